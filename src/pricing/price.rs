//! Premium calculation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::Currency;

/// Tunables of the premium formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingParams {
    /// Loading on top of the pure risk premium.
    pub surplus_margin: Decimal,
    /// Days per year used to pro-rate annual rates.
    pub days_per_year: Decimal,
}

impl Default for PricingParams {
    fn default() -> Self {
        Self {
            surplus_margin: dec!(0.3),
            days_per_year: dec!(365.25),
        }
    }
}

/// `amount × risk/100 × (1 + surplusMargin) × period / daysPerYear`.
///
/// Linear in each of `amount`, `risk_percent` and `period_days`.
#[must_use]
pub fn calculate_price(
    amount: Decimal,
    risk_percent: Decimal,
    period_days: Decimal,
    params: &PricingParams,
) -> Decimal {
    amount * risk_percent / dec!(100) * (Decimal::ONE + params.surplus_margin) * period_days
        / params.days_per_year
}

/// Flat-rate premium: `amount × bps/10000 × period / daysPerYear`, no margin.
#[must_use]
pub fn calculate_fixed_price(
    amount: Decimal,
    annual_rate_bps: u32,
    period_days: Decimal,
    params: &PricingParams,
) -> Decimal {
    amount * Decimal::from(annual_rate_bps) / dec!(10000) * period_days / params.days_per_year
}

/// Exchange rates needed to express a premium in every unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rates {
    /// DAI per ETH.
    pub dai_per_eth: Decimal,
    /// ETH per settlement token.
    pub token_price_eth: Decimal,
}

impl Rates {
    /// Units of `currency` per ETH.
    #[must_use]
    pub fn per_eth(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Eth => Decimal::ONE,
            Currency::Dai => self.dai_per_eth,
        }
    }

    /// Converts an amount of `currency` to ETH. `None` if the rate is zero.
    #[must_use]
    pub fn to_eth(&self, amount: Decimal, currency: Currency) -> Option<Decimal> {
        amount.checked_div(self.per_eth(currency))
    }
}

/// A premium expressed in the cover currency, ETH and the settlement token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Premium {
    /// Premium in ETH.
    pub eth: Decimal,
    /// Premium in the cover currency.
    pub in_currency: Decimal,
    /// Premium in settlement tokens.
    pub in_token: Decimal,
}

/// How the annual rate of a contract is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateBasis {
    /// Risk-curve percentage, loaded with the surplus margin.
    Risk(Decimal),
    /// Whitelisted flat rate in basis points.
    Fixed(u32),
}

/// Prices `amount` of `currency` for `period_days`. The premium is computed in
/// ETH and then converted. `None` when a conversion rate is zero.
#[must_use]
pub fn price_cover(
    amount: Decimal,
    currency: Currency,
    period_days: Decimal,
    basis: RateBasis,
    rates: &Rates,
    params: &PricingParams,
) -> Option<Premium> {
    let amount_eth = rates.to_eth(amount, currency)?;
    let eth = match basis {
        RateBasis::Risk(risk) => calculate_price(amount_eth, risk, period_days, params),
        RateBasis::Fixed(bps) => calculate_fixed_price(amount_eth, bps, period_days, params),
    };
    Some(Premium {
        eth,
        in_currency: eth * rates.per_eth(currency),
        in_token: eth.checked_div(rates.token_price_eth)?,
    })
}
