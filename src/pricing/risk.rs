//! Risk curve mapping net stake to an annual risk percentage.

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

/// Parameters of the stake-to-risk curve.
///
/// `risk = clamp(high × (1 − (stake / limit)^(1/exponent)), min, high)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskCurve {
    /// Risk percentage for an unstaked contract.
    pub high_risk_cost: Decimal,
    /// Net stake (settlement tokens) at or above which risk bottoms out.
    pub low_risk_limit: Decimal,
    /// Root applied to the stake ratio.
    pub exponent: u32,
    /// Floor of the curve. Always positive.
    pub min_risk: Decimal,
}

impl Default for RiskCurve {
    fn default() -> Self {
        Self {
            high_risk_cost: dec!(100),
            low_risk_limit: dec!(200000),
            exponent: 7,
            min_risk: dec!(2),
        }
    }
}

impl RiskCurve {
    /// Risk percentage for `net_stake` settlement tokens.
    ///
    /// Non-increasing in `net_stake` and always within
    /// `[min_risk, high_risk_cost]`.
    #[must_use]
    pub fn risk(&self, net_stake: Decimal) -> Decimal {
        if net_stake <= Decimal::ZERO || self.low_risk_limit <= Decimal::ZERO {
            return self.high_risk_cost;
        }
        if net_stake >= self.low_risk_limit {
            return self.min_risk;
        }
        let ratio = net_stake / self.low_risk_limit;
        let root = ratio
            .checked_ln()
            .and_then(|ln| ln.checked_div(Decimal::from(self.exponent.max(1))))
            .and_then(|scaled| scaled.checked_exp());
        let Some(root) = root else {
            return self.high_risk_cost;
        };
        (self.high_risk_cost * (Decimal::ONE - root))
            .max(self.min_risk)
            .min(self.high_risk_cost)
    }
}
