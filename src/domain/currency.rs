//! Cover currencies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Currency a cover is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    /// Ether. The base unit for all internal pricing.
    #[serde(rename = "ETH")]
    Eth,
    /// DAI stablecoin.
    #[serde(rename = "DAI")]
    Dai,
}

impl Currency {
    /// All supported currencies.
    pub const ALL: [Self; 2] = [Self::Eth, Self::Dai];

    /// Ticker symbol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eth => "ETH",
            Self::Dai => "DAI",
        }
    }

    /// The `bytes4` code the verifier contract uses: ASCII ticker, right-padded
    /// with zero bytes.
    #[must_use]
    pub const fn code(self) -> [u8; 4] {
        match self {
            Self::Eth => *b"ETH\0",
            Self::Dai => *b"DAI\0",
        }
    }

    /// Parses a `bytes4` currency code as stored on chain.
    #[must_use]
    pub fn from_code(code: [u8; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unsupported currency string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported currency: {0}")]
pub struct UnsupportedCurrency(pub String);

impl FromStr for Currency {
    type Err = UnsupportedCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ETH" => Ok(Self::Eth),
            "DAI" => Ok(Self::Dai),
            _ => Err(UnsupportedCurrency(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_right_padded_ascii() {
        assert_eq!(Currency::Eth.code(), [0x45, 0x54, 0x48, 0x00]);
        assert_eq!(Currency::Dai.code(), [0x44, 0x41, 0x49, 0x00]);
    }

    #[test]
    fn from_code_round_trips() {
        for currency in Currency::ALL {
            assert_eq!(Currency::from_code(currency.code()), Some(currency));
        }
        assert_eq!(Currency::from_code(*b"BTC\0"), None);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("eth".parse::<Currency>(), Ok(Currency::Eth));
        assert_eq!("Dai".parse::<Currency>(), Ok(Currency::Dai));
        assert!("BLA".parse::<Currency>().is_err());
    }
}
