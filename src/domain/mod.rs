//! Domain layer: addresses, currencies, covers, contract metadata and quotes.
//!
//! Everything here is plain data plus validation. Amounts are whole-unit
//! [`rust_decimal::Decimal`] values; see [`units`] for conversions to and
//! from 18-decimal integers.

pub mod address;
pub mod capacity;
pub mod contract_meta;
pub mod cover;
pub mod currency;
pub mod quote;
pub mod units;

pub use address::{Address, AddressError};
pub use capacity::{BindingLimit, CapacitySnapshot};
pub use contract_meta::{ContractMetadata, TrustClass};
pub use cover::{CoverRecord, CoverStatus};
pub use currency::{Currency, UnsupportedCurrency};
pub use quote::{
    QuoteOutcome, QuoteRejection, QuoteRequest, QuoteRequestError, QuoteSignature, SignedQuote,
};
