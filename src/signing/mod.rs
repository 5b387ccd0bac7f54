//! Quote attestation: packed encoding and secp256k1 signing.

pub mod encoding;
pub mod quote_signer;

pub use encoding::{PACKED_LEN, QuoteParams};
pub use quote_signer::{QuoteSigner, SignerError, recover_signer};
