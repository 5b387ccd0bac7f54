//! Coverable-contracts whitelist and its metadata.

pub mod loader;
pub mod registry;

pub use loader::{WhitelistLoader, WhitelistSource};
pub use registry::{ContractGroup, Whitelist, WhitelistError};
