//! # cover-quote-engine
//!
//! Capacity, risk pricing and quote signing for mutual cover on protected
//! smart contracts.
//!
//! The engine mirrors cover records from the chain, tracks net stake per
//! contract, derives how much cover is still available, prices it along a
//! stake-driven risk curve and signs quotes an on-chain verifier accepts.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers + access control (api/)
//!     │
//!     ├── QuoteService (service/)
//!     │     ├── rate limiter, reservations, capacity cache
//!     │     ├── pricing/ (capacity, risk, premium)
//!     │     └── signing/ (keccak + secp256k1)
//!     │
//!     ├── CoverLedger + refresh tasks (ledger/)
//!     ├── StakeTracker (staking/)
//!     ├── WhitelistLoader (whitelist/)
//!     ├── ChainDataSource: JSON-RPC or in-memory (chain/)
//!     │
//!     └── PostgreSQL Persistence (optional)
//! ```

pub mod api;
pub mod app_state;
pub mod chain;
pub mod config;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod persistence;
pub mod pricing;
pub mod service;
pub mod signing;
pub mod staking;
pub mod whitelist;
