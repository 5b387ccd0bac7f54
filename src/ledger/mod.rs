//! Cover ledger: a local replica of on-chain covers and its refresh tasks.

pub mod cover_ledger;
pub mod refresh;

pub use cover_ledger::{
    CoverLedger, Exposure, LedgerConfig, LedgerStatus, PayoutCheck, SyncReport,
};
pub use refresh::{RefreshIntervals, spawn_refresh_tasks};
