//! Stake and unstake tracking.

pub mod unstake_tracker;

pub use unstake_tracker::{StakeSnapshot, StakeTracker, UnstakeWindow, net_stake};
