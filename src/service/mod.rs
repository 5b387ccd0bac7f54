//! Service layer: quote orchestration and the state it guards.
//!
//! [`QuoteService`] resolves the contract group, gates signing through the
//! [`RateLimiter`], reads chain state, runs the pricing math and signs.
//! [`ReservationTracker`] keeps issued quotes counted against capacity.

pub mod capacity_cache;
pub mod quote_service;
pub mod rate_limiter;
pub mod reservations;

pub use capacity_cache::CapacityCache;
pub use quote_service::{QuoteService, QuoteServiceParts, QuoteSettings};
pub use rate_limiter::{RateLimited, RateLimiter, SigningPermit};
pub use reservations::{Reservation, ReservationTracker};
