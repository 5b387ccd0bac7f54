//! Data Transfer Objects for REST response serialization.
//!
//! Large integers (wei amounts) are serialized as JSON strings to prevent
//! precision loss in clients.

pub mod capacity_dto;
pub mod quote_dto;

pub use capacity_dto::*;
pub use quote_dto::*;
