//! Pure pricing math: risk curve, capacity and premium.
//!
//! Nothing here performs I/O or fails; degenerate inputs clamp to zero or to
//! the conservative end of a range.

pub mod capacity;
pub mod price;
pub mod risk;

pub use capacity::{Capacity, CapacityInputs, CapacityParams, calculate_capacity};
pub use price::{
    Premium, PricingParams, RateBasis, Rates, calculate_fixed_price, calculate_price, price_cover,
};
pub use risk::RiskCurve;
