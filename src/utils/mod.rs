//! Utility functions and types for the signal engine.

pub mod error;
pub mod logging;
pub mod types;

pub use error::Error;
pub use logging::init_logging;
pub use types::*;

/// Round a price to a sensible tick: cents above $1, four decimals below.
pub fn round_price(price: f64) -> f64 {
    if price.abs() >= 1.0 {
        (price * 100.0).round() / 100.0
    } else {
        (price * 10_000.0).round() / 10_000.0
    }
}

/// Round to `dp` decimal places.
pub fn round_to(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}
