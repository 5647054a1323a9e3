pub mod amount;

// Re-export commonly used functions
pub use amount::{format_units, parse_units};
