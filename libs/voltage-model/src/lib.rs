//! Voltage Model Library
//!
//! Domain types shared by the calculation pipeline:
//!
//! - `value`: dynamic [`Value`] with the coercion rules formulas depend on
//! - `item`: item, input and rule configuration
//! - `validation`: output id and input key checks

pub mod error;
pub mod item;
pub mod serde_helpers;
pub mod validation;
pub mod value;

// Re-exports for convenience
pub use error::{ModelError, Result};
pub use item::{InputConfig, ItemConfig, ItemMode, ItemType, RuleConfig};
pub use validation::{
    build_output_id, is_forbidden_key, sanitize_input_key, validate_output_id, FORBIDDEN_KEYS,
};
pub use value::{format_number, iso_string, parse_number, Value};
