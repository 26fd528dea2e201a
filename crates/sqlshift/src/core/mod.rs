//! Shared primitives: tagged values, rows, identifiers.

pub mod identifier;
pub mod value;

pub use identifier::{escape_literal, quote_backtick, quote_bracket, quote_double, TableRef};
pub use value::{Row, Value};
