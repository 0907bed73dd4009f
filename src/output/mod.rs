//! Output formatting for CLI results

pub mod formatters;
pub mod json;
pub mod table;

pub use formatters::{format_local_time, format_size};
pub use json::format_json;
pub use table::format_table;
