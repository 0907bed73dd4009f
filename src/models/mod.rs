//! Display models for CLI output
//!
//! Row types that turn cache reports and widget descriptors into table
//! rows.

pub mod display;

pub use display::{ArgumentDisplay, CacheFileDisplay, PrunedDisplay, RemovedDisplay, WidgetKindDisplay};
