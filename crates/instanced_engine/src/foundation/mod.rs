//! Foundation module - Core utilities and types
//!
//! - Math types and operations
//! - Logging utilities

pub mod math;
pub mod logging;
