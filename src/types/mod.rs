//! Core domain types
//!
//! Validated identity and work-item types shared across the worker.

mod address;
mod work;

pub use address::*;
pub use work::*;
