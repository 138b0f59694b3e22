//! Implements the base structures: configuration, options, and numeric utilities

mod config;
mod enums;
mod numerics;
pub use crate::base::config::*;
pub use crate::base::enums::*;
pub use crate::base::numerics::*;
