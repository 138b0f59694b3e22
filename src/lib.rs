//! Multi-surface elastoplastic stress update
//!
//! Given the old state of a material point and a strain increment, computes the new
//! stress, internal parameters, plastic strain, and consistent tangent operator for
//! any number of simultaneously active yield surfaces.

/// Defines a type alias for the error type as a static string
pub type StrError = &'static str;

pub mod base;
pub mod models;
pub mod prelude;
pub mod solver;
