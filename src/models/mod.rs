//! Implements the yield-surface models and their collection

mod collection;
mod drucker_prager;
mod samples;
mod tension_cutoff;
mod von_mises;
mod yield_surface;
pub use crate::models::collection::*;
pub use crate::models::drucker_prager::*;
pub use crate::models::samples::*;
pub use crate::models::tension_cutoff::*;
pub use crate::models::von_mises::*;
pub use crate::models::yield_surface::*;
