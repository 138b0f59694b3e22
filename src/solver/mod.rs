//! Implements the stress-update solver: sub-stepping, active-set resolution, Newton iterations, and tangent operator

mod active_set_resolver;
mod attempt_context;
mod constraint_newton;
mod diagnostics;
mod strain_substepper;
mod tangent_operator;
pub use crate::solver::active_set_resolver::*;
pub use crate::solver::attempt_context::*;
pub use crate::solver::constraint_newton::*;
pub use crate::solver::diagnostics::*;
pub use crate::solver::strain_substepper::*;
pub use crate::solver::tangent_operator::*;
