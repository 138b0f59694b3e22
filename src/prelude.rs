//! Makes available common structures needed to run a stress update
//!
//! You may write `use multisurf::prelude::*` in your code and obtain
//! access to commonly used functionality.

pub use crate::base::{Config, DeactivationScheme, TangentOperator};
pub use crate::models::{AxialTensionCutoff, DruckerPrager, SurfaceCollection, VonMises, YieldSurfaceModel};
pub use crate::solver::{
    DiagnosticsStrategy, FailureReport, FiniteDifferenceChecker, StrainSubstepper, StressUpdate, UpdateDiagnostics,
};
