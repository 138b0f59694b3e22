use super::{DeactivationScheme, TangentOperator};
use crate::StrError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Holds configuration parameters for the multi-surface stress update
///
/// The per-surface yield tolerances and per-model internal-constraint tolerances
/// are supplied by the yield-surface models instead.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Maximum number of Newton-Raphson iterations per attempt
    #[serde(default = "default_max_nr_iterations")]
    pub max_nr_iterations: usize,

    /// Tolerance on the norm of the plastic-strain-conservation residual
    pub ep_plastic_tolerance: f64,

    /// Minimum fraction of the strain increment before sub-stepping gives up
    #[serde(default = "default_min_stepsize")]
    pub min_stepsize: f64,

    /// Maximum fraction of the strain increment for which a fallback to the dumb stage is allowed
    #[serde(default = "default_max_stepsize_for_dumb")]
    pub max_stepsize_for_dumb: f64,

    /// Policy to deactivate yield surfaces
    #[serde(default = "default_deactivation_scheme")]
    pub deactivation_scheme: DeactivationScheme,

    /// Fidelity of the tangent operator
    #[serde(default = "default_tangent_operator")]
    pub tangent_operator: TangentOperator,

    /// Returns the last admissible state instead of failing
    #[serde(default)]
    pub ignore_failures: bool,

    /// Enables the backtracking line search
    #[serde(default = "default_use_line_search")]
    pub use_line_search: bool,

    /// Minimum step length of the line search
    #[serde(default = "default_line_search_min_step")]
    pub line_search_min_step: f64,

    /// Tolerance on the ratio of singular values to detect linearly dependent flow directions
    #[serde(default = "default_ld_svd_tol")]
    pub ld_svd_tol: f64,

    /// Tolerance on the ratio of singular values to detect singular matrices in the tangent operator
    #[serde(default = "default_singular_tol")]
    pub singular_tol: f64,
}

fn default_max_nr_iterations() -> usize {
    20
}

fn default_min_stepsize() -> f64 {
    0.01
}

fn default_max_stepsize_for_dumb() -> f64 {
    0.01
}

fn default_deactivation_scheme() -> DeactivationScheme {
    DeactivationScheme::Optimized
}

fn default_tangent_operator() -> TangentOperator {
    TangentOperator::Nonlinear
}

fn default_use_line_search() -> bool {
    true
}

fn default_line_search_min_step() -> f64 {
    1e-10
}

fn default_ld_svd_tol() -> f64 {
    1e-4
}

fn default_singular_tol() -> f64 {
    1e-12
}

impl Config {
    /// Allocates a new instance with default values
    pub fn new(ep_plastic_tolerance: f64) -> Result<Self, StrError> {
        let mut config = Config {
            max_nr_iterations: default_max_nr_iterations(),
            ep_plastic_tolerance: 1.0,
            min_stepsize: default_min_stepsize(),
            max_stepsize_for_dumb: default_max_stepsize_for_dumb(),
            deactivation_scheme: default_deactivation_scheme(),
            tangent_operator: default_tangent_operator(),
            ignore_failures: false,
            use_line_search: default_use_line_search(),
            line_search_min_step: default_line_search_min_step(),
            ld_svd_tol: default_ld_svd_tol(),
            singular_tol: default_singular_tol(),
        };
        config.set_ep_plastic_tolerance(ep_plastic_tolerance)?;
        Ok(config)
    }

    /// Parses a JSON string and validates the resulting configuration
    pub fn from_json(json: &str) -> Result<Self, StrError> {
        let config: Config = serde_json::from_str(json).map_err(|_| "cannot parse JSON configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the maximum number of Newton-Raphson iterations
    pub fn set_max_nr_iterations(&mut self, value: usize) -> Result<&mut Self, StrError> {
        if value < 1 {
            return Err("max_nr_iterations must be ≥ 1");
        }
        self.max_nr_iterations = value;
        Ok(self)
    }

    /// Sets the tolerance on the plastic-strain-conservation residual
    pub fn set_ep_plastic_tolerance(&mut self, value: f64) -> Result<&mut Self, StrError> {
        if !(value > 0.0) || !value.is_finite() {
            return Err("ep_plastic_tolerance must be > 0.0");
        }
        self.ep_plastic_tolerance = value;
        Ok(self)
    }

    /// Sets the minimum fraction of the strain increment
    pub fn set_min_stepsize(&mut self, value: f64) -> Result<&mut Self, StrError> {
        if !(value > 0.0 && value <= 1.0) {
            return Err("min_stepsize must be in (0.0, 1.0]");
        }
        self.min_stepsize = value;
        Ok(self)
    }

    /// Sets the maximum fraction of the strain increment allowing a fallback to the dumb stage
    pub fn set_max_stepsize_for_dumb(&mut self, value: f64) -> Result<&mut Self, StrError> {
        if !(value > 0.0 && value <= 1.0) {
            return Err("max_stepsize_for_dumb must be in (0.0, 1.0]");
        }
        self.max_stepsize_for_dumb = value;
        Ok(self)
    }

    /// Sets the deactivation scheme
    pub fn set_deactivation_scheme(&mut self, scheme: DeactivationScheme) -> Result<&mut Self, StrError> {
        self.deactivation_scheme = scheme;
        Ok(self)
    }

    /// Sets the fidelity of the tangent operator
    pub fn set_tangent_operator(&mut self, option: TangentOperator) -> Result<&mut Self, StrError> {
        self.tangent_operator = option;
        Ok(self)
    }

    /// Sets whether failures return the last admissible state or not
    pub fn set_ignore_failures(&mut self, flag: bool) -> Result<&mut Self, StrError> {
        self.ignore_failures = flag;
        Ok(self)
    }

    /// Enables or disables the line search
    pub fn set_use_line_search(&mut self, flag: bool) -> Result<&mut Self, StrError> {
        self.use_line_search = flag;
        Ok(self)
    }

    /// Sets the minimum step length of the line search
    pub fn set_line_search_min_step(&mut self, value: f64) -> Result<&mut Self, StrError> {
        if !(value > 0.0 && value < 1.0) {
            return Err("line_search_min_step must be in (0.0, 1.0)");
        }
        self.line_search_min_step = value;
        Ok(self)
    }

    /// Sets the singular-value ratio tolerance for the linear dependence check
    pub fn set_ld_svd_tol(&mut self, value: f64) -> Result<&mut Self, StrError> {
        if !(value > 0.0 && value < 1.0) {
            return Err("ld_svd_tol must be in (0.0, 1.0)");
        }
        self.ld_svd_tol = value;
        Ok(self)
    }

    /// Sets the singular-value ratio tolerance for the tangent operator inversions
    pub fn set_singular_tol(&mut self, value: f64) -> Result<&mut Self, StrError> {
        if !(value > 0.0 && value < 1.0) {
            return Err("singular_tol must be in (0.0, 1.0)");
        }
        self.singular_tol = value;
        Ok(self)
    }

    /// Returns whether a hybrid scheme may fall back to the dumb stage for a substep
    ///
    /// The fallback is allowed for substeps not larger than `max_stepsize_for_dumb` and for
    /// the smallest substep, i.e., one whose bisection would fall below `min_stepsize`.
    pub fn dumb_allowed(&self, step: f64) -> bool {
        step <= self.max_stepsize_for_dumb || 0.5 * step < self.min_stepsize
    }

    /// Validates all data
    pub fn validate(&self) -> Result<(), StrError> {
        if self.max_nr_iterations < 1 {
            return Err("max_nr_iterations must be ≥ 1");
        }
        if !(self.ep_plastic_tolerance > 0.0) || !self.ep_plastic_tolerance.is_finite() {
            return Err("ep_plastic_tolerance must be > 0.0");
        }
        if !(self.min_stepsize > 0.0 && self.min_stepsize <= 1.0) {
            return Err("min_stepsize must be in (0.0, 1.0]");
        }
        if !(self.max_stepsize_for_dumb > 0.0 && self.max_stepsize_for_dumb <= 1.0) {
            return Err("max_stepsize_for_dumb must be in (0.0, 1.0]");
        }
        if !(self.line_search_min_step > 0.0 && self.line_search_min_step < 1.0) {
            return Err("line_search_min_step must be in (0.0, 1.0)");
        }
        if !(self.ld_svd_tol > 0.0 && self.ld_svd_tol < 1.0) {
            return Err("ld_svd_tol must be in (0.0, 1.0)");
        }
        if !(self.singular_tol > 0.0 && self.singular_tol < 1.0) {
            return Err("singular_tol must be in (0.0, 1.0)");
        }
        Ok(())
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration data")?;
        writeln!(f, "==================")?;
        writeln!(f, "max_nr_iterations = {:?}", self.max_nr_iterations)?;
        writeln!(f, "ep_plastic_tolerance = {:?}", self.ep_plastic_tolerance)?;
        writeln!(f, "min_stepsize = {:?}", self.min_stepsize)?;
        writeln!(f, "max_stepsize_for_dumb = {:?}", self.max_stepsize_for_dumb)?;
        writeln!(f, "deactivation_scheme = {:?}", self.deactivation_scheme)?;
        writeln!(f, "tangent_operator = {:?}", self.tangent_operator)?;
        writeln!(f, "ignore_failures = {:?}", self.ignore_failures)?;
        writeln!(f, "use_line_search = {:?}", self.use_line_search)?;
        writeln!(f, "line_search_min_step = {:?}", self.line_search_min_step)?;
        writeln!(f, "ld_svd_tol = {:?}", self.ld_svd_tol)?;
        writeln!(f, "singular_tol = {:?}", self.singular_tol)?;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
