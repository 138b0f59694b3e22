use super::{AttemptContext, ConstraintNewtonSolver, SystemLayout};
use crate::base::TangentOperator;
use crate::models::{SurfaceCollection, SurfaceData};
use crate::StrError;
use log::{info, warn};
use russell_lab::{deriv1_central5, Vector};
use russell_tensor::Tensor2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Holds information about how a stress update was computed
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UpdateDiagnostics {
    /// Total number of Newton iterations (all substeps and attempts)
    pub n_iterations: usize,

    /// Number of successful substeps
    pub n_substeps: usize,

    /// Number of times the substep size was halved
    pub n_bisections: usize,

    /// A line search step shorter than the full Newton step was taken
    pub line_search_needed: bool,

    /// Linearly dependent flow directions were found
    pub ld_encountered: bool,

    /// Surfaces were added to the active set after an admissibility check
    pub constraints_added: bool,

    /// The result is the last admissible state of a failed update
    pub approximate: bool,

    /// Fidelity of the tangent operator actually computed
    pub tangent: TangentOperator,

    /// Active surfaces at the end of the update
    pub active: Vec<bool>,

    /// Fraction of the strain increment that was applied
    pub time_simulated: f64,
}

impl UpdateDiagnostics {
    /// Allocates a new instance
    pub fn new(n_surfaces: usize) -> Self {
        UpdateDiagnostics {
            n_iterations: 0,
            n_substeps: 0,
            n_bisections: 0,
            line_search_needed: false,
            ld_encountered: false,
            constraints_added: false,
            approximate: false,
            tangent: TangentOperator::Elastic,
            active: vec![false; n_surfaces],
            time_simulated: 0.0,
        }
    }
}

/// Holds the state at which a stress update failed
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FailureReport {
    /// Stress at the start of the failed substep
    pub stress_start: Tensor2,

    /// Internal parameters at the start of the failed substep
    pub intnl_start: Vector,

    /// Trial stress of the failed substep
    pub stress_trial: Tensor2,

    /// Last stress of the failed attempt
    pub stress: Tensor2,

    /// Last internal parameters of the failed attempt
    pub intnl: Vector,

    /// Last plastic multipliers of the failed attempt
    pub pm: Vec<f64>,

    /// Last active set of the failed attempt
    pub active: Vec<bool>,

    /// Size of the failed substep
    pub step_size: f64,

    /// Fraction of the strain increment applied before the failure
    pub time_simulated: f64,
}

impl FailureReport {
    /// Returns an attempt context holding the reported state
    pub fn to_context(&self) -> AttemptContext {
        let mut ctx = AttemptContext::new(self.stress.mandel(), self.pm.len(), self.intnl.dim());
        ctx.begin(&self.stress_trial, &self.intnl_start);
        ctx.stress.set_tensor(1.0, &self.stress);
        for m in 0..self.intnl.dim() {
            ctx.intnl[m] = self.intnl[m];
        }
        ctx.pm.copy_from_slice(&self.pm);
        ctx.active.copy_from_slice(&self.active);
        ctx
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Multi-surface stress update failure")?;
        writeln!(f, "===================================")?;
        writeln!(f, "step_size = {:?}", self.step_size)?;
        writeln!(f, "time_simulated = {:?}", self.time_simulated)?;
        writeln!(f, "stress_start = {:?}", self.stress_start.vector().as_data())?;
        writeln!(f, "intnl_start = {:?}", self.intnl_start.as_data())?;
        writeln!(f, "stress_trial = {:?}", self.stress_trial.vector().as_data())?;
        writeln!(f, "stress = {:?}", self.stress.vector().as_data())?;
        writeln!(f, "intnl = {:?}", self.intnl.as_data())?;
        writeln!(f, "pm = {:?}", self.pm)?;
        writeln!(f, "active = {:?}", self.active)?;
        Ok(())
    }
}

/// Defines an action taken when a stress update fails
///
/// The solver gives access to the residual and Jacobian of the constraint system.
pub trait DiagnosticsStrategy: Send + Sync {
    /// Handles a failure
    fn on_failure(&self, report: &FailureReport, solver: &ConstraintNewtonSolver) -> Result<(), StrError>;
}

/// Holds the largest relative errors between analytical and numerical derivatives
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct DerivativeErrors {
    /// ∂f/∂σ
    pub df_dstress: f64,

    /// ∂f/∂q
    pub df_dintnl: f64,

    /// ∂r/∂σ
    pub dflow_dstress: f64,

    /// ∂r/∂q
    pub dflow_dintnl: f64,

    /// ∂h/∂σ
    pub dhard_dstress: f64,

    /// ∂h/∂q
    pub dhard_dintnl: f64,

    /// Jacobian of the Newton system
    pub jacobian: f64,
}

impl DerivativeErrors {
    /// Returns the largest error
    pub fn max(&self) -> f64 {
        [
            self.df_dstress,
            self.df_dintnl,
            self.dflow_dstress,
            self.dflow_dintnl,
            self.dhard_dstress,
            self.dhard_dintnl,
            self.jacobian,
        ]
        .iter()
        .fold(0.0, |acc, e| f64::max(acc, *e))
    }
}

/// Compares analytical derivatives against central finite differences
///
/// As a [DiagnosticsStrategy], the check runs at the reported failure state and
/// the errors are logged and kept for later inspection.
pub struct FiniteDifferenceChecker {
    last: Mutex<Option<DerivativeErrors>>,
}

/// Returns |a - b| / max(1, |b|)
fn relative_error(analytical: f64, numerical: f64) -> f64 {
    f64::abs(analytical - numerical) / f64::max(1.0, f64::abs(numerical))
}

/// Computes the numerical derivative of g(σ) w.r.t the j-th Mandel component of σ
fn num_deriv_stress<F>(stress: &Tensor2, j: usize, mut g: F) -> Result<f64, StrError>
where
    F: FnMut(&Tensor2) -> Result<f64, StrError>,
{
    let mut args = stress.clone();
    deriv1_central5(stress.vector()[j], &mut args, |x, s| {
        s.vector_mut()[j] = x;
        g(s)
    })
}

/// Computes the numerical derivative of g(q) w.r.t q
fn num_deriv_intnl<F>(intnl: f64, mut g: F) -> Result<f64, StrError>
where
    F: FnMut(f64) -> Result<f64, StrError>,
{
    let mut args = 0;
    deriv1_central5(intnl, &mut args, |x, _| g(x))
}

impl FiniteDifferenceChecker {
    /// Allocates a new instance
    pub fn new() -> Self {
        FiniteDifferenceChecker { last: Mutex::new(None) }
    }

    /// Returns the errors of the last check performed through [DiagnosticsStrategy::on_failure]
    pub fn last(&self) -> Option<DerivativeErrors> {
        match self.last.lock() {
            Ok(guard) => *guard,
            Err(_) => None,
        }
    }

    /// Checks the derivatives of all models at the given state
    ///
    /// The `jacobian` field of the result is left at zero.
    pub fn check_derivatives(
        &self,
        surfaces: &SurfaceCollection,
        stress: &Tensor2,
        intnl: &Vector,
    ) -> Result<DerivativeErrors, StrError> {
        let mandel = stress.mandel();
        let nd = stress.dim();
        let mut data = SurfaceData::new(mandel, surfaces.n_surfaces());
        surfaces.all_terms(&mut data, stress, intnl)?;
        let mut errors = DerivativeErrors::default();
        for m in 0..surfaces.n_models() {
            let model = surfaces.model(m);
            let range = surfaces.surfaces_of(m);
            let ns = range.len();
            let q = intnl[m];
            let mut f = vec![0.0; ns];
            let mut r = vec![Tensor2::new(mandel); ns];
            let mut h = vec![0.0; ns];
            for a in range.clone() {
                let k = a - range.start;

                // yield function
                for j in 0..nd {
                    let num = num_deriv_stress(stress, j, |s| {
                        model.yield_function(&mut f, s, q)?;
                        Ok(f[k])
                    })?;
                    let e = relative_error(data.df[a].vector()[j], num);
                    errors.df_dstress = f64::max(errors.df_dstress, e);
                }
                let num = num_deriv_intnl(q, |x| {
                    model.yield_function(&mut f, stress, x)?;
                    Ok(f[k])
                })?;
                errors.df_dintnl = f64::max(errors.df_dintnl, relative_error(data.dfq[a], num));

                // flow direction
                for i in 0..nd {
                    for j in 0..nd {
                        let num = num_deriv_stress(stress, j, |s| {
                            model.flow_potential(&mut r, s, q)?;
                            Ok(r[k].vector()[i])
                        })?;
                        let e = relative_error(data.dr[a].matrix().get(i, j), num);
                        errors.dflow_dstress = f64::max(errors.dflow_dstress, e);
                    }
                    let num = num_deriv_intnl(q, |x| {
                        model.flow_potential(&mut r, stress, x)?;
                        Ok(r[k].vector()[i])
                    })?;
                    let e = relative_error(data.drq[a].vector()[i], num);
                    errors.dflow_dintnl = f64::max(errors.dflow_dintnl, e);
                }

                // hardening potential
                for j in 0..nd {
                    let num = num_deriv_stress(stress, j, |s| {
                        model.hard_potential(&mut h, s, q)?;
                        Ok(h[k])
                    })?;
                    let e = relative_error(data.dh[a].vector()[j], num);
                    errors.dhard_dstress = f64::max(errors.dhard_dstress, e);
                }
                let num = num_deriv_intnl(q, |x| {
                    model.hard_potential(&mut h, stress, x)?;
                    Ok(h[k])
                })?;
                errors.dhard_dintnl = f64::max(errors.dhard_dintnl, relative_error(data.dhq[a], num));
            }
        }
        Ok(errors)
    }

    /// Checks the Jacobian of the Newton system for the active set in the context
    ///
    /// Returns the largest relative error.
    pub fn check_jacobian(&self, solver: &ConstraintNewtonSolver, ctx: &AttemptContext) -> Result<f64, StrError> {
        let layout = SystemLayout::new(ctx, solver.surfaces());
        let jj = solver.jacobian(ctx, &layout)?;
        let dim = layout.dim();
        let stress0 = ctx.stress.clone();
        let pm0 = ctx.pm.clone();
        let intnl0 = ctx.intnl.clone();
        let mut work = ctx.clone();
        let mut error = 0.0;
        for j in 0..dim {
            let mut ej = Vector::new(dim);
            ej[j] = 1.0;
            for i in 0..dim {
                let num = deriv1_central5(0.0, &mut work, |alpha, c| {
                    layout.apply(c, &stress0, &pm0, &intnl0, &ej, alpha);
                    let res = solver.residual(c)?;
                    Ok(solver.residual_vector(&res, &layout)[i])
                })?;
                error = f64::max(error, relative_error(jj.get(i, j), num));
            }
        }
        Ok(error)
    }
}

impl DiagnosticsStrategy for FiniteDifferenceChecker {
    fn on_failure(&self, report: &FailureReport, solver: &ConstraintNewtonSolver) -> Result<(), StrError> {
        let mut errors = self.check_derivatives(solver.surfaces(), &report.stress, &report.intnl)?;
        errors.jacobian = self.check_jacobian(solver, &report.to_context())?;
        if errors.max() > 1e-6 {
            warn!("analytical derivatives differ from finite differences: {:?}", errors);
        } else {
            info!("analytical derivatives agree with finite differences: {:?}", errors);
        }
        if let Ok(mut guard) = self.last.lock() {
            *guard = Some(errors);
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
