use super::{
    ActiveSetResolver, AttemptContext, DiagnosticsStrategy, FailureReport, SubstepSnapshot, TangentOperatorBuilder,
    UpdateDiagnostics,
};
use crate::base::{elastic_compliance, symmetric_mandel, Config, TangentOperator};
use crate::models::SurfaceCollection;
use crate::StrError;
use log::{debug, error, warn};
use russell_lab::Vector;
use russell_tensor::{Tensor2, Tensor4};

/// Growth factor of the substep size after two consecutive successes
const STEP_GROWTH: f64 = 1.2;

/// Number of consecutive successes before the substep size grows
const N_SUCCESS_TO_GROW: usize = 2;

/// Holds the results of a stress update
#[derive(Clone, Debug)]
pub struct StressUpdate {
    /// Stress σ
    pub stress: Tensor2,

    /// Internal parameters (one per model)
    pub intnl: Vector,

    /// Plastic strain εp
    pub plastic_strain: Tensor2,

    /// Tangent operator dσ/dε
    pub tangent: Tensor4,

    /// Plastic multipliers of the last substep
    pub pm: Vec<f64>,

    /// Plastic multipliers accumulated over all substeps
    pub cumulative_pm: Vec<f64>,

    /// Information about the computation
    pub diagnostics: UpdateDiagnostics,
}

/// Applies a strain increment to a multi-surface elastoplastic material point
///
/// The increment is split into substeps which are bisected on failure and grown
/// after consecutive successes.
///
/// # Examples
///
/// ```
/// use multisurf::prelude::*;
/// use multisurf::StrError;
/// use russell_lab::Vector;
/// use russell_tensor::{LinElasticity, Mandel, Tensor2};
///
/// fn main() -> Result<(), StrError> {
///     let config = Config::new(1e-10)?;
///     let mut surfaces = SurfaceCollection::new();
///     surfaces.add(Box::new(VonMises::new(9.0, 800.0, 1e-10, 1e-10)?))?;
///     let ela = LinElasticity::new(1500.0, 0.25, true, false);
///
///     let stress = Tensor2::new(Mandel::Symmetric2D);
///     let plastic_strain = Tensor2::new(Mandel::Symmetric2D);
///     let mut delta_strain = Tensor2::new(Mandel::Symmetric2D);
///     delta_strain.vector_mut()[0] = 0.01;
///
///     let substepper = StrainSubstepper::new(&config, &surfaces);
///     let update = substepper.apply(&stress, &Vector::new(1), &plastic_strain, ela.get_modulus(), &delta_strain)?;
///     assert_eq!(update.diagnostics.active, &[true]);
///     assert_eq!(update.diagnostics.time_simulated, 1.0);
///     Ok(())
/// }
/// ```
pub struct StrainSubstepper<'a> {
    config: &'a Config,
    surfaces: &'a SurfaceCollection,
    diagnostics: Option<&'a dyn DiagnosticsStrategy>,
}

impl<'a> StrainSubstepper<'a> {
    /// Allocates a new instance
    pub fn new(config: &'a Config, surfaces: &'a SurfaceCollection) -> Self {
        StrainSubstepper {
            config,
            surfaces,
            diagnostics: None,
        }
    }

    /// Sets the strategy invoked when an update fails
    pub fn with_diagnostics(mut self, strategy: &'a dyn DiagnosticsStrategy) -> Self {
        self.diagnostics = Some(strategy);
        self
    }

    /// Performs the stress update
    ///
    /// # Input
    ///
    /// * `stress_old` -- stress at the beginning of the increment
    /// * `intnl_old` -- internal parameters at the beginning of the increment (one per model)
    /// * `plastic_strain_old` -- plastic strain at the beginning of the increment
    /// * `dde` -- elasticity tensor
    /// * `delta_strain` -- total strain increment
    pub fn apply(
        &self,
        stress_old: &Tensor2,
        intnl_old: &Vector,
        plastic_strain_old: &Tensor2,
        dde: &Tensor4,
        delta_strain: &Tensor2,
    ) -> Result<StressUpdate, StrError> {
        // check
        self.config.validate()?;
        let mandel = stress_old.mandel();
        if !symmetric_mandel(mandel) {
            return Err("tensors must have a symmetric Mandel representation");
        }
        if plastic_strain_old.mandel() != mandel || delta_strain.mandel() != mandel || dde.mandel() != mandel {
            return Err("all tensors must have the same Mandel representation");
        }
        let n = self.surfaces.n_surfaces();
        let n_models = self.surfaces.n_models();
        if intnl_old.dim() != n_models {
            return Err("intnl_old must have one entry per yield-surface model");
        }
        let mut cce = Tensor4::new(mandel);
        elastic_compliance(&mut cce, dde, self.config.singular_tol)?;

        // auxiliary
        let resolver = ActiveSetResolver::new(self.config, self.surfaces, dde, &cce);
        let mut ctx = AttemptContext::new(mandel, n, n_models);
        let mut snapshot = SubstepSnapshot {
            stress: stress_old.clone(),
            plastic_strain: plastic_strain_old.clone(),
            intnl: intnl_old.clone(),
        };
        let mut diagnostics = UpdateDiagnostics::new(n);
        let mut pm = vec![0.0; n];
        let mut cumulative_pm = vec![0.0; n];
        let mut ever_active = vec![false; n];
        let mut dep = Tensor2::new(mandel);

        // substepping
        let mut step = 1.0;
        let mut time = 0.0;
        let mut n_success = 0;
        while time < 1.0 {
            dep.set_tensor(step, delta_strain);
            let can_revert_to_dumb = self.config.dumb_allowed(step);
            let ok = resolver.return_map(&mut ctx, &snapshot.stress, &snapshot.intnl, &dep, can_revert_to_dumb)?;
            diagnostics.n_iterations += ctx.iterations;
            diagnostics.line_search_needed |= ctx.line_search_needed;
            diagnostics.ld_encountered |= ctx.ld_encountered;
            diagnostics.constraints_added |= ctx.constraints_added;
            if ok {
                snapshot = ctx.snapshot(&snapshot.plastic_strain);
                for a in 0..n {
                    pm[a] = ctx.pm[a];
                    cumulative_pm[a] += ctx.pm[a];
                    ever_active[a] |= ctx.active[a];
                }
                diagnostics.active.copy_from_slice(&ctx.active);
                diagnostics.n_substeps += 1;
                time = if step >= 1.0 - time { 1.0 } else { time + step };
                debug!("substep {} converged: step = {}, time = {}", diagnostics.n_substeps, step, time);
                n_success += 1;
                if n_success >= N_SUCCESS_TO_GROW {
                    step *= STEP_GROWTH;
                }
                step = f64::min(step, 1.0 - time);
            } else {
                let failed_step = step;
                step *= 0.5;
                n_success = 0;
                diagnostics.n_bisections += 1;
                debug!("substep failed: step = {}, time = {}", failed_step, time);
                if step < self.config.min_stepsize {
                    diagnostics.time_simulated = time;
                    return self.failure(
                        &resolver,
                        &ctx,
                        snapshot,
                        dde,
                        diagnostics,
                        pm,
                        cumulative_pm,
                        failed_step,
                    );
                }
            }
        }
        diagnostics.time_simulated = time;

        // tangent operator
        let mut tangent = Tensor4::new(mandel);
        let builder = TangentOperatorBuilder::new(self.config, self.surfaces);
        diagnostics.tangent = builder.build(
            &mut tangent,
            &snapshot.stress,
            &snapshot.intnl,
            dde,
            &cce,
            &diagnostics.active,
            &ever_active,
            &cumulative_pm,
        )?;
        Ok(StressUpdate {
            stress: snapshot.stress,
            intnl: snapshot.intnl,
            plastic_strain: snapshot.plastic_strain,
            tangent,
            pm,
            cumulative_pm,
            diagnostics,
        })
    }

    /// Handles an update that cannot be completed
    ///
    /// Returns the last admissible state if failures are ignored.
    fn failure(
        &self,
        resolver: &ActiveSetResolver,
        ctx: &AttemptContext,
        snapshot: SubstepSnapshot,
        dde: &Tensor4,
        mut diagnostics: UpdateDiagnostics,
        pm: Vec<f64>,
        cumulative_pm: Vec<f64>,
        failed_step: f64,
    ) -> Result<StressUpdate, StrError> {
        if self.config.ignore_failures {
            warn!(
                "multi-surface stress update failed at time = {}; returning the last admissible state",
                diagnostics.time_simulated
            );
            diagnostics.approximate = true;
            diagnostics.tangent = TangentOperator::Elastic;
            return Ok(StressUpdate {
                stress: snapshot.stress,
                intnl: snapshot.intnl,
                plastic_strain: snapshot.plastic_strain,
                tangent: dde.clone(),
                pm,
                cumulative_pm,
                diagnostics,
            });
        }
        let report = FailureReport {
            stress_start: snapshot.stress,
            intnl_start: snapshot.intnl,
            stress_trial: ctx.stress_trial.clone(),
            stress: ctx.stress.clone(),
            intnl: ctx.intnl.clone(),
            pm: ctx.pm.clone(),
            active: ctx.active.clone(),
            step_size: failed_step,
            time_simulated: diagnostics.time_simulated,
        };
        error!("{}", report);
        if let Some(strategy) = self.diagnostics {
            if let Err(e) = strategy.on_failure(&report, resolver.newton()) {
                warn!("diagnostics strategy failed: {}", e);
            }
        }
        Err("multi-surface stress update failed")
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
