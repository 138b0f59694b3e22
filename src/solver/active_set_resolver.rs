use super::{AttemptContext, ConstraintNewtonSolver};
use crate::base::{Config, Stage};
use crate::models::SurfaceCollection;
use crate::StrError;
use log::debug;
use russell_lab::Vector;
use russell_tensor::{t4_ddot_t2_update, Tensor2, Tensor4};

/// Defines the outcome of the checks after a Newton solve
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Outcome {
    /// Converged, complementary, and admissible
    Success,

    /// A new active set was selected
    Retry,

    /// The current stage has no repair left
    Escalate,

    /// Non-finite yield functions
    Fail,
}

/// Selects the active set, runs the Newton solver, and validates the result
pub struct ActiveSetResolver<'a> {
    config: &'a Config,
    surfaces: &'a SurfaceCollection,
    newton: ConstraintNewtonSolver<'a>,
}

impl<'a> ActiveSetResolver<'a> {
    /// Allocates a new instance
    ///
    /// `dde` is the elasticity tensor and `cce` its inverse (compliance).
    pub fn new(config: &'a Config, surfaces: &'a SurfaceCollection, dde: &'a Tensor4, cce: &'a Tensor4) -> Self {
        ActiveSetResolver {
            config,
            surfaces,
            newton: ConstraintNewtonSolver::new(config, surfaces, dde, cce),
        }
    }

    /// Returns access to the Newton solver
    pub fn newton(&self) -> &ConstraintNewtonSolver<'a> {
        &self.newton
    }

    /// Performs the return mapping of one substep
    ///
    /// Computes the trial stress `σ_start + E : dep` and returns whether a converged,
    /// complementary, and admissible state was found. The result is left in `ctx`.
    ///
    /// `can_revert_to_dumb` enables the dumb stage of hybrid schemes.
    pub fn return_map(
        &self,
        ctx: &mut AttemptContext,
        stress_start: &Tensor2,
        intnl_start: &Vector,
        dep: &Tensor2,
        can_revert_to_dumb: bool,
    ) -> Result<bool, StrError> {
        // trial state
        let mut trial = stress_start.clone();
        t4_ddot_t2_update(&mut trial, 1.0, self.newton.elasticity(), dep, 1.0); // σ += E : Δε
        ctx.begin(&trial, intnl_start);

        // elastic short-circuit
        let n = self.surfaces.n_surfaces();
        let mut f = vec![0.0; n];
        self.surfaces.yield_functions(&mut f, &trial, intnl_start)?;
        if f.iter().any(|v| !v.is_finite()) {
            debug!("non-finite yield function at the trial stress");
            return Ok(false);
        }
        let initial: Vec<bool> = (0..n).map(|a| f[a] > self.surfaces.f_tol(a)).collect();
        if !initial.iter().any(|a| *a) {
            return Ok(true);
        }

        // stages
        let stages = self.config.deactivation_scheme.stages_for_substep(can_revert_to_dumb);
        let mut index = 0;
        let mut ready = self.start_stage(ctx, stages[index], &initial, &f)?;
        let mut tried: Vec<Vec<bool>> = Vec::new();
        loop {
            let outcome = if !ready || (ctx.stage != Stage::Dumb && tried.contains(&ctx.active)) {
                Outcome::Escalate
            } else {
                tried.push(ctx.active.clone());
                ctx.reset_to_trial();
                let converged = self.newton.solve(ctx)?;
                self.check(ctx, converged)?
            };
            match outcome {
                Outcome::Success => return Ok(true),
                Outcome::Fail => return Ok(false),
                Outcome::Retry => ready = true,
                Outcome::Escalate => {
                    index += 1;
                    if index >= stages.len() {
                        debug!("all stages exhausted");
                        return Ok(false);
                    }
                    tried.clear();
                    ready = self.start_stage(ctx, stages[index], &initial, &f)?;
                }
            }
        }
    }

    /// Configures the active set for a new stage; returns false if the stage has nothing to try
    ///
    /// `f_trial` holds the yield functions at the trial state.
    fn start_stage(
        &self,
        ctx: &mut AttemptContext,
        stage: Stage,
        initial: &[bool],
        f_trial: &[f64],
    ) -> Result<bool, StrError> {
        debug!("starting {:?} stage", stage);
        ctx.stage = stage;
        match stage {
            Stage::Optimized | Stage::Safe => {
                ctx.active.copy_from_slice(initial);
                Ok(true)
            }
            Stage::Dumb => {
                ctx.dumb_order = self.dumb_order(&ctx.stress_trial, &ctx.intnl_old, f_trial)?;
                ctx.dumb_iteration = 0;
                if !ctx.can_increment_dumb() {
                    return Ok(false);
                }
                ctx.increment_dumb();
                Ok(true)
            }
        }
    }

    /// Orders the surfaces by decreasing distance f / |df/dσ| from the trial stress
    ///
    /// The pairs (distance, index) are sorted in ascending order and then reversed;
    /// thus, ties put the higher index first. Surfaces with a null gradient come last.
    pub fn dumb_order(&self, stress_trial: &Tensor2, intnl: &Vector, f_trial: &[f64]) -> Result<Vec<usize>, StrError> {
        let n = self.surfaces.n_surfaces();
        let mut df = vec![Tensor2::new(stress_trial.mandel()); n];
        self.surfaces.df_dstress(&mut df, stress_trial, intnl)?;
        let mut dist: Vec<(f64, usize)> = (0..n)
            .map(|a| {
                let norm = df[a].norm();
                let d = if norm > 0.0 { f_trial[a] / norm } else { f64::NEG_INFINITY };
                (d, a)
            })
            .collect();
        dist.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
        Ok(dist.iter().rev().map(|(_, a)| *a).collect())
    }

    /// Checks the result of a Newton solve and selects the next action
    fn check(&self, ctx: &mut AttemptContext, converged: bool) -> Result<Outcome, StrError> {
        let n = self.surfaces.n_surfaces();
        let mut f = vec![0.0; n];
        self.surfaces.yield_functions(&mut f, &ctx.stress, &ctx.intnl)?;
        if f.iter().any(|v| !v.is_finite()) {
            debug!("non-finite yield function after Newton");
            return Ok(Outcome::Fail);
        }

        // the dumb stage only moves to the next combination
        if ctx.stage == Stage::Dumb {
            if converged && self.kuhn_tucker_ok(ctx, &f) && self.admissible(&f) {
                return Ok(Outcome::Success);
            }
            if ctx.can_increment_dumb() {
                ctx.increment_dumb();
                return Ok(Outcome::Retry);
            }
            return Ok(Outcome::Escalate);
        }

        // (1) convergence
        if !converged {
            return Ok(Outcome::Escalate);
        }

        // (2) Kuhn-Tucker
        if !self.kuhn_tucker_ok(ctx, &f) {
            return Ok(self.repair_kuhn_tucker(ctx, &f));
        }

        // (3) admissibility of all surfaces
        if self.admissible(&f) {
            return Ok(Outcome::Success);
        }
        let mut added = false;
        for a in 0..n {
            if !ctx.active[a] && f[a] > self.surfaces.f_tol(a) {
                ctx.active[a] = true;
                added = true;
            }
        }
        if !added {
            return Ok(Outcome::Escalate);
        }
        ctx.constraints_added = true;
        debug!("constraints added; active set = {:?}", ctx.active);
        Ok(Outcome::Retry)
    }

    /// Checks the complementarity conditions
    pub fn kuhn_tucker_ok(&self, ctx: &AttemptContext, f: &[f64]) -> bool {
        for a in 0..f.len() {
            let f_tol = self.surfaces.f_tol(a);
            if ctx.active[a] {
                if ctx.pm[a] < 0.0 || f[a] > f_tol {
                    return false;
                }
                if f[a] < -f_tol && ctx.pm[a] != 0.0 {
                    return false;
                }
            } else if ctx.pm[a] != 0.0 {
                return false;
            }
        }
        true
    }

    /// Checks whether all yield functions are within tolerance
    pub fn admissible(&self, f: &[f64]) -> bool {
        f.iter().enumerate().all(|(a, v)| *v <= self.surfaces.f_tol(a))
    }

    /// Deactivates the surfaces violating the complementarity conditions
    fn repair_kuhn_tucker(&self, ctx: &mut AttemptContext, f: &[f64]) -> Outcome {
        let n = f.len();
        let mut changed = false;
        for a in 0..n {
            let direct = f[a] < -self.surfaces.f_tol(a) && ctx.pm[a] != 0.0;
            let negative = ctx.stage == Stage::Safe && ctx.pm[a] < 0.0;
            if ctx.active[a] && (direct || negative) {
                ctx.active[a] = false;
                changed = true;
            }
        }
        if !changed {
            let mut most_negative: Option<usize> = None;
            for a in 0..n {
                if ctx.active[a] && ctx.pm[a] < 0.0 {
                    match most_negative {
                        Some(b) if ctx.pm[b] <= ctx.pm[a] => (),
                        _ => most_negative = Some(a),
                    }
                }
            }
            match most_negative {
                Some(a) => ctx.active[a] = false,
                None => return Outcome::Escalate,
            }
        }
        debug!("Kuhn-Tucker repair; active set = {:?}", ctx.active);
        Outcome::Retry
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
