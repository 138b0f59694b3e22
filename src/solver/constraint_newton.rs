use super::AttemptContext;
use crate::base::{half_squared_scaled, singular_value_ratio, Config, Stage};
use crate::models::{SurfaceCollection, SurfaceData};
use crate::StrError;
use log::debug;
use russell_lab::{solve_lin_sys, vec_scale, Matrix, Vector};
use russell_tensor::{t2_add, t4_ddot_t2, Tensor2, Tensor4};

/// Coefficient of the sufficient decrease condition of the line search
const LS_ALPHA: f64 = 1e-4;

/// Holds the residuals of the constraint system at one state
pub struct Residual {
    /// Yield functions of all surfaces
    pub f: Vec<f64>,

    /// Flow directions of all surfaces
    pub r: Vec<Tensor2>,

    /// Hardening potentials of all surfaces
    pub h: Vec<f64>,

    /// Plastic-strain-conservation residual: Σ pm r - E⁻¹ : (σ_trial - σ)
    pub epp: Tensor2,

    /// Internal-constraint residual of each model (zero if the model has no surface in the system)
    pub ic: Vec<f64>,

    /// Convergence metric
    pub metric: f64,
}

/// Maps the unknowns of the Newton system to stress, multipliers, and internal parameters
///
/// ```text
/// x = [ dσ (nd) | dpm (surfaces in the system) | dq (models with a surface in the system) ]
/// ```
pub struct SystemLayout {
    /// Dimension of the Mandel vectors
    pub nd: usize,

    /// Surfaces in the system
    pub surfaces: Vec<usize>,

    /// Models with at least one surface in the system
    pub models: Vec<usize>,
}

impl SystemLayout {
    /// Allocates a new instance from the current active set
    pub fn new(ctx: &AttemptContext, collection: &SurfaceCollection) -> Self {
        let surfaces: Vec<usize> = (0..collection.n_surfaces()).filter(|a| ctx.in_system(*a)).collect();
        let mut models: Vec<usize> = surfaces.iter().map(|a| collection.model_of(*a)).collect();
        models.dedup();
        SystemLayout {
            nd: ctx.stress.dim(),
            surfaces,
            models,
        }
    }

    /// Returns the number of unknowns
    pub fn dim(&self) -> usize {
        self.nd + self.surfaces.len() + self.models.len()
    }

    /// Returns the position of the internal parameter of a model among the unknowns
    pub fn intnl_index(&self, model: usize) -> Option<usize> {
        let n = self.nd + self.surfaces.len();
        self.models.iter().position(|m| *m == model).map(|k| n + k)
    }

    /// Sets the state to `start + α x`
    pub fn apply(
        &self,
        ctx: &mut AttemptContext,
        stress0: &Tensor2,
        pm0: &[f64],
        intnl0: &Vector,
        x: &Vector,
        alpha: f64,
    ) {
        let nd = self.nd;
        let ns = self.surfaces.len();
        let sig = ctx.stress.vector_mut();
        for i in 0..nd {
            sig[i] = stress0.vector()[i] + alpha * x[i];
        }
        for (k, a) in self.surfaces.iter().enumerate() {
            ctx.pm[*a] = pm0[*a] + alpha * x[nd + k];
        }
        for (k, m) in self.models.iter().enumerate() {
            ctx.intnl[*m] = intnl0[*m] + alpha * x[nd + ns + k];
        }
    }
}

/// Solves the coupled yield, plastic-strain, and internal-constraint equations for a fixed active set
pub struct ConstraintNewtonSolver<'a> {
    config: &'a Config,
    surfaces: &'a SurfaceCollection,
    dde: &'a Tensor4,
    cce: &'a Tensor4,
}

impl<'a> ConstraintNewtonSolver<'a> {
    /// Allocates a new instance
    ///
    /// `dde` is the elasticity tensor and `cce` its inverse (compliance).
    pub fn new(config: &'a Config, surfaces: &'a SurfaceCollection, dde: &'a Tensor4, cce: &'a Tensor4) -> Self {
        ConstraintNewtonSolver {
            config,
            surfaces,
            dde,
            cce,
        }
    }

    /// Returns the elasticity tensor
    pub fn elasticity(&self) -> &Tensor4 {
        self.dde
    }

    /// Returns the yield-surface collection
    pub fn surfaces(&self) -> &SurfaceCollection {
        self.surfaces
    }

    /// Calculates the plastic strain increment Δεp = E⁻¹ : (σ_trial - σ)
    pub fn plastic_strain_increment(&self, delta_dp: &mut Tensor2, ctx: &AttemptContext) {
        let mut diff = Tensor2::new(ctx.stress.mandel());
        t2_add(&mut diff, 1.0, &ctx.stress_trial, -1.0, &ctx.stress);
        t4_ddot_t2(delta_dp, 1.0, self.cce, &diff);
    }

    /// Calculates the residuals and the convergence metric at the current state
    pub fn residual(&self, ctx: &AttemptContext) -> Result<Residual, StrError> {
        let mandel = ctx.stress.mandel();
        let n = self.surfaces.n_surfaces();
        let mut data = SurfaceData::new(mandel, n);
        self.surfaces.residual_terms(&mut data, &ctx.stress, &ctx.intnl)?;

        // plastic strain: Σ pm r - Δεp
        let mut epp = Tensor2::new(mandel);
        self.plastic_strain_increment(&mut epp, ctx);
        vec_scale(epp.vector_mut(), -1.0);
        for a in 0..n {
            if ctx.in_system(a) {
                epp.update(ctx.pm[a], &data.r[a]);
            }
        }

        // internal constraints: q - q_old + Σ pm h
        let n_models = self.surfaces.n_models();
        let mut ic = vec![0.0; n_models];
        for m in 0..n_models {
            let mut in_system = false;
            let mut sum = 0.0;
            for a in self.surfaces.surfaces_of(m) {
                if ctx.in_system(a) {
                    in_system = true;
                    sum += ctx.pm[a] * data.h[a];
                }
            }
            if in_system {
                ic[m] = ctx.intnl[m] - ctx.intnl_old[m] + sum;
            }
        }

        // metric
        let mut metric = half_squared_scaled(epp.norm(), self.config.ep_plastic_tolerance);
        for a in 0..n {
            if ctx.in_system(a) {
                metric += half_squared_scaled(data.f[a], self.surfaces.f_tol(a));
            }
        }
        for m in 0..n_models {
            metric += half_squared_scaled(ic[m], self.surfaces.ic_tol(m));
        }
        Ok(Residual {
            f: data.f,
            r: data.r,
            h: data.h,
            epp,
            ic,
            metric,
        })
    }

    /// Returns the residual vector R ordered as the unknowns
    pub fn residual_vector(&self, res: &Residual, layout: &SystemLayout) -> Vector {
        let nd = layout.nd;
        let ns = layout.surfaces.len();
        let mut rr = Vector::new(layout.dim());
        for i in 0..nd {
            rr[i] = res.epp.vector()[i];
        }
        for (k, a) in layout.surfaces.iter().enumerate() {
            rr[nd + k] = res.f[*a];
        }
        for (k, m) in layout.models.iter().enumerate() {
            rr[nd + ns + k] = res.ic[*m];
        }
        rr
    }

    /// Calculates the Jacobian of the residual vector w.r.t the unknowns
    ///
    /// ```text
    ///        dσ                          dpm_b    dq_m
    /// epp  [ E⁻¹ + Σ pm dr/dσ            r_b      Σ pm dr/dq      ]
    /// f_a  [ df_a/dσ                     0        df_a/dq         ]
    /// ic_m [ Σ pm dh/dσ                  h_b      1 + Σ pm dh/dq  ]
    /// ```
    pub fn jacobian(&self, ctx: &AttemptContext, layout: &SystemLayout) -> Result<Matrix, StrError> {
        let n = self.surfaces.n_surfaces();
        let mut data = SurfaceData::new(ctx.stress.mandel(), n);
        self.surfaces.all_terms(&mut data, &ctx.stress, &ctx.intnl)?;

        let nd = layout.nd;
        let ns = layout.surfaces.len();
        let mut jj = Matrix::new(layout.dim(), layout.dim());

        // plastic strain rows
        let mut kk = self.cce.clone();
        for a in &layout.surfaces {
            kk.update(ctx.pm[*a], &data.dr[*a]);
        }
        for i in 0..nd {
            for j in 0..nd {
                jj.set(i, j, kk.matrix().get(i, j));
            }
        }
        for (k, a) in layout.surfaces.iter().enumerate() {
            let col = nd + k;
            for i in 0..nd {
                jj.set(i, col, data.r[*a].vector()[i]);
            }
            if let Some(col_q) = layout.intnl_index(self.surfaces.model_of(*a)) {
                for i in 0..nd {
                    jj.set(i, col_q, jj.get(i, col_q) + ctx.pm[*a] * data.drq[*a].vector()[i]);
                }
            }
        }

        // yield function rows
        for (k, a) in layout.surfaces.iter().enumerate() {
            let row = nd + k;
            for j in 0..nd {
                jj.set(row, j, data.df[*a].vector()[j]);
            }
            if let Some(col_q) = layout.intnl_index(self.surfaces.model_of(*a)) {
                jj.set(row, col_q, data.dfq[*a]);
            }
        }

        // internal constraint rows
        for (k, m) in layout.models.iter().enumerate() {
            let row = nd + ns + k;
            let mut diag = 1.0;
            for (kb, b) in layout.surfaces.iter().enumerate() {
                if self.surfaces.model_of(*b) != *m {
                    continue;
                }
                for j in 0..nd {
                    jj.set(row, j, jj.get(row, j) + ctx.pm[*b] * data.dh[*b].vector()[j]);
                }
                jj.set(row, nd + kb, data.h[*b]);
                diag += ctx.pm[*b] * data.dhq[*b];
            }
            jj.set(row, row, diag);
        }
        Ok(jj)
    }

    /// Removes linearly dependent flow directions from the system for the current iteration
    ///
    /// Active surfaces are visited in order of decreasing yield function (ties: lower index first).
    pub fn eliminate_linear_dependence(&self, ctx: &mut AttemptContext, res: &Residual) -> Result<(), StrError> {
        ctx.deactivated_due_to_ld.fill(false);
        let mut candidates: Vec<usize> = (0..self.surfaces.n_surfaces()).filter(|a| ctx.active[*a]).collect();
        if candidates.len() < 2 {
            return Ok(());
        }
        candidates.sort_by(|a, b| res.f[*b].total_cmp(&res.f[*a]).then(a.cmp(b)));
        let nd = ctx.stress.dim();
        let mut rows: Vec<Vec<f64>> = Vec::new();
        for a in candidates {
            let norm = res.r[a].norm();
            if !(norm > 0.0) || rows.len() >= nd {
                ctx.deactivated_due_to_ld[a] = true;
                continue;
            }
            rows.push(res.r[a].vector().as_data().iter().map(|v| v / norm).collect());
            if rows.len() > 1 {
                let mut mat = Matrix::new(rows.len(), nd);
                for (i, row) in rows.iter().enumerate() {
                    for j in 0..nd {
                        mat.set(i, j, row[j]);
                    }
                }
                if singular_value_ratio(&mat)? < self.config.ld_svd_tol {
                    rows.pop();
                    ctx.deactivated_due_to_ld[a] = true;
                }
            }
        }
        if ctx.deactivated_due_to_ld.iter().any(|d| *d) {
            ctx.ld_encountered = true;
            debug!("linearly dependent flow directions: {:?}", ctx.deactivated_due_to_ld);
        }
        Ok(())
    }

    /// Runs the Newton-Raphson iterations
    ///
    /// Returns whether the metric converged within the iteration cap. On success, the
    /// plastic strain increment in the context is updated.
    pub fn solve(&self, ctx: &mut AttemptContext) -> Result<bool, StrError> {
        ctx.deactivated_due_to_ld.fill(false);
        let mut res = self.residual(ctx)?;
        let mut iteration = 0;
        loop {
            if res.metric <= 0.5 {
                if !ctx.deactivated_due_to_ld.iter().any(|d| *d) {
                    break;
                }
                ctx.deactivated_due_to_ld.fill(false);
                res = self.residual(ctx)?;
                if res.metric <= 0.5 {
                    break;
                }
            }
            if !res.metric.is_finite() {
                debug!("non-finite residual at iteration {}", iteration);
                return Ok(false);
            }
            if iteration >= self.config.max_nr_iterations {
                debug!("Newton did not converge: metric = {:e}", res.metric);
                return Ok(false);
            }

            // linear system
            self.eliminate_linear_dependence(ctx, &res)?;
            res = self.residual(ctx)?;
            let layout = SystemLayout::new(ctx, self.surfaces);
            let mut jj = self.jacobian(ctx, &layout)?;
            let mut x = self.residual_vector(&res, &layout);
            vec_scale(&mut x, -1.0);
            if solve_lin_sys(&mut x, &mut jj).is_err() {
                debug!("singular Newton system at iteration {}", iteration);
                return Ok(false);
            }
            if !x.as_data().iter().all(|v| v.is_finite()) {
                debug!("non-finite Newton step at iteration {}", iteration);
                return Ok(false);
            }

            // update
            if !self.line_search(ctx, &layout, &x, &mut res)? {
                debug!("line search failed at iteration {}", iteration);
                return Ok(false);
            }
            iteration += 1;
            ctx.iterations += 1;
            debug!("iteration {:>3}: metric = {:e}", iteration, res.metric);

            // deactivate surfaces with negative multipliers and restart from the trial state
            if ctx.stage == Stage::Optimized {
                let negative: Vec<usize> = (0..ctx.pm.len()).filter(|a| ctx.active[*a] && ctx.pm[*a] < 0.0).collect();
                if !negative.is_empty() {
                    for a in &negative {
                        ctx.active[*a] = false;
                    }
                    debug!("deactivated surfaces {:?} with negative multipliers", negative);
                    ctx.reset_to_trial();
                    res = self.residual(ctx)?;
                }
            }
        }
        let mut delta_dp = Tensor2::new(ctx.stress.mandel());
        self.plastic_strain_increment(&mut delta_dp, ctx);
        ctx.delta_dp = delta_dp;
        Ok(true)
    }

    /// Performs a backtracking line search along the Newton direction
    ///
    /// Uses a quadratic model of the metric at the first backtrack and a cubic model afterwards.
    /// On failure, the state at the beginning of the search is restored.
    fn line_search(
        &self,
        ctx: &mut AttemptContext,
        layout: &SystemLayout,
        x: &Vector,
        res: &mut Residual,
    ) -> Result<bool, StrError> {
        let stress0 = ctx.stress.clone();
        let pm0 = ctx.pm.clone();
        let intnl0 = ctx.intnl.clone();
        let m0 = res.metric;
        let slope = -2.0 * m0;
        let mut lam = 1.0;
        let mut lam_prev = 1.0;
        let mut m_prev = m0;
        loop {
            layout.apply(ctx, &stress0, &pm0, &intnl0, x, lam);
            *res = self.residual(ctx)?;
            if !self.config.use_line_search {
                return Ok(true);
            }
            let m = res.metric;
            if m.is_finite() && m < m0 + LS_ALPHA * lam * slope {
                return Ok(true);
            }
            if lam < self.config.line_search_min_step {
                layout.apply(ctx, &stress0, &pm0, &intnl0, x, 0.0);
                *res = self.residual(ctx)?;
                return Ok(false);
            }
            let tmp = if !m.is_finite() {
                0.5 * lam
            } else if lam == 1.0 {
                -slope / (2.0 * (m - m0 - slope))
            } else {
                let rhs1 = m - m0 - lam * slope;
                let rhs2 = m_prev - m0 - lam_prev * slope;
                let a = (rhs1 / (lam * lam) - rhs2 / (lam_prev * lam_prev)) / (lam - lam_prev);
                let b = (-lam_prev * rhs1 / (lam * lam) + lam * rhs2 / (lam_prev * lam_prev)) / (lam - lam_prev);
                let t = if a == 0.0 {
                    -slope / (2.0 * b)
                } else {
                    let disc = b * b - 3.0 * a * slope;
                    if disc < 0.0 {
                        0.5 * lam
                    } else if b <= 0.0 {
                        (-b + f64::sqrt(disc)) / (3.0 * a)
                    } else {
                        -slope / (b + f64::sqrt(disc))
                    }
                };
                f64::min(t, 0.5 * lam)
            };
            lam_prev = lam;
            m_prev = m;
            lam = f64::max(tmp, 0.1 * lam);
            ctx.line_search_needed = true;
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
