use crate::base::Stage;
use russell_lab::Vector;
use russell_tensor::{Mandel, Tensor2};

/// Holds all mutable state of one constraint-solve attempt
///
/// The context is exclusively owned by the routine in progress and reused
/// across the substeps of one stress update.
#[derive(Clone, Debug)]
pub struct AttemptContext {
    /// Trial stress σ_trial = σ_start + E : Δε
    pub stress_trial: Tensor2,

    /// Internal parameters at the start of the substep
    pub intnl_old: Vector,

    /// Current stress
    pub stress: Tensor2,

    /// Current internal parameters (one per model)
    pub intnl: Vector,

    /// Plastic multipliers (one per surface)
    pub pm: Vec<f64>,

    /// Plastic strain increment Δεp = E⁻¹ : (σ_trial - σ)
    pub delta_dp: Tensor2,

    /// Active surfaces
    pub active: Vec<bool>,

    /// Surfaces temporarily removed from the Newton system due to linear dependence
    pub deactivated_due_to_ld: Vec<bool>,

    /// Current stage of the deactivation scheme
    pub stage: Stage,

    /// Counter of the dumb enumeration (bit i ↔ dumb_order[i])
    pub dumb_iteration: u64,

    /// Surfaces ordered by decreasing violation
    pub dumb_order: Vec<usize>,

    /// Number of Newton iterations performed in this attempt
    pub iterations: usize,

    /// A line search step shorter than the full Newton step was taken
    pub line_search_needed: bool,

    /// Linearly dependent flow directions were found
    pub ld_encountered: bool,

    /// Surfaces were added to the active set after an admissibility check
    pub constraints_added: bool,
}

/// Holds the last admissible state used for rollback
#[derive(Clone, Debug)]
pub struct SubstepSnapshot {
    /// Stress
    pub stress: Tensor2,

    /// Plastic strain
    pub plastic_strain: Tensor2,

    /// Internal parameters
    pub intnl: Vector,
}

impl AttemptContext {
    /// Allocates a new instance
    pub fn new(mandel: Mandel, n_surfaces: usize, n_models: usize) -> Self {
        AttemptContext {
            stress_trial: Tensor2::new(mandel),
            intnl_old: Vector::new(n_models),
            stress: Tensor2::new(mandel),
            intnl: Vector::new(n_models),
            pm: vec![0.0; n_surfaces],
            delta_dp: Tensor2::new(mandel),
            active: vec![false; n_surfaces],
            deactivated_due_to_ld: vec![false; n_surfaces],
            stage: Stage::Optimized,
            dumb_iteration: 0,
            dumb_order: Vec::new(),
            iterations: 0,
            line_search_needed: false,
            ld_encountered: false,
            constraints_added: false,
        }
    }

    /// Starts a new attempt from the given trial stress and internal parameters
    pub fn begin(&mut self, stress_trial: &Tensor2, intnl_old: &Vector) {
        self.stress_trial.set_tensor(1.0, stress_trial);
        for m in 0..intnl_old.dim() {
            self.intnl_old[m] = intnl_old[m];
        }
        self.active.fill(false);
        self.dumb_iteration = 0;
        self.dumb_order.clear();
        self.iterations = 0;
        self.line_search_needed = false;
        self.ld_encountered = false;
        self.constraints_added = false;
        self.reset_to_trial();
    }

    /// Resets stress, multipliers, and internal parameters to the trial state
    pub fn reset_to_trial(&mut self) {
        self.stress.set_tensor(1.0, &self.stress_trial);
        for m in 0..self.intnl_old.dim() {
            self.intnl[m] = self.intnl_old[m];
        }
        self.pm.fill(0.0);
        self.delta_dp.vector_mut().fill(0.0);
        self.deactivated_due_to_ld.fill(false);
    }

    /// Returns whether a surface enters the Newton system
    #[inline]
    pub fn in_system(&self, surface: usize) -> bool {
        self.active[surface] && !self.deactivated_due_to_ld[surface]
    }

    /// Returns whether the dumb enumeration has patterns left
    pub fn can_increment_dumb(&self) -> bool {
        let n = self.dumb_order.len();
        let n_patterns = if n >= 64 { u64::MAX } else { (1u64 << n) - 1 };
        self.dumb_iteration < n_patterns
    }

    /// Advances the dumb enumeration and sets the corresponding active set
    pub fn increment_dumb(&mut self) {
        self.dumb_iteration += 1;
        for (i, surface) in self.dumb_order.iter().enumerate() {
            self.active[*surface] = i < 64 && (self.dumb_iteration & (1u64 << i)) != 0;
        }
    }

    /// Returns a snapshot of the current state given the plastic strain at the start of the substep
    pub fn snapshot(&self, plastic_strain_start: &Tensor2) -> SubstepSnapshot {
        let mut plastic_strain = plastic_strain_start.clone();
        plastic_strain.update(1.0, &self.delta_dp);
        SubstepSnapshot {
            stress: self.stress.clone(),
            plastic_strain,
            intnl: self.intnl.clone(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::AttemptContext;
    use russell_lab::Vector;
    use russell_tensor::{Mandel, Tensor2};

    #[test]
    fn begin_and_reset_work() {
        let mut ctx = AttemptContext::new(Mandel::Symmetric2D, 3, 2);
        let mut trial = Tensor2::new(Mandel::Symmetric2D);
        trial.vector_mut()[0] = 2.0;
        ctx.pm[1] = 5.0;
        ctx.active[1] = true;
        ctx.begin(&trial, &Vector::from(&[0.1, 0.2]));
        assert_eq!(ctx.stress.vector().as_data(), &[2.0, 0.0, 0.0, 0.0]);
        assert_eq!(ctx.intnl.as_data(), &[0.1, 0.2]);
        assert_eq!(ctx.pm, &[0.0, 0.0, 0.0]);
        assert_eq!(ctx.active, &[false, false, false]);

        ctx.stress.vector_mut()[0] = 1.0;
        ctx.intnl[0] = 0.3;
        ctx.deactivated_due_to_ld[2] = true;
        ctx.active[2] = true;
        assert!(!ctx.in_system(2));
        ctx.reset_to_trial();
        assert_eq!(ctx.stress.vector()[0], 2.0);
        assert_eq!(ctx.intnl[0], 0.1);
        assert!(ctx.in_system(2));
    }

    #[test]
    fn dumb_enumeration_works() {
        let mut ctx = AttemptContext::new(Mandel::Symmetric, 3, 1);
        ctx.dumb_order = vec![2, 0, 1];
        let mut patterns = Vec::new();
        while ctx.can_increment_dumb() {
            ctx.increment_dumb();
            patterns.push(ctx.active.clone());
        }
        assert_eq!(patterns.len(), 7);
        // bit 0 ↔ surface 2, bit 1 ↔ surface 0, bit 2 ↔ surface 1
        assert_eq!(patterns[0], &[false, false, true]);
        assert_eq!(patterns[1], &[true, false, false]);
        assert_eq!(patterns[2], &[true, false, true]);
        assert_eq!(patterns[3], &[false, true, false]);
        assert_eq!(patterns[6], &[true, true, true]);
    }

    #[test]
    fn snapshot_works() {
        let mut ctx = AttemptContext::new(Mandel::Symmetric2D, 1, 1);
        ctx.delta_dp.vector_mut()[1] = 0.5;
        ctx.stress.vector_mut()[0] = 3.0;
        ctx.intnl[0] = 0.25;
        let mut ep = Tensor2::new(Mandel::Symmetric2D);
        ep.vector_mut()[1] = 1.0;
        let snap = ctx.snapshot(&ep);
        assert_eq!(snap.plastic_strain.vector().as_data(), &[0.0, 1.5, 0.0, 0.0]);
        assert_eq!(snap.stress.vector()[0], 3.0);
        assert_eq!(snap.intnl[0], 0.25);
    }
}
