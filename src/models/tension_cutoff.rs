use super::YieldSurfaceModel;
use crate::StrError;
use russell_tensor::{Tensor2, Tensor4};

/// Implements planar tension cutoffs on normal stress components
///
/// Each surface `k` limits one normal component `c_k ∈ {0, 1, 2}` (xx, yy, zz):
///
/// ```text
/// f_k = σ[c_k] - (t0 + H q)
/// ```
///
/// The flow is associated and the surfaces are linear in stress. Repeated components
/// are allowed and produce linearly dependent surfaces.
pub struct AxialTensionCutoff {
    /// Normal components limited by each surface
    components: Vec<usize>,

    /// Initial tensile strength
    t0: f64,

    /// Hardening coefficient
    hh: f64,

    /// Tolerance on the yield functions
    f_tol: f64,

    /// Tolerance on the internal-constraint residual
    ic_tol: f64,
}

impl AxialTensionCutoff {
    /// Allocates a new instance
    pub fn new(components: &[usize], t0: f64, hh: f64, f_tol: f64, ic_tol: f64) -> Result<Self, StrError> {
        if components.len() < 1 {
            return Err("at least one component must be given for the tension cutoff");
        }
        if components.iter().any(|c| *c > 2) {
            return Err("tension cutoff components must be 0, 1, or 2");
        }
        if !t0.is_finite() || !hh.is_finite() {
            return Err("parameters for the tension cutoff are invalid");
        }
        if !(f_tol > 0.0) || !(ic_tol > 0.0) {
            return Err("tolerances for the tension cutoff must be > 0.0");
        }
        Ok(AxialTensionCutoff {
            components: components.to_vec(),
            t0,
            hh,
            f_tol,
            ic_tol,
        })
    }
}

impl YieldSurfaceModel for AxialTensionCutoff {
    fn name(&self) -> &str {
        "AxialTensionCutoff"
    }

    fn n_surfaces(&self) -> usize {
        self.components.len()
    }

    fn f_tol(&self, _surface: usize) -> f64 {
        self.f_tol
    }

    fn ic_tol(&self) -> f64 {
        self.ic_tol
    }

    fn yield_function(&self, f: &mut [f64], stress: &Tensor2, intnl: f64) -> Result<(), StrError> {
        let strength = self.t0 + self.hh * intnl;
        for (k, c) in self.components.iter().enumerate() {
            f[k] = stress.vector()[*c] - strength;
        }
        Ok(())
    }

    fn df_dstress(&self, df: &mut [Tensor2], _stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        for (k, c) in self.components.iter().enumerate() {
            let v = df[k].vector_mut();
            v.fill(0.0);
            v[*c] = 1.0;
        }
        Ok(())
    }

    fn df_dintnl(&self, dfq: &mut [f64], _stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        dfq.iter_mut().for_each(|v| *v = -self.hh);
        Ok(())
    }

    fn flow_potential(&self, r: &mut [Tensor2], stress: &Tensor2, intnl: f64) -> Result<(), StrError> {
        self.df_dstress(r, stress, intnl)
    }

    fn dflow_dstress(&self, dr: &mut [Tensor4], _stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        for t in dr.iter_mut() {
            t.matrix_mut().fill(0.0);
        }
        Ok(())
    }

    fn dflow_dintnl(&self, drq: &mut [Tensor2], _stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        for t in drq.iter_mut() {
            t.vector_mut().fill(0.0);
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
