use crate::StrError;
use russell_tensor::{Tensor2, Tensor4};

/// Specifies the functions of a plasticity law owning one or more yield surfaces
///
/// All surfaces of a model share a single internal parameter `q`. The output slices
/// have length equal to [YieldSurfaceModel::n_surfaces].
///
/// The internal parameter evolves according to
///
/// ```text
/// q = q_old + Σ_a pm_a h_a(σ, q)
/// ```
///
/// where `h_a` is the hardening potential of surface `a` (default: -1).
pub trait YieldSurfaceModel: Send + Sync {
    /// Returns a name for logging
    fn name(&self) -> &str;

    /// Returns the number of yield surfaces
    fn n_surfaces(&self) -> usize;

    /// Returns the tolerance on the yield function of a surface
    fn f_tol(&self, surface: usize) -> f64;

    /// Returns the tolerance on the internal-constraint residual
    fn ic_tol(&self) -> f64;

    /// Calculates the yield functions f
    fn yield_function(&self, f: &mut [f64], stress: &Tensor2, intnl: f64) -> Result<(), StrError>;

    /// Calculates the derivatives of the yield functions w.r.t stress
    fn df_dstress(&self, df: &mut [Tensor2], stress: &Tensor2, intnl: f64) -> Result<(), StrError>;

    /// Calculates the derivatives of the yield functions w.r.t the internal parameter
    fn df_dintnl(&self, dfq: &mut [f64], stress: &Tensor2, intnl: f64) -> Result<(), StrError>;

    /// Calculates the flow directions r (derivative of the flow potential w.r.t stress)
    fn flow_potential(&self, r: &mut [Tensor2], stress: &Tensor2, intnl: f64) -> Result<(), StrError>;

    /// Calculates the derivatives of the flow directions w.r.t stress
    fn dflow_dstress(&self, dr: &mut [Tensor4], stress: &Tensor2, intnl: f64) -> Result<(), StrError>;

    /// Calculates the derivatives of the flow directions w.r.t the internal parameter
    fn dflow_dintnl(&self, drq: &mut [Tensor2], stress: &Tensor2, intnl: f64) -> Result<(), StrError>;

    /// Calculates the hardening potentials h
    fn hard_potential(&self, h: &mut [f64], _stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        h.iter_mut().for_each(|v| *v = -1.0);
        Ok(())
    }

    /// Calculates the derivatives of the hardening potentials w.r.t stress
    fn dhard_dstress(&self, dh: &mut [Tensor2], _stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        for t in dh.iter_mut() {
            t.vector_mut().fill(0.0);
        }
        Ok(())
    }

    /// Calculates the derivatives of the hardening potentials w.r.t the internal parameter
    fn dhard_dintnl(&self, dhq: &mut [f64], _stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        dhq.iter_mut().for_each(|v| *v = 0.0);
        Ok(())
    }

    /// Calculates a model-specific consistent tangent operator
    ///
    /// This function is only called when the surfaces of this model were the only ones
    /// active during the whole strain increment. `pm` holds the cumulative multipliers of
    /// this model's surfaces and `dde` is the elasticity tensor.
    ///
    /// Returns `false` if the operator is not available (the default).
    fn consistent_tangent_operator(
        &self,
        _dd: &mut Tensor4,
        _stress: &Tensor2,
        _intnl: f64,
        _dde: &Tensor4,
        _pm: &[f64],
    ) -> Result<bool, StrError> {
        Ok(false)
    }
}
