use super::YieldSurfaceModel;
use crate::StrError;
use russell_tensor::{Tensor2, Tensor4};
use russell_tensor::{IDENTITY2, P_SYMDEV, SQRT_2_BY_3};

/// Defines an alias to IDENTITY2
const I: &[f64; 9] = &IDENTITY2;

/// Defines an alias to P_SYMDEV
const PSD: &[[f64; 9]; 9] = &P_SYMDEV;

/// Implements the von Mises yield surface with linear isotropic hardening
///
/// ```text
/// f = σd - (z0 + H q)
/// r = df/dσ = (3/2) s / σd
/// h = -1
/// ```
///
/// Thus, with a positive hardening coefficient, `q` accumulates the plastic multipliers.
pub struct VonMises {
    /// Initial size of the yield surface (von Mises stress)
    z0: f64,

    /// Hardening coefficient
    hh: f64,

    /// Tolerance on the yield function
    f_tol: f64,

    /// Tolerance on the internal-constraint residual
    ic_tol: f64,
}

impl VonMises {
    /// Allocates a new instance
    pub fn new(z0: f64, hh: f64, f_tol: f64, ic_tol: f64) -> Result<Self, StrError> {
        if !(z0 > 0.0) {
            return Err("z0 parameter for the von Mises model is invalid");
        }
        if !hh.is_finite() {
            return Err("hh parameter for the von Mises model is invalid");
        }
        if !(f_tol > 0.0) || !(ic_tol > 0.0) {
            return Err("tolerances for the von Mises model must be > 0.0");
        }
        Ok(VonMises { z0, hh, f_tol, ic_tol })
    }

    /// Computes the normal n = (3/2) s / σd; returns σd
    ///
    /// The normal is undefined at zero deviatoric stress; a null tensor is returned then.
    fn normal(&self, n: &mut Tensor2, stress: &Tensor2) -> f64 {
        let sigma_d = stress.invariant_sigma_d();
        stress.deviator(n);
        let coef = if sigma_d > 0.0 { 1.5 / sigma_d } else { 0.0 };
        n.vector_mut().as_mut_data().iter_mut().for_each(|v| *v *= coef);
        sigma_d
    }
}

impl YieldSurfaceModel for VonMises {
    fn name(&self) -> &str {
        "VonMises"
    }

    fn n_surfaces(&self) -> usize {
        1
    }

    fn f_tol(&self, _surface: usize) -> f64 {
        self.f_tol
    }

    fn ic_tol(&self) -> f64 {
        self.ic_tol
    }

    fn yield_function(&self, f: &mut [f64], stress: &Tensor2, intnl: f64) -> Result<(), StrError> {
        f[0] = stress.invariant_sigma_d() - (self.z0 + self.hh * intnl);
        Ok(())
    }

    fn df_dstress(&self, df: &mut [Tensor2], stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        self.normal(&mut df[0], stress);
        Ok(())
    }

    fn df_dintnl(&self, dfq: &mut [f64], _stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        dfq[0] = -self.hh;
        Ok(())
    }

    fn flow_potential(&self, r: &mut [Tensor2], stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        self.normal(&mut r[0], stress);
        Ok(())
    }

    /// Calculates dn/dσ = (3/(2σd)) (Psd - (2/3) n ⊗ n)
    fn dflow_dstress(&self, dr: &mut [Tensor4], stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        let mut n = Tensor2::new(stress.mandel());
        let sigma_d = self.normal(&mut n, stress);
        let nd = stress.dim();
        let mat = dr[0].matrix_mut();
        if sigma_d <= 0.0 {
            mat.fill(0.0);
            return Ok(());
        }
        let coef = 1.5 / sigma_d;
        let nv = n.vector();
        for i in 0..nd {
            for j in 0..nd {
                mat.set(i, j, coef * (PSD[i][j] - 2.0 * nv[i] * nv[j] / 3.0));
            }
        }
        Ok(())
    }

    fn dflow_dintnl(&self, drq: &mut [Tensor2], _stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        drq[0].vector_mut().fill(0.0);
        Ok(())
    }

    /// Computes the closed-form consistent tangent of the radial return
    ///
    /// Requires isotropic elasticity; returns false otherwise.
    fn consistent_tangent_operator(
        &self,
        dd: &mut Tensor4,
        stress: &Tensor2,
        _intnl: f64,
        dde: &Tensor4,
        pm: &[f64],
    ) -> Result<bool, StrError> {
        // isotropic elastic moduli
        let e = dde.matrix();
        let two_gg = e.get(0, 0) - e.get(0, 1);
        if f64::abs(e.get(3, 3) - two_gg) > 1e-10 * f64::abs(e.get(0, 0)) {
            return Ok(false);
        }
        let gg = two_gg / 2.0;
        let kk = (e.get(0, 0) + 2.0 * e.get(0, 1)) / 3.0;

        // state
        let lambda = pm[0];
        let sigma_d = stress.invariant_sigma_d();
        if sigma_d <= 0.0 {
            return Ok(false);
        }
        let mut s = Tensor2::new(stress.mandel());
        stress.deviator(&mut s);

        // coefficients
        let hh = self.hh;
        let sigma_d_trial = sigma_d + lambda * 3.0 * gg;
        let norm_s = sigma_d * SQRT_2_BY_3;
        let d = 3.0 * gg + hh;
        let a = 2.0 * gg * (1.0 - lambda * 3.0 * gg / sigma_d_trial);
        let b = 6.0 * gg * gg * (lambda / sigma_d_trial - 1.0 / d) / (norm_s * norm_s);

        // consistent tangent modulus
        let nd = stress.dim();
        let mat = dd.matrix_mut();
        let sv = s.vector();
        for i in 0..nd {
            for j in 0..nd {
                mat.set(i, j, a * PSD[i][j] + b * sv[i] * sv[j] + kk * I[i] * I[j]);
            }
        }
        Ok(true)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
