use super::YieldSurfaceModel;
use crate::StrError;
use russell_lab::vec_scale;
use russell_tensor::{t2_dyad_t2_update, Tensor2, Tensor4};

/// Implements a smoothed Drucker-Prager yield surface with linear hardening
///
/// ```text
/// f = √(σd² + δ²) + M σm - (z0 + H q)
/// g = √(σd² + δ²) + Mg σm
/// ```
///
/// The smoothing parameter δ removes the singularity at the apex. The flow is
/// non-associated if `Mg ≠ M`. With `M = Mg = δ = 0` the model reduces to von Mises.
pub struct DruckerPrager {
    /// Slope of the yield surface
    mm: f64,

    /// Slope of the flow potential
    mm_g: f64,

    /// Apex smoothing parameter
    delta: f64,

    /// Initial size of the yield surface
    z0: f64,

    /// Hardening coefficient
    hh: f64,

    /// Tolerance on the yield function
    f_tol: f64,

    /// Tolerance on the internal-constraint residual
    ic_tol: f64,
}

impl DruckerPrager {
    /// Allocates a new instance
    pub fn new(mm: f64, mm_g: f64, delta: f64, z0: f64, hh: f64, f_tol: f64, ic_tol: f64) -> Result<Self, StrError> {
        if !(mm >= 0.0) {
            return Err("M parameter for the Drucker-Prager model is invalid");
        }
        if !(mm_g >= 0.0) {
            return Err("Mg parameter for the Drucker-Prager model is invalid");
        }
        if !(delta >= 0.0) {
            return Err("delta parameter for the Drucker-Prager model is invalid");
        }
        if !(z0 > 0.0) {
            return Err("z0 parameter for the Drucker-Prager model is invalid");
        }
        if !hh.is_finite() {
            return Err("hh parameter for the Drucker-Prager model is invalid");
        }
        if !(f_tol > 0.0) || !(ic_tol > 0.0) {
            return Err("tolerances for the Drucker-Prager model must be > 0.0");
        }
        Ok(DruckerPrager {
            mm,
            mm_g,
            delta,
            z0,
            hh,
            f_tol,
            ic_tol,
        })
    }

    /// Returns the smoothed deviatoric invariant √(σd² + δ²)
    fn smoothed_sigma_d(&self, stress: &Tensor2) -> f64 {
        let sigma_d = stress.invariant_sigma_d();
        f64::sqrt(sigma_d * sigma_d + self.delta * self.delta)
    }

    /// Computes (3/2) s / σ̃d + (slope/3) I; returns σ̃d
    fn gradient(&self, grad: &mut Tensor2, stress: &Tensor2, slope: f64) -> f64 {
        let sd = self.smoothed_sigma_d(stress);
        stress.deviator(grad);
        let coef = if sd > 0.0 { 1.5 / sd } else { 0.0 };
        vec_scale(grad.vector_mut(), coef);
        grad.update(slope / 3.0, &Tensor2::identity(stress.mandel()));
        sd
    }
}

impl YieldSurfaceModel for DruckerPrager {
    fn name(&self) -> &str {
        "DruckerPrager"
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
        let sigma_m = stress.invariant_sigma_m();
        f[0] = self.smoothed_sigma_d(stress) + self.mm * sigma_m - (self.z0 + self.hh * intnl);
        Ok(())
    }

    fn df_dstress(&self, df: &mut [Tensor2], stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        self.gradient(&mut df[0], stress, self.mm);
        Ok(())
    }

    fn df_dintnl(&self, dfq: &mut [f64], _stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        dfq[0] = -self.hh;
        Ok(())
    }

    fn flow_potential(&self, r: &mut [Tensor2], stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        self.gradient(&mut r[0], stress, self.mm_g);
        Ok(())
    }

    /// Calculates dr/dσ = (3/(2σ̃d)) Psd - (9/(4σ̃d³)) s ⊗ s
    fn dflow_dstress(&self, dr: &mut [Tensor4], stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        let sd = self.smoothed_sigma_d(stress);
        if sd <= 0.0 {
            dr[0].matrix_mut().fill(0.0);
            return Ok(());
        }
        let mut s = Tensor2::new(stress.mandel());
        stress.deviator(&mut s);
        let mut psd = Tensor4::new(stress.mandel());
        psd.set_pp_symdev();
        dr[0].set_tensor(1.5 / sd, &psd);
        t2_dyad_t2_update(&mut dr[0], -2.25 / (sd * sd * sd), &s, &s);
        Ok(())
    }

    fn dflow_dintnl(&self, drq: &mut [Tensor2], _stress: &Tensor2, _intnl: f64) -> Result<(), StrError> {
        drq[0].vector_mut().fill(0.0);
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::DruckerPrager;
    use crate::models::YieldSurfaceModel;
    use crate::StrError;
    use russell_lab::approx_eq;
    use russell_tensor::{Mandel, Tensor2, Tensor4};

    #[test]
    fn new_captures_errors() {
        assert_eq!(
            DruckerPrager::new(-1.0, 0.0, 0.0, 1.0, 0.0, 1e-9, 1e-9).err(),
            Some("M parameter for the Drucker-Prager model is invalid")
        );
        assert_eq!(
            DruckerPrager::new(0.0, -1.0, 0.0, 1.0, 0.0, 1e-9, 1e-9).err(),
            Some("Mg parameter for the Drucker-Prager model is invalid")
        );
        assert_eq!(
            DruckerPrager::new(0.0, 0.0, -1.0, 1.0, 0.0, 1e-9, 1e-9).err(),
            Some("delta parameter for the Drucker-Prager model is invalid")
        );
        assert_eq!(
            DruckerPrager::new(0.0, 0.0, 0.0, 0.0, 0.0, 1e-9, 1e-9).err(),
            Some("z0 parameter for the Drucker-Prager model is invalid")
        );
        assert_eq!(
            DruckerPrager::new(0.0, 0.0, 0.0, 1.0, f64::INFINITY, 1e-9, 1e-9).err(),
            Some("hh parameter for the Drucker-Prager model is invalid")
        );
        assert_eq!(
            DruckerPrager::new(0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1e-9).err(),
            Some("tolerances for the Drucker-Prager model must be > 0.0")
        );
    }

    #[test]
    fn yield_function_works() -> Result<(), StrError> {
        let model = DruckerPrager::new(0.6, 0.3, 0.0, 5.0, 100.0, 1e-9, 1e-9)?;
        assert_eq!(model.name(), "DruckerPrager");
        let mut stress = Tensor2::new(Mandel::Symmetric);
        stress.vector_mut()[0] = 9.0;
        // σd = 9, σm = 3
        let mut f = [0.0];
        model.yield_function(&mut f, &stress, 0.01)?;
        approx_eq(f[0], 9.0 + 0.6 * 3.0 - 5.0 - 1.0, 1e-14);
        Ok(())
    }

    #[test]
    fn flow_direction_works() -> Result<(), StrError> {
        let model = DruckerPrager::new(0.6, 0.3, 0.0, 5.0, 100.0, 1e-9, 1e-9)?;
        let mut stress = Tensor2::new(Mandel::Symmetric);
        stress.vector_mut()[0] = 9.0;
        let mut r = vec![Tensor2::new(Mandel::Symmetric)];
        model.flow_potential(&mut r, &stress, 0.0)?;
        // (3/2) s/σd = (1, -1/2, -1/2, 0, 0, 0) plus Mg/3 on the diagonal
        let correct = &[1.1, -0.4, -0.4, 0.0, 0.0, 0.0];
        for i in 0..6 {
            approx_eq(r[0].vector()[i], correct[i], 1e-15);
        }
        let mut df = vec![Tensor2::new(Mandel::Symmetric)];
        model.df_dstress(&mut df, &stress, 0.0)?;
        approx_eq(df[0].vector()[0], 1.2, 1e-15);

        // symmetric second derivative
        let mut dr = vec![Tensor4::new(Mandel::Symmetric)];
        model.dflow_dstress(&mut dr, &stress, 0.0)?;
        for i in 0..6 {
            for j in 0..6 {
                approx_eq(dr[0].matrix().get(i, j), dr[0].matrix().get(j, i), 1e-15);
            }
        }
        Ok(())
    }

    #[test]
    fn smoothing_handles_the_apex() -> Result<(), StrError> {
        let model = DruckerPrager::new(0.6, 0.6, 0.1, 5.0, 0.0, 1e-9, 1e-9)?;
        let mut stress = Tensor2::new(Mandel::Symmetric);
        stress.vector_mut()[0] = 3.0;
        stress.vector_mut()[1] = 3.0;
        stress.vector_mut()[2] = 3.0;
        let mut f = [0.0];
        model.yield_function(&mut f, &stress, 0.0)?;
        approx_eq(f[0], 0.1 + 0.6 * 3.0 - 5.0, 1e-14);
        let mut dr = vec![Tensor4::new(Mandel::Symmetric)];
        model.dflow_dstress(&mut dr, &stress, 0.0)?;
        approx_eq(dr[0].matrix().get(3, 3), 1.5 / 0.1, 1e-12);
        Ok(())
    }
}
