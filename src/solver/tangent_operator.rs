use crate::base::{checked_inverse, t4_is_finite, Config, TangentOperator};
use crate::models::{SurfaceCollection, SurfaceData};
use crate::StrError;
use log::warn;
use russell_lab::{Matrix, Vector};
use russell_tensor::{t2_add, t2_ddot_t2, t2_ddot_t4, t2_dyad_t2_update, t4_ddot_t2, Tensor2, Tensor4};

/// Magnitude below which the hardening coupling coefficient c_m is considered singular
const C_TOO_SMALL: f64 = 1e-14;

/// Assembles the consistent tangent operator from a converged state
///
/// With T the set of participating surfaces and μ their multipliers:
///
/// ```text
/// c_m = 1 + Σ μ_a dh_a/dq          g_m = Σ μ_a dh_a/dσ          w_m = Σ μ_a dr_a/dq
/// S⁻¹ = E⁻¹ + Σ μ_a dr_a/dσ - Σ_m w_m ⊗ g_m / c_m
/// r̃_a = r_a - w_m h_a / c_m        ñ_a = df_a/dσ - (df_a/dq / c_m) g_m
/// A_ab = ñ_a : S : r̃_b + δ_m(a)m(b) (df_a/dq) h_b / c_m
/// C = S - Σ_ab (S : r̃_a) ⊗ (ñ_b : S) A⁻¹_ab
/// ```
///
/// The linear operator uses the final active set with μ = 0 (thus S = E). The nonlinear
/// operator uses the surfaces active at any point of the increment and the cumulative
/// multipliers.
pub struct TangentOperatorBuilder<'a> {
    config: &'a Config,
    surfaces: &'a SurfaceCollection,
}

impl<'a> TangentOperatorBuilder<'a> {
    /// Allocates a new instance
    pub fn new(config: &'a Config, surfaces: &'a SurfaceCollection) -> Self {
        TangentOperatorBuilder { config, surfaces }
    }

    /// Computes the tangent operator; returns the fidelity level actually used
    ///
    /// Singular inversions downgrade the level (nonlinear → linear → elastic).
    pub fn build(
        &self,
        dd: &mut Tensor4,
        stress: &Tensor2,
        intnl: &Vector,
        dde: &Tensor4,
        cce: &Tensor4,
        final_active: &[bool],
        ever_active: &[bool],
        cumulative_pm: &[f64],
    ) -> Result<TangentOperator, StrError> {
        let requested = self.config.tangent_operator;
        if requested == TangentOperator::Nonlinear {
            if !ever_active.iter().any(|a| *a) {
                dd.set_tensor(1.0, dde);
                return Ok(TangentOperator::Elastic);
            }
            if self.model_fast_path(dd, stress, intnl, dde, ever_active, cumulative_pm)? {
                return Ok(TangentOperator::Nonlinear);
            }
            if self.generic(dd, stress, intnl, dde, cce, ever_active, cumulative_pm)? {
                return Ok(TangentOperator::Nonlinear);
            }
            warn!("singular nonlinear tangent operator; trying the linear one");
        }
        if requested != TangentOperator::Elastic {
            if !final_active.iter().any(|a| *a) {
                dd.set_tensor(1.0, dde);
                return Ok(TangentOperator::Elastic);
            }
            let zero = vec![0.0; cumulative_pm.len()];
            if self.generic(dd, stress, intnl, dde, cce, final_active, &zero)? {
                return Ok(TangentOperator::Linear);
            }
            warn!("singular linear tangent operator; using the elastic one");
        }
        dd.set_tensor(1.0, dde);
        Ok(TangentOperator::Elastic)
    }

    /// Calls the model-specific operator if all participating surfaces belong to a single model
    fn model_fast_path(
        &self,
        dd: &mut Tensor4,
        stress: &Tensor2,
        intnl: &Vector,
        dde: &Tensor4,
        set: &[bool],
        mu: &[f64],
    ) -> Result<bool, StrError> {
        let models: Vec<usize> = (0..set.len())
            .filter(|a| set[*a])
            .map(|a| self.surfaces.model_of(a))
            .collect();
        let m = models[0];
        if models.iter().any(|k| *k != m) {
            return Ok(false);
        }
        let range = self.surfaces.surfaces_of(m);
        let ok = self
            .surfaces
            .model(m)
            .consistent_tangent_operator(dd, stress, intnl[m], dde, &mu[range])?;
        Ok(ok && t4_is_finite(dd))
    }

    /// Computes the operator for the surfaces in `set` with multipliers `mu`; returns false if singular
    fn generic(
        &self,
        dd: &mut Tensor4,
        stress: &Tensor2,
        intnl: &Vector,
        dde: &Tensor4,
        cce: &Tensor4,
        set: &[bool],
        mu: &[f64],
    ) -> Result<bool, StrError> {
        let n = self.surfaces.n_surfaces();
        let mandel = stress.mandel();
        let tol = self.config.singular_tol;
        let mut data = SurfaceData::new(mandel, n);
        self.surfaces.all_terms(&mut data, stress, intnl)?;
        let tt: Vec<usize> = (0..n).filter(|a| set[*a]).collect();
        let nt = tt.len();

        // hardening coupling per model
        let n_models = self.surfaces.n_models();
        let mut c = vec![1.0; n_models];
        let mut g = vec![Tensor2::new(mandel); n_models];
        let mut w = vec![Tensor2::new(mandel); n_models];
        for a in &tt {
            let m = self.surfaces.model_of(*a);
            c[m] += mu[*a] * data.dhq[*a];
            g[m].update(mu[*a], &data.dh[*a]);
            w[m].update(mu[*a], &data.drq[*a]);
        }
        for a in &tt {
            if f64::abs(c[self.surfaces.model_of(*a)]) < C_TOO_SMALL {
                return Ok(false);
            }
        }

        // S = (E⁻¹ + Σ μ dr/dσ - Σ w ⊗ g / c)⁻¹
        let mut ss = Tensor4::new(mandel);
        if mu.iter().all(|v| *v == 0.0) {
            ss.set_tensor(1.0, dde);
        } else {
            let mut ss_inv = Tensor4::new(mandel);
            ss_inv.set_tensor(1.0, cce);
            for a in &tt {
                ss_inv.update(mu[*a], &data.dr[*a]);
            }
            for m in 0..n_models {
                if self.surfaces.any_in_model(m, set) {
                    t2_dyad_t2_update(&mut ss_inv, -1.0 / c[m], &w[m], &g[m]);
                }
            }
            if !checked_inverse(ss.matrix_mut(), ss_inv.matrix(), tol)? {
                return Ok(false);
            }
        }

        // modified flow directions and normals
        let mut s_r = vec![Tensor2::new(mandel); nt]; // S : r̃_a
        let mut n_s = vec![Tensor2::new(mandel); nt]; // ñ_a : S
        let mut n_mod = vec![Tensor2::new(mandel); nt];
        let mut r_mod = Tensor2::new(mandel);
        for (k, a) in tt.iter().enumerate() {
            let m = self.surfaces.model_of(*a);
            t2_add(&mut r_mod, 1.0, &data.r[*a], -data.h[*a] / c[m], &w[m]);
            t2_add(&mut n_mod[k], 1.0, &data.df[*a], -data.dfq[*a] / c[m], &g[m]);
            t4_ddot_t2(&mut s_r[k], 1.0, &ss, &r_mod);
            t2_ddot_t4(&mut n_s[k], 1.0, &n_mod[k], &ss);
        }

        // A_ab = ñ_a : S : r̃_b + δ dfq_a h_b / c
        let mut aa = Matrix::new(nt, nt);
        for (i, a) in tt.iter().enumerate() {
            let ma = self.surfaces.model_of(*a);
            for (j, b) in tt.iter().enumerate() {
                let mut value = t2_ddot_t2(&n_mod[i], &s_r[j]);
                if self.surfaces.model_of(*b) == ma {
                    value += data.dfq[*a] * data.h[*b] / c[ma];
                }
                aa.set(i, j, value);
            }
        }
        let mut aa_inv = Matrix::new(nt, nt);
        if !checked_inverse(&mut aa_inv, &aa, tol)? {
            return Ok(false);
        }

        // C = S - Σ_ab (S : r̃_a) ⊗ (ñ_b : S) A⁻¹_ab
        dd.set_tensor(1.0, &ss);
        for a in 0..nt {
            for b in 0..nt {
                t2_dyad_t2_update(dd, -aa_inv.get(a, b), &s_r[a], &n_s[b]);
            }
        }
        Ok(t4_is_finite(dd))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::TangentOperatorBuilder;
    use crate::base::{elastic_compliance, Config, TangentOperator};
    use crate::models::Samples;
    use crate::StrError;
    use russell_lab::{approx_eq, Vector};
    use russell_tensor::{Mandel, Tensor4};

    #[test]
    fn elastic_option_works() -> Result<(), StrError> {
        let mut config = Config::new(1e-10)?;
        config.set_tangent_operator(TangentOperator::Elastic)?;
        let surfaces = Samples::biaxial_cutoff()?;
        let dde = Samples::elasticity(1000.0, 0.25, false);
        let mut cce = Tensor4::new(Mandel::Symmetric);
        elastic_compliance(&mut cce, &dde, 1e-12)?;
        let builder = TangentOperatorBuilder::new(&config, &surfaces);
        let stress = Samples::diagonal(false, 1.0, 0.0, 0.0);
        let mut dd = Tensor4::new(Mandel::Symmetric);
        let used = builder.build(
            &mut dd,
            &stress,
            &Vector::new(1),
            &dde,
            &cce,
            &[true, false],
            &[true, false],
            &[0.001, 0.0],
        )?;
        assert_eq!(used, TangentOperator::Elastic);
        assert_eq!(dd.matrix().get(0, 0), dde.matrix().get(0, 0));
        Ok(())
    }

    #[test]
    fn linear_operator_works_for_a_single_planar_surface() -> Result<(), StrError> {
        // with ν = 0 and an xx cutoff, the xx row and column vanish
        let mut config = Config::new(1e-10)?;
        config.set_tangent_operator(TangentOperator::Linear)?;
        let surfaces = Samples::biaxial_cutoff()?;
        let dde = Samples::elasticity(1000.0, 0.0, false);
        let mut cce = Tensor4::new(Mandel::Symmetric);
        elastic_compliance(&mut cce, &dde, 1e-12)?;
        let builder = TangentOperatorBuilder::new(&config, &surfaces);
        let stress = Samples::diagonal(false, 1.0, 0.0, 0.0);
        let mut dd = Tensor4::new(Mandel::Symmetric);
        let used = builder.build(
            &mut dd,
            &stress,
            &Vector::new(1),
            &dde,
            &cce,
            &[true, false],
            &[true, false],
            &[0.002, 0.0],
        )?;
        assert_eq!(used, TangentOperator::Linear);
        approx_eq(dd.matrix().get(0, 0), 0.0, 1e-12);
        approx_eq(dd.matrix().get(1, 1), 1000.0, 1e-12);
        approx_eq(dd.matrix().get(3, 3), 1000.0, 1e-12);
        Ok(())
    }

    #[test]
    fn linear_and_nonlinear_agree_for_planar_surfaces() -> Result<(), StrError> {
        let mut config = Config::new(1e-10)?;
        let surfaces = Samples::biaxial_cutoff()?;
        let dde = Samples::elasticity(1000.0, 0.25, false);
        let mut cce = Tensor4::new(Mandel::Symmetric);
        elastic_compliance(&mut cce, &dde, 1e-12)?;
        let stress = Samples::diagonal(false, 1.0, 1.0, 0.5);
        let mut dd_lin = Tensor4::new(Mandel::Symmetric);
        let mut dd_nonlin = Tensor4::new(Mandel::Symmetric);

        config.set_tangent_operator(TangentOperator::Linear)?;
        let builder = TangentOperatorBuilder::new(&config, &surfaces);
        let active = &[true, true];
        let pm = &[0.002, 0.001];
        let used = builder.build(&mut dd_lin, &stress, &Vector::new(1), &dde, &cce, active, active, pm)?;
        assert_eq!(used, TangentOperator::Linear);

        let mut config_nonlin = config.clone();
        config_nonlin.set_tangent_operator(TangentOperator::Nonlinear)?;
        let builder = TangentOperatorBuilder::new(&config_nonlin, &surfaces);
        let used = builder.build(&mut dd_nonlin, &stress, &Vector::new(1), &dde, &cce, active, active, pm)?;
        assert_eq!(used, TangentOperator::Nonlinear);

        for i in 0..6 {
            for j in 0..6 {
                approx_eq(dd_nonlin.matrix().get(i, j), dd_lin.matrix().get(i, j), 1e-9);
            }
        }
        // σxx and σyy are fixed by the corner: only the zz-zz and shear terms remain
        approx_eq(dd_lin.matrix().get(0, 0), 0.0, 1e-10);
        approx_eq(dd_lin.matrix().get(1, 2), 0.0, 1e-10);
        approx_eq(dd_lin.matrix().get(2, 2), 1000.0, 1e-9);
        Ok(())
    }

    #[test]
    fn singular_operators_fall_back_to_elastic() -> Result<(), StrError> {
        let config = Config::new(1e-10)?;
        let surfaces = Samples::duplicated_cutoff()?;
        let dde = Samples::elasticity(1000.0, 0.25, false);
        let mut cce = Tensor4::new(Mandel::Symmetric);
        elastic_compliance(&mut cce, &dde, 1e-12)?;
        let builder = TangentOperatorBuilder::new(&config, &surfaces);
        let stress = Samples::diagonal(false, 1.0, 0.0, 0.0);
        let mut dd = Tensor4::new(Mandel::Symmetric);
        let active = &[true, true];
        let used = builder.build(&mut dd, &stress, &Vector::new(1), &dde, &cce, active, active, &[0.002, 0.0])?;
        assert_eq!(used, TangentOperator::Elastic);
        for i in 0..6 {
            for j in 0..6 {
                assert!(dd.matrix().get(i, j).is_finite());
                assert_eq!(dd.matrix().get(i, j), dde.matrix().get(i, j));
            }
        }
        Ok(())
    }
}
