use multisurf::models::Samples;
use multisurf::prelude::*;
use multisurf::StrError;
use russell_lab::{approx_eq, Vector};
use russell_tensor::{Mandel, Tensor2};

// von Mises plasticity at a single plane-strain material point
//
// The strain path corresponds to the vertical compression of a unit square
// with rollers on the left and bottom edges. The first increment brings the
// stress point just below the yield surface; the second one doubles the strain.
//
// TEST GOAL
//
// Verifies the return mapping and the consistent tangent operator of a single
// smooth surface. The tangent values are those of the closed-form radial return.
//
// CONFIGURATION AND PARAMETERS
//
// * Plane-strain
// * Young: E = 1500, Poisson: ν = 0.25
// * Hardening: H = 800, Initial yield stress: z0 = 9.0
//
// The same problem is solved with a Drucker-Prager surface with M = Mg = δ = 0,
// which has no model-specific tangent and thus uses the generic operator.

const YOUNG: f64 = 1500.0;
const POISSON: f64 = 0.25;
const Z_INI: f64 = 9.0;

/// Returns the strain that takes the stress point to the yield surface
fn strain_to_yield() -> (f64, f64) {
    let nu = POISSON;
    let dy = Z_INI * (1.0 - nu * nu) / (YOUNG * f64::sqrt(1.0 - nu + nu * nu));
    (dy * nu / (1.0 - nu), -dy)
}

fn run(surfaces: &SurfaceCollection) -> Result<(), StrError> {
    let mut config = Config::new(1e-10)?;
    config.set_deactivation_scheme(DeactivationScheme::Safe)?;
    let substepper = StrainSubstepper::new(&config, surfaces);
    let dde = Samples::elasticity(YOUNG, POISSON, true);
    let (eps_x, eps_y) = strain_to_yield();

    // first increment: elastic
    let stress = Tensor2::new(Mandel::Symmetric2D);
    let plastic_strain = Tensor2::new(Mandel::Symmetric2D);
    let mut delta_strain = Tensor2::new(Mandel::Symmetric2D);
    delta_strain.vector_mut()[0] = 0.9999 * eps_x;
    delta_strain.vector_mut()[1] = 0.9999 * eps_y;
    let first = substepper.apply(&stress, &Vector::new(1), &plastic_strain, &dde, &delta_strain)?;
    assert_eq!(first.diagnostics.tangent, TangentOperator::Elastic);
    assert_eq!(first.diagnostics.active, &[false]);
    approx_eq(first.stress.vector()[0], 0.0, 1e-14);
    approx_eq(first.stress.vector()[1], -9.983605071700921, 1e-13);
    approx_eq(first.stress.vector()[2], -2.4959012679252304, 1e-13);
    approx_eq(first.tangent.matrix().get(0, 0), 1800.0, 1e-12);
    approx_eq(first.tangent.matrix().get(0, 1), 600.0, 1e-12);
    approx_eq(first.tangent.matrix().get(3, 3), 1200.0, 1e-12);

    // second increment: plastic
    delta_strain.vector_mut()[0] = 1.0001 * eps_x;
    delta_strain.vector_mut()[1] = 1.0001 * eps_y;
    let second = substepper.apply(
        &first.stress,
        &first.intnl,
        &first.plastic_strain,
        &dde,
        &delta_strain,
    )?;
    assert_eq!(second.diagnostics.tangent, TangentOperator::Nonlinear);
    assert_eq!(second.diagnostics.active, &[true]);
    assert_eq!(second.diagnostics.n_substeps, 1);
    assert_eq!(second.diagnostics.n_bisections, 0);
    assert!(!second.diagnostics.approximate);
    approx_eq(second.pm[0], 3.461538461538463E-03, 1e-12);
    approx_eq(second.intnl[0], 3.461538461538463E-03, 1e-12);
    approx_eq(second.stress.vector()[0], -2.8801740957848447, 1e-9);
    approx_eq(second.stress.vector()[1], -15.936963330009469, 1e-9);
    approx_eq(second.stress.vector()[2], -6.144371404341001, 1e-9);
    approx_eq(second.stress.vector()[3], 0.0, 1e-9);

    // the yield function vanishes and the hardening is consistent
    let sigma_d = second.stress.invariant_sigma_d();
    approx_eq(sigma_d, Z_INI + 800.0 * second.intnl[0], 1e-9);

    // tangent (Mandel shear = 2 × tensor shear)
    let dd = second.tangent.matrix();
    approx_eq(dd.get(0, 0), 1.389940828402367E+03, 1e-6);
    approx_eq(dd.get(0, 1), 9.248520710059172E+02, 1e-6);
    approx_eq(dd.get(1, 0), 9.248520710059172E+02, 1e-6);
    approx_eq(dd.get(1, 1), 1.262130177514793E+03, 1e-6);
    approx_eq(dd.get(0, 2), 6.852071005917161E+02, 1e-6);
    approx_eq(dd.get(2, 2), 1.501775147928994E+03, 1e-6);
    approx_eq(dd.get(3, 3), 2.0 * 3.923076923076923E+02, 1e-6);
    approx_eq(dd.get(0, 3), 0.0, 1e-9);
    Ok(())
}

#[test]
fn test_single_surface_von_mises() -> Result<(), StrError> {
    run(&Samples::von_mises()?)
}

#[test]
fn test_single_surface_drucker_prager_as_von_mises() -> Result<(), StrError> {
    run(&Samples::drucker_prager_as_von_mises()?)
}
