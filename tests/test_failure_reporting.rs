use multisurf::base::elastic_compliance;
use multisurf::models::Samples;
use multisurf::prelude::*;
use multisurf::solver::ConstraintNewtonSolver;
use multisurf::StrError;
use russell_lab::{approx_eq, Vector};
use russell_tensor::{t4_ddot_t2, Mandel, Tensor2, Tensor4};
use std::sync::Mutex;

// Reporting of failed stress updates
//
// TEST GOAL
//
// Verifies that a failed update produces a failure report which is handed to
// the injected diagnostics strategy, and that the finite-difference checker
// confirms the analytical derivatives at the failure state.
//
// CONFIGURATION AND PARAMETERS
//
// * 3D with E = 1000 and ν = 0.25
// * Tension cutoffs on σxx and σyy with t0 = 1 and H = 0
// * The strain increment gives the trial stress (5, 1.5, 0); both surfaces are
//   violated but the yy multiplier of the corner solution is negative
// * One Newton iteration only and no sub-stepping

struct Recorder {
    reports: Mutex<Vec<FailureReport>>,
}

impl DiagnosticsStrategy for Recorder {
    fn on_failure(&self, report: &FailureReport, solver: &ConstraintNewtonSolver) -> Result<(), StrError> {
        assert_eq!(solver.surfaces().n_surfaces(), 2);
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

fn failing_case() -> Result<(Config, SurfaceCollection, Tensor4, Tensor2), StrError> {
    let mut config = Config::new(1e-10)?;
    config.set_max_nr_iterations(1)?.set_min_stepsize(1.0)?;
    let surfaces = Samples::biaxial_cutoff()?;
    let dde = Samples::elasticity(1000.0, 0.25, false);
    let mut cce = Tensor4::new(Mandel::Symmetric);
    elastic_compliance(&mut cce, &dde, 1e-12)?;
    let trial = Samples::diagonal(false, 5.0, 1.5, 0.0);
    let mut delta_strain = Tensor2::new(Mandel::Symmetric);
    t4_ddot_t2(&mut delta_strain, 1.0, &cce, &trial);
    Ok((config, surfaces, dde, delta_strain))
}

#[test]
fn test_failure_reporting() -> Result<(), StrError> {
    let (config, surfaces, dde, delta_strain) = failing_case()?;
    let recorder = Recorder {
        reports: Mutex::new(Vec::new()),
    };
    let substepper = StrainSubstepper::new(&config, &surfaces).with_diagnostics(&recorder);
    let stress = Tensor2::new(Mandel::Symmetric);
    let plastic_strain = Tensor2::new(Mandel::Symmetric);
    assert_eq!(
        substepper
            .apply(&stress, &Vector::new(1), &plastic_strain, &dde, &delta_strain)
            .err(),
        Some("multi-surface stress update failed")
    );

    let reports = recorder.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.step_size, 1.0);
    assert_eq!(report.time_simulated, 0.0);
    assert_eq!(report.stress_start.vector().as_data(), stress.vector().as_data());
    approx_eq(report.stress_trial.vector()[0], 5.0, 1e-12);
    approx_eq(report.stress_trial.vector()[1], 1.5, 1e-12);
    assert_eq!(report.active, &[true, false]);
    assert_eq!(report.pm, &[0.0, 0.0]);
    let text = format!("{}", report);
    assert!(text.contains("step_size = 1.0"));
    Ok(())
}

#[test]
fn test_failure_reporting_finite_differences() -> Result<(), StrError> {
    let (config, surfaces, dde, delta_strain) = failing_case()?;
    let checker = FiniteDifferenceChecker::new();
    let substepper = StrainSubstepper::new(&config, &surfaces).with_diagnostics(&checker);
    let stress = Tensor2::new(Mandel::Symmetric);
    let plastic_strain = Tensor2::new(Mandel::Symmetric);
    assert!(substepper
        .apply(&stress, &Vector::new(1), &plastic_strain, &dde, &delta_strain)
        .is_err());
    let errors = checker.last().unwrap();
    assert!(errors.max() < 1e-8);
    Ok(())
}

#[test]
fn test_failure_reporting_ignored() -> Result<(), StrError> {
    let (mut config, surfaces, dde, delta_strain) = failing_case()?;
    config.set_ignore_failures(true)?;
    let recorder = Recorder {
        reports: Mutex::new(Vec::new()),
    };
    let substepper = StrainSubstepper::new(&config, &surfaces).with_diagnostics(&recorder);
    let stress = Tensor2::new(Mandel::Symmetric);
    let plastic_strain = Tensor2::new(Mandel::Symmetric);
    let update = substepper.apply(&stress, &Vector::new(1), &plastic_strain, &dde, &delta_strain)?;
    assert!(update.diagnostics.approximate);
    assert_eq!(update.diagnostics.tangent, TangentOperator::Elastic);
    assert_eq!(recorder.reports.lock().unwrap().len(), 0);
    Ok(())
}
