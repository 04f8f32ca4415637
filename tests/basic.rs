//! Behavioral tests for the two solvers on small constructed models.
use approx::assert_relative_eq;
use marquardt_svd::{Failure, GaussNewton, LevenbergMarquardt, RefinementModel};
use nalgebra::{dmatrix, dvector, DMatrix, DVector};

/// One parameter, one residual: `M = x0 - 5`.
struct Offset;

impl RefinementModel<f64> for Offset {
    fn residuals(&mut self, x: &DVector<f64>) -> Option<DVector<f64>> {
        Some(dvector![x[0] - 5.0])
    }

    fn gradient_and_hessian(&mut self, x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
        Some((dvector![-(x[0] - 5.0)], dmatrix![1.0]))
    }
}

/// Two parameters, but the second has no sensitivity at all.
struct DeadParameter;

impl RefinementModel<f64> for DeadParameter {
    fn residuals(&mut self, x: &DVector<f64>) -> Option<DVector<f64>> {
        Some(dvector![x[0] - 5.0])
    }

    fn gradient_and_hessian(&mut self, x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
        Some((
            dvector![-(x[0] - 5.0), 0.0],
            dmatrix![1.0, 0.0; 0.0, 0.0],
        ))
    }
}

/// Claims a useful gradient but punishes every step away from the origin,
/// so no trial point is ever acceptable.
struct Hostile;

impl RefinementModel<f64> for Hostile {
    fn residuals(&mut self, x: &DVector<f64>) -> Option<DVector<f64>> {
        if x[0] == 0.0 {
            Some(dvector![1.0])
        } else {
            Some(dvector![100.0])
        }
    }

    fn gradient_and_hessian(&mut self, _x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
        Some((dvector![1.0], dmatrix![1.0]))
    }
}

/// Always refuses to evaluate.
struct Broken;

impl RefinementModel<f64> for Broken {
    fn residuals(&mut self, _x: &DVector<f64>) -> Option<DVector<f64>> {
        None
    }

    fn gradient_and_hessian(&mut self, _x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
        None
    }
}

#[test]
fn converges_on_linear_offset() {
    let (x, report) = LevenbergMarquardt::new()
        .with_ftol(1e-8)
        .with_max_cycles(10)
        .minimize(dvector![0.0], &mut Offset);
    assert!(report.failure.is_none());
    assert!(report.converged);
    assert_relative_eq!(x[0], 5.0, epsilon = 1e-6);
    assert!(report.cycles <= 10);
    assert_eq!(report.svd_zeros, Some(0));
    assert!(report.singular.is_empty());
    let cov = report.covariance.expect("covariance on success");
    assert_relative_eq!(cov[(0, 0)], 1.0, epsilon = 1e-10);
}

#[test]
fn zero_cycles_evaluates_once() {
    let (x, report) = LevenbergMarquardt::new().minimize(dvector![0.0], &mut Offset);
    assert_eq!(report.cycles, 0);
    assert_eq!(report.evaluations, 1);
    assert_eq!(x[0], 0.0);
    assert!(!report.converged);
    assert!(report.failure.is_none());
    assert_eq!(report.svd_zeros, Some(0));
    // the damping factor never moved off its seed
    assert_relative_eq!(report.lambda_max, 1e-3, max_relative = 1e-12);
    assert!(report.covariance.is_some());
}

#[test]
fn dead_parameter_is_a_hard_singularity() {
    let (x, report) = LevenbergMarquardt::new()
        .with_max_cycles(5)
        .minimize(dvector![0.0, 0.0], &mut DeadParameter);
    assert_eq!(report.failure, Some(Failure::HardSingularity));
    assert_eq!(report.singular, vec![1]);
    assert!(report.covariance.is_none());
    assert_eq!(report.svd_zeros, None);
    assert_eq!(report.cycles, 0);
    assert_eq!(x[0], 0.0);
    assert_eq!(x[1], 0.0);
}

#[test]
fn hostile_model_escalates_lambda_until_the_ceiling() {
    let (x, report) = LevenbergMarquardt::new()
        .with_max_cycles(1)
        .minimize(dvector![0.0], &mut Hostile);
    // no trial step was ever applied
    assert_eq!(x[0], 0.0);
    // lambda grew tenfold per retry from 1e-3 past the ceiling of 10
    assert_relative_eq!(report.lambda_max, 100.0, max_relative = 1e-12);
    assert!(report.delta_chi2 < 0.0);
    // one start evaluation, five rejected trials, one terminal evaluation
    assert_eq!(report.evaluations, 7);
    assert!(report.failure.is_none());
}

#[test]
fn refining_a_converged_result_is_idempotent() {
    let (x1, report1) = LevenbergMarquardt::new()
        .with_max_cycles(10)
        .minimize(dvector![0.0], &mut Offset);
    assert!(report1.converged);
    let (x2, report2) = LevenbergMarquardt::new()
        .with_max_cycles(10)
        .minimize(x1.clone(), &mut Offset);
    assert!(report2.converged);
    assert!(report2.cycles <= 1);
    assert_relative_eq!(x2[0], x1[0], epsilon = 1e-10);
}

#[test]
fn progress_callback_sees_every_completed_cycle() {
    let mut seen = Vec::new();
    let (_, report) = LevenbergMarquardt::new()
        .with_max_cycles(10)
        .minimize_with_progress(dvector![0.0], &mut Offset, |cycle| seen.push(cycle));
    assert!(!seen.is_empty());
    let expected: Vec<usize> = (0..seen.len()).collect();
    assert_eq!(seen, expected);
    assert!(seen.len() >= report.cycles);
    assert!(seen.len() <= report.cycles + 1);
}

#[test]
fn broken_model_reports_user_failure() {
    let (x, report) = LevenbergMarquardt::new()
        .with_max_cycles(3)
        .minimize(dvector![1.0], &mut Broken);
    assert_eq!(report.failure, Some(Failure::User));
    assert!(report.covariance.is_none());
    assert_eq!(x[0], 1.0);
}

#[test]
fn gauss_newton_takes_the_full_step() {
    let (x, report) = GaussNewton::new()
        .with_max_cycles(5)
        .minimize(dvector![0.0], &mut Offset);
    assert!(report.failure.is_none());
    assert!(report.converged);
    assert_eq!(x[0], 5.0);
    assert_eq!(report.lambda_max, 0.0);
    let cov = report.covariance.expect("covariance on success");
    assert_relative_eq!(cov[(0, 0)], 1.0, epsilon = 1e-10);
}

#[test]
fn gauss_newton_flags_hard_singularity_too() {
    let (_, report) = GaussNewton::new()
        .with_max_cycles(3)
        .minimize(dvector![0.0, 0.0], &mut DeadParameter);
    assert_eq!(report.failure, Some(Failure::HardSingularity));
    assert_eq!(report.singular, vec![1]);
    assert!(report.covariance.is_none());
}
