use log::{debug, error, warn};
use nalgebra::{convert, DMatrix, DVector, RealField};
use num_traits::Float;
use thiserror::Error;

use crate::pinv::{pseudo_inverse, singular_indices, DIAG_SINGULAR_THRESHOLD};
use crate::RefinementModel;

/// Reasons for failure of the refinement.
///
/// Everything here is reported through [`RefinementReport`], never as a
/// panic from inside the solver. A stalled damping loop is *not* listed:
/// the cycle is abandoned with a warning and shows up as a non-improving
/// [`delta_chi2`](RefinementReport::delta_chi2) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Failure {
    /// A diagonal entry of the Hessian is effectively zero, i.e. the model
    /// has no sensitivity at all to one of the parameters.
    #[error("hard singularity: a Hessian diagonal entry is effectively zero")]
    HardSingularity,
    /// The SVD of the (damped) Hessian did not converge. Recoverable only
    /// by choosing a different parameterization or starting point.
    #[error("SVD of the damped Hessian did not converge")]
    Decomposition,
    /// The refinement itself finished, but the terminal covariance
    /// inversion failed. The returned parameters are still the best found;
    /// only the uncertainty estimate is missing.
    #[error("the terminal covariance inversion failed")]
    FinalCovariance,
    /// The model returned `None` from one of its evaluation hooks.
    #[error("the model failed to produce residuals or a Hessian")]
    User,
}

/// Diagnostics produced once per solver invocation.
///
/// Use this to inspect the refinement. Most importantly you may want to
/// check [`failure`](Self::failure) and whether a
/// [`covariance`](Self::covariance) was produced.
#[derive(Debug, Clone)]
pub struct RefinementReport<F: RealField> {
    pub failure: Option<Failure>,
    /// Number of completed outer refinement cycles.
    pub cycles: usize,
    /// Total number of residual-vector evaluations.
    pub evaluations: usize,
    /// The residual vector from the last evaluation.
    pub residuals: DVector<F>,
    /// Largest damping factor `$\lambda$` seen during the refinement.
    /// Always zero for [`GaussNewton`](crate::GaussNewton).
    pub lambda_max: F,
    /// Indices of parameters found (or estimated) to sit in singular
    /// directions. Empty on success.
    pub singular: Vec<usize>,
    /// Number of singular values zeroed while inverting the terminal
    /// covariance. `None` when that inversion never produced a count.
    pub svd_zeros: Option<usize>,
    /// Whether the relative chi-square improvement dropped below `ftol`.
    pub converged: bool,
    /// Last relative chi-square improvement
    /// `$(\chi^2_0 - \chi^2_1)/\chi^2_0$`.
    pub delta_chi2: F,
    /// Parameter variance-covariance matrix, produced on successful
    /// termination only.
    pub covariance: Option<DMatrix<F>>,
}

/// Running diagnostics threaded through one invocation.
pub(crate) struct Progress<F: RealField> {
    pub cycles: usize,
    pub evaluations: usize,
    pub lambda_max: F,
    pub converged: bool,
    pub delta_chi2: F,
}

impl<F: RealField + Float> Progress<F> {
    pub fn new(lambda_max: F) -> Self {
        Self {
            cycles: 0,
            evaluations: 0,
            lambda_max,
            converged: false,
            delta_chi2: convert(-10.0),
        }
    }

    /// Terminate with a failure and no covariance.
    pub fn abort(
        self,
        x: DVector<F>,
        failure: Failure,
        residuals: DVector<F>,
        singular: Vec<usize>,
    ) -> (DVector<F>, RefinementReport<F>) {
        (
            x,
            RefinementReport {
                failure: Some(failure),
                cycles: self.cycles,
                evaluations: self.evaluations,
                residuals,
                lambda_max: self.lambda_max,
                singular,
                svd_zeros: None,
                converged: self.converged,
                delta_chi2: self.delta_chi2,
                covariance: None,
            },
        )
    }
}

/// Indices of `diag` entries too close to zero to normalize by.
pub(crate) fn hard_singularities<F: RealField + Float>(diag: &DVector<F>) -> Vec<usize> {
    let threshold: F = convert(DIAG_SINGULAR_THRESHOLD);
    diag.iter()
        .enumerate()
        .filter(|(_, d)| Float::abs(**d) < threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Evaluate the model at the final point and invert the normalized Hessian
/// into the parameter covariance.
///
/// Shared tail of both solvers. No damping is applied here; the SVD cutoff
/// alone regularizes the inversion. A failure at this stage is a partial
/// success: the refined parameters are returned without a covariance.
pub(crate) fn terminal_covariance<F, M>(
    x: DVector<F>,
    model: &mut M,
    xtol: F,
    estimate_singular: bool,
    mut progress: Progress<F>,
) -> (DVector<F>, RefinementReport<F>)
where
    F: RealField + Float,
    M: RefinementModel<F>,
{
    let m = match model.residuals(&x) {
        Some(m) => m,
        None => return progress.abort(x, Failure::User, DVector::zeros(0), Vec::new()),
    };
    progress.evaluations += 1;
    let (_, mut amat) = match model.gradient_and_hessian(&x) {
        Some(pair) => pair,
        None => return progress.abort(x, Failure::User, m, Vec::new()),
    };

    let adiag = amat.diagonal().map(Float::sqrt);
    let hard = hard_singularities(&adiag);
    if !hard.is_empty() {
        warn!(
            "zero-curvature parameters {:?} prevent a covariance estimate",
            hard
        );
        return progress.abort(x, Failure::FinalCovariance, m, hard);
    }
    let anorm = &adiag * adiag.transpose();
    amat.component_div_assign(&anorm);

    match pseudo_inverse(&amat, xtol) {
        Ok((mut bmat, nzero)) => {
            if nzero > 0 {
                warn!("found {} SVD zeros in the covariance", nzero);
            }
            bmat.component_div_assign(&anorm);
            (
                x,
                RefinementReport {
                    failure: None,
                    cycles: progress.cycles,
                    evaluations: progress.evaluations,
                    residuals: m,
                    lambda_max: progress.lambda_max,
                    singular: Vec::new(),
                    svd_zeros: Some(nzero),
                    converged: progress.converged,
                    delta_chi2: progress.delta_chi2,
                    covariance: Some(bmat),
                },
            )
        }
        Err(_) => {
            error!("linear algebra error forming the variance-covariance matrix");
            let singular = if estimate_singular {
                singular_indices(&amat)
            } else {
                Vec::new()
            };
            progress.abort(x, Failure::FinalCovariance, m, singular)
        }
    }
}

/// Damped Gauss-Newton (Levenberg-Marquardt) refinement with
/// SVD-regularized Hessian inversion.
///
/// See the [module documentation](index.html) for a usage example.
///
/// Each outer cycle evaluates the model once, then retries the damped step
/// with a tenfold larger `$\lambda$` until the trial chi-square stops
/// getting worse. The Hessian is normalized by its diagonal before damping,
/// so `$\lambda$` is dimensionless regardless of the physical units of the
/// individual parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LevenbergMarquardt<F> {
    ftol: F,
    xtol: F,
    max_cycles: usize,
    lamda: i32,
}

impl<F: RealField + Float> LevenbergMarquardt<F> {
    pub fn new() -> Self {
        Self {
            ftol: convert(1.49012e-8),
            xtol: convert(1.0e-6),
            max_cycles: 0,
            lamda: -3,
        }
    }

    /// Set the relative chi-square improvement below which the refinement
    /// is considered converged.
    ///
    /// # Panics
    ///
    /// Panics if `$\mathtt{ftol} < 0$`.
    pub fn with_ftol(self, ftol: F) -> Self {
        assert!(ftol >= F::zero(), "ftol must be >= 0");
        Self { ftol, ..self }
    }

    /// Set the SVD cutoff ratio used when pseudo-inverting the Hessian.
    ///
    /// Singular values below `xtol` times the largest singular value are
    /// treated as exact zeros.
    ///
    /// # Panics
    ///
    /// Panics if `$\mathtt{xtol} < 0$`.
    pub fn with_xtol(self, xtol: F) -> Self {
        assert!(xtol >= F::zero(), "xtol must be >= 0");
        Self { xtol, ..self }
    }

    /// Set the outer cycle budget.
    ///
    /// With the default of zero the solver evaluates the model once and
    /// produces the covariance at the starting point without refining;
    /// useful to re-derive uncertainties for an already-converged
    /// parameter set.
    pub fn with_max_cycles(self, max_cycles: usize) -> Self {
        Self { max_cycles, ..self }
    }

    /// Set the base-10 exponent of the initial damping factor,
    /// `$\lambda_0 = 10^{\mathtt{lamda}}$`.
    pub fn with_lamda(self, lamda: i32) -> Self {
        Self { lamda, ..self }
    }

    /// Refine `initial_x` against the given model.
    pub fn minimize<M>(
        &self,
        initial_x: DVector<F>,
        model: &mut M,
    ) -> (DVector<F>, RefinementReport<F>)
    where
        M: RefinementModel<F>,
    {
        self.minimize_with_progress(initial_x, model, |_| {})
    }

    /// Refine `initial_x`, invoking `on_cycle` with the cycle index once
    /// per completed outer cycle.
    ///
    /// The callback is a pure notification hook (plot updates, progress
    /// bars); its absence does not change numerical behavior.
    pub fn minimize_with_progress<M, C>(
        &self,
        initial_x: DVector<F>,
        model: &mut M,
        mut on_cycle: C,
    ) -> (DVector<F>, RefinementReport<F>)
    where
        M: RefinementModel<F>,
        C: FnMut(usize),
    {
        let ten: F = convert(10.0);
        let lam0 = Float::powi(ten, self.lamda);
        let mut lam = lam0;
        let mut progress = Progress::new(lam0);
        let mut x = initial_x;

        debug!(
            "Levenberg-Marquardt SVD refinement on {} variables",
            x.len()
        );
        while progress.cycles < self.max_cycles {
            let m = match model.residuals(&x) {
                Some(m) => m,
                None => return progress.abort(x, Failure::User, DVector::zeros(0), Vec::new()),
            };
            progress.evaluations += 1;
            let nobs = m.len();
            let chisq0 = m.norm_squared();
            if chisq0 <= Float::min_positive_value() {
                // chi-square is already zero, nothing left to refine
                progress.converged = true;
                break;
            }
            let (mut yvec, mut amat) = match model.gradient_and_hessian(&x) {
                Some(pair) => pair,
                None => return progress.abort(x, Failure::User, m, Vec::new()),
            };

            let adiag = amat.diagonal().map(Float::sqrt);
            let hard = hard_singularities(&adiag);
            if !hard.is_empty() {
                error!("hard singularity in the Hessian for parameters {:?}", hard);
                return progress.abort(x, Failure::HardSingularity, m, hard);
            }
            // normalize to ~unit diagonal so lambda is scale-free
            let anorm = &adiag * adiag.transpose();
            yvec.component_div_assign(&adiag);
            amat.component_div_assign(&anorm);
            debug!("initial chi^2 {:?} on {} obs", chisq0, nobs);

            let mut chitol = self.ftol;
            let mut chisq1 = chisq0;
            loop {
                // scale the diagonal by (1 + lambda), off-diagonal unchanged
                let mut amatlam = amat.clone();
                let scale = F::one() + lam;
                for i in 0..amatlam.nrows() {
                    amatlam[(i, i)] *= scale;
                }
                let (ainv, nzeros) = match pseudo_inverse(&amatlam, self.xtol) {
                    Ok(inv) => inv,
                    Err(_) => {
                        let singular = singular_indices(&amatlam);
                        error!(
                            "bad SVD inversion; change parameterization for {:?}",
                            singular
                        );
                        return progress.abort(x, Failure::Decomposition, m, singular);
                    }
                };
                let mut xvec = &ainv * &yvec;
                xvec.component_div_assign(&adiag);

                let trial = &x + &xvec;
                let m2 = match model.residuals(&trial) {
                    Some(m2) => m2,
                    None => return progress.abort(x, Failure::User, m, Vec::new()),
                };
                progress.evaluations += 1;
                chisq1 = m2.norm_squared();
                if chisq1 > chisq0 * (F::one() + chitol) {
                    lam *= ten;
                    debug!(
                        "trial chi^2 {:?} on {} obs, {} SVD zeros; matrix modification needed, lambda now {:?}",
                        chisq1, nobs, nzeros, lam
                    );
                } else {
                    x = trial;
                    lam /= ten;
                    break;
                }
                if lam > ten {
                    warn!(
                        "refinement stalled: trial chi^2 {:?} stuck above {:?}",
                        chisq1, chisq0
                    );
                    break;
                }
                chitol *= convert(2.0);
            }
            progress.lambda_max = Float::max(progress.lambda_max, lam);
            progress.delta_chi2 = (chisq0 - chisq1) / chisq0;
            debug!(
                "cycle {}: chi^2 {:?} on {} obs, lambda max {:?}, delta {:?}",
                progress.cycles, chisq1, nobs, progress.lambda_max, progress.delta_chi2
            );
            on_cycle(progress.cycles);
            if progress.delta_chi2 < self.ftol {
                progress.converged = true;
                break;
            }
            progress.cycles += 1;
        }

        terminal_covariance(x, model, self.xtol, self.max_cycles > 0, progress)
    }
}

impl<F: RealField + Float> Default for LevenbergMarquardt<F> {
    fn default() -> Self {
        Self::new()
    }
}
