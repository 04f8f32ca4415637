use log::{debug, error};
use nalgebra::{convert, DVector, RealField};
use num_traits::Float;

use crate::lm::{hard_singularities, terminal_covariance, Progress};
use crate::pinv::{pseudo_inverse, singular_indices};
use crate::{Failure, RefinementModel, RefinementReport};

/// Undamped Gauss-Newton refinement with SVD-regularized Hessian inversion.
///
/// The fixed-step sibling of
/// [`LevenbergMarquardt`](crate::LevenbergMarquardt): no damping factor is
/// ever applied, each outer cycle takes exactly one full Newton step and
/// accepts it unconditionally, and
/// [`lambda_max`](crate::RefinementReport::lambda_max) is always reported
/// as zero. Intended for well-conditioned, low-parameter-count problems
/// where the damping retry loop is unnecessary overhead.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GaussNewton<F> {
    ftol: F,
    xtol: F,
    max_cycles: usize,
}

impl<F: RealField + Float> GaussNewton<F> {
    pub fn new() -> Self {
        Self {
            ftol: convert(1.49012e-8),
            xtol: convert(1.0e-6),
            max_cycles: 0,
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
    /// # Panics
    ///
    /// Panics if `$\mathtt{xtol} < 0$`.
    pub fn with_xtol(self, xtol: F) -> Self {
        assert!(xtol >= F::zero(), "xtol must be >= 0");
        Self { xtol, ..self }
    }

    /// Set the outer cycle budget. Zero evaluates once and produces the
    /// covariance at the starting point.
    pub fn with_max_cycles(self, max_cycles: usize) -> Self {
        Self { max_cycles, ..self }
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
        let mut progress = Progress::new(F::zero());
        let mut x = initial_x;

        debug!("Gauss-Newton SVD refinement on {} variables", x.len());
        while progress.cycles < self.max_cycles {
            let m = match model.residuals(&x) {
                Some(m) => m,
                None => return progress.abort(x, Failure::User, DVector::zeros(0), Vec::new()),
            };
            progress.evaluations += 1;
            let chisq0 = m.norm_squared();
            if chisq0 <= Float::min_positive_value() {
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
            let anorm = &adiag * adiag.transpose();
            yvec.component_div_assign(&adiag);
            amat.component_div_assign(&anorm);
            debug!("initial chi^2 {:?}", chisq0);

            let (ainv, _) = match pseudo_inverse(&amat, self.xtol) {
                Ok(inv) => inv,
                Err(_) => {
                    let singular = singular_indices(&amat);
                    error!(
                        "bad SVD inversion; change parameterization for {:?}",
                        singular
                    );
                    return progress.abort(x, Failure::Decomposition, m, singular);
                }
            };
            let mut xvec = &ainv * &yvec;
            xvec.component_div_assign(&adiag);

            // the step is accepted unconditionally
            x = &x + &xvec;
            let m2 = match model.residuals(&x) {
                Some(m2) => m2,
                None => return progress.abort(x, Failure::User, m, Vec::new()),
            };
            progress.evaluations += 1;
            let chisq1 = m2.norm_squared();
            progress.delta_chi2 = (chisq0 - chisq1) / chisq0;
            debug!(
                "cycle {}: chi^2 {:?}, delta {:?}",
                progress.cycles, chisq1, progress.delta_chi2
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

impl<F: RealField + Float> Default for GaussNewton<F> {
    fn default() -> Self {
        Self::new()
    }
}
