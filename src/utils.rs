use nalgebra::{convert, DMatrix, DVector, RealField};
use num_traits::Float;

use crate::RefinementModel;

/// Compute a [numerical approximation](https://en.wikipedia.org/wiki/Numerical_differentiation)
/// to the gradient and Hessian for testing.
///
/// The function is intended to be used for debugging or testing. You can
/// check a hand-written
/// [`gradient_and_hessian`](RefinementModel::gradient_and_hessian)
/// implementation against the Gauss-Newton pair
/// `$(-\mathbf{J}^\top\vec{M},\ \mathbf{J}^\top\mathbf{J})$` built from a
/// central-difference Jacobian of the residuals.
///
/// Computing derivatives numerically is unstable: the achieved precision
/// is well below the floating point precision in general. Expect errors
/// bigger than `$10^{-10}$` for `f64` and compare with a correspondingly
/// loose tolerance. If possible use `f64` for the testing.
///
/// Returns `None` when the model fails to produce residuals at any of the
/// probed points.
pub fn differentiate_numerically<F, M>(
    x: &DVector<F>,
    model: &mut M,
) -> Option<(DVector<F>, DMatrix<F>)>
where
    F: RealField + Float,
    M: RefinementModel<F>,
{
    let m0 = model.residuals(x)?;
    let nobs = m0.len();
    let n = x.len();
    let two: F = convert(2.0);
    let step_scale = Float::cbrt(F::default_epsilon());

    let mut jacobian = DMatrix::zeros(nobs, n);
    for j in 0..n {
        let h = step_scale * Float::max(Float::abs(x[j]), F::one());
        let mut xp = x.clone();
        xp[j] += h;
        let mut xm = x.clone();
        xm[j] -= h;
        let fp = model.residuals(&xp)?;
        let fm = model.residuals(&xm)?;
        jacobian.set_column(j, &((fp - fm) / (two * h)));
    }
    let yvec = -(jacobian.transpose() * &m0);
    let amat = jacobian.transpose() * &jacobian;
    Some((yvec, amat))
}
