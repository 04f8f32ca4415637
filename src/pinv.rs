//! SVD-based pseudo-inversion of symmetric matrices.
//!
//! The refinement loop never inverts the Hessian directly. It uses a
//! Moore-Penrose generalized inverse built from a singular value
//! decomposition so that rank-deficient and badly scaled matrices produce
//! a usable (regularized) inverse instead of garbage or a crash.
use nalgebra::{convert, linalg, DMatrix, RealField};
use num_traits::Float;
use thiserror::Error;

/// Iteration budget handed to the SVD. Exceeding it is reported as
/// [`DecompositionError`] instead of spinning forever.
const MAX_SVD_ITERATIONS: usize = 1024;

/// Diagonal entries of a triangular factor below this value are counted
/// as singular directions.
pub(crate) const DIAG_SINGULAR_THRESHOLD: f64 = 1.0e-14;

/// The singular value decomposition did not converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("singular value decomposition did not converge")]
pub struct DecompositionError;

/// Compute the Moore-Penrose pseudo-inverse of a symmetric matrix.
///
/// Let `$\mathbf{A} = \mathbf{U}\mathbf{S}\mathbf{V}^\top$` be the singular
/// value decomposition of `a`. Every singular value larger than
/// `$\mathtt{rcond}\cdot\max(\mathbf{S})$` is replaced by its reciprocal and
/// the rest are set to zero, which drops the (near-)singular directions from
/// the inverse:
/// ```math
///   \mathbf{A}^+ = \mathbf{V}\,\mathbf{S}^+\mathbf{U}^\top.
/// ```
///
/// Returns the pseudo-inverse together with the number of singular values
/// that were zeroed out. That count is the caller's measure of how
/// rank-deficient the matrix was.
///
/// # Errors
///
/// Returns [`DecompositionError`] when the SVD iteration fails to converge.
pub fn pseudo_inverse<F: RealField + Float>(
    a: &DMatrix<F>,
    rcond: F,
) -> Result<(DMatrix<F>, usize), DecompositionError> {
    let svd = linalg::SVD::try_new(
        a.clone(),
        true,
        true,
        F::default_epsilon(),
        MAX_SVD_ITERATIONS,
    )
    .ok_or(DecompositionError)?;
    let u = svd.u.ok_or(DecompositionError)?;
    let v_t = svd.v_t.ok_or(DecompositionError)?;

    let cutoff = rcond * svd.singular_values.max();
    let s_plus = svd
        .singular_values
        .map(|s| if s > cutoff { F::one() / s } else { F::zero() });
    let nzero = s_plus.iter().filter(|s| s.is_zero()).count();

    let mut ut = u.transpose();
    for (i, mut row) in ut.row_iter_mut().enumerate() {
        row *= s_plus[i];
    }
    Ok((v_t.transpose() * ut, nzero))
}

/// Estimate which parameters sit in singular directions of `a`.
///
/// A rank-revealing QR decomposition is used: indices whose diagonal entry
/// of the `$\mathbf{R}$` factor falls below the singularity threshold are
/// reported. This is the fallback diagnostic when the SVD itself fails, so
/// the caller can still name the offending parameters.
pub fn singular_indices<F: RealField + Float>(a: &DMatrix<F>) -> Vec<usize> {
    let r = linalg::QR::new(a.clone()).r();
    let threshold: F = convert(DIAG_SINGULAR_THRESHOLD);
    let k = r.nrows().min(r.ncols());
    (0..k).filter(|&i| r[(i, i)] < threshold).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::dmatrix;

    #[test]
    fn positive_definite_inverse() {
        let a = dmatrix![4.0, 1.0; 1.0, 3.0];
        let (inv, nzero) = pseudo_inverse(&a, 1e-14).unwrap();
        assert_eq!(nzero, 0);
        assert_relative_eq!(&inv * &a, DMatrix::identity(2, 2), epsilon = 1e-12);
    }

    #[test]
    fn rank_deficient_matrix() {
        // third parameter has no sensitivity at all
        let a = dmatrix![
            2.0, 1.0, 0.0;
            1.0, 2.0, 0.0;
            0.0, 0.0, 0.0
        ];
        let (inv, nzero) = pseudo_inverse(&a, 1e-14).unwrap();
        assert!(nzero >= 1);
        for i in 0..3 {
            assert_relative_eq!(inv[(2, i)], 0.0, epsilon = 1e-12);
            assert_relative_eq!(inv[(i, 2)], 0.0, epsilon = 1e-12);
        }
        // the regular 2x2 block is still inverted exactly
        let block = dmatrix![2.0, 1.0; 1.0, 2.0];
        let block_inv = inv.view((0, 0), (2, 2)).clone_owned();
        assert_relative_eq!(
            &block_inv * &block,
            DMatrix::identity(2, 2),
            epsilon = 1e-12
        );
    }

    #[test]
    fn cutoff_drops_tiny_singular_values() {
        let a = dmatrix![1.0, 0.0; 0.0, 1.0e-20];
        let (inv, nzero) = pseudo_inverse(&a, 1e-15).unwrap();
        assert_eq!(nzero, 1);
        assert_relative_eq!(inv[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(inv[(1, 1)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn qr_flags_zero_diagonal() {
        let a = dmatrix![
            1.0, 0.0, 0.0;
            0.0, 0.0, 0.0;
            0.0, 0.0, 2.0
        ];
        let singular = singular_indices(&a);
        assert!(singular.contains(&1));
    }
}
