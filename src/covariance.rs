use nalgebra::{DMatrix, RealField};

/// Select the variance-covariance terms for a named subset of parameters.
///
/// `all_names` must list the parameter names in the row/column order of
/// `covariance`, exactly as they were refined. The result is an
/// `$m\times m$` matrix, `$m$` the length of `names`, with entry `$(i,j)$`
/// taken from the full matrix where both names are found. Names absent
/// from `all_names` contribute zero rows and columns rather than an error,
/// so callers can query speculative parameter sets.
pub fn select_covariance<F: RealField>(
    names: &[&str],
    all_names: &[&str],
    covariance: &DMatrix<F>,
) -> DMatrix<F> {
    let indices: Vec<Option<usize>> = names
        .iter()
        .map(|name| all_names.iter().position(|a| a == name))
        .collect();
    DMatrix::from_fn(names.len(), names.len(), |i, j| match (indices[i], indices[j]) {
        (Some(row), Some(col)) => covariance[(row, col)].clone(),
        _ => F::zero(),
    })
}
