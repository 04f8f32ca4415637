use nalgebra::{DMatrix, DVector, RealField};

/// A parameter-refinement problem.
///
/// This is what [`LevenbergMarquardt`](crate::LevenbergMarquardt) and
/// [`GaussNewton`](crate::GaussNewton) need to evaluate the weighted
/// residual vector and the curvature of the chi-square surface. See the
/// [module documentation](index.html) for a usage example.
///
/// Both hooks receive the current parameter vector `$\vec{x}\in\R^n$`
/// directly, so a model is free to be a pure function of it. Models that
/// share expensive intermediates between the residual and the Hessian pass
/// can cache them in `self`; the solvers call the hooks strictly in
/// sequence from one thread.
pub trait RefinementModel<F: RealField> {
    /// Compute the weighted residual vector
    /// `$\vec{M}(\vec{x})\in\R^{N_{obs}}$`.
    ///
    /// The observation count is independent of `$n$` and is re-read on
    /// every evaluation. Returning `None` aborts the refinement with
    /// [`Failure::User`](crate::Failure::User).
    fn residuals(&mut self, x: &DVector<F>) -> Option<DVector<F>>;

    /// Compute the gradient vector `$\vec{Y}$` and the approximate Hessian
    /// `$\mathbf{A}$` of the chi-square surface at `$\vec{x}$`.
    ///
    /// The Hessian must be a symmetric `$n\times n$` matrix consistent with
    /// [`residuals`](Self::residuals); for a Gauss-Newton scheme that is
    /// `$\mathbf{A} \approx \mathbf{J}^\top\mathbf{J}$` and
    /// `$\vec{Y} \approx -\mathbf{J}^\top\vec{M}$` with `$\mathbf{J}$` the
    /// Jacobian of the residual vector. Positive-definiteness is *not*
    /// assumed; singular directions are handled by the SVD regularization.
    fn gradient_and_hessian(&mut self, x: &DVector<F>) -> Option<(DVector<F>, DMatrix<F>)>;
}
