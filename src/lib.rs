//! Damped least-squares parameter refinement with SVD-regularized Hessian
//! inversion, using [nalgebra](https://nalgebra.org).
//!
//! This crate tries to solve the least-squares problem
//! ```math
//! \min_{\vec{x}\in\R^n}\chi^2(\vec{x})\quad\text{where}\quad
//! \chi^2(\vec{x}) = \sum_{i=1}^{N_{obs}} \bigl(M_i(\vec{x})\bigr)^2,
//! ```
//! for weighted _residual functions_ `$M_i\!:\R^n\to\R$`, and on
//! convergence produces a parameter variance-covariance matrix for
//! downstream error propagation.
//!
//! # Inputs
//!
//! Unlike Jacobian-based minimizers, the solvers here work from the
//! curvature of the chi-square surface. You must provide an implementation
//! of [`RefinementModel`] computing
//!
//! - the residual vector `$\vec{M}(\vec{x})\in\R^{N_{obs}}$`,
//! - and the gradient/Hessian pair `$(\vec{Y}, \mathbf{A})$` with
//!   `$\mathbf{A}\in\R^{n\times n}$` symmetric; for a Gauss-Newton scheme
//!   `$\mathbf{A} \approx \mathbf{J}^\top\mathbf{J}$` and
//!   `$\vec{Y} \approx -\mathbf{J}^\top\vec{M}$`.
//!
//! The Hessian may be rank-deficient or badly scaled, as happens with
//! symmetry-correlated or locally insensitive parameters: it is normalized
//! to unit diagonal and pseudo-inverted through an SVD that discards
//! near-zero singular values, so such directions simply receive no step
//! instead of blowing up the refinement.
//!
//! Finally, you have to provide an initial guess for `$\vec{x}$`. This can
//! be a constant value, but typically the refinement result _crucially_
//! depends on a good initial value.
//!
//! The damping behavior and termination are controlled by hyperparameters
//! on [`LevenbergMarquardt`]; the undamped [`GaussNewton`] sibling takes
//! one full step per cycle for well-conditioned problems.
//!
//! # Usage Example
//!
//! A one-parameter model whose single residual is `$x_0 - 5$`:
//!
//! ```
//! use marquardt_svd::{LevenbergMarquardt, RefinementModel};
//! use nalgebra::{dmatrix, dvector, DMatrix, DVector};
//!
//! struct Offset;
//!
//! impl RefinementModel<f64> for Offset {
//!     fn residuals(&mut self, x: &DVector<f64>) -> Option<DVector<f64>> {
//!         Some(dvector![x[0] - 5.0])
//!     }
//!
//!     fn gradient_and_hessian(
//!         &mut self,
//!         x: &DVector<f64>,
//!     ) -> Option<(DVector<f64>, DMatrix<f64>)> {
//!         Some((dvector![-(x[0] - 5.0)], dmatrix![1.0]))
//!     }
//! }
//!
//! let (x, report) = LevenbergMarquardt::new()
//!     .with_max_cycles(20)
//!     .minimize(dvector![0.0], &mut Offset);
//! assert!(report.failure.is_none());
//! assert!(report.converged);
//! assert!((x[0] - 5.0).abs() < 1e-6);
//! // the covariance of a unit-curvature parameter is one
//! let cov = report.covariance.unwrap();
//! assert!((cov[(0, 0)] - 1.0).abs() < 1e-10);
//! ```
//!
//! # Failure handling
//!
//! Numerical trouble is reported through
//! [`RefinementReport`](struct.RefinementReport.html) rather than panics:
//! a hard-singular Hessian diagonal, an SVD that fails to converge, and a
//! failed terminal covariance inversion all come back as a
//! [`Failure`](enum.Failure.html) variant plus a singular-parameter index
//! list, with `covariance` set to `None`. Callers inspect those fields to
//! decide on reparameterization or recovery.

mod covariance;
mod equation;
mod gauss_newton;
mod lm;
mod pinv;
mod problem;
mod utils;

pub use covariance::select_covariance;
pub use equation::{Equation, EquationFit};
pub use gauss_newton::GaussNewton;
pub use lm::{Failure, LevenbergMarquardt, RefinementReport};
pub use pinv::{pseudo_inverse, singular_indices, DecompositionError};
pub use problem::RefinementModel;
pub use utils::differentiate_numerically;
