use nalgebra::{DMatrix, DVector, RealField};
use num_traits::Float;

use crate::{LevenbergMarquardt, RefinementModel, RefinementReport};

/// Cycle budget used by [`Equation::least_squares_fit`].
const FIT_CYCLES: usize = 100;

/// A convenience trait to fit the coefficients of a scalar equation to
/// observed data with [`LevenbergMarquardt`].
///
/// For example:
///
/// ```
/// # use approx::assert_relative_eq;
/// use marquardt_svd::Equation;
///
/// struct Problem;
///
/// impl Equation<2, f64> for Problem {
///     fn equation(&self, ws: &[f64; 2], x: f64) -> f64 {
///         // This is our equation; we want to find the coefficients `ws`.
///         ws[0] * 2.0 * x + ws[1] * 0.5 * x.powi(2)
///     }
///
///     fn derivatives(&self, ws: &[f64; 2], x: f64) -> [f64; 2] {
///         // These are the partial derivatives of our equation, one for
///         // each coefficient.
///         [
///             2.0 * x,
///             0.5 * x.powi(2),
///         ]
///     }
/// }
///
/// // Let's pick some coefficients...
/// let ws = [1.33, 0.66];
///
/// // ...and generate some data...
/// let xs = [1.0, 10.0, 100.0];
/// let ys = xs.map(|x| Problem.equation(&ws, x));
///
/// // Now we can refine the coefficients from the data.
/// let ([w0, w1], report) = Problem.least_squares_fit(&xs, &ys, [1.5, 1.0]);
///
/// assert!(report.converged);
/// assert_relative_eq!(w0, 1.33, epsilon = 1e-8);
/// assert_relative_eq!(w1, 0.66, epsilon = 1e-8);
/// ```
pub trait Equation<const N: usize, F: RealField + Float> {
    /// The equation for which we want to find the coefficients `ws`.
    fn equation(&self, ws: &[F; N], x: F) -> F;

    /// The partial derivatives of the equation with respect to each
    /// coefficient.
    fn derivatives(&self, ws: &[F; N], x: F) -> [F; N];

    /// View this equation plus observations as a [`RefinementModel`]
    /// with Gauss-Newton gradient and Hessian built from
    /// [`derivatives`](Self::derivatives).
    ///
    /// **This will panic if `xs` and `ys` are not of the same length!**
    fn as_refinement_model<'a>(&'a self, xs: &'a [F], ys: &'a [F]) -> EquationFit<'a, Self, N, F>
    where
        Self: Sized,
    {
        assert_eq!(xs.len(), ys.len(), "xs and ys must be of the same length");
        EquationFit {
            equation: self,
            xs,
            ys,
        }
    }

    /// Refine `initial_guess` against the observations `(xs, ys)`.
    ///
    /// **This will panic if `xs` and `ys` are not of the same length!**
    fn least_squares_fit(
        &self,
        xs: &[F],
        ys: &[F],
        initial_guess: [F; N],
    ) -> ([F; N], RefinementReport<F>)
    where
        Self: Sized,
    {
        let mut model = self.as_refinement_model(xs, ys);
        let x0 = DVector::from_iterator(N, initial_guess.iter().copied());
        let (x, report) = LevenbergMarquardt::new()
            .with_max_cycles(FIT_CYCLES)
            .minimize(x0, &mut model);
        let mut ws = initial_guess;
        for (w, refined) in ws.iter_mut().zip(x.iter()) {
            *w = *refined;
        }
        (ws, report)
    }
}

/// An [`Equation`] bound to its observations, usable as a
/// [`RefinementModel`].
pub struct EquationFit<'a, E, const N: usize, F> {
    equation: &'a E,
    xs: &'a [F],
    ys: &'a [F],
}

impl<E, const N: usize, F> RefinementModel<F> for EquationFit<'_, E, N, F>
where
    E: Equation<N, F>,
    F: RealField + Float,
{
    fn residuals(&mut self, x: &DVector<F>) -> Option<DVector<F>> {
        let ws = coefficients(x);
        Some(DVector::from_iterator(
            self.xs.len(),
            self.xs
                .iter()
                .zip(self.ys)
                .map(|(&xi, &yi)| self.equation.equation(&ws, xi) - yi),
        ))
    }

    fn gradient_and_hessian(&mut self, x: &DVector<F>) -> Option<(DVector<F>, DMatrix<F>)> {
        let ws = coefficients(x);
        let mut yvec = DVector::zeros(N);
        let mut amat = DMatrix::zeros(N, N);
        for (&xi, &yi) in self.xs.iter().zip(self.ys) {
            let r = self.equation.equation(&ws, xi) - yi;
            let d = self.equation.derivatives(&ws, xi);
            for k in 0..N {
                yvec[k] -= d[k] * r;
                for l in 0..N {
                    amat[(k, l)] += d[k] * d[l];
                }
            }
        }
        Some((yvec, amat))
    }
}

fn coefficients<const N: usize, F: RealField + Float>(x: &DVector<F>) -> [F; N] {
    let mut ws = [F::zero(); N];
    for (w, v) in ws.iter_mut().zip(x.iter()) {
        *w = *v;
    }
    ws
}
