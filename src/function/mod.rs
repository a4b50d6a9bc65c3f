pub mod constraint;

use faer::{Col, ColRef};

use crate::E;
pub use constraint::Constraint;

/// Bookkeeping shared by every [`Function`] implementor: call counters and
/// the accepted constraint list. Concrete functions embed this rather than
/// inherit from a common base class, per the CRTP re-architecture note.
#[derive(Default)]
pub struct FunctionBase {
    fcalls: usize,
    gcalls: usize,
    constraints: Vec<Constraint>,
}

impl FunctionBase {
    pub fn new() -> Self {
        Self::default()
    }
}

/// An objective exposed to the solvers in this crate: a value/gradient
/// oracle plus an optional constraint list and convexity/smoothness flags
/// (§4.3).
pub trait Function: Send + Sync {
    fn size(&self) -> usize;

    fn base(&self) -> &FunctionBase;
    fn base_mut(&mut self) -> &mut FunctionBase;

    fn convex(&self) -> bool {
        true
    }

    fn smooth(&self) -> bool {
        true
    }

    fn strong_convexity(&self) -> E {
        0.0
    }

    /// Evaluates `f(x)`. Implementors perform the raw evaluation here; call
    /// counting is handled uniformly by [`Function::value`].
    fn raw_value(&self, x: ColRef<E>) -> E;

    /// Evaluates `f(x)` and writes `∇f(x)` into `g`.
    fn raw_value_and_grad(&self, x: ColRef<E>, g: &mut Col<E>) -> E;

    fn value(&mut self, x: ColRef<E>) -> E {
        let f = self.raw_value(x);
        self.base_mut().fcalls += 1;
        f
    }

    fn value_and_grad(&mut self, x: ColRef<E>, g: &mut Col<E>) -> E {
        assert_eq!(g.nrows(), self.size());
        let f = self.raw_value_and_grad(x, g);
        self.base_mut().fcalls += 1;
        self.base_mut().gcalls += 1;
        f
    }

    fn fcalls(&self) -> usize {
        self.base().fcalls
    }

    fn gcalls(&self) -> usize {
        self.base().gcalls
    }

    /// Accepts `c`, rejecting it if its dimension is incompatible with this
    /// function's size or if it would alter the function's declared
    /// convexity (a non-convex constraint on a convex function).
    fn constrain(&mut self, c: Constraint) -> bool {
        if let Some(dim) = c.dim() {
            if dim != self.size() {
                return false;
            }
        }
        if self.convex() && !c.convex() {
            return false;
        }
        self.base_mut().constraints.push(c);
        true
    }

    fn constraints(&self) -> &[Constraint] {
        &self.base().constraints
    }

    /// Central-difference check of the relative error between the analytic
    /// and numerical gradient at `x`.
    fn grad_accuracy(&mut self, x: ColRef<E>) -> E
    where
        Self: Sized,
    {
        let n = self.size();
        let mut analytic = Col::<E>::zeros(n);
        self.value_and_grad(x, &mut analytic);

        let h = 1e-6;
        let mut numeric = Col::<E>::zeros(n);
        let mut perturbed = x.to_owned();
        for i in 0..n {
            let original = perturbed[i];
            perturbed[i] = original + h;
            let f_plus = self.raw_value(perturbed.as_ref());
            perturbed[i] = original - h;
            let f_minus = self.raw_value(perturbed.as_ref());
            perturbed[i] = original;
            numeric[i] = (f_plus - f_minus) / (2.0 * h);
        }

        let num = (0..n).map(|i| (analytic[i] - numeric[i]).powi(2)).sum::<E>().sqrt();
        let denom = (0..n).map(|i| analytic[i].powi(2)).sum::<E>().sqrt().max(1.0);
        num / denom
    }
}

/// `f(x) = ‖x‖²`, used throughout the test bank as the simplest convex
/// smooth function.
pub struct Sphere {
    base: FunctionBase,
    n: usize,
}

impl Sphere {
    pub fn new(n: usize) -> Self {
        Self {
            base: FunctionBase::new(),
            n,
        }
    }
}

impl Function for Sphere {
    fn size(&self) -> usize {
        self.n
    }

    fn base(&self) -> &FunctionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FunctionBase {
        &mut self.base
    }

    fn strong_convexity(&self) -> E {
        2.0
    }

    fn raw_value(&self, x: ColRef<E>) -> E {
        (0..x.nrows()).map(|i| x[i] * x[i]).sum()
    }

    fn raw_value_and_grad(&self, x: ColRef<E>, g: &mut Col<E>) -> E {
        for i in 0..x.nrows() {
            g[i] = 2.0 * x[i];
        }
        self.raw_value(x)
    }
}

/// The 2-D Rosenbrock "banana" function, the standard nonconvex smoke test
/// for quasi-Newton/CGD solvers.
pub struct Rosenbrock {
    base: FunctionBase,
}

impl Rosenbrock {
    pub fn new() -> Self {
        Self { base: FunctionBase::new() }
    }
}

impl Default for Rosenbrock {
    fn default() -> Self {
        Self::new()
    }
}

impl Function for Rosenbrock {
    fn size(&self) -> usize {
        2
    }

    fn base(&self) -> &FunctionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FunctionBase {
        &mut self.base
    }

    fn convex(&self) -> bool {
        false
    }

    fn raw_value(&self, x: ColRef<E>) -> E {
        let (a, b) = (x[0], x[1]);
        (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2)
    }

    fn raw_value_and_grad(&self, x: ColRef<E>, g: &mut Col<E>) -> E {
        let (a, b) = (x[0], x[1]);
        g[0] = -2.0 * (1.0 - a) - 400.0 * a * (b - a * a);
        g[1] = 200.0 * (b - a * a);
        self.raw_value(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_gradient_matches_central_difference() {
        let mut f = Sphere::new(4);
        let x = Col::from_fn(4, |i| (i as E + 1.0) * 0.3);
        let err = f.grad_accuracy(x.as_ref());
        assert!(err <= 10.0 * f64::EPSILON.sqrt(), "relative error {err} too large");
    }

    #[test]
    fn rosenbrock_gradient_matches_central_difference() {
        let mut f = Rosenbrock::new();
        let x = Col::from_fn(2, |i| if i == 0 { -1.2 } else { 1.0 });
        let err = f.grad_accuracy(x.as_ref());
        assert!(err <= 10.0 * f64::EPSILON.sqrt(), "relative error {err} too large");
    }

    #[test]
    fn constrain_rejects_dimension_mismatch() {
        let mut f = Sphere::new(3);
        let accepted = f.constrain(Constraint::Equality {
            a: Col::zeros(2),
            b: 0.0,
        });
        assert!(!accepted);
    }

    #[test]
    fn constrain_rejects_non_convex_constraint_on_convex_function() {
        let mut f = Sphere::new(3);
        assert!(f.convex());
        let accepted = f.constrain(Constraint::Functional {
            residual: Box::new(|x: ColRef<E>| x[0].sin()),
            convex: false,
        });
        assert!(!accepted);
    }

    #[test]
    fn constrain_accepts_convex_functional_constraint() {
        let mut f = Sphere::new(3);
        let accepted = f.constrain(Constraint::Functional {
            residual: Box::new(|x: ColRef<E>| x[0] - 1.0),
            convex: true,
        });
        assert!(accepted);
    }
}
