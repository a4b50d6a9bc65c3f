//! Unconstrained smooth/non-smooth solvers (§4.5): nonlinear conjugate
//! gradient, quasi-Newton, the ellipsoid method, universal gradient methods,
//! and the accelerated subgradient (ASGA) family.

pub mod asga;
pub mod cgd;
pub mod ellipsoid;
pub mod quasi_newton;
pub mod universal;

pub use asga::{Asga2, Asga4};
pub use cgd::{BetaFormula, ConjugateGradient};
pub use ellipsoid::Ellipsoid;
pub use quasi_newton::{QuasiNewton, QuasiNewtonUpdate};
pub use universal::{DualGradientMethod, FastGradientMethod, ProjectedGradientMethod};
