//! The contract between the interior-point solver and a nonlinear program.

use crate::error::IpsError;
use sprs::CsMat;

/// Sizes of a nonlinear program `min f(x) s.t. G(x) = 0, H(x) <= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemDimensions {
    /// Primal variables
    pub n_x: usize,
    /// Equality constraints
    pub n_eq: usize,
    /// Inequality constraints
    pub n_ineq: usize,
}

/// How much derivative information an evaluation must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DerivativeLevel {
    /// `f`, `G`, `H` only
    Values,
    /// plus `fx`, `Gx`, `Hx`
    FirstOrder,
    /// plus `fxx`, `Gxx`, `Hxx`
    SecondOrder,
}

impl DerivativeLevel {
    pub fn wants_first(self) -> bool {
        self >= DerivativeLevel::FirstOrder
    }

    pub fn wants_second(self) -> bool {
        self == DerivativeLevel::SecondOrder
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FirstOrder {
    /// ∇f, length `n_x`
    pub fx: Vec<f64>,
    /// ∂G/∂x, `n_eq × n_x`
    pub gx: CsMat<f64>,
    /// ∂H/∂x, `n_ineq × n_x`
    pub hx: CsMat<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecondOrder {
    /// ∇²f
    pub fxx: CsMat<f64>,
    /// ∇²(λᵗG) for the λ passed to `evaluate`
    pub gxx: CsMat<f64>,
    /// ∇²(μᵗH) for the μ passed to `evaluate`
    pub hxx: CsMat<f64>,
}

/// One evaluation of the program at a given iterate. Never mutated by the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub f: f64,
    pub g: Vec<f64>,
    pub h: Vec<f64>,
    pub first: Option<FirstOrder>,
    pub second: Option<SecondOrder>,
}

impl Evaluation {
    pub fn first_order(&self) -> Result<&FirstOrder, IpsError> {
        self.first
            .as_ref()
            .ok_or(IpsError::MissingDerivatives("first-order"))
    }

    pub fn second_order(&self) -> Result<&SecondOrder, IpsError> {
        self.second
            .as_ref()
            .ok_or(IpsError::MissingDerivatives("second-order"))
    }

    /// Check every returned block against the declared dimensions.
    pub fn check(&self, dims: ProblemDimensions, level: DerivativeLevel) -> Result<(), IpsError> {
        check_len("G", self.g.len(), dims.n_eq)?;
        check_len("H", self.h.len(), dims.n_ineq)?;

        if level.wants_first() {
            let first = self.first_order()?;
            check_len("fx", first.fx.len(), dims.n_x)?;
            check_shape("Gx", first.gx.shape(), (dims.n_eq, dims.n_x))?;
            check_shape("Hx", first.hx.shape(), (dims.n_ineq, dims.n_x))?;
        }
        if level.wants_second() {
            let second = self.second_order()?;
            let square = (dims.n_x, dims.n_x);
            check_shape("fxx", second.fxx.shape(), square)?;
            check_shape("Gxx", second.gxx.shape(), square)?;
            check_shape("Hxx", second.hxx.shape(), square)?;
        }
        Ok(())
    }

    /// True when values and every returned derivative block are free of NaN and Inf.
    pub fn is_finite(&self) -> bool {
        let blocks_finite = |blocks: &[&CsMat<f64>]| {
            blocks
                .iter()
                .all(|m| m.data().iter().all(|v| v.is_finite()))
        };
        self.f.is_finite()
            && all_finite(&self.g)
            && all_finite(&self.h)
            && self.first.as_ref().map_or(true, |d| {
                all_finite(&d.fx) && blocks_finite(&[&d.gx, &d.hx])
            })
            && self
                .second
                .as_ref()
                .map_or(true, |d| blocks_finite(&[&d.fxx, &d.gxx, &d.hxx]))
    }
}

fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}

fn check_len(what: &'static str, actual: usize, expected: usize) -> Result<(), IpsError> {
    if actual == expected {
        return Ok(());
    }
    Err(IpsError::DimensionMismatch {
        what,
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

fn check_shape(
    what: &'static str,
    actual: (usize, usize),
    expected: (usize, usize),
) -> Result<(), IpsError> {
    if actual == expected {
        return Ok(());
    }
    Err(IpsError::DimensionMismatch {
        what,
        expected: format!("{}x{}", expected.0, expected.1),
        actual: format!("{}x{}", actual.0, actual.1),
    })
}

/// A smooth nonlinear program the interior-point solver can work on.
///
/// # Contract
///
/// `evaluate` must be a pure function of `(x, mu, lam, level)`: two calls with
/// identical arguments return bit-identical evaluations. Implementations must
/// not cache state between calls. `mu` and `lam` only weight the constraint
/// Hessians `Gxx` and `Hxx`.
pub trait NonlinearProblem {
    fn dimensions(&self) -> ProblemDimensions;

    fn evaluate(&self, x: &[f64], mu: &[f64], lam: &[f64], level: DerivativeLevel) -> Evaluation;
}

impl<P: NonlinearProblem + ?Sized> NonlinearProblem for &P {
    fn dimensions(&self) -> ProblemDimensions {
        (**self).dimensions()
    }

    fn evaluate(&self, x: &[f64], mu: &[f64], lam: &[f64], level: DerivativeLevel) -> Evaluation {
        (**self).evaluate(x, mu, lam, level)
    }
}
