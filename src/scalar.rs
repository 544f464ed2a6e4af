//! Inputs that may be either exact numbers or uncertain numbers.
//!
//! Correction models are often evaluated with a mix of nominal constants and measured values. The
//! variants keep exact arithmetic exact, and only promote to an uncertain number when one of the
//! operands carries uncertainty.
use std::ops::{Add, Div, Mul, Neg, Sub};

use num_complex::Complex64;

use crate::complex::UncertainComplex;
use crate::uncertain::UncertainReal;

#[derive(Clone, Debug)]
pub enum Scalar {
    Number(f64),
    Uncertain(UncertainReal),
}

impl Scalar {
    pub const fn value(&self) -> f64 {
        match self {
            Self::Number(x) => *x,
            Self::Uncertain(x) => x.x(),
        }
    }

    pub fn to_uncertain(&self) -> UncertainReal {
        match self {
            Self::Number(x) => UncertainReal::constant(*x),
            Self::Uncertain(x) => x.clone(),
        }
    }

    pub fn recip(&self) -> Self {
        match self {
            Self::Number(x) => Self::Number(x.recip()),
            Self::Uncertain(x) => Self::Uncertain(1.0 / x),
        }
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Self::Number(x)
    }
}

impl From<UncertainReal> for Scalar {
    fn from(x: UncertainReal) -> Self {
        Self::Uncertain(x)
    }
}

impl From<Scalar> for UncertainReal {
    fn from(x: Scalar) -> Self {
        match x {
            Scalar::Number(x) => Self::constant(x),
            Scalar::Uncertain(x) => x,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ComplexScalar {
    Number(Complex64),
    Uncertain(UncertainComplex),
}

impl ComplexScalar {
    pub fn value(&self) -> Complex64 {
        match self {
            Self::Number(z) => *z,
            Self::Uncertain(z) => z.value(),
        }
    }

    pub fn to_uncertain(&self) -> UncertainComplex {
        match self {
            Self::Number(z) => UncertainComplex::constant(*z),
            Self::Uncertain(z) => z.clone(),
        }
    }
}

impl From<Complex64> for ComplexScalar {
    fn from(z: Complex64) -> Self {
        Self::Number(z)
    }
}

impl From<f64> for ComplexScalar {
    fn from(x: f64) -> Self {
        Self::Number(Complex64::new(x, 0.0))
    }
}

impl From<UncertainComplex> for ComplexScalar {
    fn from(z: UncertainComplex) -> Self {
        Self::Uncertain(z)
    }
}

impl From<UncertainReal> for ComplexScalar {
    fn from(x: UncertainReal) -> Self {
        Self::Uncertain(x.into())
    }
}

impl From<Scalar> for ComplexScalar {
    fn from(x: Scalar) -> Self {
        match x {
            Scalar::Number(x) => x.into(),
            Scalar::Uncertain(x) => x.into(),
        }
    }
}

impl From<ComplexScalar> for UncertainComplex {
    fn from(z: ComplexScalar) -> Self {
        match z {
            ComplexScalar::Number(z) => Self::constant(z),
            ComplexScalar::Uncertain(z) => z,
        }
    }
}

/// Implement a binary operator over borrowed tagged unions, keeping `Number op Number` exact.
macro_rules! tagged_binop {
    ($imp:ident, $method:ident, $ty:ident) => {
        impl<'a, 'b> $imp<&'b $ty> for &'a $ty {
            type Output = $ty;

            fn $method(self, rhs: &'b $ty) -> $ty {
                match (self, rhs) {
                    ($ty::Number(a), $ty::Number(b)) => $ty::Number($imp::$method(*a, *b)),
                    ($ty::Uncertain(a), $ty::Number(b)) => $ty::Uncertain($imp::$method(a, *b)),
                    ($ty::Number(a), $ty::Uncertain(b)) => $ty::Uncertain($imp::$method(*a, b)),
                    ($ty::Uncertain(a), $ty::Uncertain(b)) => $ty::Uncertain($imp::$method(a, b)),
                }
            }
        }

        forward_ref_binop!($imp, $method, $ty, $ty, $ty);
    };
}

tagged_binop!(Add, add, Scalar);
tagged_binop!(Sub, sub, Scalar);
tagged_binop!(Mul, mul, Scalar);
tagged_binop!(Div, div, Scalar);

tagged_binop!(Add, add, ComplexScalar);
tagged_binop!(Sub, sub, ComplexScalar);
tagged_binop!(Mul, mul, ComplexScalar);
tagged_binop!(Div, div, ComplexScalar);

impl<'a> Neg for &'a Scalar {
    type Output = Scalar;

    fn neg(self) -> Scalar {
        match self {
            Scalar::Number(x) => Scalar::Number(-x),
            Scalar::Uncertain(x) => Scalar::Uncertain(-x),
        }
    }
}

impl<'a> Neg for &'a ComplexScalar {
    type Output = ComplexScalar;

    fn neg(self) -> ComplexScalar {
        match self {
            ComplexScalar::Number(z) => ComplexScalar::Number(-*z),
            ComplexScalar::Uncertain(z) => ComplexScalar::Uncertain(-z),
        }
    }
}

impl<'a, 'b> Mul<&'b Scalar> for &'a ComplexScalar {
    type Output = ComplexScalar;

    fn mul(self, rhs: &'b Scalar) -> ComplexScalar {
        self * &ComplexScalar::from(rhs.clone())
    }
}

impl<'a> Mul<f64> for &'a ComplexScalar {
    type Output = ComplexScalar;

    fn mul(self, rhs: f64) -> ComplexScalar {
        match self {
            ComplexScalar::Number(z) => ComplexScalar::Number(*z * rhs),
            ComplexScalar::Uncertain(z) => ComplexScalar::Uncertain(z * rhs),
        }
    }
}

impl<'a> Div<f64> for &'a ComplexScalar {
    type Output = ComplexScalar;

    fn div(self, rhs: f64) -> ComplexScalar {
        match self {
            ComplexScalar::Number(z) => ComplexScalar::Number(*z / rhs),
            ComplexScalar::Uncertain(z) => ComplexScalar::Uncertain(z / rhs),
        }
    }
}

forward_ref_binop!(Mul, mul, ComplexScalar, Scalar, ComplexScalar);
forward_const_binop!(Mul, mul, ComplexScalar, f64, ComplexScalar);
forward_const_binop!(Div, div, ComplexScalar, f64, ComplexScalar);

#[cfg(test)]
mod test {
    use num_complex::Complex64;

    use super::{ComplexScalar, Scalar};
    use crate::uncertain::CorrelationContext;
    use crate::Result;

    #[test]
    fn exact_operands_stay_exact() {
        let a = Scalar::from(3.0);
        let b = Scalar::from(4.0);

        let c = &a * &b + Scalar::from(1.0);

        assert!(matches!(c, Scalar::Number(x) if x == 13.0));
    }

    #[test]
    fn one_uncertain_operand_promotes_the_result() -> Result<()> {
        let ctx = CorrelationContext::new();
        let a = Scalar::from(ctx.ureal(2.0, 0.1, 5.0, "a")?);
        let b = Scalar::from(4.0);

        let c = &b / &a;

        match c {
            Scalar::Uncertain(c) => {
                approx::assert_relative_eq!(c.x(), 2.0, max_relative = 1e-12);
                approx::assert_relative_eq!(c.u(), 4.0 * 0.1 / 4.0, max_relative = 1e-12);
            }
            Scalar::Number(_) => panic!("expected an uncertain result"),
        }
        Ok(())
    }

    #[test]
    fn complex_scalars_mix_with_real_scalars() -> Result<()> {
        let ctx = CorrelationContext::new();
        let admittance = ComplexScalar::from(Complex64::new(0.0, 2.0));
        let resistance = Scalar::from(ctx.ureal(0.5, 0.01, 5.0, "r")?);

        let product = &admittance * &resistance;

        assert!(matches!(product, ComplexScalar::Uncertain(_)));
        approx::assert_relative_eq!(product.value().im, 1.0, max_relative = 1e-12);
        approx::assert_relative_eq!(
            product.to_uncertain().u()[1],
            0.02,
            max_relative = 1e-12
        );
        Ok(())
    }
}
