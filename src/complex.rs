use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use num_complex::Complex64;
use num_traits::Zero;

use crate::error::Result;
use crate::uncertain::{CorrelationContext, UncertainReal};

/// An uncertain complex number, held as a pair of uncertain real parts
///
/// The correlation between the parts is not stored: it follows from the components the two parts
/// share, or from a correlation declared between them when the value was created.
#[derive(Clone, Debug)]
pub struct UncertainComplex {
    re: UncertainReal,
    im: UncertainReal,
    label: Option<String>,
}

impl CorrelationContext {
    /// Create an elementary uncertain complex number with independent real and imaginary parts
    ///
    /// # Errors
    /// Fails if either uncertainty or `df` is invalid, as for [`CorrelationContext::ureal`].
    pub fn ucomplex(
        &self,
        z: Complex64,
        u: [f64; 2],
        df: f64,
        label: impl Into<String>,
    ) -> Result<UncertainComplex> {
        let label = label.into();
        let re = self.ureal(z.re, u[0], df, format!("{label}_re"))?;
        let im = self.ureal(z.im, u[1], df, format!("{label}_im"))?;
        Ok(UncertainComplex::new(re, im).with_label(label))
    }

    /// Create an elementary uncertain complex number whose parts are correlated with coefficient `r`
    ///
    /// # Errors
    /// Fails on an invalid uncertainty or `df`, or if `r` lies outside `[-1, 1]`.
    pub fn ucomplex_correlated(
        &self,
        z: Complex64,
        u: [f64; 2],
        r: f64,
        df: f64,
        label: impl Into<String>,
    ) -> Result<UncertainComplex> {
        let value = self.ucomplex(z, u, df, label)?;
        self.set_correlation(&value.re, &value.im, r)?;
        Ok(value)
    }
}

impl UncertainComplex {
    pub const fn new(re: UncertainReal, im: UncertainReal) -> Self {
        Self {
            re,
            im,
            label: None,
        }
    }

    pub const fn constant(z: Complex64) -> Self {
        Self::new(UncertainReal::constant(z.re), UncertainReal::constant(z.im))
    }

    pub fn value(&self) -> Complex64 {
        Complex64::new(self.re.x(), self.im.x())
    }

    pub const fn real(&self) -> &UncertainReal {
        &self.re
    }

    pub const fn imag(&self) -> &UncertainReal {
        &self.im
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Standard uncertainties of the real and imaginary parts
    pub fn u(&self) -> [f64; 2] {
        [self.re.u(), self.im.u()]
    }

    /// Correlation coefficient between the real and imaginary parts
    pub fn r(&self) -> f64 {
        self.re.correlation(&self.im)
    }

    /// Degrees of freedom, taken as the smaller of the two parts
    pub fn df(&self) -> f64 {
        self.re.df().min(self.im.df())
    }

    #[must_use]
    pub fn conjugate(&self) -> Self {
        Self::new(self.re.clone(), -&self.im)
    }

    /// The modulus $|z|$
    ///
    /// At the origin the sensitivities are undefined and an exact zero is returned.
    pub fn magnitude(&self) -> UncertainReal {
        let m = self.re.x().hypot(self.im.x());
        if m == 0.0 {
            return UncertainReal::constant(0.0);
        }
        UncertainReal::linear(&self.re, self.re.x() / m, &self.im, self.im.x() / m, m)
    }

    /// The argument of $z$ in radians
    ///
    /// $$
    ///     \frac{\partial \phi}{\partial x} = -\frac{y}{|z|^2}, \quad
    ///     \frac{\partial \phi}{\partial y} = \frac{x}{|z|^2}
    /// $$
    pub fn phase(&self) -> UncertainReal {
        let (x, y) = (self.re.x(), self.im.x());
        let m2 = x.mul_add(x, y * y);
        if m2 == 0.0 {
            return UncertainReal::constant(0.0);
        }
        UncertainReal::linear(&self.re, -y / m2, &self.im, x / m2, y.atan2(x))
    }
}

impl fmt::Display for UncertainComplex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label}: ")?;
        }
        let [u_re, u_im] = self.u();
        write!(
            f,
            "({} ({u_re}), {} ({u_im})j, df = {})",
            self.re.x(),
            self.im.x(),
            self.df()
        )
    }
}

impl From<UncertainReal> for UncertainComplex {
    fn from(re: UncertainReal) -> Self {
        Self::new(re, UncertainReal::constant(0.0))
    }
}

impl From<Complex64> for UncertainComplex {
    fn from(z: Complex64) -> Self {
        Self::constant(z)
    }
}

impl<'a, 'b> Add<&'b UncertainComplex> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn add(self, rhs: &'b UncertainComplex) -> UncertainComplex {
        UncertainComplex::new(&self.re + &rhs.re, &self.im + &rhs.im)
    }
}

impl<'a, 'b> Sub<&'b UncertainComplex> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn sub(self, rhs: &'b UncertainComplex) -> UncertainComplex {
        UncertainComplex::new(&self.re - &rhs.re, &self.im - &rhs.im)
    }
}

impl<'a, 'b> Mul<&'b UncertainComplex> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn mul(self, rhs: &'b UncertainComplex) -> UncertainComplex {
        let re = &(&self.re * &rhs.re) - &(&self.im * &rhs.im);
        let im = &(&self.re * &rhs.im) + &(&self.im * &rhs.re);
        UncertainComplex::new(re, im)
    }
}

impl<'a, 'b> Div<&'b UncertainComplex> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn div(self, rhs: &'b UncertainComplex) -> UncertainComplex {
        let denominator = &(&rhs.re * &rhs.re) + &(&rhs.im * &rhs.im);
        let re = &(&self.re * &rhs.re) + &(&self.im * &rhs.im);
        let im = &(&self.im * &rhs.re) - &(&self.re * &rhs.im);
        UncertainComplex::new(&re / &denominator, &im / &denominator)
    }
}

forward_ref_binop!(Add, add, UncertainComplex, UncertainComplex, UncertainComplex);
forward_ref_binop!(Sub, sub, UncertainComplex, UncertainComplex, UncertainComplex);
forward_ref_binop!(Mul, mul, UncertainComplex, UncertainComplex, UncertainComplex);
forward_ref_binop!(Div, div, UncertainComplex, UncertainComplex, UncertainComplex);

impl<'a, 'b> Add<&'b UncertainReal> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn add(self, rhs: &'b UncertainReal) -> UncertainComplex {
        UncertainComplex::new(&self.re + rhs, self.im.clone())
    }
}

impl<'a, 'b> Sub<&'b UncertainReal> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn sub(self, rhs: &'b UncertainReal) -> UncertainComplex {
        UncertainComplex::new(&self.re - rhs, self.im.clone())
    }
}

impl<'a, 'b> Mul<&'b UncertainReal> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn mul(self, rhs: &'b UncertainReal) -> UncertainComplex {
        UncertainComplex::new(&self.re * rhs, &self.im * rhs)
    }
}

impl<'a, 'b> Div<&'b UncertainReal> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn div(self, rhs: &'b UncertainReal) -> UncertainComplex {
        UncertainComplex::new(&self.re / rhs, &self.im / rhs)
    }
}

forward_ref_binop!(Add, add, UncertainComplex, UncertainReal, UncertainComplex);
forward_ref_binop!(Sub, sub, UncertainComplex, UncertainReal, UncertainComplex);
forward_ref_binop!(Mul, mul, UncertainComplex, UncertainReal, UncertainComplex);
forward_ref_binop!(Div, div, UncertainComplex, UncertainReal, UncertainComplex);

impl<'a, 'b> Add<&'b UncertainComplex> for &'a UncertainReal {
    type Output = UncertainComplex;

    fn add(self, rhs: &'b UncertainComplex) -> UncertainComplex {
        rhs + self
    }
}

impl<'a, 'b> Sub<&'b UncertainComplex> for &'a UncertainReal {
    type Output = UncertainComplex;

    fn sub(self, rhs: &'b UncertainComplex) -> UncertainComplex {
        UncertainComplex::new(self - &rhs.re, -&rhs.im)
    }
}

impl<'a, 'b> Mul<&'b UncertainComplex> for &'a UncertainReal {
    type Output = UncertainComplex;

    fn mul(self, rhs: &'b UncertainComplex) -> UncertainComplex {
        rhs * self
    }
}

impl<'a, 'b> Div<&'b UncertainComplex> for &'a UncertainReal {
    type Output = UncertainComplex;

    fn div(self, rhs: &'b UncertainComplex) -> UncertainComplex {
        &UncertainComplex::from(self.clone()) / rhs
    }
}

forward_ref_binop!(Add, add, UncertainReal, UncertainComplex, UncertainComplex);
forward_ref_binop!(Sub, sub, UncertainReal, UncertainComplex, UncertainComplex);
forward_ref_binop!(Mul, mul, UncertainReal, UncertainComplex, UncertainComplex);
forward_ref_binop!(Div, div, UncertainReal, UncertainComplex, UncertainComplex);

impl<'a> Add<Complex64> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn add(self, rhs: Complex64) -> UncertainComplex {
        UncertainComplex::new(&self.re + rhs.re, &self.im + rhs.im)
    }
}

impl<'a> Sub<Complex64> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn sub(self, rhs: Complex64) -> UncertainComplex {
        UncertainComplex::new(&self.re - rhs.re, &self.im - rhs.im)
    }
}

impl<'a> Mul<Complex64> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn mul(self, rhs: Complex64) -> UncertainComplex {
        let (x, y) = (self.re.x(), self.im.x());
        let re = UncertainReal::linear(&self.re, rhs.re, &self.im, -rhs.im, x * rhs.re - y * rhs.im);
        let im = UncertainReal::linear(&self.re, rhs.im, &self.im, rhs.re, x * rhs.im + y * rhs.re);
        UncertainComplex::new(re, im)
    }
}

impl<'a> Div<Complex64> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn div(self, rhs: Complex64) -> UncertainComplex {
        self * rhs.inv()
    }
}

forward_const_binop!(Add, add, UncertainComplex, Complex64, UncertainComplex);
forward_const_binop!(Sub, sub, UncertainComplex, Complex64, UncertainComplex);
forward_const_binop!(Mul, mul, UncertainComplex, Complex64, UncertainComplex);
forward_const_binop!(Div, div, UncertainComplex, Complex64, UncertainComplex);

impl<'a> Add<&'a UncertainComplex> for Complex64 {
    type Output = UncertainComplex;

    fn add(self, rhs: &'a UncertainComplex) -> UncertainComplex {
        rhs + self
    }
}

impl<'a> Sub<&'a UncertainComplex> for Complex64 {
    type Output = UncertainComplex;

    fn sub(self, rhs: &'a UncertainComplex) -> UncertainComplex {
        UncertainComplex::new(self.re - &rhs.re, self.im - &rhs.im)
    }
}

impl<'a> Mul<&'a UncertainComplex> for Complex64 {
    type Output = UncertainComplex;

    fn mul(self, rhs: &'a UncertainComplex) -> UncertainComplex {
        rhs * self
    }
}

impl<'a> Div<&'a UncertainComplex> for Complex64 {
    type Output = UncertainComplex;

    fn div(self, rhs: &'a UncertainComplex) -> UncertainComplex {
        &UncertainComplex::constant(self) / rhs
    }
}

forward_const_lhs_binop!(Add, add, Complex64, UncertainComplex, UncertainComplex);
forward_const_lhs_binop!(Sub, sub, Complex64, UncertainComplex, UncertainComplex);
forward_const_lhs_binop!(Mul, mul, Complex64, UncertainComplex, UncertainComplex);
forward_const_lhs_binop!(Div, div, Complex64, UncertainComplex, UncertainComplex);

impl<'a> Add<f64> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn add(self, rhs: f64) -> UncertainComplex {
        UncertainComplex::new(&self.re + rhs, self.im.clone())
    }
}

impl<'a> Sub<f64> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn sub(self, rhs: f64) -> UncertainComplex {
        UncertainComplex::new(&self.re - rhs, self.im.clone())
    }
}

impl<'a> Mul<f64> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn mul(self, rhs: f64) -> UncertainComplex {
        UncertainComplex::new(&self.re * rhs, &self.im * rhs)
    }
}

impl<'a> Div<f64> for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn div(self, rhs: f64) -> UncertainComplex {
        UncertainComplex::new(&self.re / rhs, &self.im / rhs)
    }
}

forward_const_binop!(Add, add, UncertainComplex, f64, UncertainComplex);
forward_const_binop!(Sub, sub, UncertainComplex, f64, UncertainComplex);
forward_const_binop!(Mul, mul, UncertainComplex, f64, UncertainComplex);
forward_const_binop!(Div, div, UncertainComplex, f64, UncertainComplex);

impl<'a> Add<&'a UncertainComplex> for f64 {
    type Output = UncertainComplex;

    fn add(self, rhs: &'a UncertainComplex) -> UncertainComplex {
        rhs + self
    }
}

impl<'a> Sub<&'a UncertainComplex> for f64 {
    type Output = UncertainComplex;

    fn sub(self, rhs: &'a UncertainComplex) -> UncertainComplex {
        UncertainComplex::new(self - &rhs.re, -&rhs.im)
    }
}

impl<'a> Mul<&'a UncertainComplex> for f64 {
    type Output = UncertainComplex;

    fn mul(self, rhs: &'a UncertainComplex) -> UncertainComplex {
        rhs * self
    }
}

impl<'a> Div<&'a UncertainComplex> for f64 {
    type Output = UncertainComplex;

    fn div(self, rhs: &'a UncertainComplex) -> UncertainComplex {
        Complex64::new(self, 0.0) / rhs
    }
}

forward_const_lhs_binop!(Add, add, f64, UncertainComplex, UncertainComplex);
forward_const_lhs_binop!(Sub, sub, f64, UncertainComplex, UncertainComplex);
forward_const_lhs_binop!(Mul, mul, f64, UncertainComplex, UncertainComplex);
forward_const_lhs_binop!(Div, div, f64, UncertainComplex, UncertainComplex);

impl<'a> Neg for &'a UncertainComplex {
    type Output = UncertainComplex;

    fn neg(self) -> UncertainComplex {
        UncertainComplex::new(-&self.re, -&self.im)
    }
}

impl Neg for UncertainComplex {
    type Output = Self;

    fn neg(self) -> Self {
        -&self
    }
}

impl Zero for UncertainComplex {
    fn zero() -> Self {
        Self::constant(Complex64::zero())
    }

    fn is_zero(&self) -> bool {
        self.re.is_zero() && self.im.is_zero()
    }
}

impl std::iter::Sum for UncertainComplex {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, z| acc + z)
    }
}

impl<'a> std::iter::Sum<&'a UncertainComplex> for UncertainComplex {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, z| acc + z)
    }
}
