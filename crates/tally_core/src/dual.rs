use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// Dual number for forward-mode automatic differentiation.
///
/// `re` is the value, `dx` the derivative with respect to whichever input
/// was seeded with `dx = 1`. Running the expression VM on `Dual` inputs
/// therefore yields one partial derivative per pass.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub re: f64,
    pub dx: f64,
}

impl Dual {
    pub fn new(re: f64, dx: f64) -> Self {
        Self { re, dx }
    }

    /// A value with zero derivative (parameters, literals, unseeded inputs).
    pub fn constant(re: f64) -> Self {
        Self { re, dx: 0.0 }
    }

    /// The input being differentiated against (`dx = 1`).
    pub fn seeded(re: f64) -> Self {
        Self { re, dx: 1.0 }
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.dx + rhs.dx)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.dx - rhs.dx)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.re * rhs.re, self.re * rhs.dx + self.dx * rhs.re)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Self::new(
            self.re / rhs.re,
            (self.dx * rhs.re - self.re * rhs.dx) / (rhs.re * rhs.re),
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.re, -self.dx)
    }
}

impl Rem for Dual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // Piecewise translation of self; the slope is unchanged away
        // from the discontinuities.
        Self::new(self.re % rhs.re, self.dx)
    }
}

impl AddAssign for Dual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl SubAssign for Dual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl MulAssign for Dual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
impl DivAssign for Dual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}
impl RemAssign for Dual {
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.re == 0.0 && self.dx == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Num for Dual {
    type FromStrRadixErr = num_traits::ParseFloatError;
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(str, radix).map(Self::constant)
    }
}

impl ToPrimitive for Dual {
    fn to_i64(&self) -> Option<i64> {
        self.re.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.re.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.re)
    }
}

impl FromPrimitive for Dual {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_u64(n: u64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::constant(n))
    }
}

impl NumCast for Dual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
}

impl Float for Dual {
    fn nan() -> Self {
        Self::constant(f64::NAN)
    }
    fn infinity() -> Self {
        Self::constant(f64::INFINITY)
    }
    fn neg_infinity() -> Self {
        Self::constant(f64::NEG_INFINITY)
    }
    fn neg_zero() -> Self {
        Self::constant(-0.0)
    }
    fn min_value() -> Self {
        Self::constant(f64::MIN)
    }
    fn min_positive_value() -> Self {
        Self::constant(f64::MIN_POSITIVE)
    }
    fn max_value() -> Self {
        Self::constant(f64::MAX)
    }

    fn is_nan(self) -> bool {
        self.re.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.re.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.re.is_finite()
    }
    fn is_normal(self) -> bool {
        self.re.is_normal()
    }
    fn classify(self) -> std::num::FpCategory {
        self.re.classify()
    }

    // Step functions: flat almost everywhere.
    fn floor(self) -> Self {
        Self::constant(self.re.floor())
    }
    fn ceil(self) -> Self {
        Self::constant(self.re.ceil())
    }
    fn round(self) -> Self {
        Self::constant(self.re.round())
    }
    fn trunc(self) -> Self {
        Self::constant(self.re.trunc())
    }
    fn fract(self) -> Self {
        Self::new(self.re.fract(), self.dx)
    }
    fn signum(self) -> Self {
        Self::constant(self.re.signum())
    }

    fn abs(self) -> Self {
        if self.re < 0.0 {
            -self
        } else {
            self
        }
    }
    fn abs_sub(self, other: Self) -> Self {
        if self.re > other.re {
            self - other
        } else {
            Self::constant(0.0)
        }
    }
    fn is_sign_positive(self) -> bool {
        self.re.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.re.is_sign_negative()
    }

    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        Self::new(self.re.recip(), -self.dx / (self.re * self.re))
    }

    fn powi(self, n: i32) -> Self {
        Self::new(
            self.re.powi(n),
            <f64 as From<i32>>::from(n) * self.re.powi(n - 1) * self.dx,
        )
    }
    fn powf(self, n: Self) -> Self {
        let value = self.re.powf(n.re);
        // Constant exponents take the plain power rule; the general
        // d(x^y) = x^y (y' ln x + y x'/x) needs ln x and a nonzero base.
        let dx = if n.dx == 0.0 {
            n.re * self.re.powf(n.re - 1.0) * self.dx
        } else {
            value * (n.dx * self.re.ln() + n.re * self.dx / self.re)
        };
        Self::new(value, dx)
    }
    fn sqrt(self) -> Self {
        let root = self.re.sqrt();
        Self::new(root, self.dx / (2.0 * root))
    }
    fn cbrt(self) -> Self {
        let root = self.re.cbrt();
        Self::new(root, self.dx / (3.0 * root * root))
    }
    fn hypot(self, other: Self) -> Self {
        let h = self.re.hypot(other.re);
        Self::new(h, (self.re * self.dx + other.re * other.dx) / h)
    }

    fn exp(self) -> Self {
        let value = self.re.exp();
        Self::new(value, value * self.dx)
    }
    fn exp2(self) -> Self {
        let value = self.re.exp2();
        Self::new(value, value * std::f64::consts::LN_2 * self.dx)
    }
    fn exp_m1(self) -> Self {
        Self::new(self.re.exp_m1(), self.re.exp() * self.dx)
    }
    fn ln(self) -> Self {
        Self::new(self.re.ln(), self.dx / self.re)
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        Self::new(self.re.log2(), self.dx / (self.re * std::f64::consts::LN_2))
    }
    fn log10(self) -> Self {
        Self::new(
            self.re.log10(),
            self.dx / (self.re * std::f64::consts::LN_10),
        )
    }
    fn ln_1p(self) -> Self {
        Self::new(self.re.ln_1p(), self.dx / (1.0 + self.re))
    }

    fn sin(self) -> Self {
        Self::new(self.re.sin(), self.re.cos() * self.dx)
    }
    fn cos(self) -> Self {
        Self::new(self.re.cos(), -self.re.sin() * self.dx)
    }
    fn tan(self) -> Self {
        let t = self.re.tan();
        Self::new(t, (1.0 + t * t) * self.dx)
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }
    fn asin(self) -> Self {
        Self::new(self.re.asin(), self.dx / (1.0 - self.re * self.re).sqrt())
    }
    fn acos(self) -> Self {
        Self::new(self.re.acos(), -self.dx / (1.0 - self.re * self.re).sqrt())
    }
    fn atan(self) -> Self {
        Self::new(self.re.atan(), self.dx / (1.0 + self.re * self.re))
    }
    fn atan2(self, other: Self) -> Self {
        let denom = self.re * self.re + other.re * other.re;
        Self::new(
            self.re.atan2(other.re),
            (self.dx * other.re - self.re * other.dx) / denom,
        )
    }

    fn sinh(self) -> Self {
        Self::new(self.re.sinh(), self.re.cosh() * self.dx)
    }
    fn cosh(self) -> Self {
        Self::new(self.re.cosh(), self.re.sinh() * self.dx)
    }
    fn tanh(self) -> Self {
        let t = self.re.tanh();
        Self::new(t, (1.0 - t * t) * self.dx)
    }
    fn asinh(self) -> Self {
        Self::new(self.re.asinh(), self.dx / (self.re * self.re + 1.0).sqrt())
    }
    fn acosh(self) -> Self {
        Self::new(self.re.acosh(), self.dx / (self.re * self.re - 1.0).sqrt())
    }
    fn atanh(self) -> Self {
        Self::new(self.re.atanh(), self.dx / (1.0 - self.re * self.re))
    }

    fn max(self, other: Self) -> Self {
        if self.re >= other.re {
            self
        } else {
            other
        }
    }
    fn min(self, other: Self) -> Self {
        if self.re <= other.re {
            self
        } else {
            other
        }
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.re.integer_decode()
    }
}

#[cfg(test)]
mod tests {
    use super::Dual;
    use num_traits::Float;

    fn assert_close(found: f64, expected: f64) {
        assert!(
            (found - expected).abs() <= 1e-12 * expected.abs().max(1.0),
            "expected {expected}, got {found}"
        );
    }

    #[test]
    fn product_rule() {
        // d/dx (x * sin x) = sin x + x cos x at x = 0.7
        let x = Dual::seeded(0.7);
        let y = x * x.sin();
        assert_close(y.re, 0.7 * 0.7f64.sin());
        assert_close(y.dx, 0.7f64.sin() + 0.7 * 0.7f64.cos());
    }

    #[test]
    fn quotient_rule() {
        // d/dx (1 / x) = -1 / x^2 at x = 2
        let y = Dual::constant(1.0) / Dual::seeded(2.0);
        assert_close(y.re, 0.5);
        assert_close(y.dx, -0.25);
    }

    #[test]
    fn integer_power() {
        let y = Dual::seeded(3.0).powi(4);
        assert_close(y.re, 81.0);
        assert_close(y.dx, 4.0 * 27.0);
    }

    #[test]
    fn general_power() {
        // d/dx x^2.5 = 2.5 x^1.5 at x = 4
        let y = Dual::seeded(4.0).powf(Dual::constant(2.5));
        assert_close(y.re, 32.0);
        assert_close(y.dx, 2.5 * 8.0);
    }

    #[test]
    fn constant_power_of_a_negative_base() {
        // The log form of the power derivative would give NaN here.
        let y = Dual::seeded(-0.5).powf(Dual::constant(2.0));
        assert_close(y.re, 0.25);
        assert_close(y.dx, -1.0);
    }

    #[test]
    fn chain_through_exp_and_log() {
        // d/dx exp(ln x) = 1
        let y = Dual::seeded(1.3).ln().exp();
        assert_close(y.re, 1.3);
        assert_close(y.dx, 1.0);
    }

    #[test]
    fn min_max_pick_the_argument_derivative() {
        let a = Dual::new(1.0, 10.0);
        let b = Dual::new(2.0, 20.0);
        assert_close(a.min(b).dx, 10.0);
        assert_close(a.max(b).dx, 20.0);
    }

    #[test]
    fn abs_flips_slope_on_negative_side() {
        let y = Dual::new(-3.0, 1.0).abs();
        assert_close(y.re, 3.0);
        assert_close(y.dx, -1.0);
    }
}
