//! # Fractions
//!
//! Exact rational numbers for musical time. Every position and duration in the
//! pipeline is a [`Frac`] counted in quarter notes; floats only appear at the
//! final millisecond conversion.
//!
//! `Frac` wraps [`fraction::Fraction`], which already keeps values reduced with
//! the sign outside the ratio. On top of it `Frac` adds a total order (so it can
//! key maps and be sorted), the `0/0` indeterminate and `n/0` infinite
//! sentinels addressed with signed integers, and `"x/y"` display/serialization.
//!
//! Arithmetic between finite values is exact and checked: when a result
//! does not fit `i64` parts it becomes indeterminate instead of panicking.
//!
//! ## Example
//! ```rust
//! use nmn::frac::Frac;
//!
//! let half = Frac::new(1, 2);
//! let third = Frac::new(2, 6);
//! assert_eq!((half + third).to_string(), "5/6");
//! assert!((Frac::new(0, 0) + half).is_indeterminate());
//! ```

use fraction::{Fraction, Sign};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

#[derive(Debug, Clone, Copy)]
pub struct Frac(Fraction);

impl Frac {
    /// Build `x/y`. `0/0` is indeterminate, `n/0` is infinite with the sign of `n`.
    pub fn new(x: i64, y: i64) -> Self {
        let negative = (x < 0) != (y < 0) && x != 0;
        let (n, d) = (x.unsigned_abs(), y.unsigned_abs());
        if d == 0 {
            return match x.signum() {
                0 => Frac(Fraction::nan()),
                1 => Frac(Fraction::infinity()),
                _ => Frac(Fraction::neg_infinity()),
            };
        }
        if negative {
            Frac(Fraction::new_neg(n, d))
        } else {
            Frac(Fraction::new(n, d))
        }
    }

    pub fn from_int(x: i64) -> Self {
        Frac::new(x, 1)
    }

    pub fn zero() -> Self {
        Frac::new(0, 1)
    }

    pub fn one() -> Self {
        Frac::new(1, 1)
    }

    pub fn nan() -> Self {
        Frac(Fraction::nan())
    }

    /// `n/d` from wide parts, indeterminate when it does not fit.
    fn from_wide(n: Option<i128>, d: Option<i128>) -> Self {
        let (Some(n), Some(d)) = (n, d) else {
            return Frac::nan();
        };
        if d == 0 {
            return Frac::new(n.signum() as i64, 0);
        }
        let g = gcd(n.unsigned_abs(), d.unsigned_abs()) as i128;
        let (n, d) = if d < 0 { (-n / g, -d / g) } else { (n / g, d / g) };
        match (i64::try_from(n), i64::try_from(d)) {
            (Ok(n), Ok(d)) if n != i64::MIN => Frac::new(n, d),
            _ => Frac::nan(),
        }
    }

    fn wide(&self) -> (i128, i128) {
        (i128::from(self.numer()), i128::from(self.denom()))
    }

    fn both_finite(&self, other: &Self) -> bool {
        self.is_finite() && other.is_finite()
    }

    /// Numerator with the sign applied. `0` for indeterminate.
    pub fn numer(&self) -> i64 {
        match (self.0.sign(), self.0.numer()) {
            (Some(Sign::Minus), Some(n)) => (-i128::from(*n)) as i64,
            (Some(Sign::Plus), Some(n)) => *n as i64,
            (Some(Sign::Minus), None) => -1,
            (Some(Sign::Plus), None) => 1,
            (None, _) => 0,
        }
    }

    /// Denominator, always positive for finite values and `0` for sentinels.
    pub fn denom(&self) -> i64 {
        if self.0.is_nan() || self.0.is_infinite() {
            return 0;
        }
        self.0.denom().map(|d| *d as i64).unwrap_or(0)
    }

    pub fn is_indeterminate(&self) -> bool {
        self.0.is_nan()
    }

    pub fn is_infinite(&self) -> bool {
        self.0.is_infinite()
    }

    pub fn is_finite(&self) -> bool {
        !self.is_indeterminate() && !self.is_infinite()
    }

    pub fn is_zero(&self) -> bool {
        self.is_finite() && self.numer() == 0
    }

    pub fn is_negative(&self) -> bool {
        self.numer() < 0
    }

    pub fn to_f64(&self) -> f64 {
        if self.is_indeterminate() {
            return f64::NAN;
        }
        match self.denom() {
            0 => self.numer() as f64 * f64::INFINITY,
            d => self.numer() as f64 / d as f64,
        }
    }

    /// Largest integer not greater than the value. Sentinels floor to `0`.
    pub fn floor(&self) -> i64 {
        if !self.is_finite() {
            return 0;
        }
        self.numer().div_euclid(self.denom())
    }

    pub fn abs(&self) -> Self {
        if self.is_negative() {
            -*self
        } else {
            *self
        }
    }

    /// Parse `"x"` or `"x/y"` with integer parts.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match text.split_once('/') {
            Some((x, y)) => Some(Frac::new(x.trim().parse().ok()?, y.trim().parse().ok()?)),
            None => Some(Frac::from_int(text.parse().ok()?)),
        }
    }

    /// Total order where indeterminate equals itself and sorts first.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self.is_indeterminate(), other.is_indeterminate()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal),
        }
    }
}

impl Default for Frac {
    fn default() -> Self {
        Frac::zero()
    }
}

impl PartialEq for Frac {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Frac {}

impl PartialOrd for Frac {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frac {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

impl Add for Frac {
    type Output = Frac;
    fn add(self, rhs: Frac) -> Frac {
        if !self.both_finite(&rhs) {
            return Frac(self.0 + rhs.0);
        }
        let ((a, b), (c, d)) = (self.wide(), rhs.wide());
        let n = a.checked_mul(d).zip(c.checked_mul(b)).and_then(|(x, y)| x.checked_add(y));
        Frac::from_wide(n, b.checked_mul(d))
    }
}

impl Sub for Frac {
    type Output = Frac;
    fn sub(self, rhs: Frac) -> Frac {
        if !self.both_finite(&rhs) {
            return Frac(self.0 - rhs.0);
        }
        let ((a, b), (c, d)) = (self.wide(), rhs.wide());
        let n = a.checked_mul(d).zip(c.checked_mul(b)).and_then(|(x, y)| x.checked_sub(y));
        Frac::from_wide(n, b.checked_mul(d))
    }
}

impl Mul for Frac {
    type Output = Frac;
    fn mul(self, rhs: Frac) -> Frac {
        if !self.both_finite(&rhs) {
            return Frac(self.0 * rhs.0);
        }
        let ((a, b), (c, d)) = (self.wide(), rhs.wide());
        Frac::from_wide(a.checked_mul(c), b.checked_mul(d))
    }
}

impl Div for Frac {
    type Output = Frac;
    fn div(self, rhs: Frac) -> Frac {
        if rhs.is_zero() {
            // x/0 keeps the same sentinel rules as construction
            return Frac::new(self.numer().signum(), 0);
        }
        if !self.both_finite(&rhs) {
            return Frac(self.0 / rhs.0);
        }
        let ((a, b), (c, d)) = (self.wide(), rhs.wide());
        Frac::from_wide(a.checked_mul(d), b.checked_mul(c))
    }
}

impl Neg for Frac {
    type Output = Frac;
    fn neg(self) -> Frac {
        Frac(-self.0)
    }
}

impl AddAssign for Frac {
    fn add_assign(&mut self, rhs: Frac) {
        *self = *self + rhs;
    }
}

impl SubAssign for Frac {
    fn sub_assign(&mut self, rhs: Frac) {
        *self = *self - rhs;
    }
}

impl std::iter::Sum for Frac {
    fn sum<I: Iterator<Item = Frac>>(iter: I) -> Frac {
        iter.fold(Frac::zero(), |acc, f| acc + f)
    }
}

impl From<i64> for Frac {
    fn from(x: i64) -> Self {
        Frac::from_int(x)
    }
}

impl fmt::Display for Frac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numer(), self.denom())
    }
}

impl Serialize for Frac {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
