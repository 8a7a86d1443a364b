use core::f64;
use std::cmp::Ordering;
use std::fmt;

use crate::unit::UnitType;

/// A numeric runtime value: a scalar in the base unit of its dimension.
///
/// The dimension tag rides along with the scalar; whether two quantities may
/// be combined is decided by the operators, not here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: UnitType,
}

impl Quantity {
    pub fn new(value: f64, unit: UnitType) -> Self {
        Quantity { value, unit }
    }

    pub fn dimensionless(value: f64) -> Self {
        Quantity {
            value,
            unit: UnitType::DIMENSIONLESS,
        }
    }

    pub fn zero(unit: UnitType) -> Self {
        Quantity { value: 0.0, unit }
    }

    #[inline(always)]
    pub fn same_unit(&self, other: &Quantity) -> bool {
        self.unit == other.unit
    }

    /// Returns `true` if the value represents an integer.
    ///
    /// Uses epsilon comparison to account for floating-point precision.
    pub fn is_int(&self) -> bool {
        (self.value - self.value.trunc()).abs() < f64::EPSILON
    }

    /// Returns `true` if the value is zero or very close to zero.
    pub fn is_zero(&self) -> bool {
        self.value.abs() < f64::EPSILON
    }

    /// Same dimension, different scalar.
    pub fn with_value(&self, value: f64) -> Self {
        Quantity {
            value,
            unit: self.unit,
        }
    }

    /// Rounded value as a 1-based index candidate; `None` for NaN/infinite.
    pub fn as_index(&self) -> Option<i64> {
        self.value.is_finite().then_some(self.value.round() as i64)
    }

    /// Total order over the scalar, treating NaN as the greatest value.
    ///
    /// Used for map keys and aggregate comparisons; callers are responsible
    /// for only comparing quantities of one dimension.
    pub fn cmp_value(&self, other: &Quantity) -> Ordering {
        match (self.value.is_nan(), other.value.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self
                .value
                .partial_cmp(&other.value)
                .unwrap_or(Ordering::Less),
        }
    }
}

impl From<f64> for Quantity {
    fn from(value: f64) -> Self {
        Quantity::dimensionless(value)
    }
}

impl From<i64> for Quantity {
    fn from(value: i64) -> Self {
        Quantity::dimensionless(value as f64)
    }
}

impl From<usize> for Quantity {
    fn from(value: usize) -> Self {
        Quantity::dimensionless(value as f64)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_int() && self.value.abs() < 1e15 {
            write!(f, "{}", self.value as i64)
        } else {
            let s = format!("{:.6}", self.value);
            let s = s.trim_end_matches('0').trim_end_matches('.');
            write!(f, "{}", s)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(42.0, "42")]
    #[case(42.123, "42.123")]
    #[case(42.100, "42.1")]
    #[case(-42.0, "-42")]
    #[case(0.0, "0")]
    #[case(0.1, "0.1")]
    fn test_display_formatting(#[case] input: f64, #[case] expected: &str) {
        assert_eq!(format!("{}", Quantity::dimensionless(input)), expected);
    }

    #[rstest]
    #[case(0.0, true)]
    #[case(0.1, false)]
    #[case(-0.0, true)]
    #[case(1e-16, true)]
    fn test_is_zero(#[case] value: f64, #[case] expected: bool) {
        assert_eq!(Quantity::dimensionless(value).is_zero(), expected);
    }

    #[rstest]
    #[case(1.2, Some(1))]
    #[case(1.5, Some(2))]
    #[case(-2.5, Some(-3))]
    #[case(f64::NAN, None)]
    #[case(f64::INFINITY, None)]
    fn test_as_index(#[case] value: f64, #[case] expected: Option<i64>) {
        assert_eq!(Quantity::dimensionless(value).as_index(), expected);
    }

    #[test]
    fn test_same_unit() {
        let a = Quantity::new(1.0, UnitType(1));
        let b = Quantity::new(2.0, UnitType(1));
        let c = Quantity::new(2.0, UnitType(2));
        assert!(a.same_unit(&b));
        assert!(!a.same_unit(&c));
    }

    #[test]
    fn test_cmp_value_nan_is_greatest() {
        let nan = Quantity::dimensionless(f64::NAN);
        let one = Quantity::dimensionless(1.0);
        assert_eq!(nan.cmp_value(&one), Ordering::Greater);
        assert_eq!(one.cmp_value(&nan), Ordering::Less);
        assert_eq!(nan.cmp_value(&nan), Ordering::Equal);
    }
}
