//! The boundary to the host's unit system.
//!
//! The engine never interprets unit dimensions itself: a [`UnitType`] is an
//! opaque handle into a table owned by the host, and all dimensional
//! arithmetic goes through a [`UnitProvider`]. Operators only ever ask two
//! questions: "are these the same dimension?" (identity comparison on the
//! handle) and "what does multiplying/dividing these dimensions yield?"
//! (a provider lookup that may fail when no such dimension is registered).

/// Identifier of a unit dimension in the host's unit table.
///
/// Id `0` is reserved for the dimensionless dimension; every provider must
/// honor that convention.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct UnitType(pub u32);

impl UnitType {
    pub const DIMENSIONLESS: UnitType = UnitType(0);

    #[inline(always)]
    pub fn is_dimensionless(self) -> bool {
        self == Self::DIMENSIONLESS
    }
}

impl Default for UnitType {
    fn default() -> Self {
        Self::DIMENSIONLESS
    }
}

/// Result of resolving a unit name: the dimension it belongs to and the
/// factor that converts a value written in that unit into the dimension's
/// base unit (e.g. `km` resolves to the length dimension with scale 1000).
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ResolvedUnit {
    pub scale: f64,
    pub unit: UnitType,
}

pub trait UnitProvider: Send + Sync {
    /// Looks up a unit name as written in source (`m`, `km/h`, ...).
    fn resolve(&self, name: &str) -> Option<ResolvedUnit>;

    /// Dimension of the product of two dimensions, if registered.
    fn multiply(&self, lhs: UnitType, rhs: UnitType) -> Option<UnitType>;

    /// Dimension of the quotient of two dimensions, if registered.
    fn divide(&self, numerator: UnitType, denominator: UnitType) -> Option<UnitType>;

    /// The host's angle dimension, if it has one. Trig accepts it alongside
    /// dimensionless operands, and inverse trig produces it.
    fn angle_unit(&self) -> Option<UnitType> {
        None
    }

    /// Whether `unit` is the host's angle dimension.
    fn is_angle(&self, unit: UnitType) -> bool {
        self.angle_unit() == Some(unit)
    }

    /// Human-readable dimension name for diagnostics.
    fn describe(&self, unit: UnitType) -> String {
        if unit.is_dimensionless() {
            "dimensionless".to_string()
        } else {
            format!("unit#{}", unit.0)
        }
    }
}

/// Provider for hosts without physical units: no names resolve, and only
/// dimensionless values can be combined.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unitless;

impl UnitProvider for Unitless {
    fn resolve(&self, _name: &str) -> Option<ResolvedUnit> {
        None
    }

    fn multiply(&self, lhs: UnitType, rhs: UnitType) -> Option<UnitType> {
        (lhs.is_dimensionless() && rhs.is_dimensionless()).then_some(UnitType::DIMENSIONLESS)
    }

    fn divide(&self, numerator: UnitType, denominator: UnitType) -> Option<UnitType> {
        (numerator.is_dimensionless() && denominator.is_dimensionless())
            .then_some(UnitType::DIMENSIONLESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensionless_convention() {
        assert!(UnitType::DIMENSIONLESS.is_dimensionless());
        assert!(!UnitType(3).is_dimensionless());
        assert_eq!(UnitType::default(), UnitType::DIMENSIONLESS);
    }

    #[test]
    fn test_unitless_provider() {
        let units = Unitless;
        assert_eq!(units.resolve("m"), None);
        assert_eq!(
            units.multiply(UnitType::DIMENSIONLESS, UnitType::DIMENSIONLESS),
            Some(UnitType::DIMENSIONLESS)
        );
        assert_eq!(units.multiply(UnitType(1), UnitType::DIMENSIONLESS), None);
        assert_eq!(units.divide(UnitType::DIMENSIONLESS, UnitType(2)), None);
        assert_eq!(units.describe(UnitType::DIMENSIONLESS), "dimensionless");
        assert_eq!(units.describe(UnitType(4)), "unit#4");
    }
}
