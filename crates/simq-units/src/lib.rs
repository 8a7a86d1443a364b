//! Reference SI unit system for the simq expression engine.
//!
//! Implements [`simq_lang::UnitProvider`] with a fixed table of dimensions
//! (exponent vectors over length, mass, time, angle and temperature) and
//! named units with scale factors into each dimension's base unit.
//!
//! Composition follows the registered-dimension rule: multiplying or
//! dividing two dimensions succeeds only when the resulting exponent vector
//! is itself a registered dimension. `3[m] / 1[s]` yields the Speed
//! dimension; multiplying two Speeds fails because no such dimension is
//! registered here.

use rustc_hash::FxHashMap;
use simq_lang::{ResolvedUnit, UnitProvider, UnitType};

/// Exponents of the base dimensions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Dimensions {
    pub length: i8,
    pub mass: i8,
    pub time: i8,
    pub angle: i8,
    pub temperature: i8,
}

impl Dimensions {
    pub const DIMENSIONLESS: Dimensions = Dimensions {
        length: 0,
        mass: 0,
        time: 0,
        angle: 0,
        temperature: 0,
    };

    /// Exponent addition, `None` on overflow.
    fn multiply(self, other: Dimensions) -> Option<Dimensions> {
        Some(Dimensions {
            length: self.length.checked_add(other.length)?,
            mass: self.mass.checked_add(other.mass)?,
            time: self.time.checked_add(other.time)?,
            angle: self.angle.checked_add(other.angle)?,
            temperature: self.temperature.checked_add(other.temperature)?,
        })
    }

    /// Exponent subtraction, `None` on overflow.
    fn divide(self, other: Dimensions) -> Option<Dimensions> {
        Some(Dimensions {
            length: self.length.checked_sub(other.length)?,
            mass: self.mass.checked_sub(other.mass)?,
            time: self.time.checked_sub(other.time)?,
            angle: self.angle.checked_sub(other.angle)?,
            temperature: self.temperature.checked_sub(other.temperature)?,
        })
    }
}

const fn dims(length: i8, mass: i8, time: i8, angle: i8, temperature: i8) -> Dimensions {
    Dimensions {
        length,
        mass,
        time,
        angle,
        temperature,
    }
}

/// `(name, dimensions)`, in registration order; index is the `UnitType` id.
/// The dimensionless entry must stay first (id 0).
const DIMENSIONS: &[(&str, Dimensions)] = &[
    ("dimensionless", Dimensions::DIMENSIONLESS),
    ("Length", dims(1, 0, 0, 0, 0)),
    ("Area", dims(2, 0, 0, 0, 0)),
    ("Volume", dims(3, 0, 0, 0, 0)),
    ("Time", dims(0, 0, 1, 0, 0)),
    ("Frequency", dims(0, 0, -1, 0, 0)),
    ("Speed", dims(1, 0, -1, 0, 0)),
    ("Acceleration", dims(1, 0, -2, 0, 0)),
    ("Mass", dims(0, 1, 0, 0, 0)),
    ("MassFlowRate", dims(0, 1, -1, 0, 0)),
    ("VolumeFlowRate", dims(3, 0, -1, 0, 0)),
    ("Angle", dims(0, 0, 0, 1, 0)),
    ("Temperature", dims(0, 0, 0, 0, 1)),
];

/// `(symbol, scale to the dimension's base unit, dimension name)`.
const UNITS: &[(&str, f64, &str)] = &[
    ("unitless", 1.0, "dimensionless"),
    ("m", 1.0, "Length"),
    ("km", 1000.0, "Length"),
    ("cm", 0.01, "Length"),
    ("mm", 0.001, "Length"),
    ("m2", 1.0, "Area"),
    ("m3", 1.0, "Volume"),
    ("L", 0.001, "Volume"),
    ("s", 1.0, "Time"),
    ("min", 60.0, "Time"),
    ("h", 3600.0, "Time"),
    ("d", 86400.0, "Time"),
    ("Hz", 1.0, "Frequency"),
    ("m/s", 1.0, "Speed"),
    ("km/h", 1.0 / 3.6, "Speed"),
    ("m/s2", 1.0, "Acceleration"),
    ("kg", 1.0, "Mass"),
    ("g", 0.001, "Mass"),
    ("t", 1000.0, "Mass"),
    ("kg/s", 1.0, "MassFlowRate"),
    ("m3/s", 1.0, "VolumeFlowRate"),
    ("rad", 1.0, "Angle"),
    ("deg", std::f64::consts::PI / 180.0, "Angle"),
    ("K", 1.0, "Temperature"),
];

pub struct SiUnits {
    dimensions: Vec<(&'static str, Dimensions)>,
    by_dims: FxHashMap<Dimensions, UnitType>,
    by_name: FxHashMap<&'static str, UnitType>,
    units: FxHashMap<&'static str, ResolvedUnit>,
}

impl SiUnits {
    pub fn new() -> Self {
        let dimensions: Vec<(&'static str, Dimensions)> = DIMENSIONS.to_vec();
        let mut by_dims = FxHashMap::default();
        let mut by_name = FxHashMap::default();
        for (id, (name, d)) in dimensions.iter().enumerate() {
            by_dims.insert(*d, UnitType(id as u32));
            by_name.insert(*name, UnitType(id as u32));
        }
        let mut units = FxHashMap::default();
        for (symbol, scale, dimension) in UNITS {
            let unit = by_name[dimension];
            units.insert(
                *symbol,
                ResolvedUnit {
                    scale: *scale,
                    unit,
                },
            );
        }
        Self {
            dimensions,
            by_dims,
            by_name,
            units,
        }
    }

    /// Looks a dimension up by its name (`"Length"`, `"Speed"`, ...).
    pub fn dimension(&self, name: &str) -> Option<UnitType> {
        self.by_name.get(name).copied()
    }

    fn dims_of(&self, unit: UnitType) -> Option<Dimensions> {
        self.dimensions.get(unit.0 as usize).map(|(_, d)| *d)
    }
}

impl Default for SiUnits {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitProvider for SiUnits {
    fn resolve(&self, name: &str) -> Option<ResolvedUnit> {
        self.units.get(name).copied()
    }

    fn multiply(&self, lhs: UnitType, rhs: UnitType) -> Option<UnitType> {
        let dims = self.dims_of(lhs)?.multiply(self.dims_of(rhs)?)?;
        self.by_dims.get(&dims).copied()
    }

    fn divide(&self, numerator: UnitType, denominator: UnitType) -> Option<UnitType> {
        let dims = self
            .dims_of(numerator)?
            .divide(self.dims_of(denominator)?)?;
        self.by_dims.get(&dims).copied()
    }

    fn angle_unit(&self) -> Option<UnitType> {
        self.by_name.get("Angle").copied()
    }

    fn describe(&self, unit: UnitType) -> String {
        match self.dimensions.get(unit.0 as usize) {
            Some((name, _)) => (*name).to_string(),
            None => format!("unit#{}", unit.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("m", 1.0, "Length")]
    #[case("km", 1000.0, "Length")]
    #[case("h", 3600.0, "Time")]
    #[case("km/h", 1.0 / 3.6, "Speed")]
    #[case("unitless", 1.0, "dimensionless")]
    fn test_resolve(#[case] symbol: &str, #[case] scale: f64, #[case] dimension: &str) {
        let units = SiUnits::new();
        let resolved = units.resolve(symbol).unwrap();
        assert_eq!(resolved.scale, scale);
        assert_eq!(resolved.unit, units.dimension(dimension).unwrap());
    }

    #[test]
    fn test_resolve_unknown() {
        assert!(SiUnits::new().resolve("parsec").is_none());
    }

    #[test]
    fn test_dimensionless_is_id_zero() {
        let units = SiUnits::new();
        assert_eq!(
            units.dimension("dimensionless"),
            Some(UnitType::DIMENSIONLESS)
        );
        assert_eq!(units.resolve("unitless").unwrap().unit, UnitType::DIMENSIONLESS);
    }

    #[test]
    fn test_divide_length_by_time_is_speed() {
        let units = SiUnits::new();
        let length = units.dimension("Length").unwrap();
        let time = units.dimension("Time").unwrap();
        assert_eq!(units.divide(length, time), units.dimension("Speed"));
    }

    #[test]
    fn test_multiply_speed_by_time_is_length() {
        let units = SiUnits::new();
        let speed = units.dimension("Speed").unwrap();
        let time = units.dimension("Time").unwrap();
        assert_eq!(units.multiply(speed, time), units.dimension("Length"));
    }

    #[test]
    fn test_unregistered_composition_fails() {
        let units = SiUnits::new();
        let speed = units.dimension("Speed").unwrap();
        // Speed squared is not a registered dimension.
        assert_eq!(units.multiply(speed, speed), None);
    }

    #[test]
    fn test_multiply_by_dimensionless_is_identity() {
        let units = SiUnits::new();
        let mass = units.dimension("Mass").unwrap();
        assert_eq!(units.multiply(mass, UnitType::DIMENSIONLESS), Some(mass));
        assert_eq!(units.divide(mass, UnitType::DIMENSIONLESS), Some(mass));
    }

    #[test]
    fn test_angle() {
        let units = SiUnits::new();
        let angle = units.dimension("Angle").unwrap();
        assert_eq!(units.angle_unit(), Some(angle));
        assert!(units.is_angle(angle));
        assert!(!units.is_angle(UnitType::DIMENSIONLESS));
        let deg = units.resolve("deg").unwrap();
        assert!((deg.scale - std::f64::consts::PI / 180.0).abs() < 1e-12);
    }

    #[test]
    fn test_describe() {
        let units = SiUnits::new();
        assert_eq!(units.describe(UnitType::DIMENSIONLESS), "dimensionless");
        assert_eq!(units.describe(units.dimension("Speed").unwrap()), "Speed");
        assert_eq!(units.describe(UnitType(999)), "unit#999");
    }
}
