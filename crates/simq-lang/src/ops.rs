//! The closed operator set.
//!
//! Each operator carries three behaviors: a static validator over tri-state
//! judgments, a runtime check, and the value computation. Nodes the
//! validation pass proved sound skip the runtime check.

use crate::eval::value::{Value, ValueKind};
use crate::quantity::Quantity;
use crate::unit::{UnitProvider, UnitType};
use crate::validate::{FaultKind, Validation};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// "Nonzero means true", defined only for dimensionless numbers.
pub fn truthiness(value: &Value) -> Result<bool, FaultKind> {
    match value {
        Value::Number(q) if q.unit.is_dimensionless() => Ok(q.value != 0.0),
        Value::Number(_) => Err(FaultKind::BadCondition {
            got: "a dimensioned number".to_string(),
        }),
        other => Err(FaultKind::BadCondition {
            got: other.type_name().to_string(),
        }),
    }
}

fn bool_value(b: bool) -> Value {
    Value::Number(Quantity::dimensionless(if b { 1.0 } else { 0.0 }))
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
        }
    }

    pub fn validate(self, operand: (ValueKind, UnitType)) -> Result<Validation, FaultKind> {
        let (kind, unit) = operand;
        if kind != ValueKind::Number {
            return Err(FaultKind::KindMismatch {
                op: self.symbol().to_string(),
                got: kind.name().to_string(),
            });
        }
        match self {
            UnaryOp::Negate => Ok(Validation::number(unit)),
            UnaryOp::Not => {
                if unit.is_dimensionless() {
                    Ok(Validation::dimensionless())
                } else {
                    Err(FaultKind::NotDimensionless {
                        op: self.symbol().to_string(),
                        got: "a dimensioned number".to_string(),
                    })
                }
            }
        }
    }

    pub fn apply(self, operand: &Value, checked: bool) -> Result<Value, FaultKind> {
        if checked {
            self.check(operand)?;
        }
        match (self, operand) {
            (UnaryOp::Negate, Value::Number(q)) => Ok(Value::Number(q.with_value(-q.value))),
            (UnaryOp::Not, Value::Number(q)) => Ok(bool_value(q.value == 0.0)),
            _ => Err(self.kind_fault(operand)),
        }
    }

    fn check(self, operand: &Value) -> Result<(), FaultKind> {
        match (self, operand) {
            (UnaryOp::Negate, Value::Number(_)) => Ok(()),
            (UnaryOp::Not, Value::Number(q)) if q.unit.is_dimensionless() => Ok(()),
            (UnaryOp::Not, Value::Number(_)) => Err(FaultKind::NotDimensionless {
                op: self.symbol().to_string(),
                got: "a dimensioned number".to_string(),
            }),
            _ => Err(self.kind_fault(operand)),
        }
    }

    fn kind_fault(self, operand: &Value) -> FaultKind {
        FaultKind::KindMismatch {
            op: self.symbol().to_string(),
            got: operand.type_name().to_string(),
        }
    }
}

impl BinaryOp {
    /// Recognizes an operator from one symbol token, or from two *adjacent*
    /// symbol tokens. Returns the operator and how many tokens it spans.
    pub fn from_symbols(first: char, adjacent_second: Option<char>) -> Option<(BinaryOp, usize)> {
        match (first, adjacent_second) {
            ('&', Some('&')) => Some((BinaryOp::And, 2)),
            ('|', Some('|')) => Some((BinaryOp::Or, 2)),
            ('<', Some('=')) => Some((BinaryOp::Le, 2)),
            ('>', Some('=')) => Some((BinaryOp::Ge, 2)),
            ('=', Some('=')) => Some((BinaryOp::Eq, 2)),
            ('!', Some('=')) => Some((BinaryOp::Ne, 2)),
            ('<', _) => Some((BinaryOp::Lt, 1)),
            ('>', _) => Some((BinaryOp::Gt, 1)),
            ('+', _) => Some((BinaryOp::Add, 1)),
            ('-', _) => Some((BinaryOp::Sub, 1)),
            ('*', _) => Some((BinaryOp::Mul, 1)),
            ('/', _) => Some((BinaryOp::Div, 1)),
            ('%', _) => Some((BinaryOp::Mod, 1)),
            ('^', _) => Some((BinaryOp::Pow, 1)),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
            BinaryOp::Pow => 7,
        }
    }

    pub fn right_assoc(self) -> bool {
        matches!(self, BinaryOp::Pow)
    }

    /// Lazy operators receive their right operand unevaluated and decide
    /// whether to evaluate it.
    pub fn is_lazy(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn validate(
        self,
        lhs: (ValueKind, UnitType),
        rhs: (ValueKind, UnitType),
        units: &dyn UnitProvider,
    ) -> Result<Validation, FaultKind> {
        use BinaryOp::*;
        match self {
            Add | Sub | Mod => {
                self.require_numbers(lhs.0, rhs.0)?;
                self.require_same_unit(lhs.1, rhs.1, units)?;
                Ok(Validation::number(lhs.1))
            }
            Mul => {
                self.require_numbers(lhs.0, rhs.0)?;
                let unit =
                    units
                        .multiply(lhs.1, rhs.1)
                        .ok_or_else(|| FaultKind::NoComposedUnit {
                            op: "*",
                            left: units.describe(lhs.1),
                            right: units.describe(rhs.1),
                        })?;
                Ok(Validation::number(unit))
            }
            Div => {
                self.require_numbers(lhs.0, rhs.0)?;
                let unit = units
                    .divide(lhs.1, rhs.1)
                    .ok_or_else(|| FaultKind::NoComposedUnit {
                        op: "/",
                        left: units.describe(lhs.1),
                        right: units.describe(rhs.1),
                    })?;
                Ok(Validation::number(unit))
            }
            Pow | And | Or => {
                self.require_numbers(lhs.0, rhs.0)?;
                self.require_dimensionless(lhs.1, units)?;
                self.require_dimensionless(rhs.1, units)?;
                Ok(Validation::dimensionless())
            }
            Lt | Le | Gt | Ge => {
                self.require_numbers(lhs.0, rhs.0)?;
                self.require_same_unit(lhs.1, rhs.1, units)?;
                Ok(Validation::dimensionless())
            }
            Eq | Ne => {
                // Typed equality: operands must share a comparable kind, and
                // for numbers the same dimension. Never a silent false.
                if lhs.0 != rhs.0 {
                    return Err(FaultKind::EqualityKindMismatch {
                        left: lhs.0.name().to_string(),
                        right: rhs.0.name().to_string(),
                    });
                }
                match lhs.0 {
                    ValueKind::Number => {
                        self.require_same_unit(lhs.1, rhs.1, units)?;
                    }
                    ValueKind::String | ValueKind::Entity => {}
                    ValueKind::Collection | ValueKind::Lambda => {
                        return Err(FaultKind::EqualityKindMismatch {
                            left: lhs.0.name().to_string(),
                            right: rhs.0.name().to_string(),
                        });
                    }
                }
                Ok(Validation::dimensionless())
            }
        }
    }

    /// Eager application. Lazy operators never reach this; the evaluator
    /// short-circuits them itself.
    pub fn apply(
        self,
        lhs: &Value,
        rhs: &Value,
        units: &dyn UnitProvider,
        checked: bool,
    ) -> Result<Value, FaultKind> {
        use BinaryOp::*;
        if checked {
            self.check(lhs, rhs, units)?;
        }
        match self {
            Eq => return Ok(bool_value(lhs == rhs)),
            Ne => return Ok(bool_value(lhs != rhs)),
            _ => {}
        }
        let (a, b) = match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => (a, b),
            _ => return Err(self.kind_fault(lhs, rhs)),
        };
        match self {
            Add => Ok(Value::Number(a.with_value(a.value + b.value))),
            Sub => Ok(Value::Number(a.with_value(a.value - b.value))),
            Mul => {
                let unit = units
                    .multiply(a.unit, b.unit)
                    .ok_or_else(|| FaultKind::NoComposedUnit {
                        op: "*",
                        left: units.describe(a.unit),
                        right: units.describe(b.unit),
                    })?;
                Ok(Value::Number(Quantity::new(a.value * b.value, unit)))
            }
            Div => {
                if b.value == 0.0 {
                    return Err(FaultKind::ZeroDivision);
                }
                let unit = units
                    .divide(a.unit, b.unit)
                    .ok_or_else(|| FaultKind::NoComposedUnit {
                        op: "/",
                        left: units.describe(a.unit),
                        right: units.describe(b.unit),
                    })?;
                Ok(Value::Number(Quantity::new(a.value / b.value, unit)))
            }
            Mod => {
                if b.value == 0.0 {
                    return Err(FaultKind::ZeroDivision);
                }
                Ok(Value::Number(a.with_value(a.value % b.value)))
            }
            Pow => Ok(Value::Number(Quantity::dimensionless(
                a.value.powf(b.value),
            ))),
            Lt => Ok(bool_value(a.value < b.value)),
            Le => Ok(bool_value(a.value <= b.value)),
            Gt => Ok(bool_value(a.value > b.value)),
            Ge => Ok(bool_value(a.value >= b.value)),
            Eq | Ne | And | Or => Err(FaultKind::Message(format!(
                "operator \"{}\" applied eagerly",
                self.symbol()
            ))),
        }
    }

    /// The runtime type/unit assertion, skipped on nodes validation proved.
    pub fn check(self, lhs: &Value, rhs: &Value, units: &dyn UnitProvider) -> Result<(), FaultKind> {
        let lk = (lhs.kind(), lhs.unit());
        let rk = (rhs.kind(), rhs.unit());
        self.validate(lk, rk, units).map(|_| ())
    }

    fn require_numbers(self, lhs: ValueKind, rhs: ValueKind) -> Result<(), FaultKind> {
        if lhs == ValueKind::Number && rhs == ValueKind::Number {
            Ok(())
        } else {
            Err(FaultKind::KindMismatch {
                op: self.symbol().to_string(),
                got: format!("{}, {}", lhs.name(), rhs.name()),
            })
        }
    }

    fn require_same_unit(
        self,
        lhs: UnitType,
        rhs: UnitType,
        units: &dyn UnitProvider,
    ) -> Result<(), FaultKind> {
        if lhs == rhs {
            Ok(())
        } else {
            Err(FaultKind::UnitMismatch {
                op: self.symbol().to_string(),
                left: units.describe(lhs),
                right: units.describe(rhs),
            })
        }
    }

    fn require_dimensionless(self, unit: UnitType, units: &dyn UnitProvider) -> Result<(), FaultKind> {
        if unit.is_dimensionless() {
            Ok(())
        } else {
            Err(FaultKind::NotDimensionless {
                op: self.symbol().to_string(),
                got: units.describe(unit),
            })
        }
    }

    fn kind_fault(self, lhs: &Value, rhs: &Value) -> FaultKind {
        FaultKind::KindMismatch {
            op: self.symbol().to_string(),
            got: format!("{}, {}", lhs.type_name(), rhs.type_name()),
        }
    }
}
