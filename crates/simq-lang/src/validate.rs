//! The static judgment vocabulary shared by the validation pass, the
//! operator enums and the builtin registry.

use thiserror::Error;

use crate::ast::node::TokenId;
use crate::eval::value::{Value, ValueKind};
use crate::lexer::token::Token;
use crate::unit::UnitType;

/// A defect detected by a type/unit check. The same vocabulary is used by
/// the static validation pass (wrapped in [`Fault`] with a token) and by the
/// runtime checks on nodes validation could not decide.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum FaultKind {
    #[error("Invalid operand types for \"{op}\": got {got}")]
    KindMismatch { op: String, got: String },
    #[error("Unit mismatch for \"{op}\": {left} vs {right}")]
    UnitMismatch {
        op: String,
        left: String,
        right: String,
    },
    #[error("\"{op}\" requires dimensionless operands, got {got}")]
    NotDimensionless { op: String, got: String },
    #[error("No registered unit dimension for {left} {op} {right}")]
    NoComposedUnit {
        op: &'static str,
        left: String,
        right: String,
    },
    #[error("Cannot compare {left} with {right}")]
    EqualityKindMismatch { left: String, right: String },
    #[error("Invalid number of arguments in \"{name}\", expected {expected}, got {got}")]
    ArgCount {
        name: String,
        expected: String,
        got: usize,
    },
    #[error("Conditional branches disagree: {left} vs {right}")]
    BranchMismatch { left: String, right: String },
    #[error("Condition must be a dimensionless number, got {got}")]
    BadCondition { got: String },
    #[error("Divided by 0")]
    ZeroDivision,
    #[error("{0}")]
    Message(String),
}

/// A fault anchored to the token of the node that raised it.
#[derive(Debug, PartialEq, Clone)]
pub struct Fault {
    pub token_id: TokenId,
    pub kind: FaultKind,
}

/// The first validation diagnostic, surfaced to the caller as a parse-time
/// failure.
#[derive(Error, Debug, PartialEq, Clone)]
#[error("{kind}")]
pub struct ValidateError {
    pub token: Token,
    pub kind: FaultKind,
}

/// The tri-state static judgment: proven valid with a known kind and unit,
/// proven invalid, or deferred to runtime.
///
/// Composition rules: any invalid child makes the parent invalid (faults
/// accumulate); otherwise any undecidable child makes the parent
/// undecidable.
#[derive(Debug, PartialEq, Clone)]
pub enum Validation {
    Valid { kind: ValueKind, unit: UnitType },
    Invalid(Vec<Fault>),
    Undecidable,
}

impl Validation {
    pub fn valid(kind: ValueKind, unit: UnitType) -> Self {
        Validation::Valid { kind, unit }
    }

    pub fn number(unit: UnitType) -> Self {
        Validation::Valid {
            kind: ValueKind::Number,
            unit,
        }
    }

    pub fn dimensionless() -> Self {
        Validation::number(UnitType::DIMENSIONLESS)
    }

    pub fn fault(token_id: TokenId, kind: FaultKind) -> Self {
        Validation::Invalid(vec![Fault { token_id, kind }])
    }

    /// Judgment of a literal value.
    pub fn of_value(value: &Value) -> Self {
        Validation::Valid {
            kind: value.kind(),
            unit: value.unit(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid { .. })
    }

    pub fn as_valid(&self) -> Option<(ValueKind, UnitType)> {
        match self {
            Validation::Valid { kind, unit } => Some((*kind, *unit)),
            _ => None,
        }
    }

    /// Applies the composition rules over child judgments. Returns `None`
    /// when all children are valid and the caller should compute its own
    /// judgment.
    pub fn merge<'a, I>(children: I) -> Option<Validation>
    where
        I: IntoIterator<Item = &'a Validation>,
    {
        let mut faults: Vec<Fault> = Vec::new();
        let mut undecidable = false;
        for child in children {
            match child {
                Validation::Invalid(f) => faults.extend(f.iter().cloned()),
                Validation::Undecidable => undecidable = true,
                Validation::Valid { .. } => {}
            }
        }
        if !faults.is_empty() {
            Some(Validation::Invalid(faults))
        } else if undecidable {
            Some(Validation::Undecidable)
        } else {
            None
        }
    }

    /// First fault, if this judgment is invalid.
    pub fn first_fault(&self) -> Option<&Fault> {
        match self {
            Validation::Invalid(faults) => faults.first(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_invalid_over_undecidable() {
        let invalid = Validation::fault(TokenId::new(0), FaultKind::ZeroDivision);
        let merged = Validation::merge([&Validation::Undecidable, &invalid]);
        assert!(matches!(merged, Some(Validation::Invalid(_))));
    }

    #[test]
    fn test_merge_undecidable() {
        let valid = Validation::dimensionless();
        let merged = Validation::merge([&valid, &Validation::Undecidable]);
        assert_eq!(merged, Some(Validation::Undecidable));
    }

    #[test]
    fn test_merge_all_valid() {
        let valid = Validation::dimensionless();
        assert_eq!(Validation::merge([&valid, &valid]), None);
    }

    #[test]
    fn test_of_value() {
        assert_eq!(
            Validation::of_value(&Value::from(1.0)),
            Validation::dimensionless()
        );
        assert_eq!(
            Validation::of_value(&Value::from("s")),
            Validation::valid(ValueKind::String, UnitType::DIMENSIONLESS)
        );
    }
}
