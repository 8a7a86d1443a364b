use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use compact_str::CompactString;
use rustc_hash::FxHashSet;
use scopeguard::defer;

use crate::arena::Arena;
use crate::ast::node::{NodeRef, TokenId};
use crate::context::EvalContext;
use crate::error::{Error, InnerError};
use crate::eval::error::EvalError;
use crate::eval::value::{Value, ValueKind};
use crate::eval::{self, EvalState};
use crate::host::Assigner;
use crate::lexer::token::{Token, TokenKind};
use crate::range::Range;
use crate::unit::{UnitProvider, UnitType};
use crate::validate::{FaultKind, ValidateError, Validation};

/// A compiled expression: source text, the specialized tree, and the cached
/// static judgment.
///
/// Read-only after construction, so a single `Expression` may be evaluated
/// concurrently from independent threads; the only shared mutable state is
/// the reentrancy-tracking set behind its mutex.
#[derive(Debug)]
pub struct Expression {
    source: String,
    root: NodeRef,
    validation: Validation,
    arena: Arc<Arena<Token>>,
    entity_spans: Vec<(Range, CompactString)>,
    in_flight: Mutex<FxHashSet<ThreadId>>,
}

impl Expression {
    pub(crate) fn new(
        source: &str,
        root: NodeRef,
        validation: Validation,
        arena: Arena<Token>,
        entity_spans: Vec<(Range, CompactString)>,
    ) -> Self {
        Self {
            source: source.to_string(),
            root,
            validation,
            arena: Arc::new(arena),
            entity_spans,
            in_flight: Mutex::new(FxHashSet::default()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The cached static judgment computed by the validation pass. Never
    /// `Invalid`; an invalid expression is rejected at parse time.
    pub fn validation(&self) -> &Validation {
        &self.validation
    }

    /// Evaluates the expression against a fresh runtime environment.
    ///
    /// If this thread is already inside `evaluate` on this same expression
    /// (a self-referential property chain), the call fails immediately
    /// instead of overflowing the stack. Failures leave the expression
    /// reusable.
    pub fn evaluate(&self, env: &EvalContext) -> Result<Value, Error> {
        let thread = thread::current().id();
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(thread) {
                return Err(self.error(EvalError::SelfRecursion(self.token(self.root.token_id))));
            }
        }
        defer! {
            self.in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&thread);
        }

        let mut state = EvalState::new(env, &self.arena);
        eval::eval_node(&self.root, &mut state).map_err(|e| self.error(e))
    }

    /// Enforces a caller-specific kind contract against the cached judgment.
    /// `Undecidable` passes; the contract is then checked at runtime like any
    /// other deferred check.
    pub fn assert_kind(&self, expected: ValueKind) -> Result<(), Error> {
        match self.validation {
            Validation::Valid { kind, .. } if kind != expected => {
                Err(self.validate_error(FaultKind::Message(format!(
                    "expression must produce a {}, but produces a {}",
                    expected.name(),
                    kind.name()
                ))))
            }
            _ => Ok(()),
        }
    }

    /// Enforces a caller-specific unit-dimension contract against the cached
    /// judgment, without re-parsing.
    pub fn assert_unit(&self, expected: UnitType, units: &dyn UnitProvider) -> Result<(), Error> {
        match self.validation {
            Validation::Valid { kind, .. } if kind != ValueKind::Number => {
                Err(self.validate_error(FaultKind::Message(format!(
                    "expression must produce a number, but produces a {}",
                    kind.name()
                ))))
            }
            Validation::Valid { unit, .. } if unit != expected => {
                Err(self.validate_error(FaultKind::UnitMismatch {
                    op: "expression".to_string(),
                    left: units.describe(expected),
                    right: units.describe(unit),
                }))
            }
            _ => Ok(()),
        }
    }

    /// The source text with every recorded `[EntityName]` literal renamed
    /// through `renames`. Re-parsing the result yields an expression that
    /// behaves identically up to the renamed references.
    pub fn source_with_renames(&self, renames: &HashMap<String, String>) -> String {
        rename_spans(&self.source, &self.entity_spans, renames)
    }

    fn token(&self, id: TokenId) -> Token {
        self.arena.get(id).cloned().unwrap_or(Token {
            range: Range::default(),
            kind: TokenKind::Eof,
        })
    }

    fn error(&self, cause: EvalError) -> Error {
        Error::new(&self.source, InnerError::Eval(cause))
    }

    fn validate_error(&self, kind: FaultKind) -> Error {
        Error::new(
            &self.source,
            InnerError::Validate(ValidateError {
                token: self.token(self.root.token_id),
                kind,
            }),
        )
    }
}

/// A compiled assignment statement: `target.property(index) = value`.
///
/// The assigner callback was bound at parse time - against the literal
/// target entity where possible, otherwise by name with the entity supplied
/// per evaluation.
pub struct Assignment {
    source: String,
    target: NodeRef,
    property: CompactString,
    property_token: TokenId,
    indices: Vec<NodeRef>,
    value: NodeRef,
    assigner: Arc<dyn Assigner>,
    validation: Validation,
    arena: Arc<Arena<Token>>,
    entity_spans: Vec<(Range, CompactString)>,
    in_flight: Mutex<FxHashSet<ThreadId>>,
}

impl fmt::Debug for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assignment")
            .field("source", &self.source)
            .field("property", &self.property)
            .finish_non_exhaustive()
    }
}

impl Assignment {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source: &str,
        target: NodeRef,
        property: CompactString,
        property_token: TokenId,
        indices: Vec<NodeRef>,
        value: NodeRef,
        assigner: Arc<dyn Assigner>,
        validation: Validation,
        arena: Arena<Token>,
        entity_spans: Vec<(Range, CompactString)>,
    ) -> Self {
        Self {
            source: source.to_string(),
            target,
            property,
            property_token,
            indices,
            value,
            assigner,
            validation,
            arena: Arc::new(arena),
            entity_spans,
            in_flight: Mutex::new(FxHashSet::default()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    /// The cached static judgment of the value expression.
    pub fn validation(&self) -> &Validation {
        &self.validation
    }

    /// Evaluates the target entity, the index expressions and the value, then
    /// invokes the bound assigner. Returns the assigned value.
    pub fn evaluate(&self, env: &EvalContext) -> Result<Value, Error> {
        let thread = thread::current().id();
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(thread) {
                return Err(self.error(EvalError::SelfRecursion(self.token(self.property_token))));
            }
        }
        defer! {
            self.in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&thread);
        }

        let mut state = EvalState::new(env, &self.arena);
        let target = eval::eval_node(&self.target, &mut state).map_err(|e| self.error(e))?;
        let entity = match target {
            Value::Entity(entity) if !entity.is_null() => entity,
            Value::Entity(_) => {
                return Err(self.error(EvalError::NullEntity(self.token(self.property_token))));
            }
            other => {
                return Err(self.error(EvalError::Check(
                    self.token(self.target.token_id),
                    FaultKind::KindMismatch {
                        op: format!(".{}", self.property),
                        got: other.type_name().to_string(),
                    },
                )));
            }
        };
        let mut indices = Vec::with_capacity(self.indices.len());
        for index in &self.indices {
            indices.push(eval::eval_node(index, &mut state).map_err(|e| self.error(e))?);
        }
        let value = eval::eval_node(&self.value, &mut state).map_err(|e| self.error(e))?;

        self.assigner
            .assign(entity, &indices, value.clone())
            .map_err(|e| {
                self.error(EvalError::Host(
                    self.token(self.property_token),
                    e.to_string(),
                ))
            })?;
        Ok(value)
    }

    /// See [`Expression::source_with_renames`].
    pub fn source_with_renames(&self, renames: &HashMap<String, String>) -> String {
        rename_spans(&self.source, &self.entity_spans, renames)
    }

    fn token(&self, id: TokenId) -> Token {
        self.arena.get(id).cloned().unwrap_or(Token {
            range: Range::default(),
            kind: TokenKind::Eof,
        })
    }

    fn error(&self, cause: EvalError) -> Error {
        Error::new(&self.source, InnerError::Eval(cause))
    }
}

/// Splices new entity names into `source` at the recorded literal spans.
fn rename_spans(
    source: &str,
    spans: &[(Range, CompactString)],
    renames: &HashMap<String, String>,
) -> String {
    let mut pieces: Vec<(usize, usize, &str)> = spans
        .iter()
        .filter_map(|(range, name)| {
            renames.get(name.as_str()).map(|new_name| {
                let (start, end) = range.byte_span(source);
                (start, end, new_name.as_str())
            })
        })
        .collect();
    pieces.sort_by_key(|(start, _, _)| *start);

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for (start, end, new_name) in pieces {
        out.push_str(&source[cursor..start]);
        out.push('[');
        out.push_str(new_name);
        out.push(']');
        cursor = end;
    }
    out.push_str(&source[cursor..]);
    out
}
