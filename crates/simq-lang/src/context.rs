use compact_str::CompactString;
use rustc_hash::FxHashMap;

use crate::eval::value::Value;
use crate::host::{EntityGraph, RandomSource};
use crate::quantity::Quantity;
use crate::unit::UnitProvider;

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Run constant folding and check elimination. Validation always runs.
    pub optimize: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { optimize: true }
    }
}

/// Everything the parser and optimizer need from the host: the unit table,
/// the entity graph, and the compile-time constant table.
///
/// The lexical scope stack is *not* here; it lives inside the parser and dies
/// with each parse call.
pub struct ParseContext<'a> {
    pub units: &'a dyn UnitProvider,
    pub graph: &'a dyn EntityGraph,
    pub constants: FxHashMap<CompactString, Value>,
    pub options: ParseOptions,
}

impl<'a> ParseContext<'a> {
    pub fn new(units: &'a dyn UnitProvider, graph: &'a dyn EntityGraph) -> Self {
        let mut constants = FxHashMap::default();
        constants.insert(
            CompactString::const_new("PI"),
            Value::Number(Quantity::dimensionless(std::f64::consts::PI)),
        );
        constants.insert(
            CompactString::const_new("E"),
            Value::Number(Quantity::dimensionless(std::f64::consts::E)),
        );
        Self {
            units,
            graph,
            constants,
            options: ParseOptions::default(),
        }
    }

    /// Adds a named compile-time constant, replacing any previous binding.
    pub fn with_constant(mut self, name: &str, value: Value) -> Self {
        self.constants.insert(CompactString::new(name), value);
        self
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Maximum lambda-application depth before evaluation fails, instead of
    /// overflowing the host's stack.
    pub max_depth: u32,
}

#[cfg(debug_assertions)]
impl Default for EvalOptions {
    fn default() -> Self {
        Self { max_depth: 48 }
    }
}

#[cfg(not(debug_assertions))]
impl Default for EvalOptions {
    fn default() -> Self {
        Self { max_depth: 192 }
    }
}

/// The per-call runtime environment handed to [`Expression::evaluate`].
///
/// Carries no evaluation state of its own; variable frames are created fresh
/// inside each call, which is what makes concurrent evaluation of one
/// compiled expression safe.
///
/// [`Expression::evaluate`]: crate::Expression::evaluate
pub struct EvalContext<'a> {
    pub units: &'a dyn UnitProvider,
    pub graph: &'a dyn EntityGraph,
    pub random: &'a dyn RandomSource,
    /// Identity of the evaluating object, used to key random streams.
    pub caller: CompactString,
    pub options: EvalOptions,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        units: &'a dyn UnitProvider,
        graph: &'a dyn EntityGraph,
        random: &'a dyn RandomSource,
    ) -> Self {
        Self {
            units,
            graph,
            random,
            caller: CompactString::const_new(""),
            options: EvalOptions::default(),
        }
    }

    pub fn with_caller(mut self, caller: &str) -> Self {
        self.caller = CompactString::new(caller);
        self
    }

    pub fn with_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }
}
