//! `simq-lang` is the expression engine of simq: a tokenizer, a
//! precedence-climbing parser with lexical scoping and closure conversion, a
//! two-pass static validator/optimizer, and a tree-walking evaluator over a
//! small tagged value model (numbers carrying a unit dimension, strings,
//! entity references, collections and lambdas).
//!
//! The engine is embedded: units, entities and simulation state stay behind
//! the [`UnitProvider`], [`EntityGraph`] and [`RandomSource`] traits supplied
//! by the host.
//!
//! ## Examples
//!
//! ```
//! use simq_lang::{EvalContext, NoEntities, NoSimulation, ParseContext, Unitless, Value};
//!
//! let units = Unitless;
//! let graph = NoEntities;
//! let ctx = ParseContext::new(&units, &graph);
//!
//! let expr = simq_lang::parse_expression(&ctx, "2 + 3 * 4").unwrap();
//!
//! let random = NoSimulation;
//! let env = EvalContext::new(&units, &graph, &random);
//! assert_eq!(expr.evaluate(&env).unwrap(), Value::from(14.0));
//! ```

mod arena;
mod ast;
mod context;
mod error;
mod eval;
mod expression;
mod host;
mod lexer;
mod ops;
mod optimizer;
mod quantity;
mod range;
mod unit;
mod validate;

use tracing::debug;

pub use ast::error::{ParseError, SemanticError, SyntaxError};
pub use context::{EvalContext, EvalOptions, ParseContext, ParseOptions};
pub use error::{Error, InnerError};
pub use eval::builtin::{BUILTIN_FUNCTION_DOC, BuiltinFunctionDoc};
pub use eval::error::EvalError;
pub use eval::value::{Collection, LambdaClosure, MapKey, Value, ValueKind};
pub use expression::{Assignment, Expression};
pub use host::{
    Accessor, Assigner, EntityGraph, EntityId, EntityRef, HostError, NoEntities, NoSimulation,
    RandomSource, RandomStream,
};
pub use lexer::error::LexerError;
pub use lexer::token::{Token, TokenKind};
pub use ops::{BinaryOp, UnaryOp};
pub use quantity::Quantity;
pub use range::{Position, Range};
pub use unit::{ResolvedUnit, UnitProvider, UnitType, Unitless};
pub use validate::{Fault, FaultKind, ValidateError, Validation};

/// Tokenizes source text without parsing it. Mostly useful for tooling.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Error> {
    lexer::tokenize(source).map_err(|e| Error::new(source, e.into()))
}

/// Compiles an expression: tokenize, parse (resolving lexical scopes, unit
/// names and entity literals), constant-fold, validate, and eliminate the
/// runtime checks validation proved redundant.
///
/// A validation failure surfaces the first diagnostic; the expression is
/// never produced.
pub fn parse_expression(ctx: &ParseContext, source: &str) -> Result<Expression, Error> {
    debug!(target: "simq::parse", len = source.len(), "parse expression");
    let tokens = lexer::tokenize(source).map_err(|e| Error::new(source, e.into()))?;
    let parsed = ast::parser::Parser::new(&tokens, ctx)
        .parse_expression()
        .map_err(|e| Error::new(source, e.into()))?;

    let root = if ctx.options.optimize {
        optimizer::fold(&parsed.root, ctx, &parsed.arena)
    } else {
        parsed.root
    };
    let (root, validation) = optimizer::specialize(&root, ctx.units, ctx.options.optimize);
    if let Some(fault) = validation.first_fault() {
        let error = ValidateError {
            token: parsed.arena[fault.token_id].clone(),
            kind: fault.kind.clone(),
        };
        return Err(Error::new(source, error.into()));
    }

    Ok(Expression::new(
        source,
        root,
        validation,
        parsed.arena,
        parsed.entity_spans,
    ))
}

/// Compiles an assignment statement `target.property(index) = value`.
///
/// The target, index and value sub-expressions go through the same folding
/// and validation pipeline as plain expressions; the assigner callback was
/// already bound during parsing.
pub fn parse_assignment(ctx: &ParseContext, source: &str) -> Result<Assignment, Error> {
    debug!(target: "simq::parse", len = source.len(), "parse assignment");
    let tokens = lexer::tokenize(source).map_err(|e| Error::new(source, e.into()))?;
    let parsed = ast::parser::Parser::new(&tokens, ctx)
        .parse_assignment()
        .map_err(|e| Error::new(source, e.into()))?;

    let mut check = |node: &ast::node::NodeRef| -> Result<ast::node::NodeRef, Error> {
        let folded = if ctx.options.optimize {
            optimizer::fold(node, ctx, &parsed.arena)
        } else {
            std::sync::Arc::clone(node)
        };
        let (folded, validation) = optimizer::specialize(&folded, ctx.units, ctx.options.optimize);
        if let Some(fault) = validation.first_fault() {
            let error = ValidateError {
                token: parsed.arena[fault.token_id].clone(),
                kind: fault.kind.clone(),
            };
            return Err(Error::new(source, error.into()));
        }
        Ok(folded)
    };

    let target = check(&parsed.target)?;
    let indices = parsed
        .indices
        .iter()
        .map(&mut check)
        .collect::<Result<Vec<_>, _>>()?;
    let value = check(&parsed.value)?;

    // The target must be able to produce an entity reference.
    let (_, target_validation) = optimizer::specialize(&target, ctx.units, false);
    if let Validation::Valid { kind, .. } = target_validation {
        if kind != ValueKind::Entity {
            let error = ValidateError {
                token: parsed.arena[target.token_id].clone(),
                kind: FaultKind::KindMismatch {
                    op: format!(".{}", parsed.property),
                    got: kind.name().to_string(),
                },
            };
            return Err(Error::new(source, error.into()));
        }
    }
    let (_, value_validation) = optimizer::specialize(&value, ctx.units, false);

    Ok(Assignment::new(
        source,
        target,
        parsed.property,
        parsed.property_token,
        indices,
        value,
        parsed.assigner,
        value_validation,
        parsed.arena,
        parsed.entity_spans,
    ))
}
