//! The tree-walking evaluator.
//!
//! Walks an already-validated (and possibly specialized) AST against a
//! per-call stack of variable frames. All evaluation state lives in
//! [`EvalState`], created fresh for every `evaluate` call; the tree itself is
//! never mutated, which is what makes concurrent evaluation of one compiled
//! expression safe.

pub mod builtin;
pub mod error;
pub mod value;

use std::sync::Arc;

use crate::arena::Arena;
use crate::ast::node::{Expr, Node, TokenId};
use crate::context::EvalContext;
use crate::lexer::token::{Token, TokenKind};
use crate::ops::{self, BinaryOp};
use crate::range::Range;
use error::EvalError;
use value::{Collection, LambdaClosure, Value};

pub struct EvalState<'a> {
    pub(crate) env: &'a EvalContext<'a>,
    pub(crate) arena: &'a Arena<Token>,
    pub(crate) frames: Vec<Vec<Value>>,
    pub(crate) depth: u32,
}

impl<'a> EvalState<'a> {
    pub fn new(env: &'a EvalContext<'a>, arena: &'a Arena<Token>) -> Self {
        Self {
            env,
            arena,
            frames: Vec::new(),
            depth: 0,
        }
    }

    pub fn token(&self, id: TokenId) -> Token {
        self.arena.get(id).cloned().unwrap_or(Token {
            range: Range::default(),
            kind: TokenKind::Eof,
        })
    }
}

pub(crate) fn eval_node(node: &Node, state: &mut EvalState) -> Result<Value, EvalError> {
    match &*node.expr {
        Expr::Constant(value) => Ok(value.clone()),
        Expr::Variable(slot) => {
            let frame = state
                .frames
                .last()
                .ok_or_else(|| EvalError::Internal(state.token(node.token_id)))?;
            frame
                .get(*slot)
                .cloned()
                .ok_or_else(|| EvalError::Internal(state.token(node.token_id)))
        }
        Expr::Lambda(lambda) => {
            // Snapshot the captured slots now; collections are deep-copied so
            // the closure owns its captures by value.
            let mut captured = Vec::with_capacity(lambda.captures.len());
            for &slot in &lambda.captures {
                let value = state
                    .frames
                    .last()
                    .and_then(|frame| frame.get(slot))
                    .ok_or_else(|| EvalError::Internal(state.token(node.token_id)))?;
                captured.push(value.deep_copy());
            }
            Ok(Value::Lambda(Arc::new(LambdaClosure {
                arity: lambda.arity,
                captured,
                body: Arc::clone(&lambda.body),
            })))
        }
        Expr::Property(property) => {
            let target = eval_node(&property.target, state)?;
            let entity = match target {
                Value::Entity(entity) => entity,
                other => {
                    return Err(EvalError::Check(
                        state.token(node.token_id),
                        crate::validate::FaultKind::KindMismatch {
                            op: format!(".{}", property.name),
                            got: other.type_name().to_string(),
                        },
                    ));
                }
            };
            if entity.is_null() {
                return Err(EvalError::NullEntity(state.token(node.token_id)));
            }
            property
                .accessor
                .read(entity)
                .map_err(|e| EvalError::Host(state.token(node.token_id), e.to_string()))
        }
        Expr::Index { target, args } => {
            let target_value = eval_node(target, state)?;
            match target_value {
                Value::Collection(collection) => {
                    if args.len() != 1 {
                        return Err(EvalError::Runtime(
                            state.token(node.token_id),
                            format!("collection index takes one argument, got {}", args.len()),
                        ));
                    }
                    let key = eval_node(&args[0], state)?;
                    collection
                        .index(&key)
                        .map_err(|message| EvalError::Runtime(state.token(node.token_id), message))
                }
                Value::Lambda(closure) => {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(eval_node(arg, state)?);
                    }
                    let token = state.token(node.token_id);
                    apply_lambda(state, &closure, values, &token)
                }
                other => Err(EvalError::Check(
                    state.token(node.token_id),
                    crate::validate::FaultKind::KindMismatch {
                        op: "()".to_string(),
                        got: other.type_name().to_string(),
                    },
                )),
            }
        }
        Expr::Array(elements) => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push(eval_node(element, state)?);
            }
            Ok(Value::Collection(Arc::new(Collection::Vector(values))))
        }
        Expr::Unary {
            op,
            operand,
            checked,
        } => {
            let value = eval_node(operand, state)?;
            op.apply(&value, *checked)
                .map_err(|fault| EvalError::Check(state.token(node.token_id), fault))
        }
        Expr::Binary {
            op,
            lhs,
            rhs,
            checked: _,
        } if op.is_lazy() => {
            let left = eval_node(lhs, state)?;
            let left_true = ops::truthiness(&left)
                .map_err(|fault| EvalError::Check(state.token(node.token_id), fault))?;
            let short_circuit = match op {
                BinaryOp::And => !left_true,
                _ => left_true,
            };
            if short_circuit {
                // The right operand node is never evaluated.
                return Ok(Value::from(if left_true { 1.0 } else { 0.0 }));
            }
            let right = eval_node(rhs, state)?;
            let right_true = ops::truthiness(&right)
                .map_err(|fault| EvalError::Check(state.token(node.token_id), fault))?;
            Ok(Value::from(if right_true { 1.0 } else { 0.0 }))
        }
        Expr::Binary {
            op,
            lhs,
            rhs,
            checked,
        } => {
            let left = eval_node(lhs, state)?;
            let right = eval_node(rhs, state)?;
            op.apply(&left, &right, state.env.units, *checked)
                .map_err(|fault| EvalError::Check(state.token(node.token_id), fault))
        }
        Expr::Conditional {
            cond,
            then_branch,
            else_branch,
        } => {
            let cond_value = eval_node(cond, state)?;
            let take_then = ops::truthiness(&cond_value)
                .map_err(|fault| EvalError::Check(state.token(cond.token_id), fault))?;
            if take_then {
                eval_node(then_branch, state)
            } else {
                eval_node(else_branch, state)
            }
        }
        Expr::Call(call) => {
            if call.checked && !call.func.params.is_valid(call.args.len()) {
                return Err(EvalError::InvalidNumberOfArguments(
                    state.token(node.token_id),
                    call.name.to_string(),
                    call.func.params.expected(),
                    call.args.len(),
                ));
            }
            let mut values = Vec::with_capacity(call.args.len());
            for arg in &call.args {
                values.push(eval_node(arg, state)?);
            }
            let token = state.token(node.token_id);
            (call.func.eval)(state, &token, &values)
        }
    }
}

/// Invokes a closure: pushes a frame laid out as arguments first, captured
/// values after, mirroring the parser's bound-then-free slot numbering.
pub(crate) fn apply_lambda(
    state: &mut EvalState,
    closure: &LambdaClosure,
    args: Vec<Value>,
    token: &Token,
) -> Result<Value, EvalError> {
    if args.len() != closure.arity {
        return Err(EvalError::LambdaArity(
            token.clone(),
            closure.arity,
            args.len(),
        ));
    }
    if state.depth >= state.env.options.max_depth {
        return Err(EvalError::RecursionLimit(
            token.clone(),
            state.env.options.max_depth,
        ));
    }

    let mut frame = args;
    frame.extend(closure.captured.iter().cloned());
    state.frames.push(frame);
    state.depth += 1;
    let result = eval_node(&closure.body, state);
    state.depth -= 1;
    state.frames.pop();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ParseContext;
    use crate::host::{NoEntities, NoSimulation};
    use crate::lexer;
    use crate::unit::Unitless;
    use crate::validate::FaultKind;
    use rstest::rstest;

    fn run(source: &str) -> Result<Value, EvalError> {
        let units = Unitless;
        let graph = NoEntities;
        let ctx = ParseContext::new(&units, &graph);
        let tokens = lexer::tokenize(source).expect("test source must tokenize");
        let parsed = crate::ast::parser::Parser::new(&tokens, &ctx)
            .parse_expression()
            .expect("test source must parse");

        let random = NoSimulation;
        let env = EvalContext::new(&units, &graph, &random);
        let mut state = EvalState::new(&env, &parsed.arena);
        eval_node(&parsed.root, &mut state)
    }

    #[rstest]
    #[case("1 + 2 * 3", 7.0)]
    #[case("10 / 4", 2.5)]
    #[case("2 ^ 8", 256.0)]
    #[case("1 < 2 ? 10 : 20", 10.0)]
    #[case("0 ? 10 : 20", 20.0)]
    #[case("x = 3; x * x", 9.0)]
    #[case("f = |a, b|(a % b); f(7, 4)", 3.0)]
    #[case("{5, 6, 7}(2)", 6.0)]
    #[case("!3", 0.0)]
    fn test_eval(#[case] source: &str, #[case] expected: f64) {
        assert_eq!(run(source).unwrap(), Value::from(expected));
    }

    #[test]
    fn test_zero_division() {
        assert!(matches!(
            run("1 / 0"),
            Err(EvalError::Check(_, FaultKind::ZeroDivision))
        ));
    }

    #[test]
    fn test_indexing_a_number_fails() {
        assert!(matches!(
            run("x = 1; x(2)"),
            Err(EvalError::Check(_, FaultKind::KindMismatch { .. }))
        ));
    }

    #[test]
    fn test_condition_must_be_dimensionless_number() {
        assert!(matches!(
            run("\"yes\" ? 1 : 2"),
            Err(EvalError::Check(_, FaultKind::BadCondition { .. }))
        ));
    }

    #[test]
    fn test_lambda_frame_layout() {
        // Argument slots come before capture slots.
        assert_eq!(
            run("a = 10; f = |x, y|(x - y + a); f(3, 2)").unwrap(),
            Value::from(11.0)
        );
    }
}
