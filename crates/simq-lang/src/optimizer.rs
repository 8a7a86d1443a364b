//! The two tree-rewrite passes between parsing and evaluation.
//!
//! Both are post-order walks that rebuild the tree: constant folding first
//! (so units computed from constant operands are known to the validator),
//! then a combined validation + check-elimination pass that computes every
//! node's tri-state judgment bottom-up and clears the runtime-check flag on
//! nodes proven valid.

use std::sync::Arc;

use tracing::trace;

use crate::arena::Arena;
use crate::ast::node::{Args, CallExpr, Expr, LambdaExpr, Node, NodeRef, PropertyExpr};
use crate::context::{EvalContext, ParseContext};
use crate::eval::builtin::ValidateCtx;
use crate::eval::value::ValueKind;
use crate::eval::{self, EvalState};
use crate::host::NoSimulation;
use crate::lexer::token::Token;
use crate::unit::UnitProvider;
use crate::validate::{FaultKind, Validation};

/// Constant folding: any foldable node whose children are all constants is
/// evaluated against a host-free environment and replaced by the resulting
/// constant. Nodes whose evaluation fails are left in place for the
/// validation pass to diagnose.
pub(crate) fn fold(node: &NodeRef, ctx: &ParseContext, arena: &Arena<Token>) -> NodeRef {
    let random = NoSimulation;
    let env = EvalContext::new(ctx.units, ctx.graph, &random);
    let folded = fold_node(node, &env, arena);
    trace!(target: "simq::optimizer", "constant folding done");
    folded
}

fn fold_node(node: &NodeRef, env: &EvalContext, arena: &Arena<Token>) -> NodeRef {
    let rebuilt = match &*node.expr {
        Expr::Constant(_) | Expr::Variable(_) => return Arc::clone(node),
        Expr::Lambda(lambda) => Node::new(
            node.token_id,
            Expr::Lambda(LambdaExpr {
                arity: lambda.arity,
                captures: lambda.captures.clone(),
                body: fold_node(&lambda.body, env, arena),
            }),
        ),
        Expr::Property(property) => Node::new(
            node.token_id,
            Expr::Property(PropertyExpr {
                target: fold_node(&property.target, env, arena),
                name: property.name.clone(),
                accessor: Arc::clone(&property.accessor),
            }),
        ),
        Expr::Index { target, args } => Node::new(
            node.token_id,
            Expr::Index {
                target: fold_node(target, env, arena),
                args: args.iter().map(|a| fold_node(a, env, arena)).collect(),
            },
        ),
        Expr::Array(elements) => Node::new(
            node.token_id,
            Expr::Array(elements.iter().map(|e| fold_node(e, env, arena)).collect()),
        ),
        Expr::Unary {
            op,
            operand,
            checked,
        } => Node::new(
            node.token_id,
            Expr::Unary {
                op: *op,
                operand: fold_node(operand, env, arena),
                checked: *checked,
            },
        ),
        Expr::Binary {
            op,
            lhs,
            rhs,
            checked,
        } => Node::new(
            node.token_id,
            Expr::Binary {
                op: *op,
                lhs: fold_node(lhs, env, arena),
                rhs: fold_node(rhs, env, arena),
                checked: *checked,
            },
        ),
        Expr::Conditional {
            cond,
            then_branch,
            else_branch,
        } => Node::new(
            node.token_id,
            Expr::Conditional {
                cond: fold_node(cond, env, arena),
                then_branch: fold_node(then_branch, env, arena),
                else_branch: fold_node(else_branch, env, arena),
            },
        ),
        Expr::Call(call) => Node::new(
            node.token_id,
            Expr::Call(CallExpr {
                name: call.name.clone(),
                func: call.func,
                args: call.args.iter().map(|a| fold_node(a, env, arena)).collect(),
                checked: call.checked,
            }),
        ),
    };

    if foldable(&rebuilt) {
        let mut state = EvalState::new(env, arena);
        if let Ok(value) = eval::eval_node(&rebuilt, &mut state) {
            return Node::new(node.token_id, Expr::Constant(value));
        }
    }
    rebuilt
}

fn is_constant(node: &NodeRef) -> bool {
    matches!(&*node.expr, Expr::Constant(_))
}

fn foldable(node: &Node) -> bool {
    match &*node.expr {
        Expr::Unary { operand, .. } => is_constant(operand),
        Expr::Binary { lhs, rhs, .. } => is_constant(lhs) && is_constant(rhs),
        Expr::Conditional {
            cond,
            then_branch,
            else_branch,
        } => is_constant(cond) && is_constant(then_branch) && is_constant(else_branch),
        Expr::Array(elements) => elements.iter().all(is_constant),
        Expr::Index { target, args } => is_constant(target) && args.iter().all(is_constant),
        Expr::Call(call) => call.func.pure && call.args.iter().all(is_constant),
        _ => false,
    }
}

/// Bottom-up validation with check elimination. Returns the (possibly
/// specialized) tree and the root judgment; with `strip` false the judgment
/// is still computed but every runtime check stays in place.
pub(crate) fn specialize(
    node: &NodeRef,
    units: &dyn UnitProvider,
    strip: bool,
) -> (NodeRef, Validation) {
    match &*node.expr {
        Expr::Constant(value) => (Arc::clone(node), Validation::of_value(value)),
        Expr::Variable(_) => (Arc::clone(node), Validation::Undecidable),
        Expr::Lambda(lambda) => {
            let (body, body_judgment) = specialize(&lambda.body, units, strip);
            let judgment = match body_judgment {
                Validation::Invalid(faults) => Validation::Invalid(faults),
                // An undecidable body still yields a perfectly valid lambda
                // value; the body's own checks run when it is applied.
                _ => Validation::valid(ValueKind::Lambda, crate::unit::UnitType::DIMENSIONLESS),
            };
            (
                Node::new(
                    node.token_id,
                    Expr::Lambda(LambdaExpr {
                        arity: lambda.arity,
                        captures: lambda.captures.clone(),
                        body,
                    }),
                ),
                judgment,
            )
        }
        Expr::Property(property) => {
            let (target, target_judgment) = specialize(&property.target, units, strip);
            let judgment = match &target_judgment {
                Validation::Invalid(faults) => Validation::Invalid(faults.clone()),
                Validation::Valid { kind, .. } if *kind != ValueKind::Entity => Validation::fault(
                    node.token_id,
                    FaultKind::KindMismatch {
                        op: format!(".{}", property.name),
                        got: kind.name().to_string(),
                    },
                ),
                _ => property.accessor.static_judgment(),
            };
            (
                Node::new(
                    node.token_id,
                    Expr::Property(PropertyExpr {
                        target,
                        name: property.name.clone(),
                        accessor: Arc::clone(&property.accessor),
                    }),
                ),
                judgment,
            )
        }
        Expr::Index { target, args } => {
            let (target, target_judgment) = specialize(target, units, strip);
            let mut judgments = vec![target_judgment];
            let args: Args = args
                .iter()
                .map(|arg| {
                    let (arg, judgment) = specialize(arg, units, strip);
                    judgments.push(judgment);
                    arg
                })
                .collect();
            // The element type of a collection (and the result of a lambda)
            // is runtime-only information.
            let judgment = match Validation::merge(&judgments) {
                Some(merged) => merged,
                None => match judgments[0].as_valid() {
                    Some((ValueKind::Collection | ValueKind::Lambda, _)) | None => {
                        Validation::Undecidable
                    }
                    Some((kind, _)) => Validation::fault(
                        node.token_id,
                        FaultKind::KindMismatch {
                            op: "()".to_string(),
                            got: kind.name().to_string(),
                        },
                    ),
                },
            };
            (Node::new(node.token_id, Expr::Index { target, args }), judgment)
        }
        Expr::Array(elements) => {
            let mut judgments = Vec::with_capacity(elements.len());
            let elements: Vec<NodeRef> = elements
                .iter()
                .map(|element| {
                    let (element, judgment) = specialize(element, units, strip);
                    judgments.push(judgment);
                    element
                })
                .collect();
            let judgment = Validation::merge(&judgments).unwrap_or_else(|| {
                Validation::valid(ValueKind::Collection, crate::unit::UnitType::DIMENSIONLESS)
            });
            (Node::new(node.token_id, Expr::Array(elements)), judgment)
        }
        Expr::Unary {
            op,
            operand,
            checked,
        } => {
            let (operand, operand_judgment) = specialize(operand, units, strip);
            let judgment = match Validation::merge([&operand_judgment]) {
                Some(merged) => merged,
                None => match operand_judgment.as_valid() {
                    Some(valid) => op
                        .validate(valid)
                        .unwrap_or_else(|kind| Validation::fault(node.token_id, kind)),
                    None => Validation::Undecidable,
                },
            };
            let checked = *checked && !(strip && judgment.is_valid());
            (
                Node::new(
                    node.token_id,
                    Expr::Unary {
                        op: *op,
                        operand,
                        checked,
                    },
                ),
                judgment,
            )
        }
        Expr::Binary {
            op,
            lhs,
            rhs,
            checked,
        } => {
            let (lhs, lhs_judgment) = specialize(lhs, units, strip);
            let (rhs, rhs_judgment) = specialize(rhs, units, strip);
            let judgment = match Validation::merge([&lhs_judgment, &rhs_judgment]) {
                Some(merged) => merged,
                None => match (lhs_judgment.as_valid(), rhs_judgment.as_valid()) {
                    (Some(l), Some(r)) => op
                        .validate(l, r, units)
                        .unwrap_or_else(|kind| Validation::fault(node.token_id, kind)),
                    _ => Validation::Undecidable,
                },
            };
            let checked = *checked && !(strip && judgment.is_valid());
            (
                Node::new(
                    node.token_id,
                    Expr::Binary {
                        op: *op,
                        lhs,
                        rhs,
                        checked,
                    },
                ),
                judgment,
            )
        }
        Expr::Conditional {
            cond,
            then_branch,
            else_branch,
        } => {
            let (cond, cond_judgment) = specialize(cond, units, strip);
            let (then_branch, then_judgment) = specialize(then_branch, units, strip);
            let (else_branch, else_judgment) = specialize(else_branch, units, strip);

            let mut faults = Vec::new();
            for judgment in [&cond_judgment, &then_judgment, &else_judgment] {
                if let Validation::Invalid(f) = judgment {
                    faults.extend(f.iter().cloned());
                }
            }
            if let Some((kind, unit)) = cond_judgment.as_valid() {
                if kind != ValueKind::Number || !unit.is_dimensionless() {
                    faults.push(crate::validate::Fault {
                        token_id: cond.token_id,
                        kind: FaultKind::BadCondition {
                            got: if kind != ValueKind::Number {
                                kind.name().to_string()
                            } else {
                                units.describe(unit)
                            },
                        },
                    });
                }
            }
            if let (Some(t), Some(e)) = (then_judgment.as_valid(), else_judgment.as_valid()) {
                if t != e {
                    faults.push(crate::validate::Fault {
                        token_id: node.token_id,
                        kind: FaultKind::BranchMismatch {
                            left: format!("{} ({})", t.0.name(), units.describe(t.1)),
                            right: format!("{} ({})", e.0.name(), units.describe(e.1)),
                        },
                    });
                }
            }

            let judgment = if !faults.is_empty() {
                Validation::Invalid(faults)
            } else if matches!(cond_judgment, Validation::Undecidable)
                || matches!(then_judgment, Validation::Undecidable)
                || matches!(else_judgment, Validation::Undecidable)
            {
                Validation::Undecidable
            } else {
                match then_judgment.as_valid() {
                    Some((kind, unit)) => Validation::valid(kind, unit),
                    None => Validation::Undecidable,
                }
            };
            (
                Node::new(
                    node.token_id,
                    Expr::Conditional {
                        cond,
                        then_branch,
                        else_branch,
                    },
                ),
                judgment,
            )
        }
        Expr::Call(call) => {
            let mut judgments = Vec::with_capacity(call.args.len());
            let args: Args = call
                .args
                .iter()
                .map(|arg| {
                    let (arg, judgment) = specialize(arg, units, strip);
                    judgments.push(judgment);
                    arg
                })
                .collect();

            let judgment = if !call.func.params.is_valid(args.len()) {
                Validation::fault(
                    node.token_id,
                    FaultKind::ArgCount {
                        name: call.name.to_string(),
                        expected: call.func.params.expected(),
                        got: args.len(),
                    },
                )
            } else if let Some(Validation::Invalid(faults)) =
                Validation::merge(&judgments).filter(|m| matches!(m, Validation::Invalid(_)))
            {
                Validation::Invalid(faults)
            } else {
                let cx = ValidateCtx {
                    name: &call.name,
                    token_id: node.token_id,
                    units,
                };
                (call.func.validate)(&cx, &judgments)
            };
            let checked = call.checked && !(strip && judgment.is_valid());
            (
                Node::new(
                    node.token_id,
                    Expr::Call(CallExpr {
                        name: call.name.clone(),
                        func: call.func,
                        args,
                        checked,
                    }),
                ),
                judgment,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ParseContext;
    use crate::eval::value::Value;
    use crate::host::NoEntities;
    use crate::lexer;
    use crate::quantity::Quantity;
    use crate::unit::Unitless;
    use rstest::rstest;

    fn parse_and_fold(source: &str) -> NodeRef {
        let units = Unitless;
        let graph = NoEntities;
        let ctx = ParseContext::new(&units, &graph);
        let tokens = lexer::tokenize(source).unwrap();
        let parsed = crate::ast::parser::Parser::new(&tokens, &ctx)
            .parse_expression()
            .unwrap();
        fold(&parsed.root, &ctx, &parsed.arena)
    }

    #[rstest]
    #[case("2 + 3 * 4", 14.0)]
    #[case("(2 + 3) * 4", 20.0)]
    #[case("2 ^ 3 ^ 2", 512.0)]
    #[case("-3 + 1", -2.0)]
    #[case("1 < 2 ? 10 : 20", 10.0)]
    #[case("max(1, 7, 3)", 7.0)]
    #[case("{10, 20, 30}(2)", 20.0)]
    fn test_fold_to_constant(#[case] source: &str, #[case] expected: f64) {
        let folded = parse_and_fold(source);
        assert_eq!(
            *folded.expr,
            Expr::Constant(Value::Number(Quantity::dimensionless(expected))),
            "source: {}",
            source
        );
    }

    #[test]
    fn test_fold_failure_left_for_validation() {
        // 1/0 cannot fold; the node survives and fails at runtime instead.
        let folded = parse_and_fold("1 / 0");
        assert!(matches!(&*folded.expr, Expr::Binary { .. }));
    }

    #[test]
    fn test_impure_call_not_folded() {
        let folded = parse_and_fold("uniform(1, 2)");
        assert!(matches!(&*folded.expr, Expr::Call(_)));
    }

    #[test]
    fn test_specialize_strips_checks_on_valid_nodes() {
        let units = Unitless;
        let graph = NoEntities;
        let ctx = ParseContext::new(&units, &graph);
        let tokens = lexer::tokenize("2 + 3").unwrap();
        let parsed = crate::ast::parser::Parser::new(&tokens, &ctx)
            .parse_expression()
            .unwrap();
        // No folding: the binary node survives, and the valid judgment
        // clears its runtime-check flag.
        let (root, judgment) = specialize(&parsed.root, &units, true);
        assert_eq!(judgment, Validation::dimensionless());
        assert!(matches!(
            &*root.expr,
            Expr::Binary { checked: false, .. }
        ));

        // With strip disabled the flag stays.
        let (root, _) = specialize(&parsed.root, &units, false);
        assert!(matches!(&*root.expr, Expr::Binary { checked: true, .. }));
    }

    #[test]
    fn test_specialize_marks_valid_constant() {
        let units = Unitless;
        let folded = parse_and_fold("2 + 3");
        let (_, judgment) = specialize(&folded, &units, true);
        assert_eq!(judgment, Validation::dimensionless());
    }

    #[test]
    fn test_specialize_flags_type_error() {
        let units = Unitless;
        let folded = parse_and_fold("\"a\" == 1");
        let (_, judgment) = specialize(&folded, &units, true);
        assert!(matches!(judgment, Validation::Invalid(_)));
    }
}
