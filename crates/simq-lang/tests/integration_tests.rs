use std::sync::{Arc, OnceLock};

use std::collections::HashMap;
use simq_lang::{
    EvalContext, EvalError, HostError, InnerError, ParseContext, ParseOptions, Quantity,
    SemanticError, UnitType, Value, ValueKind,
};
use simq_test::{FnAccessor, MockGraph, ScriptedRandom, TestHost};
use simq_units::SiUnits;

fn eval_str(host: &TestHost, source: &str) -> Result<Value, simq_lang::Error> {
    let expr = simq_lang::parse_expression(&host.parse_ctx(), source)?;
    expr.evaluate(&host.eval_ctx())
}

fn number(host: &TestHost, source: &str) -> Quantity {
    match eval_str(host, source).unwrap() {
        Value::Number(q) => q,
        other => panic!("expected a number from {:?}, got {:?}", source, other),
    }
}

#[test]
fn arithmetic_precedence_and_associativity() {
    let host = TestHost::new();
    assert_eq!(number(&host, "2 + 3 * 4").value, 14.0);
    assert_eq!(number(&host, "(2 + 3) * 4").value, 20.0);
    assert_eq!(number(&host, "2 ^ 3 ^ 2").value, 512.0);
    assert_eq!(number(&host, "10 - 2 - 3").value, 5.0);
    assert_eq!(number(&host, "7 % 4").value, 3.0);
    assert_eq!(number(&host, "-2 ^ 2").value, 4.0);
}

#[test]
fn comparison_and_logic() {
    let host = TestHost::new();
    assert_eq!(number(&host, "1 < 2").value, 1.0);
    assert_eq!(number(&host, "2 <= 1").value, 0.0);
    assert_eq!(number(&host, "1 == 1 && 2 > 1").value, 1.0);
    assert_eq!(number(&host, "0 || 3").value, 1.0);
    assert_eq!(number(&host, "!0").value, 1.0);
    assert_eq!(number(&host, "1 != 2 ? 10 : 20").value, 10.0);
}

#[test]
fn unit_mismatch_fails_at_parse_time() {
    let host = TestHost::new();
    let err = simq_lang::parse_expression(&host.parse_ctx(), "1[m] + 1[s]").unwrap_err();
    assert!(matches!(err.cause, InnerError::Validate(_)), "{:?}", err);
}

#[test]
fn unit_composition() {
    let host = TestHost::new();
    let speed = host.units.dimension("Speed").unwrap();
    let q = number(&host, "3[m] / 1[s]");
    assert_eq!(q.unit, speed);
    assert_eq!(q.value, 3.0);

    // Scale factors apply at parse time; values live in base units.
    let q = number(&host, "1[km] + 1[m]");
    assert_eq!(q.value, 1001.0);
    assert_eq!(q.unit, host.units.dimension("Length").unwrap());

    let q = number(&host, "2[m/s] * 3[s]");
    assert_eq!(q.unit, host.units.dimension("Length").unwrap());
    assert_eq!(q.value, 6.0);
}

#[test]
fn unregistered_composition_is_an_error() {
    let host = TestHost::new();
    let err = simq_lang::parse_expression(&host.parse_ctx(), "1[m/s] * 1[m/s]").unwrap_err();
    assert!(matches!(err.cause, InnerError::Validate(_)));
}

#[test]
fn unknown_unit_is_a_semantic_error() {
    let host = TestHost::new();
    let err = simq_lang::parse_expression(&host.parse_ctx(), "1[parsec]").unwrap_err();
    assert!(matches!(
        err.cause,
        InnerError::Semantic(SemanticError::UnknownUnit(_, _))
    ));
}

#[test]
fn quoted_unit_suffix() {
    let host = TestHost::new();
    assert_eq!(number(&host, "2'km'").value, 2000.0);
}

#[test]
fn short_circuit_and_never_evaluates_right_side() {
    let host = TestHost::new();
    let e = host.graph.add_entity("Server");
    host.graph.set(e, "flag", Value::from(0.0));
    host.graph.set(e, "load", Value::from(1.0));

    let result = eval_str(&host, "[Server].flag && [Server].load").unwrap();
    assert_eq!(result, Value::from(0.0));
    assert_eq!(host.graph.reads(e, "flag"), 1);
    assert_eq!(host.graph.reads(e, "load"), 0);

    host.graph.set(e, "flag", Value::from(2.0));
    let result = eval_str(&host, "[Server].flag && [Server].load").unwrap();
    assert_eq!(result, Value::from(1.0));
    assert_eq!(host.graph.reads(e, "load"), 1);
}

#[test]
fn short_circuit_or() {
    let host = TestHost::new();
    let e = host.graph.add_entity("Server");
    host.graph.set(e, "flag", Value::from(1.0));
    host.graph.set(e, "load", Value::from(0.0));

    let result = eval_str(&host, "[Server].flag || [Server].load").unwrap();
    assert_eq!(result, Value::from(1.0));
    assert_eq!(host.graph.reads(e, "load"), 0);
}

#[test]
fn collections_are_one_based_with_permissive_reads() {
    let host = TestHost::new();
    assert_eq!(number(&host, "c = {10, 20, 30}; c(1)").value, 10.0);
    assert_eq!(number(&host, "c = {10, 20, 30}; c(3)").value, 30.0);
    // Out of range reads a zero of the collection's dimension.
    assert_eq!(number(&host, "c = {10, 20, 30}; c(4)").value, 0.0);
    assert_eq!(number(&host, "c = {10, 20, 30}; c(0)").value, 0.0);

    let q = number(&host, "c = {1[m], 2[m]}; c(9)");
    assert_eq!(q.unit, host.units.dimension("Length").unwrap());
    assert_eq!(q.value, 0.0);
}

#[test]
fn collection_index_of_wrong_kind_fails() {
    let host = TestHost::new();
    let err = eval_str(&host, "c = {1, 2}; c(\"x\")").unwrap_err();
    assert!(matches!(err.cause, InnerError::Eval(_)));
}

#[test]
fn higher_order_functions() {
    let host = TestHost::new();
    assert_eq!(
        eval_str(&host, "map(|x|(x*2), {1,2,3})").unwrap().to_string(),
        "{2, 4, 6}"
    );
    assert_eq!(
        eval_str(&host, "filter(|x|(x>1[unitless]), {1,2,3})")
            .unwrap()
            .to_string(),
        "{2, 3}"
    );
    assert_eq!(
        number(&host, "reduce(|v,acc|(acc+v), 0, {1,2,3})").value,
        6.0
    );
    assert_eq!(
        eval_str(&host, "map(|v,k|(v + k), {10, 20})").unwrap().to_string(),
        "{11, 22}"
    );
    assert_eq!(
        eval_str(&host, "sort(|a,b|(a < b), {3,1,2})").unwrap().to_string(),
        "{1, 2, 3}"
    );
}

#[test]
fn map_requires_unit_agreement_across_results() {
    let host = TestHost::new();
    let err = eval_str(&host, "map(|x|(x), {1[m], 1[s]})").unwrap_err();
    assert!(matches!(err.cause, InnerError::Eval(EvalError::Check(_, _))));
}

#[test]
fn lambdas_capture_by_value() {
    let host = TestHost::new();
    assert_eq!(number(&host, "a = 5; f = |x|(x + a); f(2)").value, 7.0);
    // Transitive capture through a nested lambda.
    assert_eq!(
        number(&host, "a = 1; g = |x|(|y|(x + y + a)); g(2)(3)").value,
        6.0
    );
    // Shadowing: the inner binding wins.
    assert_eq!(number(&host, "a = 1; a = 2; a").value, 2.0);
}

#[test]
fn lambda_arity_is_enforced() {
    let host = TestHost::new();
    let err = eval_str(&host, "f = |x, y|(x + y); f(1)").unwrap_err();
    assert!(matches!(
        err.cause,
        InnerError::Eval(EvalError::LambdaArity(_, 2, 1))
    ));
}

#[test]
fn aggregates() {
    let host = TestHost::new();
    assert_eq!(number(&host, "max(1, 7, 3)").value, 7.0);
    assert_eq!(number(&host, "min(1[m], 3[m])").value, 1.0);
    assert_eq!(number(&host, "indexOfMax(1, 7, 3)").value, 2.0);
    assert_eq!(number(&host, "sum({1, 2, 3})").value, 6.0);
    assert_eq!(number(&host, "sum({})").value, 0.0);
    assert_eq!(number(&host, "maxCol({4, 9, 2})").value, 9.0);
    assert_eq!(number(&host, "indexOfMinCol({4, 9, 2})").value, 3.0);
    assert_eq!(number(&host, "indexOfNearest({10, 20, 30}, 24)").value, 2.0);
    assert_eq!(number(&host, "indexOf({5, 6, 7}, 6)").value, 2.0);
    assert_eq!(number(&host, "indexOf({5, 6, 7}, 9)").value, 0.0);

    let err = eval_str(&host, "maxCol({})").unwrap_err();
    assert!(matches!(
        err.cause,
        InnerError::Eval(EvalError::EmptyCollection(_, _))
    ));
}

#[test]
fn aggregate_unit_mismatch() {
    let host = TestHost::new();
    let err = simq_lang::parse_expression(&host.parse_ctx(), "max(1[m], 1[s])").unwrap_err();
    assert!(matches!(err.cause, InnerError::Validate(_)));

    // Mixed units inside a collection surface at runtime.
    let err = eval_str(&host, "sum({1[m], 1[s]})").unwrap_err();
    assert!(matches!(err.cause, InnerError::Eval(EvalError::Check(_, _))));
}

#[test]
fn string_functions() {
    let host = TestHost::new();
    assert_eq!(
        eval_str(&host, "substring(\"hello\", 2, 4)").unwrap(),
        Value::from("el")
    );
    // Clamped rather than out-of-range errors.
    assert_eq!(
        eval_str(&host, "substring(\"hello\", 4, 99)").unwrap(),
        Value::from("lo")
    );
    assert_eq!(
        eval_str(&host, "substring(\"hello\", 2)").unwrap(),
        Value::from("ello")
    );
    assert_eq!(number(&host, "indexOfStr(\"hello\", \"ll\")").value, 3.0);
    assert_eq!(number(&host, "indexOfStr(\"hello\", \"xyz\")").value, 0.0);
    assert_eq!(number(&host, "length(\"hello\")").value, 5.0);
    assert_eq!(number(&host, "length({1, 2})").value, 2.0);
    assert_eq!(
        eval_str(&host, "split(\"a,b,c\", \",\")").unwrap().to_string(),
        r#"{"a", "b", "c"}"#
    );
    assert_eq!(
        eval_str(&host, "toUpperCase(trim(\" abc \"))").unwrap(),
        Value::from("ABC")
    );
    assert_eq!(
        eval_str(&host, "format(\"%s is %.2f\", \"pi\", PI)").unwrap(),
        Value::from("pi is 3.14")
    );
    assert_eq!(number(&host, "parseNumber(\"2.5\")").value, 2.5);
}

#[test]
fn format_rejects_dimensioned_numbers() {
    let host = TestHost::new();
    let err = simq_lang::parse_expression(&host.parse_ctx(), "format(\"%f\", 1[m])").unwrap_err();
    assert!(matches!(err.cause, InnerError::Validate(_)));
}

#[test]
fn math_and_constants() {
    let host = TestHost::new();
    assert_eq!(number(&host, "abs(-3[m])").value, 3.0);
    assert_eq!(number(&host, "floor(2.7)").value, 2.0);
    assert!((number(&host, "sin(PI / 2)").value - 1.0).abs() < 1e-12);
    assert!((number(&host, "sin(90[deg])").value - 1.0).abs() < 1e-12);
    assert!((number(&host, "exp(1) - E").value).abs() < 1e-12);
    assert_eq!(number(&host, "sqrt(16)").value, 4.0);

    // Inverse trig produces the host's angle dimension.
    let q = number(&host, "atan(1)");
    assert_eq!(q.unit, host.units.dimension("Angle").unwrap());

    let err = simq_lang::parse_expression(&host.parse_ctx(), "sqrt(1[m])").unwrap_err();
    assert!(matches!(err.cause, InnerError::Validate(_)));
}

#[test]
fn choose_and_range() {
    let host = TestHost::new();
    assert_eq!(number(&host, "choose(2, 10, 20, 30)").value, 20.0);
    assert_eq!(
        eval_str(&host, "range(4)").unwrap().to_string(),
        "{1, 2, 3, 4}"
    );
    assert_eq!(
        eval_str(&host, "range(2, 8, 3)").unwrap().to_string(),
        "{2, 5, 8}"
    );
    let err = eval_str(&host, "choose(4, 1, 2)").unwrap_err();
    assert!(matches!(
        err.cause,
        InnerError::Eval(EvalError::ChooseOutOfRange(_, 4, 2))
    ));
}

#[test]
fn typed_equality_never_coerces() {
    let host = TestHost::new();
    let err = simq_lang::parse_expression(&host.parse_ctx(), "\"a\" == 1").unwrap_err();
    assert!(matches!(err.cause, InnerError::Validate(_)));

    let err = simq_lang::parse_expression(&host.parse_ctx(), "1[m] == 1[s]").unwrap_err();
    assert!(matches!(err.cause, InnerError::Validate(_)));

    assert_eq!(number(&host, "2[m] == 2[m]").value, 1.0);
    assert_eq!(number(&host, "\"a\" != \"b\"").value, 1.0);

    // The same rule holds at runtime for late-bound operands.
    let e = host.graph.add_entity("Box");
    host.graph.set(e, "label", Value::from("a"));
    let err = eval_str(&host, "[Box].label == 1").unwrap_err();
    assert!(matches!(err.cause, InnerError::Eval(EvalError::Check(_, _))));
}

#[test]
fn property_access_reads_current_state() {
    let host = TestHost::new();
    let e = host.graph.add_entity("Tank");
    host.graph.set(e, "level", Value::Number(Quantity::new(2.0, UnitType(1))));

    let expr = simq_lang::parse_expression(&host.parse_ctx(), "[Tank].level").unwrap();
    assert_eq!(
        expr.evaluate(&host.eval_ctx()).unwrap(),
        Value::Number(Quantity::new(2.0, UnitType(1)))
    );

    // Late-bound state: a second evaluation of the same compiled expression
    // sees the updated value.
    host.graph.set(e, "level", Value::Number(Quantity::new(5.0, UnitType(1))));
    assert_eq!(
        expr.evaluate(&host.eval_ctx()).unwrap(),
        Value::Number(Quantity::new(5.0, UnitType(1)))
    );
}

#[test]
fn expression_stays_usable_after_an_evaluation_error() {
    let host = TestHost::new();
    let e = host.graph.add_entity("Tank");
    host.graph.set(e, "level", Value::from(0.0));

    let expr = simq_lang::parse_expression(&host.parse_ctx(), "1 / [Tank].level").unwrap();
    assert!(expr.evaluate(&host.eval_ctx()).is_err());

    host.graph.set(e, "level", Value::from(2.0));
    assert_eq!(expr.evaluate(&host.eval_ctx()).unwrap(), Value::from(0.5));
}

#[test]
fn reentrant_evaluation_is_detected() {
    let units = Arc::new(SiUnits::new());
    let graph = Arc::new(MockGraph::new());
    let random = Arc::new(ScriptedRandom::inactive());
    let entity = graph.add_entity("Loop");

    let expr_cell: Arc<OnceLock<Arc<simq_lang::Expression>>> = Arc::new(OnceLock::new());
    {
        let units = Arc::clone(&units);
        let graph_for_closure = Arc::clone(&graph);
        let random = Arc::clone(&random);
        let expr_cell = Arc::clone(&expr_cell);
        graph.set_accessor(
            "cycle",
            Arc::new(FnAccessor(move |_| {
                let env = EvalContext::new(&*units, &*graph_for_closure, &*random);
                match expr_cell.get() {
                    Some(expr) => expr.evaluate(&env).map_err(|e| {
                        HostError::Other(e.to_string())
                    }),
                    None => Ok(Value::from(0.0)),
                }
            })),
        );
    }

    let ctx = ParseContext::new(&*units, &*graph);
    let expr = Arc::new(simq_lang::parse_expression(&ctx, "[Loop].cycle + 1").unwrap());
    expr_cell.set(Arc::clone(&expr)).ok();

    let env = EvalContext::new(&*units, &*graph, &*random);
    let err = expr.evaluate(&env).unwrap_err();
    // The inner evaluation failed with the self-recursion error, which the
    // accessor surfaced as a host failure; nothing overflowed.
    assert!(
        err.to_string().contains("already being evaluated"),
        "{}",
        err
    );
    let _ = entity;
}

#[test]
fn deep_lambda_recursion_hits_the_depth_limit() {
    // A lambda applying its own argument to itself recurses forever; the
    // depth limit turns that into an error instead of a stack overflow.
    let host = TestHost::new();
    let expr = simq_lang::parse_expression(&host.parse_ctx(), "f = |x|(x(x)); f(f)").unwrap();
    let mut env = host.eval_ctx();
    env.options.max_depth = 16;
    let err = expr.evaluate(&env).unwrap_err();
    assert!(matches!(
        err.cause,
        InnerError::Eval(EvalError::RecursionLimit(_, 16))
    ));
}

#[test]
fn constant_folding_is_behavior_preserving() {
    let host = TestHost::new();
    let sources = [
        "2 + 3 * 4",
        "max(1, 2) + min(3, 4)",
        "{1, 2, 3}(2) * 10",
        "substring(\"hello\", 2, 4)",
        "1 < 2 ? sqrt(16) : 0",
        "sum({1, 2, 3}) == 6 ? 1 : 0",
    ];
    for source in sources {
        let optimized = eval_str(&host, source).unwrap();

        let mut ctx = host.parse_ctx();
        ctx.options = ParseOptions { optimize: false };
        let plain = simq_lang::parse_expression(&ctx, source)
            .unwrap()
            .evaluate(&host.eval_ctx())
            .unwrap();
        assert_eq!(optimized, plain, "source: {}", source);
    }
}

#[test]
fn random_functions_return_zero_outside_a_run() {
    let host = TestHost::new();
    let q = number(&host, "normal(5[m], 1[m])");
    assert_eq!(q.value, 0.0);
    assert_eq!(q.unit, host.units.dimension("Length").unwrap());
}

#[test]
fn random_functions_draw_from_keyed_streams() {
    let units = SiUnits::new();
    let graph = MockGraph::new();
    let random = ScriptedRandom::active([0.5]);
    let ctx = ParseContext::new(&units, &graph);
    let expr = simq_lang::parse_expression(&ctx, "uniform(10, 20, 3)").unwrap();

    let env = EvalContext::new(&units, &graph, &random).with_caller("Server1");
    assert_eq!(expr.evaluate(&env).unwrap(), Value::from(15.0));
    assert_eq!(
        random.requests(),
        vec![(3, "uniform".to_string(), "Server1".to_string())]
    );
}

#[test]
fn assignments() {
    let host = TestHost::new();
    let e = host.graph.add_entity("Tank");

    let assignment =
        simq_lang::parse_assignment(&host.parse_ctx(), "[Tank].mass = 2[kg] + 3[kg]").unwrap();
    let value = assignment.evaluate(&host.eval_ctx()).unwrap();
    assert_eq!(
        value,
        Value::Number(Quantity::new(5.0, host.units.dimension("Mass").unwrap()))
    );
    assert_eq!(host.graph.writes(e, "mass"), 1);

    // One trailing index is allowed.
    let assignment =
        simq_lang::parse_assignment(&host.parse_ctx(), "[Tank].level(2) = 7").unwrap();
    assignment.evaluate(&host.eval_ctx()).unwrap();
    assert_eq!(host.graph.writes(e, "level(2)"), 1);
}

#[test]
fn malformed_assignment_targets() {
    let host = TestHost::new();
    host.graph.add_entity("Tank");

    for source in [
        "[Tank] = 1",
        "[Tank].a(1)(2) = 1",
        "1 + 1 = 2",
        "{1, 2} = 3",
    ] {
        let err = simq_lang::parse_assignment(&host.parse_ctx(), source).unwrap_err();
        assert!(
            matches!(
                err.cause,
                InnerError::Semantic(SemanticError::BadAssignmentTarget(_))
            ),
            "source: {} -> {:?}",
            source,
            err
        );
    }
}

#[test]
fn assignment_value_is_validated() {
    let host = TestHost::new();
    host.graph.add_entity("Tank");
    let err =
        simq_lang::parse_assignment(&host.parse_ctx(), "[Tank].mass = 1[kg] + 1[s]").unwrap_err();
    assert!(matches!(err.cause, InnerError::Validate(_)));
}

#[test]
fn rename_round_trip() {
    let host = TestHost::new();
    let box1 = host.graph.add_entity("Box1");
    host.graph.set(box1, "mass", Value::from(5.0));
    let crate1 = host.graph.add_entity("Crate1");
    host.graph.set(crate1, "mass", Value::from(9.0));

    let expr = simq_lang::parse_expression(&host.parse_ctx(), "[Box1].mass * 2").unwrap();
    assert_eq!(expr.evaluate(&host.eval_ctx()).unwrap(), Value::from(10.0));

    // No renames: the source survives verbatim and re-parses identically.
    let same = expr.source_with_renames(&HashMap::new());
    assert_eq!(same, expr.source());
    let reparsed = simq_lang::parse_expression(&host.parse_ctx(), &same).unwrap();
    assert_eq!(reparsed.evaluate(&host.eval_ctx()).unwrap(), Value::from(10.0));

    // Renamed: the literal is rewritten and the new expression reads the
    // other entity.
    let mut renames = HashMap::new();
    renames.insert("Box1".to_string(), "Crate1".to_string());
    let renamed = expr.source_with_renames(&renames);
    assert_eq!(renamed, "[Crate1].mass * 2");
    let reparsed = simq_lang::parse_expression(&host.parse_ctx(), &renamed).unwrap();
    assert_eq!(reparsed.evaluate(&host.eval_ctx()).unwrap(), Value::from(18.0));
}

#[test]
fn post_hoc_assertions() {
    let host = TestHost::new();
    let length = host.units.dimension("Length").unwrap();
    let time = host.units.dimension("Time").unwrap();

    let expr = simq_lang::parse_expression(&host.parse_ctx(), "3[m] + 1[m]").unwrap();
    assert!(expr.assert_kind(ValueKind::Number).is_ok());
    assert!(expr.assert_unit(length, &host.units).is_ok());
    assert!(expr.assert_unit(time, &host.units).is_err());

    let expr = simq_lang::parse_expression(&host.parse_ctx(), "\"a\"").unwrap();
    assert!(expr.assert_kind(ValueKind::Number).is_err());

    // Undecidable judgments pass; the check is deferred to runtime.
    let e = host.graph.add_entity("Tank");
    host.graph.set(e, "level", Value::from(1.0));
    let expr = simq_lang::parse_expression(&host.parse_ctx(), "[Tank].level").unwrap();
    assert!(expr.assert_kind(ValueKind::String).is_ok());
}

#[test]
fn error_positions_point_into_the_source() {
    let host = TestHost::new();
    let err = simq_lang::parse_expression(&host.parse_ctx(), "1 + nope").unwrap_err();
    assert!(matches!(
        err.cause,
        InnerError::Semantic(SemanticError::UnknownIdentifier(_, _))
    ));
    assert_eq!(err.location.offset(), 4);
    assert_eq!(err.location.len(), 4);
    assert_eq!(err.source_code, "1 + nope");
}

#[test]
fn unknown_entity_fails_at_parse_time() {
    let host = TestHost::new();
    let err = simq_lang::parse_expression(&host.parse_ctx(), "[Ghost].mass").unwrap_err();
    assert!(matches!(
        err.cause,
        InnerError::Semantic(SemanticError::UnknownEntity(_, _))
    ));
}

#[test]
fn concurrent_evaluation_of_one_expression() {
    let units = Arc::new(SiUnits::new());
    let graph = Arc::new(MockGraph::new());
    let e = graph.add_entity("Tank");
    graph.set(e, "level", Value::from(21.0));

    let ctx = ParseContext::new(&*units, &*graph);
    let expr = Arc::new(simq_lang::parse_expression(&ctx, "[Tank].level * 2").unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let units = Arc::clone(&units);
            let graph = Arc::clone(&graph);
            let expr = Arc::clone(&expr);
            std::thread::spawn(move || {
                let random = ScriptedRandom::inactive();
                let env = EvalContext::new(&*units, &*graph, &random);
                expr.evaluate(&env).unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Value::from(42.0));
    }
}
