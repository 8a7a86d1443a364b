//! The builtin function library.
//!
//! One static table, populated once at first use and read-only afterwards.
//! Each entry carries an arity contract, a purity flag (impure entries are
//! never constant-folded), a static validator over tri-state judgments, and
//! the runtime evaluator.

use std::cmp::Ordering;
use std::sync::{Arc, LazyLock};

use rustc_hash::FxHashMap;

use crate::ast::node::TokenId;
use crate::eval::error::EvalError;
use crate::eval::value::{Collection, LambdaClosure, Value, ValueKind};
use crate::eval::{EvalState, apply_lambda};
use crate::lexer::token::Token;
use crate::quantity::Quantity;
use crate::unit::{UnitProvider, UnitType};
use crate::validate::{FaultKind, Validation};

type EvalFn = fn(&mut EvalState, &Token, &[Value]) -> Result<Value, EvalError>;
type ValidateFn = fn(&ValidateCtx, &[Validation]) -> Validation;

/// What a validator callback gets to see: the call's name and token for
/// diagnostics, and the unit table.
pub struct ValidateCtx<'a> {
    pub name: &'a str,
    pub token_id: TokenId,
    pub units: &'a dyn UnitProvider,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamNum {
    Fixed(u8),
    Range(u8, u8),
    Variadic(u8),
}

impl ParamNum {
    #[inline(always)]
    pub fn is_valid(&self, num_args: usize) -> bool {
        match self {
            ParamNum::Fixed(n) => num_args == *n as usize,
            ParamNum::Range(min, max) => num_args >= *min as usize && num_args <= *max as usize,
            ParamNum::Variadic(min) => num_args >= *min as usize,
        }
    }

    pub fn expected(&self) -> String {
        match self {
            ParamNum::Fixed(n) => n.to_string(),
            ParamNum::Range(min, max) => format!("{} to {}", min, max),
            ParamNum::Variadic(min) => format!("at least {}", min),
        }
    }
}

pub struct BuiltinFunction {
    pub params: ParamNum,
    /// Pure entries may be evaluated at parse time when all arguments fold
    /// to constants.
    pub pure: bool,
    pub validate: ValidateFn,
    pub eval: EvalFn,
}

impl BuiltinFunction {
    const fn new(params: ParamNum, pure: bool, validate: ValidateFn, eval: EvalFn) -> Self {
        BuiltinFunction {
            params,
            pure,
            validate,
            eval,
        }
    }
}

impl std::fmt::Debug for BuiltinFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinFunction")
            .field("params", &self.params)
            .field("pure", &self.pure)
            .finish_non_exhaustive()
    }
}

pub fn find(name: &str) -> Option<&'static BuiltinFunction> {
    let registry: &'static FxHashMap<&'static str, BuiltinFunction> = &BUILTIN_FUNCTIONS;
    registry.get(name)
}

// --- runtime argument helpers ----------------------------------------------

fn kind_fault(token: &Token, name: &str, value: &Value) -> EvalError {
    EvalError::Check(
        token.clone(),
        FaultKind::KindMismatch {
            op: name.to_string(),
            got: value.type_name().to_string(),
        },
    )
}

fn expect_number<'v>(token: &Token, name: &str, value: &'v Value) -> Result<&'v Quantity, EvalError> {
    value.as_number().ok_or_else(|| kind_fault(token, name, value))
}

fn expect_dimensionless(token: &Token, name: &str, value: &Value) -> Result<f64, EvalError> {
    let q = expect_number(token, name, value)?;
    if q.unit.is_dimensionless() {
        Ok(q.value)
    } else {
        Err(EvalError::Check(
            token.clone(),
            FaultKind::NotDimensionless {
                op: name.to_string(),
                got: "a dimensioned number".to_string(),
            },
        ))
    }
}

fn expect_string<'v>(token: &Token, name: &str, value: &'v Value) -> Result<&'v str, EvalError> {
    value.as_string().ok_or_else(|| kind_fault(token, name, value))
}

fn expect_collection<'v>(
    token: &Token,
    name: &str,
    value: &'v Value,
) -> Result<&'v Arc<Collection>, EvalError> {
    value
        .as_collection()
        .ok_or_else(|| kind_fault(token, name, value))
}

fn expect_lambda(token: &Token, name: &str, value: &Value) -> Result<Arc<LambdaClosure>, EvalError> {
    match value {
        Value::Lambda(closure) => Ok(Arc::clone(closure)),
        other => Err(kind_fault(token, name, other)),
    }
}

fn require_same_unit(
    token: &Token,
    name: &str,
    a: UnitType,
    b: UnitType,
    units: &dyn UnitProvider,
) -> Result<(), EvalError> {
    if a == b {
        Ok(())
    } else {
        Err(EvalError::Check(
            token.clone(),
            FaultKind::UnitMismatch {
                op: name.to_string(),
                left: units.describe(a),
                right: units.describe(b),
            },
        ))
    }
}

// --- static validation helpers ---------------------------------------------

fn fault(cx: &ValidateCtx, kind: FaultKind) -> Validation {
    Validation::fault(cx.token_id, kind)
}

/// Positional kind check; `None` accepts any kind, and the last entry repeats
/// for variadic tails. Returns whether any argument was undecidable.
fn check_kinds(
    cx: &ValidateCtx,
    args: &[Validation],
    expected: &[Option<ValueKind>],
) -> Result<bool, Validation> {
    let mut undecidable = false;
    for (i, judgment) in args.iter().enumerate() {
        match judgment {
            Validation::Undecidable => undecidable = true,
            Validation::Valid { kind, .. } => {
                if let Some(want) = expected[i.min(expected.len() - 1)] {
                    if *kind != want {
                        return Err(fault(
                            cx,
                            FaultKind::KindMismatch {
                                op: cx.name.to_string(),
                                got: kind.name().to_string(),
                            },
                        ));
                    }
                }
            }
            Validation::Invalid(faults) => return Err(Validation::Invalid(faults.clone())),
        }
    }
    Ok(undecidable)
}

/// Unit agreement across `positions`. `Ok(None)` when any of them is
/// undecidable.
fn check_same_unit(
    cx: &ValidateCtx,
    args: &[Validation],
    positions: std::ops::Range<usize>,
) -> Result<Option<UnitType>, Validation> {
    let mut unit: Option<UnitType> = None;
    for i in positions {
        let Some(judgment) = args.get(i) else { break };
        match judgment {
            Validation::Undecidable => return Ok(None),
            Validation::Valid { unit: u, .. } => match unit {
                None => unit = Some(*u),
                Some(prev) if prev != *u => {
                    return Err(fault(
                        cx,
                        FaultKind::UnitMismatch {
                            op: cx.name.to_string(),
                            left: cx.units.describe(prev),
                            right: cx.units.describe(*u),
                        },
                    ));
                }
                _ => {}
            },
            Validation::Invalid(faults) => return Err(Validation::Invalid(faults.clone())),
        }
    }
    Ok(unit)
}

fn check_dimensionless(
    cx: &ValidateCtx,
    args: &[Validation],
    position: usize,
) -> Result<(), Validation> {
    if let Some(Validation::Valid { unit, .. }) = args.get(position) {
        if !unit.is_dimensionless() {
            return Err(fault(
                cx,
                FaultKind::NotDimensionless {
                    op: cx.name.to_string(),
                    got: cx.units.describe(*unit),
                },
            ));
        }
    }
    Ok(())
}

const NUMBER: Option<ValueKind> = Some(ValueKind::Number);
const STRING: Option<ValueKind> = Some(ValueKind::String);
const COLLECTION: Option<ValueKind> = Some(ValueKind::Collection);
const LAMBDA: Option<ValueKind> = Some(ValueKind::Lambda);
const ANY: Option<ValueKind> = None;

/// All-numbers, one shared dimension; result carries that dimension.
fn v_numbers_same_unit(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[NUMBER]) {
        Err(v) => v,
        Ok(_) => match check_same_unit(cx, args, 0..args.len()) {
            Err(v) => v,
            Ok(Some(unit)) => Validation::number(unit),
            Ok(None) => Validation::Undecidable,
        },
    }
}

/// All-numbers, one shared dimension; result is a 1-based index.
fn v_numbers_index(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[NUMBER]) {
        Err(v) => v,
        Ok(und) => match check_same_unit(cx, args, 0..args.len()) {
            Err(v) => v,
            Ok(Some(_)) if !und => Validation::dimensionless(),
            _ => Validation::Undecidable,
        },
    }
}

/// A collection aggregate: the element dimension is not known statically.
fn v_collection_agg(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[COLLECTION]) {
        Err(v) => v,
        Ok(_) => Validation::Undecidable,
    }
}

fn v_collection_probe(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[COLLECTION, ANY]) {
        Err(v) => v,
        Ok(_) => Validation::Undecidable,
    }
}

fn v_index_of_nearest(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[COLLECTION, NUMBER]) {
        Err(v) => v,
        Ok(_) => Validation::Undecidable,
    }
}

fn v_higher_order(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[LAMBDA, COLLECTION]) {
        Err(v) => v,
        Ok(false) => Validation::valid(ValueKind::Collection, UnitType::DIMENSIONLESS),
        Ok(true) => Validation::Undecidable,
    }
}

fn v_reduce(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[LAMBDA, ANY, COLLECTION]) {
        Err(v) => v,
        Ok(_) => Validation::Undecidable,
    }
}

fn v_string_to_string(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[STRING]) {
        Err(v) => v,
        Ok(false) => Validation::valid(ValueKind::String, UnitType::DIMENSIONLESS),
        Ok(true) => Validation::Undecidable,
    }
}

fn v_substring(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[STRING, NUMBER, NUMBER]) {
        Err(v) => v,
        Ok(und) => {
            for i in 1..args.len() {
                if let Err(v) = check_dimensionless(cx, args, i) {
                    return v;
                }
            }
            if und {
                Validation::Undecidable
            } else {
                Validation::valid(ValueKind::String, UnitType::DIMENSIONLESS)
            }
        }
    }
}

fn v_index_of_str(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[STRING, STRING]) {
        Err(v) => v,
        Ok(false) => Validation::dimensionless(),
        Ok(true) => Validation::Undecidable,
    }
}

fn v_split(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[STRING, STRING]) {
        Err(v) => v,
        Ok(false) => Validation::valid(ValueKind::Collection, UnitType::DIMENSIONLESS),
        Ok(true) => Validation::Undecidable,
    }
}

fn v_length(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match &args[0] {
        Validation::Undecidable => Validation::Undecidable,
        Validation::Valid { kind, .. }
            if matches!(kind, ValueKind::String | ValueKind::Collection) =>
        {
            Validation::dimensionless()
        }
        Validation::Valid { kind, .. } => fault(
            cx,
            FaultKind::KindMismatch {
                op: cx.name.to_string(),
                got: kind.name().to_string(),
            },
        ),
        Validation::Invalid(faults) => Validation::Invalid(faults.clone()),
    }
}

/// `format` requires every numeric argument to be dimensionless.
fn v_format(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[STRING, ANY]) {
        Err(v) => v,
        Ok(und) => {
            for (i, judgment) in args.iter().enumerate().skip(1) {
                if matches!(judgment, Validation::Valid { kind: ValueKind::Number, .. }) {
                    if let Err(v) = check_dimensionless(cx, args, i) {
                        return v;
                    }
                }
            }
            if und {
                Validation::Undecidable
            } else {
                Validation::valid(ValueKind::String, UnitType::DIMENSIONLESS)
            }
        }
    }
}

fn v_parse_number(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[STRING]) {
        Err(v) => v,
        Ok(false) => Validation::dimensionless(),
        Ok(true) => Validation::Undecidable,
    }
}

/// Distribution functions: `dist` leading parameters share one dimension,
/// and the optional trailing seed is dimensionless.
fn v_random(cx: &ValidateCtx, args: &[Validation], dist: usize) -> Validation {
    match check_kinds(cx, args, &[NUMBER]) {
        Err(v) => v,
        Ok(_) => {
            for i in dist..args.len() {
                if let Err(v) = check_dimensionless(cx, args, i) {
                    return v;
                }
            }
            match check_same_unit(cx, args, 0..dist) {
                Err(v) => v,
                Ok(Some(unit)) => Validation::number(unit),
                Ok(None) => Validation::Undecidable,
            }
        }
    }
}

fn v_random1(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    v_random(cx, args, 1)
}

fn v_random2(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    v_random(cx, args, 2)
}

fn v_random3(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    v_random(cx, args, 3)
}

fn v_math_dimensionless(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[NUMBER]) {
        Err(v) => v,
        Ok(und) => {
            if let Err(v) = check_dimensionless(cx, args, 0) {
                return v;
            }
            if und {
                Validation::Undecidable
            } else {
                Validation::dimensionless()
            }
        }
    }
}

fn v_math_same_unit(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[NUMBER]) {
        Err(v) => v,
        Ok(_) => match &args[0] {
            Validation::Valid { unit, .. } => Validation::number(*unit),
            _ => Validation::Undecidable,
        },
    }
}

/// Trig accepts dimensionless operands or the host's angle dimension.
fn v_trig(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[NUMBER]) {
        Err(v) => v,
        Ok(und) => match &args[0] {
            Validation::Valid { unit, .. }
                if !unit.is_dimensionless() && !cx.units.is_angle(*unit) =>
            {
                fault(
                    cx,
                    FaultKind::NotDimensionless {
                        op: cx.name.to_string(),
                        got: cx.units.describe(*unit),
                    },
                )
            }
            _ if und => Validation::Undecidable,
            _ => Validation::dimensionless(),
        },
    }
}

fn v_inverse_trig(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match v_math_dimensionless(cx, args) {
        Validation::Valid { .. } => {
            Validation::number(cx.units.angle_unit().unwrap_or(UnitType::DIMENSIONLESS))
        }
        other => other,
    }
}

/// `choose(k, v1..vn)`: `k` dimensionless, all alternatives of one kind and
/// dimension; the result judgment is the alternatives' judgment.
fn v_choose(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    if let Some(Validation::Valid { kind, .. }) = args.first() {
        if *kind != ValueKind::Number {
            return fault(
                cx,
                FaultKind::KindMismatch {
                    op: cx.name.to_string(),
                    got: kind.name().to_string(),
                },
            );
        }
    }
    if let Err(v) = check_dimensionless(cx, args, 0) {
        return v;
    }
    let mut alternative: Option<(ValueKind, UnitType)> = None;
    let mut undecidable = matches!(args[0], Validation::Undecidable);
    for judgment in &args[1..] {
        match judgment {
            Validation::Undecidable => undecidable = true,
            Validation::Valid { kind, unit } => match alternative {
                None => alternative = Some((*kind, *unit)),
                Some((k, _)) if k != *kind => {
                    return fault(
                        cx,
                        FaultKind::KindMismatch {
                            op: cx.name.to_string(),
                            got: format!("{}, {}", k.name(), kind.name()),
                        },
                    );
                }
                Some((ValueKind::Number, u)) if u != *unit => {
                    return fault(
                        cx,
                        FaultKind::UnitMismatch {
                            op: cx.name.to_string(),
                            left: cx.units.describe(u),
                            right: cx.units.describe(*unit),
                        },
                    );
                }
                _ => {}
            },
            Validation::Invalid(faults) => return Validation::Invalid(faults.clone()),
        }
    }
    match alternative {
        Some((kind, unit)) if !undecidable => Validation::valid(kind, unit),
        _ => Validation::Undecidable,
    }
}

fn v_range(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[NUMBER]) {
        Err(v) => v,
        Ok(und) => {
            if args.len() == 1 {
                if let Err(v) = check_dimensionless(cx, args, 0) {
                    return v;
                }
            } else if let Err(v) = check_same_unit(cx, args, 0..args.len()) {
                return v;
            }
            if und {
                Validation::Undecidable
            } else {
                Validation::valid(ValueKind::Collection, UnitType::DIMENSIONLESS)
            }
        }
    }
}

fn v_not_null(cx: &ValidateCtx, args: &[Validation]) -> Validation {
    match check_kinds(cx, args, &[Some(ValueKind::Entity)]) {
        Err(v) => v,
        Ok(false) => Validation::dimensionless(),
        Ok(true) => Validation::Undecidable,
    }
}

/// `typeName` accepts anything; the result is always a string.
fn v_type_name(_cx: &ValidateCtx, _args: &[Validation]) -> Validation {
    Validation::valid(ValueKind::String, UnitType::DIMENSIONLESS)
}

// --- runtime helpers --------------------------------------------------------

fn extremal(
    token: &Token,
    name: &str,
    args: &[Value],
    winner: Ordering,
    units: &dyn UnitProvider,
) -> Result<(usize, Quantity), EvalError> {
    let first = expect_number(token, name, &args[0])?;
    let mut best = (0usize, *first);
    for (i, arg) in args.iter().enumerate().skip(1) {
        let q = expect_number(token, name, arg)?;
        require_same_unit(token, name, first.unit, q.unit, units)?;
        if q.cmp_value(&best.1) == winner {
            best = (i, *q);
        }
    }
    Ok(best)
}

/// Iterates a collection once, requiring every element to be a number of the
/// first element's dimension; yields the extremal entry's key and value.
fn extremal_col(
    state: &EvalState,
    token: &Token,
    name: &str,
    collection: &Collection,
    winner: Ordering,
) -> Result<(Value, Quantity), EvalError> {
    let mut best: Option<(Value, Quantity)> = None;
    for (key, value) in collection.entries() {
        let q = expect_number(token, name, value)?;
        match &mut best {
            None => best = Some((key, *q)),
            Some((best_key, best_q)) => {
                require_same_unit(token, name, best_q.unit, q.unit, state.env.units)?;
                if q.cmp_value(best_q) == winner {
                    *best_key = key;
                    *best_q = *q;
                }
            }
        }
    }
    best.ok_or_else(|| EvalError::EmptyCollection(token.clone(), name.to_string()))
}

/// Optional trailing dimensionless seed argument; defaults to 0.
fn opt_seed(token: &Token, name: &str, args: &[Value], base: usize) -> Result<i64, EvalError> {
    match args.get(base) {
        Some(value) => Ok(expect_dimensionless(token, name, value)? as i64),
        None => Ok(0),
    }
}

/// One uniform draw from the stream keyed by `(seed, name, caller)`, or
/// `None` when no simulation run is active.
fn draws(state: &EvalState, name: &str, seed: i64, n: usize) -> Option<Vec<f64>> {
    if !state.env.random.run_active() {
        return None;
    }
    let stream = state.env.random.stream(seed, name, &state.env.caller);
    Some((0..n).map(|_| stream.next_uniform()).collect())
}

fn map_filter_args(
    closure: &LambdaClosure,
    key: &Value,
    value: &Value,
    token: &Token,
    name: &str,
) -> Result<Vec<Value>, EvalError> {
    match closure.arity {
        1 => Ok(vec![value.clone()]),
        2 => Ok(vec![value.clone(), key.clone()]),
        n => Err(EvalError::Runtime(
            token.clone(),
            format!("\"{}\" lambda must take 1 or 2 parameters, has {}", name, n),
        )),
    }
}

/// A tiny `%`-style formatter: `%s`, `%d`, `%f`, `%e` with optional width and
/// precision, plus `%%`. Numeric conversions require dimensionless numbers.
fn format_impl(
    token: &Token,
    fmt: &str,
    args: &[Value],
) -> Result<String, EvalError> {
    let mut out = String::with_capacity(fmt.len() + 16);
    let mut chars = fmt.chars().peekable();
    let mut next_arg = 0usize;

    let mut take = |next_arg: &mut usize| -> Result<Value, EvalError> {
        let value = args.get(*next_arg).cloned().ok_or_else(|| {
            EvalError::Runtime(
                token.clone(),
                format!("format string expects more than {} argument(s)", args.len()),
            )
        })?;
        *next_arg += 1;
        Ok(value)
    };

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        let mut width = String::new();
        while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
            width.push(chars.next().unwrap_or('0'));
        }
        let mut precision = String::new();
        if chars.peek() == Some(&'.') {
            chars.next();
            while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                precision.push(chars.next().unwrap_or('0'));
            }
        }
        let width: usize = width.parse().unwrap_or(0);
        let conv = chars.next().ok_or_else(|| {
            EvalError::Runtime(token.clone(), "dangling % in format string".to_string())
        })?;
        let piece = match conv {
            's' => take(&mut next_arg)?.to_string(),
            'd' => {
                let v = expect_dimensionless(token, "format", &take(&mut next_arg)?)?;
                format!("{}", v.round() as i64)
            }
            'f' => {
                let v = expect_dimensionless(token, "format", &take(&mut next_arg)?)?;
                let precision: usize = precision.parse().unwrap_or(6);
                format!("{:.*}", precision, v)
            }
            'e' => {
                let v = expect_dimensionless(token, "format", &take(&mut next_arg)?)?;
                let precision: usize = precision.parse().unwrap_or(6);
                format!("{:.*e}", precision, v)
            }
            other => {
                return Err(EvalError::Runtime(
                    token.clone(),
                    format!("unsupported format conversion %{}", other),
                ));
            }
        };
        if piece.len() < width {
            for _ in 0..width - piece.len() {
                out.push(' ');
            }
        }
        out.push_str(&piece);
    }
    Ok(out)
}

const RANGE_LIMIT: usize = 1_000_000;

// --- the registry -----------------------------------------------------------

static BUILTIN_FUNCTIONS: LazyLock<FxHashMap<&'static str, BuiltinFunction>> =
    LazyLock::new(|| {
        let mut map = FxHashMap::default();

        // Extremal functions over scalar arguments; indices are 1-based
        // argument positions.
        map.insert(
            "max",
            BuiltinFunction::new(ParamNum::Variadic(2), true, v_numbers_same_unit, |state, token, args| {
                extremal(token, "max", args, Ordering::Greater, state.env.units)
                    .map(|(_, q)| Value::Number(q))
            }),
        );
        map.insert(
            "min",
            BuiltinFunction::new(ParamNum::Variadic(2), true, v_numbers_same_unit, |state, token, args| {
                extremal(token, "min", args, Ordering::Less, state.env.units)
                    .map(|(_, q)| Value::Number(q))
            }),
        );
        map.insert(
            "indexOfMax",
            BuiltinFunction::new(ParamNum::Variadic(2), true, v_numbers_index, |state, token, args| {
                extremal(token, "indexOfMax", args, Ordering::Greater, state.env.units)
                    .map(|(i, _)| Value::from((i + 1) as f64))
            }),
        );
        map.insert(
            "indexOfMin",
            BuiltinFunction::new(ParamNum::Variadic(2), true, v_numbers_index, |state, token, args| {
                extremal(token, "indexOfMin", args, Ordering::Less, state.env.units)
                    .map(|(i, _)| Value::from((i + 1) as f64))
            }),
        );

        // Aggregates over a collection's key sequence.
        map.insert(
            "sum",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_collection_agg, |state, token, args| {
                let collection = expect_collection(token, "sum", &args[0])?;
                let mut acc: Option<Quantity> = None;
                for value in collection.values() {
                    let q = expect_number(token, "sum", value)?;
                    match &mut acc {
                        None => acc = Some(*q),
                        Some(a) => {
                            require_same_unit(token, "sum", a.unit, q.unit, state.env.units)?;
                            a.value += q.value;
                        }
                    }
                }
                // An empty collection sums to a dimensionless zero.
                Ok(Value::Number(acc.unwrap_or_else(|| Quantity::dimensionless(0.0))))
            }),
        );
        map.insert(
            "maxCol",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_collection_agg, |state, token, args| {
                let collection = expect_collection(token, "maxCol", &args[0])?;
                extremal_col(state, token, "maxCol", collection, Ordering::Greater)
                    .map(|(_, q)| Value::Number(q))
            }),
        );
        map.insert(
            "minCol",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_collection_agg, |state, token, args| {
                let collection = expect_collection(token, "minCol", &args[0])?;
                extremal_col(state, token, "minCol", collection, Ordering::Less)
                    .map(|(_, q)| Value::Number(q))
            }),
        );
        map.insert(
            "indexOfMaxCol",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_collection_agg, |state, token, args| {
                let collection = expect_collection(token, "indexOfMaxCol", &args[0])?;
                extremal_col(state, token, "indexOfMaxCol", collection, Ordering::Greater)
                    .map(|(key, _)| key)
            }),
        );
        map.insert(
            "indexOfMinCol",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_collection_agg, |state, token, args| {
                let collection = expect_collection(token, "indexOfMinCol", &args[0])?;
                extremal_col(state, token, "indexOfMinCol", collection, Ordering::Less)
                    .map(|(key, _)| key)
            }),
        );
        map.insert(
            "indexOfNearest",
            BuiltinFunction::new(ParamNum::Fixed(2), true, v_index_of_nearest, |state, token, args| {
                let collection = expect_collection(token, "indexOfNearest", &args[0])?;
                let target = expect_number(token, "indexOfNearest", &args[1])?;
                let mut best: Option<(Value, f64)> = None;
                for (key, value) in collection.entries() {
                    let q = expect_number(token, "indexOfNearest", value)?;
                    require_same_unit(token, "indexOfNearest", target.unit, q.unit, state.env.units)?;
                    let distance = (q.value - target.value).abs();
                    if best.as_ref().is_none_or(|(_, d)| distance < *d) {
                        best = Some((key, distance));
                    }
                }
                best.map(|(key, _)| key).ok_or_else(|| {
                    EvalError::EmptyCollection(token.clone(), "indexOfNearest".to_string())
                })
            }),
        );
        map.insert(
            "indexOf",
            BuiltinFunction::new(ParamNum::Fixed(2), true, v_collection_probe, |_, token, args| {
                let collection = expect_collection(token, "indexOf", &args[0])?;
                for (key, value) in collection.entries() {
                    if *value == args[1] {
                        return Ok(key);
                    }
                }
                Ok(Value::ZERO)
            }),
        );

        // Higher-order functions; all of them return a fresh array-shaped
        // collection.
        map.insert(
            "map",
            BuiltinFunction::new(ParamNum::Fixed(2), true, v_higher_order, |state, token, args| {
                let closure = expect_lambda(token, "map", &args[0])?;
                let collection = Arc::clone(expect_collection(token, "map", &args[1])?);
                let mut out = Vec::with_capacity(collection.len());
                let mut unit: Option<UnitType> = None;
                for (key, value) in collection.entries() {
                    let call_args = map_filter_args(&closure, &key, value, token, "map")?;
                    let result = apply_lambda(state, &closure, call_args, token)?;
                    if let Value::Number(q) = &result {
                        match unit {
                            None => unit = Some(q.unit),
                            Some(u) => {
                                require_same_unit(token, "map", u, q.unit, state.env.units)?;
                            }
                        }
                    }
                    out.push(result);
                }
                Ok(Value::from(out))
            }),
        );
        map.insert(
            "filter",
            BuiltinFunction::new(ParamNum::Fixed(2), true, v_higher_order, |state, token, args| {
                let closure = expect_lambda(token, "filter", &args[0])?;
                let collection = Arc::clone(expect_collection(token, "filter", &args[1])?);
                let mut out = Vec::new();
                for (key, value) in collection.entries() {
                    let call_args = map_filter_args(&closure, &key, value, token, "filter")?;
                    let keep = apply_lambda(state, &closure, call_args, token)?;
                    if expect_dimensionless(token, "filter", &keep)? != 0.0 {
                        out.push(value.clone());
                    }
                }
                Ok(Value::from(out))
            }),
        );
        map.insert(
            "reduce",
            BuiltinFunction::new(ParamNum::Fixed(3), true, v_reduce, |state, token, args| {
                let closure = expect_lambda(token, "reduce", &args[0])?;
                if closure.arity != 2 {
                    return Err(EvalError::Runtime(
                        token.clone(),
                        format!(
                            "\"reduce\" lambda must take 2 parameters (value, accumulator), has {}",
                            closure.arity
                        ),
                    ));
                }
                let collection = Arc::clone(expect_collection(token, "reduce", &args[2])?);
                let mut acc = args[1].clone();
                for value in collection.values() {
                    acc = apply_lambda(state, &closure, vec![value.clone(), acc], token)?;
                }
                Ok(acc)
            }),
        );
        // The comparator contract is two-way: a zero result means "not less",
        // anything else "less". Comparators that are not strict total orders
        // sort, but in an unspecified order.
        map.insert(
            "sort",
            BuiltinFunction::new(ParamNum::Fixed(2), true, v_higher_order, |state, token, args| {
                let closure = expect_lambda(token, "sort", &args[0])?;
                if closure.arity != 2 {
                    return Err(EvalError::Runtime(
                        token.clone(),
                        format!("\"sort\" lambda must take 2 parameters, has {}", closure.arity),
                    ));
                }
                let collection = Arc::clone(expect_collection(token, "sort", &args[1])?);
                let mut values: Vec<Value> = collection.values().cloned().collect();
                let mut failure: Option<EvalError> = None;
                values.sort_by(|a, b| {
                    if failure.is_some() {
                        return Ordering::Equal;
                    }
                    let result = apply_lambda(state, &closure, vec![a.clone(), b.clone()], token)
                        .and_then(|v| expect_dimensionless(token, "sort", &v));
                    match result {
                        Ok(less) if less != 0.0 => Ordering::Less,
                        Ok(_) => Ordering::Greater,
                        Err(e) => {
                            failure = Some(e);
                            Ordering::Equal
                        }
                    }
                });
                match failure {
                    Some(e) => Err(e),
                    None => Ok(Value::from(values)),
                }
            }),
        );

        // String functions. Indices are 1-based and clamped, not errors.
        map.insert(
            "length",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_length, |_, token, args| {
                match &args[0] {
                    Value::String(s) => Ok(Value::from(s.chars().count() as f64)),
                    Value::Collection(c) => Ok(Value::from(c.len() as f64)),
                    other => Err(kind_fault(token, "length", other)),
                }
            }),
        );
        map.insert(
            "substring",
            BuiltinFunction::new(ParamNum::Range(2, 3), true, v_substring, |_, token, args| {
                let s = expect_string(token, "substring", &args[0])?;
                let chars: Vec<char> = s.chars().collect();
                let start = expect_dimensionless(token, "substring", &args[1])?.round() as i64;
                let end = match args.get(2) {
                    Some(v) => expect_dimensionless(token, "substring", v)?.round() as i64,
                    None => chars.len() as i64 + 1,
                };
                let start = start.clamp(1, chars.len() as i64 + 1) as usize;
                let end = end.clamp(1, chars.len() as i64 + 1) as usize;
                if end <= start {
                    return Ok(Value::from(""));
                }
                Ok(Value::String(chars[start - 1..end - 1].iter().collect()))
            }),
        );
        map.insert(
            "indexOfStr",
            BuiltinFunction::new(ParamNum::Fixed(2), true, v_index_of_str, |_, token, args| {
                let s = expect_string(token, "indexOfStr", &args[0])?;
                let needle = expect_string(token, "indexOfStr", &args[1])?;
                Ok(match s.find(needle) {
                    Some(byte_pos) => Value::from((s[..byte_pos].chars().count() + 1) as f64),
                    None => Value::ZERO,
                })
            }),
        );
        map.insert(
            "split",
            BuiltinFunction::new(ParamNum::Fixed(2), true, v_split, |_, token, args| {
                let s = expect_string(token, "split", &args[0])?;
                let sep = expect_string(token, "split", &args[1])?;
                let parts: Vec<Value> = if sep.is_empty() {
                    s.chars().map(|c| Value::String(c.to_string())).collect()
                } else {
                    s.split(sep).map(Value::from).collect()
                };
                Ok(Value::from(parts))
            }),
        );
        map.insert(
            "trim",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_string_to_string, |_, token, args| {
                Ok(Value::from(expect_string(token, "trim", &args[0])?.trim()))
            }),
        );
        map.insert(
            "toUpperCase",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_string_to_string, |_, token, args| {
                Ok(Value::String(
                    expect_string(token, "toUpperCase", &args[0])?.to_uppercase(),
                ))
            }),
        );
        map.insert(
            "toLowerCase",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_string_to_string, |_, token, args| {
                Ok(Value::String(
                    expect_string(token, "toLowerCase", &args[0])?.to_lowercase(),
                ))
            }),
        );
        map.insert(
            "format",
            BuiltinFunction::new(ParamNum::Variadic(1), true, v_format, |_, token, args| {
                let fmt = expect_string(token, "format", &args[0])?;
                format_impl(token, fmt, &args[1..]).map(Value::String)
            }),
        );
        map.insert(
            "parseNumber",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_parse_number, |_, token, args| {
                let s = expect_string(token, "parseNumber", &args[0])?;
                s.trim().parse::<f64>().map(Value::from).map_err(|_| {
                    EvalError::Runtime(token.clone(), format!("cannot parse \"{}\" as a number", s))
                })
            }),
        );

        // Random-distribution functions. Each draws from an external stream
        // keyed by (seed, function name, caller identity); outside an active
        // run they return zero of the appropriate dimension.
        map.insert(
            "uniform",
            BuiltinFunction::new(ParamNum::Range(2, 3), false, v_random2, |state, token, args| {
                let lo = *expect_number(token, "uniform", &args[0])?;
                let hi = expect_number(token, "uniform", &args[1])?;
                require_same_unit(token, "uniform", lo.unit, hi.unit, state.env.units)?;
                let seed = opt_seed(token, "uniform", args, 2)?;
                match draws(state, "uniform", seed, 1) {
                    None => Ok(Value::Number(Quantity::zero(lo.unit))),
                    Some(u) => Ok(Value::Number(Quantity::new(
                        lo.value + u[0] * (hi.value - lo.value),
                        lo.unit,
                    ))),
                }
            }),
        );
        map.insert(
            "normal",
            BuiltinFunction::new(ParamNum::Range(2, 3), false, v_random2, |state, token, args| {
                let mean = *expect_number(token, "normal", &args[0])?;
                let sd = expect_number(token, "normal", &args[1])?;
                require_same_unit(token, "normal", mean.unit, sd.unit, state.env.units)?;
                let seed = opt_seed(token, "normal", args, 2)?;
                match draws(state, "normal", seed, 2) {
                    None => Ok(Value::Number(Quantity::zero(mean.unit))),
                    Some(u) => {
                        let z = (-2.0 * (1.0 - u[0]).ln()).sqrt()
                            * (2.0 * std::f64::consts::PI * u[1]).cos();
                        Ok(Value::Number(Quantity::new(
                            mean.value + sd.value * z,
                            mean.unit,
                        )))
                    }
                }
            }),
        );
        map.insert(
            "exponential",
            BuiltinFunction::new(ParamNum::Range(1, 2), false, v_random1, |state, token, args| {
                let mean = *expect_number(token, "exponential", &args[0])?;
                let seed = opt_seed(token, "exponential", args, 1)?;
                match draws(state, "exponential", seed, 1) {
                    None => Ok(Value::Number(Quantity::zero(mean.unit))),
                    Some(u) => Ok(Value::Number(Quantity::new(
                        -mean.value * (1.0 - u[0]).ln(),
                        mean.unit,
                    ))),
                }
            }),
        );
        map.insert(
            "triangular",
            BuiltinFunction::new(ParamNum::Range(3, 4), false, v_random3, |state, token, args| {
                let lo = *expect_number(token, "triangular", &args[0])?;
                let mode = expect_number(token, "triangular", &args[1])?;
                let hi = expect_number(token, "triangular", &args[2])?;
                require_same_unit(token, "triangular", lo.unit, mode.unit, state.env.units)?;
                require_same_unit(token, "triangular", lo.unit, hi.unit, state.env.units)?;
                let seed = opt_seed(token, "triangular", args, 3)?;
                match draws(state, "triangular", seed, 1) {
                    None => Ok(Value::Number(Quantity::zero(lo.unit))),
                    Some(u) => {
                        let span = hi.value - lo.value;
                        let value = if span == 0.0 {
                            lo.value
                        } else {
                            let cut = (mode.value - lo.value) / span;
                            if u[0] < cut {
                                lo.value + (u[0] * span * (mode.value - lo.value)).sqrt()
                            } else {
                                hi.value - ((1.0 - u[0]) * span * (hi.value - mode.value)).sqrt()
                            }
                        };
                        Ok(Value::Number(Quantity::new(value, lo.unit)))
                    }
                }
            }),
        );

        // Math.
        map.insert(
            "abs",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_math_same_unit, |_, token, args| {
                let q = expect_number(token, "abs", &args[0])?;
                Ok(Value::Number(q.with_value(q.value.abs())))
            }),
        );
        map.insert(
            "ceil",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_math_same_unit, |_, token, args| {
                let q = expect_number(token, "ceil", &args[0])?;
                Ok(Value::Number(q.with_value(q.value.ceil())))
            }),
        );
        map.insert(
            "floor",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_math_same_unit, |_, token, args| {
                let q = expect_number(token, "floor", &args[0])?;
                Ok(Value::Number(q.with_value(q.value.floor())))
            }),
        );
        map.insert(
            "round",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_math_same_unit, |_, token, args| {
                let q = expect_number(token, "round", &args[0])?;
                Ok(Value::Number(q.with_value(q.value.round())))
            }),
        );
        map.insert(
            "signum",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_math_same_unit, |_, token, args| {
                let q = expect_number(token, "signum", &args[0])?;
                let s = if q.value == 0.0 { 0.0 } else { q.value.signum() };
                Ok(Value::from(s))
            }),
        );
        map.insert(
            "sqrt",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_math_dimensionless, |_, token, args| {
                Ok(Value::from(
                    expect_dimensionless(token, "sqrt", &args[0])?.sqrt(),
                ))
            }),
        );
        map.insert(
            "exp",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_math_dimensionless, |_, token, args| {
                Ok(Value::from(
                    expect_dimensionless(token, "exp", &args[0])?.exp(),
                ))
            }),
        );
        map.insert(
            "ln",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_math_dimensionless, |_, token, args| {
                Ok(Value::from(expect_dimensionless(token, "ln", &args[0])?.ln()))
            }),
        );
        map.insert(
            "log10",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_math_dimensionless, |_, token, args| {
                Ok(Value::from(
                    expect_dimensionless(token, "log10", &args[0])?.log10(),
                ))
            }),
        );

        // Trig accepts dimensionless or angle operands; angle values are held
        // in radians, the angle dimension's base unit.
        map.insert(
            "sin",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_trig, |state, token, args| {
                trig(state, token, "sin", &args[0], f64::sin)
            }),
        );
        map.insert(
            "cos",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_trig, |state, token, args| {
                trig(state, token, "cos", &args[0], f64::cos)
            }),
        );
        map.insert(
            "tan",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_trig, |state, token, args| {
                trig(state, token, "tan", &args[0], f64::tan)
            }),
        );
        map.insert(
            "asin",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_inverse_trig, |state, token, args| {
                inverse_trig(state, token, "asin", &args[0], f64::asin)
            }),
        );
        map.insert(
            "acos",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_inverse_trig, |state, token, args| {
                inverse_trig(state, token, "acos", &args[0], f64::acos)
            }),
        );
        map.insert(
            "atan",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_inverse_trig, |state, token, args| {
                inverse_trig(state, token, "atan", &args[0], f64::atan)
            }),
        );

        // Misc.
        map.insert(
            "choose",
            BuiltinFunction::new(ParamNum::Variadic(2), true, v_choose, |state, token, args| {
                let k = expect_dimensionless(token, "choose", &args[0])?.round() as i64;
                let alternatives = &args[1..];
                let first = &alternatives[0];
                for value in &alternatives[1..] {
                    if value.kind() != first.kind() {
                        return Err(kind_fault(token, "choose", value));
                    }
                    if let (Value::Number(a), Value::Number(b)) = (first, value) {
                        require_same_unit(token, "choose", a.unit, b.unit, state.env.units)?;
                    }
                }
                if k < 1 || k as usize > alternatives.len() {
                    return Err(EvalError::ChooseOutOfRange(
                        token.clone(),
                        k,
                        alternatives.len(),
                    ));
                }
                Ok(alternatives[k as usize - 1].clone())
            }),
        );
        map.insert(
            "range",
            BuiltinFunction::new(ParamNum::Range(1, 3), true, v_range, |state, token, args| {
                let (start, end, step) = match args.len() {
                    1 => {
                        let n = expect_dimensionless(token, "range", &args[0])?;
                        (
                            Quantity::dimensionless(1.0),
                            Quantity::dimensionless(n.floor()),
                            Quantity::dimensionless(1.0),
                        )
                    }
                    _ => {
                        let start = *expect_number(token, "range", &args[0])?;
                        let end = *expect_number(token, "range", &args[1])?;
                        require_same_unit(token, "range", start.unit, end.unit, state.env.units)?;
                        let step = match args.get(2) {
                            Some(v) => {
                                let step = *expect_number(token, "range", v)?;
                                require_same_unit(
                                    token,
                                    "range",
                                    start.unit,
                                    step.unit,
                                    state.env.units,
                                )?;
                                step
                            }
                            None => start.with_value(1.0),
                        };
                        (start, end, step)
                    }
                };
                if step.value == 0.0 {
                    return Err(EvalError::Runtime(
                        token.clone(),
                        "\"range\" step must be nonzero".to_string(),
                    ));
                }
                let count = ((end.value - start.value) / step.value).floor() + 1.0;
                if count > RANGE_LIMIT as f64 {
                    return Err(EvalError::Runtime(
                        token.clone(),
                        format!("\"range\" would produce more than {} elements", RANGE_LIMIT),
                    ));
                }
                let mut out = Vec::new();
                let mut i = 0.0;
                while i < count {
                    out.push(Value::Number(start.with_value(start.value + i * step.value)));
                    i += 1.0;
                }
                Ok(Value::from(out))
            }),
        );
        map.insert(
            "notNull",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_not_null, |_, token, args| {
                match &args[0] {
                    Value::Entity(entity) => {
                        Ok(Value::from(if entity.is_null() { 0.0 } else { 1.0 }))
                    }
                    other => Err(kind_fault(token, "notNull", other)),
                }
            }),
        );
        map.insert(
            "typeName",
            BuiltinFunction::new(ParamNum::Fixed(1), true, v_type_name, |_, _, args| {
                Ok(Value::from(args[0].type_name()))
            }),
        );

        map
    });

fn trig(
    state: &EvalState,
    token: &Token,
    name: &str,
    value: &Value,
    f: fn(f64) -> f64,
) -> Result<Value, EvalError> {
    let q = expect_number(token, name, value)?;
    if !q.unit.is_dimensionless() && !state.env.units.is_angle(q.unit) {
        return Err(EvalError::Check(
            token.clone(),
            FaultKind::NotDimensionless {
                op: name.to_string(),
                got: state.env.units.describe(q.unit),
            },
        ));
    }
    Ok(Value::from(f(q.value)))
}

fn inverse_trig(
    state: &EvalState,
    token: &Token,
    name: &str,
    value: &Value,
    f: fn(f64) -> f64,
) -> Result<Value, EvalError> {
    let v = expect_dimensionless(token, name, value)?;
    let unit = state.env.units.angle_unit().unwrap_or(UnitType::DIMENSIONLESS);
    Ok(Value::Number(Quantity::new(f(v), unit)))
}

pub struct BuiltinFunctionDoc {
    pub name: &'static str,
    pub params: &'static str,
    pub description: &'static str,
}

/// One-line docs for editors and tooling.
pub static BUILTIN_FUNCTION_DOC: &[BuiltinFunctionDoc] = &[
    BuiltinFunctionDoc { name: "abs", params: "x", description: "Absolute value; keeps the dimension." },
    BuiltinFunctionDoc { name: "acos", params: "x", description: "Arc cosine of a dimensionless number." },
    BuiltinFunctionDoc { name: "asin", params: "x", description: "Arc sine of a dimensionless number." },
    BuiltinFunctionDoc { name: "atan", params: "x", description: "Arc tangent of a dimensionless number." },
    BuiltinFunctionDoc { name: "ceil", params: "x", description: "Smallest integer not below x; keeps the dimension." },
    BuiltinFunctionDoc { name: "choose", params: "k, v1, ..., vn", description: "The k-th alternative (1-based); all alternatives share one type and dimension." },
    BuiltinFunctionDoc { name: "cos", params: "x", description: "Cosine of a dimensionless or angle operand." },
    BuiltinFunctionDoc { name: "exp", params: "x", description: "e raised to a dimensionless number." },
    BuiltinFunctionDoc { name: "exponential", params: "mean [, seed]", description: "Exponential draw from the simulation's random stream; 0 outside a run." },
    BuiltinFunctionDoc { name: "filter", params: "lambda, collection", description: "Elements for which the lambda returns nonzero, as a new array." },
    BuiltinFunctionDoc { name: "floor", params: "x", description: "Largest integer not above x; keeps the dimension." },
    BuiltinFunctionDoc { name: "format", params: "fmt, args...", description: "%-style formatting; numeric arguments must be dimensionless." },
    BuiltinFunctionDoc { name: "indexOf", params: "collection, value", description: "Key of the first element equal to value, or 0." },
    BuiltinFunctionDoc { name: "indexOfMax", params: "a, b, ...", description: "1-based position of the largest argument." },
    BuiltinFunctionDoc { name: "indexOfMaxCol", params: "collection", description: "Key of the largest element; empty collections are an error." },
    BuiltinFunctionDoc { name: "indexOfMin", params: "a, b, ...", description: "1-based position of the smallest argument." },
    BuiltinFunctionDoc { name: "indexOfMinCol", params: "collection", description: "Key of the smallest element; empty collections are an error." },
    BuiltinFunctionDoc { name: "indexOfNearest", params: "collection, x", description: "Key of the element closest to x; one shared dimension." },
    BuiltinFunctionDoc { name: "indexOfStr", params: "s, needle", description: "1-based position of needle in s, or 0." },
    BuiltinFunctionDoc { name: "length", params: "s | collection", description: "Character count of a string, or element count of a collection." },
    BuiltinFunctionDoc { name: "ln", params: "x", description: "Natural logarithm of a dimensionless number." },
    BuiltinFunctionDoc { name: "log10", params: "x", description: "Base-10 logarithm of a dimensionless number." },
    BuiltinFunctionDoc { name: "map", params: "lambda, collection", description: "Applies the lambda (value[, key]) to every element; results form a new array with one shared dimension." },
    BuiltinFunctionDoc { name: "max", params: "a, b, ...", description: "Largest argument; all arguments share one dimension." },
    BuiltinFunctionDoc { name: "maxCol", params: "collection", description: "Largest element; empty collections are an error." },
    BuiltinFunctionDoc { name: "min", params: "a, b, ...", description: "Smallest argument; all arguments share one dimension." },
    BuiltinFunctionDoc { name: "minCol", params: "collection", description: "Smallest element; empty collections are an error." },
    BuiltinFunctionDoc { name: "normal", params: "mean, sd [, seed]", description: "Normal draw from the simulation's random stream; 0 outside a run." },
    BuiltinFunctionDoc { name: "notNull", params: "entity", description: "1 if the entity reference is non-null, else 0." },
    BuiltinFunctionDoc { name: "parseNumber", params: "s", description: "Parses a dimensionless number from a string." },
    BuiltinFunctionDoc { name: "range", params: "n | start, end [, step]", description: "Arithmetic sequence as an array; one shared dimension." },
    BuiltinFunctionDoc { name: "reduce", params: "lambda, init, collection", description: "Left fold: lambda(value, accumulator) starting from init." },
    BuiltinFunctionDoc { name: "round", params: "x", description: "Nearest integer; keeps the dimension." },
    BuiltinFunctionDoc { name: "signum", params: "x", description: "-1, 0 or 1 by sign." },
    BuiltinFunctionDoc { name: "sin", params: "x", description: "Sine of a dimensionless or angle operand." },
    BuiltinFunctionDoc { name: "sort", params: "lambda, collection", description: "Sorted copy; the comparator returns nonzero for \"less\", zero for \"not less\"." },
    BuiltinFunctionDoc { name: "split", params: "s, sep", description: "Splits a string into an array of strings." },
    BuiltinFunctionDoc { name: "sqrt", params: "x", description: "Square root of a dimensionless number." },
    BuiltinFunctionDoc { name: "substring", params: "s, start [, end]", description: "1-based, end-exclusive slice, clamped to the string." },
    BuiltinFunctionDoc { name: "sum", params: "collection", description: "Sum of all elements; empty collections sum to dimensionless 0." },
    BuiltinFunctionDoc { name: "tan", params: "x", description: "Tangent of a dimensionless or angle operand." },
    BuiltinFunctionDoc { name: "toLowerCase", params: "s", description: "Lowercased copy." },
    BuiltinFunctionDoc { name: "toUpperCase", params: "s", description: "Uppercased copy." },
    BuiltinFunctionDoc { name: "triangular", params: "lo, mode, hi [, seed]", description: "Triangular draw from the simulation's random stream; 0 outside a run." },
    BuiltinFunctionDoc { name: "trim", params: "s", description: "Copy with surrounding whitespace removed." },
    BuiltinFunctionDoc { name: "typeName", params: "v", description: "The value's kind as a string." },
    BuiltinFunctionDoc { name: "uniform", params: "lo, hi [, seed]", description: "Uniform draw from the simulation's random stream; 0 outside a run." },
];
