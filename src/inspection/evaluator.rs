//! Recursive evaluation of a campaign's condition AST against current
//! signal histories.
//!
//! Plain recursive walk, no explicit evaluation stack.

use std::collections::HashMap;

use crate::inspection::ast::{ArithOp, CmpOp, Expr, LogicalOp, WindowFn, WindowSpec};
use crate::inspection::custom_fn::CustomFunctionRegistry;
use crate::inspection::ast::InvocationId;
use crate::inspection::history::SignalHistory;
use crate::types::{SignalId, SignalValue, Timestamp};

/// Everything one evaluation round needs: the per-signal histories, the
/// custom-function registry (mutable, since invocations carry state), and
/// the round's timestamp for time-windowed queries.
pub struct EvalContext<'a> {
    pub histories: &'a HashMap<SignalId, SignalHistory>,
    pub registry: &'a mut CustomFunctionRegistry,
    pub now: Timestamp,
    /// `(function name, invocation id)` pairs actually invoked this round
    /// (i.e. not short-circuited away); the emitter calls `condition_end`
    /// on exactly these afterward.
    pub invoked_this_round: Vec<(String, InvocationId)>,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        histories: &'a HashMap<SignalId, SignalHistory>,
        registry: &'a mut CustomFunctionRegistry,
        now: Timestamp,
    ) -> Self {
        Self {
            histories,
            registry,
            now,
            invoked_this_round: Vec::new(),
        }
    }
}

/// Evaluates `expr` against `ctx`. Never panics; unsupported or
/// type-mismatched operations resolve to [`SignalValue::Undefined`].
pub fn eval(expr: &Expr, ctx: &mut EvalContext) -> SignalValue {
    match expr {
        Expr::NumberLit(n) => SignalValue::Double(*n),
        Expr::StringLit(s) => SignalValue::String(s.as_str().into()),
        Expr::BoolLit(b) => SignalValue::Bool(*b),
        Expr::SignalRef(id) => ctx
            .histories
            .get(id)
            .and_then(|h| h.latest())
            .cloned()
            .unwrap_or(SignalValue::Undefined),
        Expr::Not(inner) => match eval_bool(inner, ctx) {
            Some(b) => SignalValue::Bool(!b),
            None => SignalValue::Undefined,
        },
        Expr::Arith { op, lhs, rhs } => eval_arith(*op, lhs, rhs, ctx),
        Expr::Compare { op, lhs, rhs } => eval_compare(*op, lhs, rhs, ctx),
        Expr::Logical { op, lhs, rhs } => eval_logical(*op, lhs, rhs, ctx),
        Expr::Conditional {
            cond,
            then_branch,
            else_branch,
        } => match eval_bool(cond, ctx) {
            Some(true) => eval(then_branch, ctx),
            Some(false) => eval(else_branch, ctx),
            None => SignalValue::Undefined,
        },
        Expr::Window { kind, signal } => eval_window(*kind, *signal, ctx),
        Expr::CustomCall {
            name,
            args,
            invocation_id,
        } => eval_custom_call(name, args, *invocation_id, ctx),
    }
}

/// Coerces an evaluated expression to a bool for activation purposes:
/// `undefined` is `None` here (distinct from `false`), doubles coerce via
/// `≠0`, strings never coerce.
fn eval_bool(expr: &Expr, ctx: &mut EvalContext) -> Option<bool> {
    match eval(expr, ctx) {
        SignalValue::Bool(b) => Some(b),
        SignalValue::Double(d) => Some(d != 0.0),
        SignalValue::Undefined | SignalValue::String(_) => None,
    }
}

fn eval_arith(op: ArithOp, lhs: &Expr, rhs: &Expr, ctx: &mut EvalContext) -> SignalValue {
    let (Some(l), Some(r)) = (eval(lhs, ctx).as_f64(), eval(rhs, ctx).as_f64()) else {
        return SignalValue::Undefined;
    };
    let result = match op {
        ArithOp::Add => l + r,
        ArithOp::Sub => l - r,
        ArithOp::Mul => l * r,
        ArithOp::Div => l / r,
        ArithOp::Rem => l % r,
    };
    SignalValue::Double(result)
}

fn eval_compare(op: CmpOp, lhs: &Expr, rhs: &Expr, ctx: &mut EvalContext) -> SignalValue {
    let lv = eval(lhs, ctx);
    let rv = eval(rhs, ctx);

    if lv.is_undefined() || rv.is_undefined() {
        return SignalValue::Undefined;
    }

    let result = match (&lv, &rv) {
        (SignalValue::String(a), SignalValue::String(b)) => match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            _ => return SignalValue::Undefined, // strings are exact-compare only
        },
        _ => {
            let (Some(l), Some(r)) = (lv.as_f64(), rv.as_f64()) else {
                return SignalValue::Undefined;
            };
            match op {
                CmpOp::Lt => l < r,
                CmpOp::Le => l <= r,
                CmpOp::Gt => l > r,
                CmpOp::Ge => l >= r,
                CmpOp::Eq => l == r,
                CmpOp::Ne => l != r,
            }
        }
    };
    SignalValue::Bool(result)
}

/// Three-valued (Kleene) logic: a conclusive operand short-circuits
/// (`false` for AND, `true` for OR) without evaluating the other side. A
/// short-circuited custom function call is skipped entirely, so its
/// `condition_end` correctly does not run that round. An undefined operand
/// does not short-circuit; the other side is still evaluated so a
/// conclusive `false`/`true` there can still resolve the expression.
fn eval_logical(op: LogicalOp, lhs: &Expr, rhs: &Expr, ctx: &mut EvalContext) -> SignalValue {
    let lhs_bool = eval_bool(lhs, ctx);

    let short_circuit_value = match op {
        LogicalOp::And => Some(false),
        LogicalOp::Or => Some(true),
    };
    if lhs_bool == short_circuit_value {
        return SignalValue::Bool(short_circuit_value.unwrap());
    }

    let rhs_bool = eval_bool(rhs, ctx);
    match (lhs_bool, rhs_bool) {
        (Some(a), Some(b)) => SignalValue::Bool(match op {
            LogicalOp::And => a && b,
            LogicalOp::Or => a || b,
        }),
        (_, Some(b)) if Some(b) == short_circuit_value => SignalValue::Bool(b),
        _ => SignalValue::Undefined,
    }
}

fn eval_window(kind: WindowFn, signal: SignalId, ctx: &EvalContext) -> SignalValue {
    let Some(history) = ctx.histories.get(&signal) else {
        return SignalValue::Undefined;
    };

    let since = |spec: WindowSpec| -> Timestamp {
        match spec {
            WindowSpec::TimeMs(ms) => Timestamp(ctx.now.0.saturating_sub(ms)),
            WindowSpec::Count(_) => Timestamp(0),
        }
    };

    match kind {
        WindowFn::Latest => history.latest().cloned().unwrap_or(SignalValue::Undefined),
        WindowFn::Previous => history.previous().cloned().unwrap_or(SignalValue::Undefined),
        WindowFn::Min(spec) => window_numeric(spec, since, |n| history.min_last_n(n), |t| history.min_since(t)),
        WindowFn::Max(spec) => window_numeric(spec, since, |n| history.max_last_n(n), |t| history.max_since(t)),
        WindowFn::Sum(spec) => {
            let value = match spec {
                WindowSpec::Count(n) => history.sum_last_n(n),
                WindowSpec::TimeMs(_) => history.sum_since(since(spec)),
            };
            SignalValue::Double(value)
        }
        WindowFn::Count(spec) => {
            let value = match spec {
                WindowSpec::Count(n) => history.count_last_n(n),
                WindowSpec::TimeMs(_) => history.count_since(since(spec)),
            };
            SignalValue::Double(value as f64)
        }
        WindowFn::Avg(spec) => window_numeric(spec, since, |n| history.avg_last_n(n), |t| history.avg_since(t)),
        WindowFn::Presence(spec) => SignalValue::Bool(history.has_seen_since(since(spec))),
    }
}

fn window_numeric(
    spec: WindowSpec,
    since: impl Fn(WindowSpec) -> Timestamp,
    by_count: impl Fn(usize) -> Option<f64>,
    by_time: impl Fn(Timestamp) -> Option<f64>,
) -> SignalValue {
    let value = match spec {
        WindowSpec::Count(n) => by_count(n),
        WindowSpec::TimeMs(_) => by_time(since(spec)),
    };
    value.map(SignalValue::Double).unwrap_or(SignalValue::Undefined)
}

fn eval_custom_call(
    name: &str,
    args: &[Expr],
    invocation_id: InvocationId,
    ctx: &mut EvalContext,
) -> SignalValue {
    let values: Vec<SignalValue> = args.iter().map(|a| eval(a, ctx)).collect();
    let Some(function) = ctx.registry.get_mut(name) else {
        return SignalValue::Undefined;
    };
    ctx.invoked_this_round.push((name.to_string(), invocation_id));
    function.invoke(invocation_id, &values).as_signal_value()
}
