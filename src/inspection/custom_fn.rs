//! The custom-function registry: named, externally pluggable triples of
//! `invoke`/`condition_end`/`cleanup` with per-invocation-identity state.
//!
//! Modeled as a tagged trait object held in a
//! `HashMap<String, Box<dyn CustomFunction>>` registry, rather than the
//! three bare callbacks: each implementation owns its own per-invocation
//! state map, keyed by [`InvocationId`].

use std::collections::{HashMap, HashSet};

use crate::inspection::ast::InvocationId;
use crate::types::{CollectedDataFrame, CollectedSignal, SignalId, SignalType, SignalValue, Timestamp};

/// Outcome of one `invoke` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeStatus {
    Ok,
    TypeMismatch,
    RuntimeError,
}

#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    pub status: InvokeStatus,
    /// Omitted on non-ok status, or when the function explicitly returns
    /// undefined.
    pub value: Option<SignalValue>,
}

impl InvokeOutcome {
    pub fn ok(value: SignalValue) -> Self {
        Self {
            status: InvokeStatus::Ok,
            value: Some(value),
        }
    }

    pub fn undefined() -> Self {
        Self {
            status: InvokeStatus::Ok,
            value: None,
        }
    }

    pub fn type_mismatch() -> Self {
        Self {
            status: InvokeStatus::TypeMismatch,
            value: None,
        }
    }

    /// The value to surface to the evaluator: `undefined` on any non-ok
    /// status or an explicit undefined return.
    pub fn as_signal_value(&self) -> SignalValue {
        match (self.status, &self.value) {
            (InvokeStatus::Ok, Some(v)) => v.clone(),
            _ => SignalValue::Undefined,
        }
    }
}

/// A named primitive invocable from a campaign expression.
pub trait CustomFunction: Send {
    fn invoke(&mut self, invocation_id: InvocationId, args: &[SignalValue]) -> InvokeOutcome;

    /// Called once per evaluation round for each invocation identity of
    /// this function that actually ran (was not short-circuited away) in a
    /// campaign that triggered. May append to `output` iff the signal id it
    /// targets is in `collected_signal_ids`.
    fn condition_end(
        &mut self,
        _invocation_id: InvocationId,
        _collected_signal_ids: &HashSet<SignalId>,
        _timestamp: Timestamp,
        _output: &mut CollectedDataFrame,
    ) {
    }

    /// Called when an invocation identity retires (campaign removed or
    /// reloaded); drops any per-invocation state.
    fn cleanup(&mut self, _invocation_id: InvocationId) {}
}

fn numeric_args(args: &[SignalValue]) -> Option<Vec<f64>> {
    let mut out = Vec::with_capacity(args.len());
    for a in args {
        if a.is_undefined() {
            return None;
        }
        out.push(a.as_f64()?);
    }
    Some(out)
}

/// Returns `undefined` (not `type_mismatch`) when any arg is undefined:
/// any argument being undefined yields an undefined result without a
/// state change.
fn has_undefined(args: &[SignalValue]) -> bool {
    args.iter().any(|a| a.is_undefined())
}

macro_rules! unary_numeric_fn {
    ($struct_name:ident, $op:expr) => {
        #[derive(Default)]
        pub struct $struct_name;

        impl CustomFunction for $struct_name {
            fn invoke(&mut self, _invocation_id: InvocationId, args: &[SignalValue]) -> InvokeOutcome {
                if args.len() != 1 {
                    return InvokeOutcome::type_mismatch();
                }
                if has_undefined(args) {
                    return InvokeOutcome::undefined();
                }
                let Some(x) = args[0].as_f64() else {
                    return InvokeOutcome::type_mismatch();
                };
                InvokeOutcome::ok(SignalValue::Double($op(x)))
            }
        }
    };
}

unary_numeric_fn!(AbsFn, f64::abs);
unary_numeric_fn!(CeilFn, f64::ceil);
unary_numeric_fn!(FloorFn, f64::floor);

#[derive(Default)]
pub struct MinFn;

impl CustomFunction for MinFn {
    fn invoke(&mut self, _invocation_id: InvocationId, args: &[SignalValue]) -> InvokeOutcome {
        if args.len() < 2 {
            return InvokeOutcome::type_mismatch();
        }
        if has_undefined(args) {
            return InvokeOutcome::undefined();
        }
        match numeric_args(args) {
            Some(values) => InvokeOutcome::ok(SignalValue::Double(
                values.into_iter().fold(f64::INFINITY, f64::min),
            )),
            None => InvokeOutcome::type_mismatch(),
        }
    }
}

#[derive(Default)]
pub struct MaxFn;

impl CustomFunction for MaxFn {
    fn invoke(&mut self, _invocation_id: InvocationId, args: &[SignalValue]) -> InvokeOutcome {
        if args.len() < 2 {
            return InvokeOutcome::type_mismatch();
        }
        if has_undefined(args) {
            return InvokeOutcome::undefined();
        }
        match numeric_args(args) {
            Some(values) => InvokeOutcome::ok(SignalValue::Double(
                values.into_iter().fold(f64::NEG_INFINITY, f64::max),
            )),
            None => InvokeOutcome::type_mismatch(),
        }
    }
}

#[derive(Default)]
pub struct PowFn;

impl CustomFunction for PowFn {
    fn invoke(&mut self, _invocation_id: InvocationId, args: &[SignalValue]) -> InvokeOutcome {
        if args.len() != 2 {
            return InvokeOutcome::type_mismatch();
        }
        if has_undefined(args) {
            return InvokeOutcome::undefined();
        }
        match numeric_args(args) {
            Some(values) => InvokeOutcome::ok(SignalValue::Double(values[0].powf(values[1]))),
            None => InvokeOutcome::type_mismatch(),
        }
    }
}

#[derive(Default)]
pub struct LogFn;

impl CustomFunction for LogFn {
    fn invoke(&mut self, _invocation_id: InvocationId, args: &[SignalValue]) -> InvokeOutcome {
        if args.len() != 2 {
            return InvokeOutcome::type_mismatch();
        }
        if has_undefined(args) {
            return InvokeOutcome::undefined();
        }
        match numeric_args(args) {
            Some(values) => InvokeOutcome::ok(SignalValue::Double(values[1].log(values[0]))),
            None => InvokeOutcome::type_mismatch(),
        }
    }
}

/// Per-invocation rising-edge memory for `MULTI_RISING_EDGE_TRIGGER`: last
/// seen boolean per named signal, plus the names that rose since the last
/// `condition_end`.
#[derive(Default)]
struct MultiEdgeState {
    last_seen: HashMap<String, bool>,
    risen_this_round: Vec<String>,
}

/// `MULTI_RISING_EDGE_TRIGGER((name, bool), ...)`: true iff at least one
/// named boolean rose since this invocation id's last call; on
/// `condition_end`, appends the names that rose (input order) as a JSON
/// array to a designated output signal.
pub struct MultiRisingEdgeTriggerFn {
    output_signal: SignalId,
    output_type: SignalType,
    state: HashMap<InvocationId, MultiEdgeState>,
}

impl MultiRisingEdgeTriggerFn {
    /// `output_signal` is resolved ahead of time from the fully-qualified
    /// name (default `Vehicle.MultiRisingEdgeTrigger`) by the engine's
    /// signal name table.
    pub fn new(output_signal: SignalId) -> Self {
        Self {
            output_signal,
            output_type: SignalType::String,
            state: HashMap::new(),
        }
    }
}

impl CustomFunction for MultiRisingEdgeTriggerFn {
    fn invoke(&mut self, invocation_id: InvocationId, args: &[SignalValue]) -> InvokeOutcome {
        if args.is_empty() || args.len() % 2 != 0 {
            return InvokeOutcome::type_mismatch();
        }
        if has_undefined(args) {
            return InvokeOutcome::undefined();
        }

        let mut pairs = Vec::with_capacity(args.len() / 2);
        for chunk in args.chunks(2) {
            let name = match &chunk[0] {
                SignalValue::String(s) => s.to_string(),
                _ => return InvokeOutcome::type_mismatch(),
            };
            let value = match &chunk[1] {
                SignalValue::Bool(b) => *b,
                _ => return InvokeOutcome::type_mismatch(),
            };
            pairs.push((name, value));
        }

        let entry = self.state.entry(invocation_id).or_default();
        let mut any_rose = false;
        for (name, value) in &pairs {
            let last = entry.last_seen.get(name).copied().unwrap_or(false);
            if !last && *value {
                entry.risen_this_round.push(name.clone());
                any_rose = true;
            }
            entry.last_seen.insert(name.clone(), *value);
        }

        InvokeOutcome::ok(SignalValue::Bool(any_rose))
    }

    fn condition_end(
        &mut self,
        invocation_id: InvocationId,
        collected_signal_ids: &HashSet<SignalId>,
        timestamp: Timestamp,
        output: &mut CollectedDataFrame,
    ) {
        let Some(entry) = self.state.get_mut(&invocation_id) else {
            return;
        };
        if entry.risen_this_round.is_empty() {
            return;
        }
        if collected_signal_ids.contains(&self.output_signal) {
            let json = serde_json::to_string(&entry.risen_this_round).unwrap_or_default();
            output.signals.push(CollectedSignal {
                signal_id: self.output_signal,
                timestamp,
                value: SignalValue::String(json.into()),
                signal_type: self.output_type,
            });
        }
        entry.risen_this_round.clear();
    }

    fn cleanup(&mut self, invocation_id: InvocationId) {
        self.state.remove(&invocation_id);
    }
}

/// Default fully-qualified name `MULTI_RISING_EDGE_TRIGGER` resolves its
/// output to, before an engine-level signal name table overrides it.
pub const DEFAULT_MULTI_RISING_EDGE_OUTPUT_NAME: &str = "Vehicle.MultiRisingEdgeTrigger";

/// Registry of custom functions keyed by name, as the AST's
/// `custom_function("name", args...)` calls reference them.
#[derive(Default)]
pub struct CustomFunctionRegistry {
    functions: HashMap<String, Box<dyn CustomFunction>>,
}

impl CustomFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the standard built-ins, except `MULTI_RISING_EDGE_TRIGGER`,
    /// which needs a resolved output signal id from the caller.
    pub fn with_builtins(mut self) -> Self {
        self.register("abs", Box::new(AbsFn));
        self.register("ceil", Box::new(CeilFn));
        self.register("floor", Box::new(FloorFn));
        self.register("min", Box::new(MinFn));
        self.register("max", Box::new(MaxFn));
        self.register("pow", Box::new(PowFn));
        self.register("log", Box::new(LogFn));
        self
    }

    pub fn register(&mut self, name: &str, function: Box<dyn CustomFunction>) {
        self.functions.insert(name.to_string(), function);
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn CustomFunction>> {
        self.functions.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.functions.keys()
    }
}
