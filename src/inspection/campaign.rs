//! Campaign documents: the cloud-supplied JSON shape and the compiled,
//! immutable [`Campaign`] the engine evaluates against.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::inspection::ast::{assign_invocation_ids, Expr, WindowSpec};
use crate::inspection::custom_fn::CustomFunctionRegistry;
use crate::inspection::parser::parse_expression;
use crate::types::{SignalId, Timestamp};

/// `triggerMode` values in the cloud-issued campaign document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    #[serde(rename = "RISING_EDGE")]
    RisingEdge,
    #[serde(rename = "ALWAYS")]
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionBasedCollectionScheme {
    pub condition_language_version: u32,
    pub expression: String,
    pub trigger_mode: TriggerMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionScheme {
    pub condition_based_collection_scheme: ConditionBasedCollectionScheme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    #[serde(rename = "SNAPPY")]
    Snappy,
    #[serde(rename = "NONE")]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalToCollect {
    pub name: String,
    /// Optional per-signal window override; absent means "latest value
    /// only" for that signal's inclusion in the collection frame.
    #[serde(default)]
    pub window_ms: Option<u64>,
    #[serde(default)]
    pub window_samples: Option<usize>,
}

/// The wire shape of a campaign document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDocument {
    pub campaign_id: String,
    pub collection_scheme: CollectionScheme,
    pub signals_to_collect: Vec<SignalToCollect>,
    pub compression: Compression,
    #[serde(default)]
    pub minimum_trigger_interval_ms: u64,
    #[serde(default)]
    pub expiry_time_ms: Option<u64>,
}

/// A per-signal window specification attached to a campaign's collect set.
#[derive(Debug, Clone, Copy)]
pub struct CollectWindow {
    pub time_ms: Option<u64>,
    pub sample_count: Option<usize>,
}

impl CollectWindow {
    pub fn largest_sample_count(&self, observed_samples_for_time: usize) -> usize {
        self.sample_count
            .unwrap_or(0)
            .max(if self.time_ms.is_some() {
                observed_samples_for_time
            } else {
                0
            })
            .max(1)
    }
}

/// A compiled, immutable campaign ready for the evaluator.
#[derive(Debug, Clone)]
pub struct Campaign {
    pub campaign_id: String,
    pub condition: Expr,
    pub trigger_mode: TriggerMode,
    pub collect_set: HashMap<SignalId, CollectWindow>,
    pub minimum_trigger_interval_ms: u64,
    pub expiry: Option<Timestamp>,
}

impl Campaign {
    /// Parses and compiles a [`CampaignDocument`] against a signal name
    /// table and the registry of custom functions actually available at
    /// runtime, assigning stable invocation ids to every custom-function
    /// call site. Rejects the whole campaign on any structural, expression,
    /// or unknown-function error: a malformed campaign document is rejected
    /// and the prior campaign is kept.
    pub fn compile(
        doc: &CampaignDocument,
        signals: &HashMap<String, SignalId>,
        registry: &CustomFunctionRegistry,
    ) -> Result<Campaign> {
        let mut condition = parse_expression(
            &doc.collection_scheme.condition_based_collection_scheme.expression,
            signals,
        )?;
        assign_invocation_ids(&mut condition);
        check_custom_functions(&condition, registry)?;

        let mut collect_set = HashMap::new();
        for sig in &doc.signals_to_collect {
            let id = signals.get(&sig.name).copied().ok_or_else(|| {
                crate::error::Error::CampaignRejected(format!(
                    "signalsToCollect references unknown signal {:?}",
                    sig.name
                ))
            })?;
            collect_set.insert(
                id,
                CollectWindow {
                    time_ms: sig.window_ms,
                    sample_count: sig.window_samples,
                },
            );
        }

        Ok(Campaign {
            campaign_id: doc.campaign_id.clone(),
            condition,
            trigger_mode: doc.collection_scheme.condition_based_collection_scheme.trigger_mode,
            collect_set,
            minimum_trigger_interval_ms: doc.minimum_trigger_interval_ms,
            expiry: doc.expiry_time_ms.map(Timestamp),
        })
    }

    /// Every signal id this campaign's condition and collect set touch,
    /// used to size history ring buffers.
    pub fn referenced_signals(&self) -> Vec<SignalId> {
        let mut out = Vec::new();
        collect_signal_refs(&self.condition, &mut out);
        out.extend(self.collect_set.keys().copied());
        out
    }

    /// The largest window (in milliseconds and in sample count) this
    /// campaign's condition references, used to size history buffers.
    pub fn max_window(&self) -> (u64, usize) {
        let mut max_ms = 0u64;
        let mut max_count = 0usize;
        collect_window_bounds(&self.condition, &mut max_ms, &mut max_count);
        for window in self.collect_set.values() {
            if let Some(ms) = window.time_ms {
                max_ms = max_ms.max(ms);
            }
            if let Some(n) = window.sample_count {
                max_count = max_count.max(n);
            }
        }
        (max_ms, max_count)
    }
}

/// Rejects the expression if it calls a custom function with no registered
/// implementation, rather than letting it silently evaluate to `undefined`
/// at runtime.
fn check_custom_functions(expr: &Expr, registry: &CustomFunctionRegistry) -> Result<()> {
    match expr {
        Expr::CustomCall { name, args, .. } => {
            if !registry.contains(name) {
                return Err(Error::UnknownCustomFunction(name.clone()));
            }
            for arg in args {
                check_custom_functions(arg, registry)?;
            }
        }
        Expr::Not(inner) => check_custom_functions(inner, registry)?,
        Expr::Arith { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } | Expr::Logical { lhs, rhs, .. } => {
            check_custom_functions(lhs, registry)?;
            check_custom_functions(rhs, registry)?;
        }
        Expr::Conditional {
            cond,
            then_branch,
            else_branch,
        } => {
            check_custom_functions(cond, registry)?;
            check_custom_functions(then_branch, registry)?;
            check_custom_functions(else_branch, registry)?;
        }
        Expr::Window { .. }
        | Expr::SignalRef(_)
        | Expr::NumberLit(_)
        | Expr::StringLit(_)
        | Expr::BoolLit(_) => {}
    }
    Ok(())
}

fn collect_signal_refs(expr: &Expr, out: &mut Vec<SignalId>) {
    match expr {
        Expr::SignalRef(id) => out.push(*id),
        Expr::Window { signal, .. } => out.push(*signal),
        Expr::Not(inner) => collect_signal_refs(inner, out),
        Expr::Arith { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } | Expr::Logical { lhs, rhs, .. } => {
            collect_signal_refs(lhs, out);
            collect_signal_refs(rhs, out);
        }
        Expr::Conditional {
            cond,
            then_branch,
            else_branch,
        } => {
            collect_signal_refs(cond, out);
            collect_signal_refs(then_branch, out);
            collect_signal_refs(else_branch, out);
        }
        Expr::CustomCall { args, .. } => {
            for arg in args {
                collect_signal_refs(arg, out);
            }
        }
        Expr::NumberLit(_) | Expr::StringLit(_) | Expr::BoolLit(_) => {}
    }
}

fn collect_window_bounds(expr: &Expr, max_ms: &mut u64, max_count: &mut usize) {
    match expr {
        Expr::Window { kind, .. } => {
            use crate::inspection::ast::WindowFn::*;
            let spec = match kind {
                Min(s) | Max(s) | Sum(s) | Count(s) | Avg(s) | Presence(s) => Some(*s),
                Latest | Previous => None,
            };
            if let Some(spec) = spec {
                match spec {
                    WindowSpec::Count(n) => *max_count = (*max_count).max(n),
                    WindowSpec::TimeMs(ms) => *max_ms = (*max_ms).max(ms),
                }
            }
        }
        Expr::Not(inner) => collect_window_bounds(inner, max_ms, max_count),
        Expr::Arith { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } | Expr::Logical { lhs, rhs, .. } => {
            collect_window_bounds(lhs, max_ms, max_count);
            collect_window_bounds(rhs, max_ms, max_count);
        }
        Expr::Conditional {
            cond,
            then_branch,
            else_branch,
        } => {
            collect_window_bounds(cond, max_ms, max_count);
            collect_window_bounds(then_branch, max_ms, max_count);
            collect_window_bounds(else_branch, max_ms, max_count);
        }
        Expr::CustomCall { args, .. } => {
            for arg in args {
                collect_window_bounds(arg, max_ms, max_count);
            }
        }
        Expr::SignalRef(_) | Expr::NumberLit(_) | Expr::StringLit(_) | Expr::BoolLit(_) => {}
    }
}
