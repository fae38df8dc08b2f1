//! The collection emitter: assembles a bounded collection payload when a
//! campaign fires and hands it to the uplink queue.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::inspection::ast::InvocationId;
use crate::inspection::campaign::Campaign;
use crate::inspection::custom_fn::CustomFunctionRegistry;
use crate::inspection::history::SignalHistory;
use crate::queue::BoundedQueue;
use crate::types::{CollectedSignal, SignalId, Timestamp};

/// One fired campaign's assembled output.
#[derive(Debug, Clone)]
pub struct CollectionPayload {
    pub campaign_id: String,
    pub fire_timestamp: Timestamp,
    pub signals: Vec<CollectedSignal>,
}

/// Counts payloads dropped because the uplink queue was full; the
/// inspection thread is never blocked on this.
#[derive(Debug, Default)]
pub struct EmitterCounters {
    pub dropped: AtomicU64,
}

/// Builds the collection frame for a fired campaign: pulls window-matching
/// samples for each collect-set signal, lets every custom function invoked
/// this round append its own output via `condition_end`, then pushes the
/// finished frame to `uplink`.
pub fn emit_collection(
    campaign: &Campaign,
    histories: &HashMap<SignalId, SignalHistory>,
    invoked_this_round: &[(String, InvocationId)],
    registry: &mut CustomFunctionRegistry,
    now: Timestamp,
    uplink: &BoundedQueue<CollectionPayload>,
    counters: &EmitterCounters,
) {
    let mut signals = Vec::new();
    let collected_ids: HashSet<SignalId> = campaign.collect_set.keys().copied().collect();

    for (&signal_id, window) in &campaign.collect_set {
        let Some(history) = histories.get(&signal_id) else {
            continue;
        };
        let samples = match (window.time_ms, window.sample_count) {
            (None, None) => history.samples_last_n(1),
            (Some(ms), _) => history.samples_since(Timestamp(now.0.saturating_sub(ms))),
            (None, Some(n)) => history.samples_last_n(n),
        };
        for (timestamp, value, signal_type) in samples {
            signals.push(CollectedSignal {
                signal_id,
                timestamp,
                value,
                signal_type,
            });
        }
    }

    let mut appended = crate::types::CollectedDataFrame::default();
    for (name, invocation_id) in invoked_this_round {
        if let Some(function) = registry.get_mut(name) {
            function.condition_end(*invocation_id, &collected_ids, now, &mut appended);
        }
    }
    signals.extend(appended.signals);

    let payload = CollectionPayload {
        campaign_id: campaign.campaign_id.clone(),
        fire_timestamp: now,
        signals,
    };

    if !uplink.try_push(payload) {
        counters.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspection::campaign::{CampaignDocument, CollectionScheme, ConditionBasedCollectionScheme, Compression, SignalToCollect, TriggerMode};
    use crate::queue::OverflowPolicy;
    use crate::types::{SignalType, SignalValue};

    fn signals() -> HashMap<String, SignalId> {
        let mut m = HashMap::new();
        m.insert("x".to_string(), SignalId(1));
        m
    }

    #[test]
    fn emits_latest_value_when_no_window_specified() {
        let doc = CampaignDocument {
            campaign_id: "c1".to_string(),
            collection_scheme: CollectionScheme {
                condition_based_collection_scheme: ConditionBasedCollectionScheme {
                    condition_language_version: 1,
                    expression: "x > 0".to_string(),
                    trigger_mode: TriggerMode::RisingEdge,
                },
            },
            signals_to_collect: vec![SignalToCollect {
                name: "x".to_string(),
                window_ms: None,
                window_samples: None,
            }],
            compression: Compression::None,
            minimum_trigger_interval_ms: 0,
            expiry_time_ms: None,
        };
        let mut registry = CustomFunctionRegistry::new().with_builtins();
        let campaign = Campaign::compile(&doc, &signals(), &registry).unwrap();

        let mut histories = HashMap::new();
        let mut h = SignalHistory::new(10, 10_000);
        h.push(Timestamp(1), SignalValue::Double(5.0), SignalType::Double);
        histories.insert(SignalId(1), h);
        let uplink = BoundedQueue::new(4, OverflowPolicy::DropNewest);
        let counters = EmitterCounters::default();

        emit_collection(&campaign, &histories, &[], &mut registry, Timestamp(2), &uplink, &counters);

        let payload = uplink.try_pop().unwrap();
        assert_eq!(payload.campaign_id, "c1");
        assert_eq!(payload.signals.len(), 1);
        assert_eq!(payload.signals[0].value, SignalValue::Double(5.0));
    }

    #[test]
    fn overflow_increments_drop_counter_without_blocking() {
        let doc = CampaignDocument {
            campaign_id: "c1".to_string(),
            collection_scheme: CollectionScheme {
                condition_based_collection_scheme: ConditionBasedCollectionScheme {
                    condition_language_version: 1,
                    expression: "x > 0".to_string(),
                    trigger_mode: TriggerMode::Always,
                },
            },
            signals_to_collect: vec![],
            compression: Compression::None,
            minimum_trigger_interval_ms: 0,
            expiry_time_ms: None,
        };
        let mut registry = CustomFunctionRegistry::new().with_builtins();
        let campaign = Campaign::compile(&doc, &signals(), &registry).unwrap();
        let histories = HashMap::new();
        let uplink = BoundedQueue::new(1, OverflowPolicy::DropNewest);
        let counters = EmitterCounters::default();

        emit_collection(&campaign, &histories, &[], &mut registry, Timestamp(1), &uplink, &counters);
        emit_collection(&campaign, &histories, &[], &mut registry, Timestamp(2), &uplink, &counters);

        assert_eq!(counters.dropped.load(Ordering::Relaxed), 1);
    }
}
