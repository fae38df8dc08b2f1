//! The inspection engine: the single worker thread that owns per-signal
//! history, the compiled campaign set, and edge-detection state, and fires
//! the emitter on trigger.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{trace, warn};

use crate::inspection::campaign::Campaign;
use crate::inspection::custom_fn::CustomFunctionRegistry;
use crate::inspection::emitter::{emit_collection, CollectionPayload, EmitterCounters};
use crate::inspection::evaluator::{eval, EvalContext};
use crate::inspection::history::SignalHistory;
use crate::queue::BoundedQueue;
use crate::types::{CollectedDataFrame, SignalId, Timestamp};

const POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// Per-campaign edge-detection and throttling state, independent of the
/// campaign's own (immutable) compiled form.
#[derive(Debug, Default)]
struct CampaignState {
    active_last_round: bool,
    last_fired: Option<Timestamp>,
}

/// Owns everything one evaluation round needs: signal history sized per the
/// active campaign set, the compiled campaigns themselves, their
/// edge-detection state, and the custom-function registry.
pub struct InspectionEngine {
    histories: HashMap<SignalId, SignalHistory>,
    campaigns: Vec<Campaign>,
    states: Vec<CampaignState>,
    registry: CustomFunctionRegistry,
    uplink: Arc<BoundedQueue<CollectionPayload>>,
    emitter_counters: EmitterCounters,
}

impl InspectionEngine {
    /// Builds an engine for a freshly compiled campaign set. History buffers
    /// are sized to the largest window (time or sample count) any campaign
    /// references for that signal.
    pub fn new(
        campaigns: Vec<Campaign>,
        registry: CustomFunctionRegistry,
        uplink: Arc<BoundedQueue<CollectionPayload>>,
    ) -> Self {
        let mut bounds: HashMap<SignalId, (u64, usize)> = HashMap::new();
        for campaign in &campaigns {
            let (max_ms, max_count) = campaign.max_window();
            for signal in campaign.referenced_signals() {
                let entry = bounds.entry(signal).or_insert((0, 0));
                entry.0 = entry.0.max(max_ms);
                entry.1 = entry.1.max(max_count);
            }
        }

        let histories = bounds
            .into_iter()
            .map(|(signal, (max_ms, max_count))| {
                (signal, SignalHistory::new(max_count.max(1), max_ms.max(1)))
            })
            .collect();

        let states = campaigns.iter().map(|_| CampaignState::default()).collect();

        Self {
            histories,
            campaigns,
            states,
            registry,
            uplink,
            emitter_counters: EmitterCounters::default(),
        }
    }

    pub fn emitter_counters(&self) -> &EmitterCounters {
        &self.emitter_counters
    }

    /// Folds one decoded frame's signals into history, then re-evaluates
    /// every live campaign against the updated state.
    pub fn ingest(&mut self, frame: &CollectedDataFrame) {
        if frame.signals.is_empty() {
            return;
        }
        let mut now = Timestamp(0);
        for signal in &frame.signals {
            now = now.max(signal.timestamp);
            self.histories
                .entry(signal.signal_id)
                .or_insert_with(|| SignalHistory::new(1, 1))
                .push(signal.timestamp, signal.value.clone(), signal.signal_type);
        }
        self.evaluate_round(now);
    }

    fn evaluate_round(&mut self, now: Timestamp) {
        for idx in 0..self.campaigns.len() {
            let campaign = &self.campaigns[idx];

            if let Some(expiry) = campaign.expiry {
                if now >= expiry {
                    continue;
                }
            }

            let mut ctx = EvalContext::new(&self.histories, &mut self.registry, now);
            let value = eval(&campaign.condition, &mut ctx);
            let invoked = std::mem::take(&mut ctx.invoked_this_round);
            let activated = value.as_bool_for_activation();

            let state = &self.states[idx];
            let should_fire = match campaign.trigger_mode {
                crate::inspection::campaign::TriggerMode::RisingEdge => {
                    activated && !state.active_last_round
                }
                crate::inspection::campaign::TriggerMode::Always => activated,
            };

            let throttled = should_fire
                && state
                    .last_fired
                    .map(|last| now.saturating_sub(last) < campaign.minimum_trigger_interval_ms)
                    .unwrap_or(false);

            if should_fire && !throttled {
                trace!(campaign = %campaign.campaign_id, "campaign fired");
                emit_collection(
                    campaign,
                    &self.histories,
                    &invoked,
                    &mut self.registry,
                    now,
                    &self.uplink,
                    &self.emitter_counters,
                );
                self.states[idx].last_fired = Some(now);
            } else if should_fire && throttled {
                warn!(campaign = %campaign.campaign_id, "suppressed by minimum trigger interval");
            }

            self.states[idx].active_last_round = activated;
        }
    }
}

/// Runs the engine until `stop` is set, pulling decoded frames from
/// `inbound` as its sole suspension point.
pub fn run_engine_loop(
    inbound: Arc<BoundedQueue<CollectedDataFrame>>,
    mut engine: InspectionEngine,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Acquire) {
        let Some(frame) = inbound.blocking_pop(POLL_TIMEOUT) else {
            continue;
        };
        engine.ingest(&frame);
    }
}

/// Spawns [`run_engine_loop`] on its own thread.
pub fn spawn_engine(
    inbound: Arc<BoundedQueue<CollectedDataFrame>>,
    engine: InspectionEngine,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || run_engine_loop(inbound, engine, stop))
}
