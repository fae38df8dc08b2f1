#![forbid(unsafe_code)]

//! # inspect-engine
//!
//! An edge-side collection inspection engine for a vehicle telemetry agent:
//! decodes CAN signals against a hot-swappable dictionary, keeps bounded
//! per-signal history, evaluates cloud-issued campaign conditions against
//! that history, and emits collection payloads to an uplink queue.
//!
//! This crate implements the parts of the agent that run entirely on-box.
//! It does not own a bus socket or file descriptor itself (the CAN consumer
//! takes already-read frames, [`can::consumer::IngestFrame`]), and it does
//! not talk to the cloud control plane directly; dictionary and campaign
//! documents are handed in as already-fetched bytes.
//!
//! ## Data flow
//!
//! ```text
//! bus reader -> IngestFrame -> can::consumer (per channel) -> CollectedDataFrame
//!            -> inspection::engine (single worker) -> CollectionPayload -> uplink queue
//! ```
//!
//! ## Module overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Shared identifiers, tagged signal values, collected-frame shapes |
//! | [`error`] | Configuration-plane [`Error`] and [`Result`] |
//! | [`queue`] | Bounded, overflow-accounted queues used as every worker's suspension point |
//! | [`distributor`] | Fan-out of one decoded stream to multiple sinks |
//! | [`retry`] | Interruptible retry/backoff executor for uplink delivery |
//! | [`can`] | Dictionary snapshots, bit-exact signal extraction, the CAN consumer worker |
//! | [`inspection`] | Campaign compilation, history, the condition-language evaluator, the engine |
//!
//! ## Error handling
//!
//! Configuration-plane failures (a malformed dictionary or campaign
//! document) are [`Result`]-returning and reject the document while keeping
//! the previous one live. Data-plane failures (a single frame's decode
//! failure, an out-of-order sample, a full uplink queue) are never
//! exceptions: they are logged via `tracing` and tracked on per-component
//! atomic counters, so a single bad frame never stops the agent.

pub mod can;
pub mod distributor;
pub mod error;
pub mod inspection;
pub mod queue;
pub mod retry;
pub mod types;

pub use error::{Error, Result};
