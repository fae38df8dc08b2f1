//! Core data model shared across the decoder, inspection history, and
//! evaluator: signal/channel identifiers, timestamps, tagged signal values,
//! and the collected-frame shapes handed to the uplink queue.

use std::sync::Arc;

/// Opaque signal identifier. [`SignalId::INVALID`] is the sentinel used by
/// decoder dictionaries for signals that should never be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId(pub u32);

impl SignalId {
    /// Sentinel value denoting "unknown/invalid" per the data model.
    pub const INVALID: SignalId = SignalId(u32::MAX);

    /// Returns true if this is the invalid sentinel.
    #[inline]
    pub fn is_invalid(&self) -> bool {
        *self == SignalId::INVALID
    }
}

/// Small integer naming a bus instance (e.g. `can0`, `can1`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u8);

/// Monotonic milliseconds since an agent-chosen epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Saturating difference `self - other`, in milliseconds.
    #[inline]
    pub fn saturating_sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl core::ops::Add<u64> for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs))
    }
}

impl core::ops::Sub<u64> for Timestamp {
    type Output = Timestamp;
    fn sub(self, rhs: u64) -> Timestamp {
        Timestamp(self.0.saturating_sub(rhs))
    }
}

/// The declared storage type for a signal. Decoding yields this type
/// exactly; it also drives how raw extraction bits are widened and scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    Double,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Bool,
    String,
}

/// A tagged union over the values a signal can carry.
///
/// Numeric comparisons coerce `Bool` to `{0, 1}`; `String` never coerces.
/// Strings are reference-counted (`Arc<str>`) so cloning a sample into
/// multiple distributor sinks is cheap, and never enter the numeric ring
/// buffer (see `inspection::history`).
#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    Undefined,
    Bool(bool),
    Double(f64),
    String(Arc<str>),
}

impl SignalValue {
    /// Attempts a numeric coercion: `Bool` becomes `0.0`/`1.0`, `Double`
    /// passes through, everything else (including `String`) is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SignalValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            SignalValue::Double(v) => Some(*v),
            SignalValue::Undefined | SignalValue::String(_) => None,
        }
    }

    /// Boolean context coercion used for activation: `Undefined` is `false`
    /// for activation purposes (though recorded distinctly by callers that
    /// care about the difference between "false" and "undefined").
    pub fn as_bool_for_activation(&self) -> bool {
        match self {
            SignalValue::Bool(b) => *b,
            SignalValue::Double(v) => *v != 0.0,
            SignalValue::Undefined | SignalValue::String(_) => false,
        }
    }

    /// True if this value is the `Undefined` variant.
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, SignalValue::Undefined)
    }
}

/// Maximum raw CAN frame payload this engine ever buffers (CAN FD, 64 bytes).
pub const MAX_FRAME_LEN: usize = 64;

/// A collected signal: one sample pulled into a pending or finished
/// collection frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedSignal {
    pub signal_id: SignalId,
    pub timestamp: Timestamp,
    pub value: SignalValue,
    pub signal_type: SignalType,
}

/// A raw CAN frame captured verbatim, up to 64 bytes inline (no heap
/// allocation on the hot path).
#[derive(Debug, Clone, Copy)]
pub struct CollectedRawFrame {
    pub channel: ChannelId,
    pub frame_id: u32,
    pub receive_time: Timestamp,
    data: [u8; MAX_FRAME_LEN],
    len: u8,
}

impl CollectedRawFrame {
    /// Builds a raw frame record, truncating payloads longer than
    /// [`MAX_FRAME_LEN`] (callers are expected to have already validated
    /// length against the bus's actual frame size).
    pub fn new(channel: ChannelId, frame_id: u32, receive_time: Timestamp, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_FRAME_LEN);
        let mut data = [0u8; MAX_FRAME_LEN];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            channel,
            frame_id,
            receive_time,
            data,
            len: len as u8,
        }
    }

    /// The captured payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl PartialEq for CollectedRawFrame {
    fn eq(&self, other: &Self) -> bool {
        self.channel == other.channel
            && self.frame_id == other.frame_id
            && self.receive_time == other.receive_time
            && self.payload() == other.payload()
    }
}

/// Optional raw frame plus an ordered list of collected signals. An empty
/// frame (`raw_frame: None`, `signals: vec![]`) is a legal no-op, per the
/// data model invariant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedDataFrame {
    pub raw_frame: Option<CollectedRawFrame>,
    pub signals: Vec<CollectedSignal>,
}

impl Default for CollectedRawFrame {
    fn default() -> Self {
        Self::new(ChannelId(0), 0, Timestamp(0), &[])
    }
}

impl CollectedDataFrame {
    pub fn is_empty(&self) -> bool {
        self.raw_frame.is_none() && self.signals.is_empty()
    }
}
