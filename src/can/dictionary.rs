//! The decoder dictionary: an immutable, atomically-swappable snapshot
//! mapping `(channel, frame_id)` to a decode method.
//!
//! Swap is modeled as `RwLock<Option<Arc<DecoderDictionary>>>` rather than a
//! lock-free pointer: a reader takes a short read lock, clones the `Arc`,
//! and releases it before touching any frame data, giving a load-once-per-
//! frame, atomic-snapshot guarantee without a crossbeam/arc-swap dependency.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::can::format::CanMessageFormat;
use crate::types::{ChannelId, SignalId};

/// What a matched frame should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectPolicy {
    Raw,
    Decode,
    RawAndDecode,
}

/// Extended-frame id mask per Linux SocketCAN convention.
pub const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub format: Arc<CanMessageFormat>,
    pub collect_policy: CollectPolicy,
}

/// One immutable dictionary snapshot. Replacing the dictionary never
/// mutates an existing snapshot: a new one is built and swapped in.
#[derive(Debug, Default)]
pub struct DecoderDictionary {
    methods: HashMap<(ChannelId, u32), MethodEntry>,
    pub signals_to_collect: HashSet<SignalId>,
}

/// Outcome of looking a frame up against a dictionary snapshot.
pub enum Lookup<'a> {
    /// Matched directly; use `frame_id` as given.
    Direct(&'a MethodEntry),
    /// Matched only after masking off the extended-frame flag; the caller
    /// should rewrite the frame id to `canonical_id` before emitting records.
    ExtendedRewrite {
        entry: &'a MethodEntry,
        canonical_id: u32,
    },
    /// No method registered for this `(channel, frame_id)`.
    Unknown,
}

impl DecoderDictionary {
    pub fn builder() -> DecoderDictionaryBuilder {
        DecoderDictionaryBuilder::new()
    }

    /// Looks up a method: direct match, then retry masked by
    /// [`EXTENDED_ID_MASK`] with canonical-id rewrite on hit, else unknown.
    pub fn lookup(&self, channel: ChannelId, frame_id: u32) -> Lookup<'_> {
        if let Some(entry) = self.methods.get(&(channel, frame_id)) {
            return Lookup::Direct(entry);
        }
        let masked = frame_id & EXTENDED_ID_MASK;
        if masked != frame_id {
            if let Some(entry) = self.methods.get(&(channel, masked)) {
                return Lookup::ExtendedRewrite {
                    entry,
                    canonical_id: masked,
                };
            }
        }
        Lookup::Unknown
    }
}

/// Builds a [`DecoderDictionary`] snapshot before it's published.
#[derive(Default)]
pub struct DecoderDictionaryBuilder {
    methods: HashMap<(ChannelId, u32), MethodEntry>,
    signals_to_collect: HashSet<SignalId>,
}

impl DecoderDictionaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(
        mut self,
        channel: ChannelId,
        frame_id: u32,
        format: CanMessageFormat,
        collect_policy: CollectPolicy,
    ) -> Self {
        for sig in &format.signals {
            self.signals_to_collect.insert(sig.signal_id);
        }
        self.methods.insert(
            (channel, frame_id),
            MethodEntry {
                format: Arc::new(format),
                collect_policy,
            },
        );
        self
    }

    pub fn build(self) -> DecoderDictionary {
        DecoderDictionary {
            methods: self.methods,
            signals_to_collect: self.signals_to_collect,
        }
    }
}

/// Holds the currently active dictionary snapshot and allows atomic
/// replacement. `None` means "invalidated": frames are dropped while the
/// slot is empty.
#[derive(Default)]
pub struct DictionarySlot {
    current: RwLock<Option<Arc<DecoderDictionary>>>,
}

impl DictionarySlot {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Loads the current snapshot once; callers must process one frame
    /// against this clone only, never re-read mid-frame.
    pub fn load(&self) -> Option<Arc<DecoderDictionary>> {
        self.current.read().unwrap().clone()
    }

    /// Atomically replaces the active snapshot.
    pub fn swap(&self, dictionary: Arc<DecoderDictionary>) {
        *self.current.write().unwrap() = Some(dictionary);
    }

    /// Invalidates the slot; subsequent frames are dropped until the next
    /// swap.
    pub fn invalidate(&self) {
        *self.current.write().unwrap() = None;
    }
}
