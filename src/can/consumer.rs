//! The CAN consumer: one long-lived worker per bus channel, draining an
//! inbound raw-frame queue, applying the current dictionary snapshot, and
//! pushing decoded frames downstream via a distributor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::can::decoder::{decode_frame, DecoderCounters};
use crate::can::dictionary::{DictionarySlot, Lookup};
use crate::distributor::Distributor;
use crate::queue::BoundedQueue;
use crate::types::{ChannelId, CollectedDataFrame, Timestamp};

/// One ingested raw frame as handed off by the bus reader (out of scope:
/// the socket/transport itself).
#[derive(Debug, Clone)]
pub struct IngestFrame {
    pub channel: ChannelId,
    pub timestamp: Timestamp,
    pub frame_id: u32,
    pub payload: Vec<u8>,
}

const POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// Runs the consumer loop for one channel until `stop` is set. Pulls frames
/// from `inbound`, loads the dictionary snapshot once per frame, and fans
/// decoded output through `outbound`. A missing dictionary (post-
/// invalidation) drops the frame with no side effects.
pub fn run_consumer_loop(
    inbound: Arc<BoundedQueue<IngestFrame>>,
    dictionary: Arc<DictionarySlot>,
    outbound: Arc<Distributor<CollectedDataFrame>>,
    counters: Arc<DecoderCounters>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Acquire) {
        let Some(frame) = inbound.blocking_pop(POLL_TIMEOUT) else {
            continue;
        };
        let Some(snapshot) = dictionary.load() else {
            debug!(channel = frame.channel.0, "dictionary absent, dropping frame");
            continue;
        };

        let mut frame_id = frame.frame_id;
        let entry = match snapshot.lookup(frame.channel, frame_id) {
            Lookup::Direct(entry) => Some(entry),
            Lookup::ExtendedRewrite { entry, canonical_id } => {
                frame_id = canonical_id;
                Some(entry)
            }
            Lookup::Unknown => None,
        };

        let Some(entry) = entry else {
            continue;
        };

        let decoded = decode_frame(
            frame.channel,
            frame_id,
            frame.timestamp,
            &frame.payload,
            entry,
            &snapshot.signals_to_collect,
            &counters,
        );

        if !decoded.is_empty() {
            outbound.push(decoded);
        }
    }
}

/// Spawns [`run_consumer_loop`] on its own thread.
pub fn spawn_consumer(
    inbound: Arc<BoundedQueue<IngestFrame>>,
    dictionary: Arc<DictionarySlot>,
    outbound: Arc<Distributor<CollectedDataFrame>>,
    counters: Arc<DecoderCounters>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || run_consumer_loop(inbound, dictionary, outbound, counters, stop))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::dictionary::{CollectPolicy, DecoderDictionary};
    use crate::can::format::{CanMessageFormat, CanSignalFormat, Endianness, Signedness};
    use crate::queue::OverflowPolicy;
    use crate::types::{SignalId, SignalType};

    fn build_dictionary() -> DictionarySlot {
        let format = CanMessageFormat::new(
            0x123,
            8,
            vec![CanSignalFormat::new(
                SignalId(1),
                8,
                24,
                Endianness::BigEndian,
                Signedness::Signed,
                1.0,
                0.0,
                SignalType::Double,
            )],
        );
        let dict = DecoderDictionary::builder()
            .with_method(ChannelId(0), 0x123, format, CollectPolicy::Decode)
            .build();
        let slot = DictionarySlot::new();
        slot.swap(Arc::new(dict));
        slot
    }

    #[test]
    fn extended_id_frame_rewrites_canonical_id_downstream() {
        let dictionary = Arc::new(build_dictionary());
        let inbound = Arc::new(BoundedQueue::new(8, OverflowPolicy::DropNewest));
        let outbound_queue = Arc::new(BoundedQueue::new(8, OverflowPolicy::DropNewest));
        let mut distributor = Distributor::new();
        distributor.add_sink(outbound_queue.clone());
        let outbound = Arc::new(distributor);
        let counters = Arc::new(DecoderCounters::default());
        let stop = Arc::new(AtomicBool::new(false));

        inbound.try_push(IngestFrame {
            channel: ChannelId(0),
            timestamp: Timestamp(1),
            frame_id: 0x123 | 0x8000_0000,
            payload: vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07],
        });

        let handle = {
            let inbound = inbound.clone();
            let dictionary = dictionary.clone();
            let outbound = outbound.clone();
            let counters = counters.clone();
            let stop = stop.clone();
            thread::spawn(move || run_consumer_loop(inbound, dictionary, outbound, counters, stop))
        };

        let out = outbound_queue.blocking_pop(Duration::from_secs(2)).unwrap();
        stop.store(true, Ordering::Release);
        handle.join().unwrap();

        assert_eq!(out.raw_frame, None);
        assert_eq!(out.signals[0].value.as_f64(), Some(0x10203 as f64));
    }

    #[test]
    fn dictionary_invalidated_between_frames_drops_second_frame() {
        let dictionary = Arc::new(build_dictionary());
        let inbound = Arc::new(BoundedQueue::new(8, OverflowPolicy::DropNewest));
        let outbound_queue = Arc::new(BoundedQueue::new(8, OverflowPolicy::DropNewest));
        let mut distributor = Distributor::new();
        distributor.add_sink(outbound_queue.clone());
        let outbound = Arc::new(distributor);
        let counters = Arc::new(DecoderCounters::default());
        let stop = Arc::new(AtomicBool::new(false));

        inbound.try_push(IngestFrame {
            channel: ChannelId(0),
            timestamp: Timestamp(1),
            frame_id: 0x123,
            payload: vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07],
        });

        let handle = {
            let inbound = inbound.clone();
            let dictionary = dictionary.clone();
            let outbound = outbound.clone();
            let counters = counters.clone();
            let stop = stop.clone();
            thread::spawn(move || run_consumer_loop(inbound, dictionary, outbound, counters, stop))
        };

        let _ = outbound_queue.blocking_pop(Duration::from_secs(2)).unwrap();
        dictionary.invalidate();
        inbound.try_push(IngestFrame {
            channel: ChannelId(0),
            timestamp: Timestamp(2),
            frame_id: 0x123,
            payload: vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07],
        });
        assert!(outbound_queue
            .blocking_pop(Duration::from_millis(300))
            .is_none());

        stop.store(true, Ordering::Release);
        handle.join().unwrap();
    }
}
