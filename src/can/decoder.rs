//! Applies a matched [`MethodEntry`] to a raw frame payload, producing a
//! [`CollectedDataFrame`] per the `collect_policy`.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::can::dictionary::{CollectPolicy, MethodEntry};
use crate::types::{
    ChannelId, CollectedDataFrame, CollectedRawFrame, CollectedSignal, SignalId, Timestamp,
};

/// Counters for decode-time failure modes that must never abort ingestion.
#[derive(Debug, Default)]
pub struct DecoderCounters {
    pub decode_failures: AtomicU64,
    pub format_invalid: AtomicU64,
}

/// Decodes one frame against a matched method, honoring `collect_policy`,
/// the invalid-signal sentinel, and the `signals_to_collect` filter.
///
/// A format marked invalid skips decoding but still performs the RAW half
/// of `RAW_AND_DECODE`/`RAW`; a signal whose bits extend past the payload
/// is skipped individually, and the rest of the frame still decodes.
pub fn decode_frame(
    channel: ChannelId,
    frame_id: u32,
    timestamp: Timestamp,
    payload: &[u8],
    entry: &MethodEntry,
    signals_to_collect: &std::collections::HashSet<SignalId>,
    counters: &DecoderCounters,
) -> CollectedDataFrame {
    let mut out = CollectedDataFrame::default();

    let wants_raw = matches!(
        entry.collect_policy,
        CollectPolicy::Raw | CollectPolicy::RawAndDecode
    );
    let wants_decode = matches!(
        entry.collect_policy,
        CollectPolicy::Decode | CollectPolicy::RawAndDecode
    );

    if wants_raw {
        out.raw_frame = Some(CollectedRawFrame::new(channel, frame_id, timestamp, payload));
    }

    if !wants_decode {
        return out;
    }

    if !entry.format.valid {
        counters.format_invalid.fetch_add(1, Ordering::Relaxed);
        warn!(frame_id, channel = channel.0, "decoder format marked invalid, skipping decode");
        return out;
    }

    for sig_format in &entry.format.signals {
        if sig_format.signal_id.is_invalid() {
            continue;
        }
        if !signals_to_collect.contains(&sig_format.signal_id) {
            continue;
        }
        match sig_format.extract_physical(payload) {
            Some(value) => out.signals.push(CollectedSignal {
                signal_id: sig_format.signal_id,
                timestamp,
                value: crate::types::SignalValue::Double(value),
                signal_type: sig_format.output_type,
            }),
            None => {
                counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    frame_id,
                    channel = channel.0,
                    signal_id = sig_format.signal_id.0,
                    "signal bits exceed payload length, skipping signal"
                );
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::dictionary::DecoderDictionary;
    use crate::can::format::{CanMessageFormat, CanSignalFormat, Endianness, Signedness};
    use crate::types::SignalType;
    use std::collections::HashSet;

    fn dictionary_with_s1() -> (
        std::sync::Arc<crate::can::format::CanMessageFormat>,
        HashSet<SignalId>,
    ) {
        let format = CanMessageFormat::new(
            0x123,
            8,
            vec![
                CanSignalFormat::new(
                    SignalId(1),
                    8,
                    24,
                    Endianness::BigEndian,
                    Signedness::Signed,
                    1.0,
                    0.0,
                    SignalType::Double,
                ),
                CanSignalFormat::new(
                    SignalId(7),
                    32,
                    32,
                    Endianness::BigEndian,
                    Signedness::Signed,
                    1.0,
                    0.0,
                    SignalType::Double,
                ),
            ],
        );
        let mut collect = HashSet::new();
        collect.insert(SignalId(1));
        collect.insert(SignalId(7));
        (std::sync::Arc::new(format), collect)
    }

    #[test]
    fn s1_decode_vector() {
        let (format, collect) = dictionary_with_s1();
        let entry = crate::can::dictionary::MethodEntry {
            format,
            collect_policy: CollectPolicy::Decode,
        };
        let payload = [0x00u8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let counters = DecoderCounters::default();
        let frame = decode_frame(
            ChannelId(0),
            0x123,
            Timestamp(1),
            &payload,
            &entry,
            &collect,
            &counters,
        );
        assert_eq!(frame.signals.len(), 2);
        assert_eq!(frame.signals[0].value.as_f64(), Some(0x10203 as f64));
        assert_eq!(frame.signals[1].value.as_f64(), Some(0x4050607 as f64));
        assert_eq!(counters.decode_failures.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn s2_fd_payload_produces_raw_and_decoded() {
        let (format, collect) = dictionary_with_s1();
        let entry = crate::can::dictionary::MethodEntry {
            format,
            collect_policy: CollectPolicy::RawAndDecode,
        };
        let payload: Vec<u8> = (0u8..64).collect();
        let counters = DecoderCounters::default();
        let frame = decode_frame(
            ChannelId(0),
            0x123,
            Timestamp(1),
            &payload,
            &entry,
            &collect,
            &counters,
        );
        assert_eq!(frame.raw_frame.as_ref().unwrap().len(), 64);
        assert_eq!(frame.signals.len(), 2);
        assert_eq!(frame.signals[0].value.as_f64(), Some(0x10203 as f64));
        assert_eq!(frame.signals[1].value.as_f64(), Some(0x4050607 as f64));
    }

    #[test]
    fn invalid_format_skips_decode_but_keeps_raw() {
        let (format, collect) = dictionary_with_s1();
        let mut format = (*format).clone();
        format.valid = false;
        let entry = crate::can::dictionary::MethodEntry {
            format: std::sync::Arc::new(format),
            collect_policy: CollectPolicy::RawAndDecode,
        };
        let payload = [0u8; 8];
        let counters = DecoderCounters::default();
        let frame = decode_frame(
            ChannelId(0),
            0x123,
            Timestamp(1),
            &payload,
            &entry,
            &collect,
            &counters,
        );
        assert!(frame.raw_frame.is_some());
        assert!(frame.signals.is_empty());
        assert_eq!(counters.format_invalid.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn signal_not_in_collect_set_is_skipped() {
        let (format, _collect) = dictionary_with_s1();
        let entry = crate::can::dictionary::MethodEntry {
            format,
            collect_policy: CollectPolicy::Decode,
        };
        let payload = [0x00u8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let counters = DecoderCounters::default();
        let only_sig1: HashSet<SignalId> = [SignalId(1)].into_iter().collect();
        let frame = decode_frame(
            ChannelId(0),
            0x123,
            Timestamp(1),
            &payload,
            &entry,
            &only_sig1,
            &counters,
        );
        assert_eq!(frame.signals.len(), 1);
        assert_eq!(frame.signals[0].signal_id, SignalId(1));
    }
}
