//! Benchmarks for the hot path: frame decoding and history ingestion.
//!
//! Run with: cargo bench --bench decode_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use inspect_engine::can::decoder::{decode_frame, DecoderCounters};
use inspect_engine::can::dictionary::{CollectPolicy, DecoderDictionary};
use inspect_engine::can::format::{CanMessageFormat, CanSignalFormat, Endianness, Signedness};
use inspect_engine::inspection::history::SignalHistory;
use inspect_engine::types::{ChannelId, SignalId, SignalType, SignalValue, Timestamp};

fn build_format() -> CanMessageFormat {
    CanMessageFormat::new(
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
                SignalId(2),
                32,
                32,
                Endianness::BigEndian,
                Signedness::Signed,
                1.0,
                0.0,
                SignalType::Double,
            ),
        ],
    )
}

fn decode_benchmark(c: &mut Criterion) {
    let format = build_format();
    let dictionary = DecoderDictionary::builder()
        .with_method(ChannelId(0), 0x123, format, CollectPolicy::Decode)
        .build();
    let entry = dictionary.lookup(ChannelId(0), 0x123);
    let counters = DecoderCounters::default();
    let payload = [0x00u8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];

    c.bench_function("decode_frame signed bit-exact", |b| {
        b.iter(|| {
            let entry = match entry {
                inspect_engine::can::dictionary::Lookup::Direct(e) => e,
                _ => unreachable!(),
            };
            black_box(decode_frame(
                ChannelId(0),
                0x123,
                Timestamp(0),
                black_box(&payload),
                entry,
                &dictionary.signals_to_collect,
                &counters,
            ))
        })
    });
}

fn history_benchmark(c: &mut Criterion) {
    c.bench_function("signal history push at capacity", |b| {
        let mut history = SignalHistory::new(256, 60_000);
        let mut t = 0u64;
        b.iter(|| {
            t += 1;
            history.push(
                Timestamp(t),
                black_box(SignalValue::Double(t as f64)),
                SignalType::Double,
            );
        })
    });
}

criterion_group!(benches, decode_benchmark, history_benchmark);
criterion_main!(benches);
