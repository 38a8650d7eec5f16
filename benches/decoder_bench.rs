//! Benchmarks for the wheel frame decoder.
//!
//! Measures decoding throughput for a busy wheel: a burst of steps with the
//! occasional temperature sample, heartbeat and tag read.

use bytes::BytesMut;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use wheelhouse_core::{LockState, StepDirection, TagId};
use wheelhouse_protocol::{FrameDecoder, Message, find_sync_run};

fn busy_wheel_stream(frames: usize) -> BytesMut {
    let tag = TagId::new("3A00112233").expect("valid tag");
    let mut wire = BytesMut::new();
    for i in 0..frames {
        let message = match i % 50 {
            0 => Message::Tag(tag.clone()),
            10 => Message::Temperature { raw: 154 },
            25 => Message::LockState(LockState::Unlocked),
            _ => Message::Step(StepDirection::Forward),
        };
        message.encode_into(&mut wire);
    }
    wire
}

fn bench_decode(c: &mut Criterion) {
    let wire = busy_wheel_stream(1_000);

    let mut group = c.benchmark_group("frame_decoder");
    group.throughput(Throughput::Bytes(wire.len() as u64));

    group.bench_function("decode_whole_buffer", |b| {
        b.iter(|| {
            let mut buf = wire.clone();
            black_box(FrameDecoder::decode(&mut buf))
        })
    });

    group.bench_function("decode_per_tick_chunks", |b| {
        b.iter(|| {
            let mut buf = BytesMut::new();
            let mut count = 0;
            for chunk in wire.chunks(37) {
                buf.extend_from_slice(chunk);
                count += FrameDecoder::decode(&mut buf).messages.len();
            }
            black_box(count)
        })
    });

    group.finish();
}

fn bench_sync_search(c: &mut Criterion) {
    let mut stream = vec![0x00; 512];
    stream.extend_from_slice(&[0xFF; 10]);
    stream.extend_from_slice(&[0x05, 0x02]);

    c.bench_function("find_sync_run", |b| {
        b.iter(|| black_box(find_sync_run(black_box(&stream), 10)))
    });
}

criterion_group!(benches, bench_decode, bench_sync_search);
criterion_main!(benches);
