use std::hint::black_box;

use castbus::pubsub::{decode_event, encode_event, ChannelEvent};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

fn sample(with_ack: bool) -> ChannelEvent {
    let ev = ChannelEvent::new("orders", "/widgets/chart", "x".repeat(256));
    if with_ack {
        ev.with_ack("k3Jx9aQe-2a", true)
    } else {
        ev
    }
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_encode");
    for (name, with_ack) in [("plain", false), ("ack", true)] {
        let ev = sample(with_ack);
        group.bench_function(name, |b| {
            b.iter(|| black_box(encode_event(black_box(&ev)).unwrap()))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_decode");
    for (name, with_ack) in [("plain", false), ("ack", true)] {
        let frame = encode_event(&sample(with_ack)).unwrap();
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| black_box(decode_event(black_box(&frame)).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
