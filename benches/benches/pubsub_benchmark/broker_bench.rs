use std::{hint::black_box, sync::Arc, time::Duration};

use castbus::{
    callback, AckBroker, AckSettings, BrokerOptions, ChannelEvent, LocalTransport,
    MessageBroker, OutgoingMessage, PublishParams,
};
use criterion::{criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn bench_publish(c: &mut Criterion) {
    let rt = runtime();
    let _enter = rt.enter();

    let transport = LocalTransport::with_capacity(1 << 16);
    let a = MessageBroker::new(&transport, BrokerOptions::new("/a")).unwrap();

    c.bench_function("publish_no_peers", |b| {
        b.iter(|| {
            a.publish(black_box(PublishParams::new("orders", "payload")))
                .unwrap()
        })
    });

    // Пир без подписчиков разбирает кадры, но не копит журнал.
    let _peer = MessageBroker::new(&transport, BrokerOptions::new("/b")).unwrap();

    c.bench_function("publish_one_idle_peer", |b| {
        b.iter(|| {
            a.publish(black_box(PublishParams::new("orders", "payload")))
                .unwrap()
        })
    });
}

/// Подписка с повторной доставкой журнала из 100 событий.
fn bench_subscribe_with_replay(c: &mut Criterion) {
    let rt = runtime();
    let _enter = rt.enter();

    let transport = LocalTransport::new();
    let a = MessageBroker::new(&transport, BrokerOptions::new("/a")).unwrap();
    let b = MessageBroker::new(&transport, BrokerOptions::new("/b")).unwrap();
    b.subscribe("orders", callback(|_| {})).unwrap();

    for n in 0..100 {
        a.publish(PublishParams::new("orders", format!("m{n}"))).unwrap();
    }
    rt.block_on(async {
        while b.replay_len("orders") < 100 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    c.bench_function("subscribe_replay_100", |bench| {
        bench.iter(|| {
            let cb = callback(|ev: &ChannelEvent| {
                black_box(ev);
            });
            b.subscribe("orders", cb.clone()).unwrap();
            b.unsubscribe("orders", &cb);
        })
    });
}

fn bench_ack_round_trip(c: &mut Criterion) {
    let rt = runtime();
    let transport = LocalTransport::new();
    let settings = AckSettings::builder()
        .retry_interval(Duration::from_millis(500))
        .build();

    let (sender, receiver) = rt.block_on(async {
        let sender = AckBroker::new(&transport, BrokerOptions::new("/a"), settings.clone()).unwrap();
        let receiver = Arc::new(AckBroker::new(&transport, BrokerOptions::new("/b"), settings).unwrap());
        let acker = {
            let receiver = receiver.clone();
            callback(move |ev: &ChannelEvent| {
                let _ = receiver.received(ev);
            })
        };
        receiver.broker().subscribe("orders", acker).unwrap();
        (sender, receiver)
    });

    c.bench_function("ack_round_trip", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                sender
                    .send(OutgoingMessage::new("orders", "payload"))
                    .await
                    .unwrap(),
            )
        })
    });

    rt.block_on(async {
        receiver.close().await.unwrap();
        sender.close().await.unwrap();
    });
}

criterion_group!(
    benches,
    bench_publish,
    bench_subscribe_with_replay,
    bench_ack_round_trip
);
criterion_main!(benches);
