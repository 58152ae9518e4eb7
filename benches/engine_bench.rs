use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::{Duration, Instant};

use tiersched::queue::Inbox;
use tiersched::{Engine, EngineConfig, FnItem};

fn bench_submission(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");

    group.bench_function("submit_far_deadline", |b| {
        let engine = Engine::new();
        engine.start(EngineConfig::default()).unwrap();
        let far = Instant::now() + Duration::from_secs(3600);

        b.iter(|| {
            engine
                .submit(FnItem::new(black_box(far), || {}))
                .unwrap();
        });
        engine.stop();
    });

    group.bench_function("submit_near_deadline", |b| {
        let engine = Engine::new();
        engine.start(EngineConfig::default()).unwrap();

        b.iter(|| {
            let deadline = Instant::now() + Duration::from_millis(100);
            engine
                .submit(FnItem::new(black_box(deadline), || {}))
                .unwrap();
        });
        engine.stop();
    });

    group.finish();
}

fn bench_inbox(c: &mut Criterion) {
    let mut group = c.benchmark_group("inbox");

    group.bench_function("push_then_drain_64", |b| {
        let inbox = Inbox::new();
        let deadline = Instant::now();

        b.iter(|| {
            for _ in 0..64 {
                inbox.push(Box::new(FnItem::new(deadline, || {})));
            }
            black_box(inbox.drain_all());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_submission, bench_inbox);
criterion_main!(benches);
