//! Flush throughput benchmarks
//!
//! Run with: cargo bench -p zenith-reactive

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use zenith_reactive::{batch, ComputedSignal, Effect, Signal};

fn bench_write_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_fan_out");
    for subscribers in [1usize, 10, 100] {
        let source = Signal::new(0u64);
        let effects: Vec<Effect> = (0..subscribers)
            .map(|_| {
                let source = source.clone();
                Effect::new(move || {
                    black_box(source.get());
                })
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &source, |b, source| {
            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(next);
            })
        });

        for effect in effects {
            effect.dispose();
        }
        source.dispose();
    }
    group.finish();
}

fn bench_batched_writes(c: &mut Criterion) {
    let signals: Vec<Signal<u64>> = (0..32).map(|_| Signal::new(0)).collect();
    let sum = {
        let signals = signals.clone();
        Effect::new(move || {
            black_box(signals.iter().map(Signal::get).sum::<u64>());
        })
    };

    c.bench_function("batch_32_writes", |b| {
        let mut next = 0u64;
        b.iter(|| {
            next += 1;
            batch(|| {
                for signal in &signals {
                    signal.set(next);
                }
            })
        })
    });

    sum.dispose();
}

fn bench_diamond(c: &mut Criterion) {
    let source = Signal::new(0i64);
    let left = ComputedSignal::new({
        let source = source.clone();
        move || source.get() + 1
    });
    let right = ComputedSignal::new({
        let source = source.clone();
        move || source.get() * 2
    });
    let join = ComputedSignal::new({
        let (left, right) = (left.clone(), right.clone());
        move || left.get() + right.get()
    });

    c.bench_function("diamond_write_then_read", |b| {
        let mut next = 0i64;
        b.iter(|| {
            next += 1;
            source.set(next);
            black_box(join.get())
        })
    });

    join.dispose();
    left.dispose();
    right.dispose();
}

fn bench_signal_read(c: &mut Criterion) {
    let s = Signal::new(42i32);
    c.bench_function("signal_read_untracked", |b| b.iter(|| black_box(s.get())));
}

criterion_group!(
    benches,
    bench_write_fan_out,
    bench_batched_writes,
    bench_diamond,
    bench_signal_read,
);
criterion_main!(benches);
