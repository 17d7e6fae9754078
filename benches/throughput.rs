//! Throughput benchmarks for Tributary pipelines.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tributary::channel::{Input, MultiInput, Producer};
use tributary::{Context, Pipeline, Stream};

fn bench_push_through_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_through_chain");

    for depth in [1usize, 8, 32].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let pipeline: Pipeline<Input<u64>, _> = Pipeline::channel();
            let mut pipeline = pipeline.map(|x| x);
            for _ in 1..depth {
                pipeline = pipeline.next(|s| s.map(|x| x.wrapping_add(1)));
            }
            let sum = Arc::new(AtomicU64::new(0));
            let sink = sum.clone();
            let (input, _sub) = pipeline.subscribe_values(&Context::Direct, move |v| {
                sink.fetch_add(v, Ordering::Relaxed);
            });

            let mut i = 0u64;
            b.iter(|| {
                input.push(black_box(i)).unwrap();
                i += 1;
            });
            black_box(sum.load(Ordering::Relaxed));
        });
    }

    group.finish();
}

fn bench_buffer_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_batches");

    for count in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(10_000));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let batches = Arc::new(AtomicU64::new(0));
                let sink = batches.clone();
                let _sub = Stream::from_values(0..10_000u64)
                    .buffer_count(count)
                    .subscribe_values(&Context::Direct, move |batch| {
                        sink.fetch_add(batch.len() as u64, Ordering::Relaxed);
                    });
                black_box(batches.load(Ordering::Relaxed))
            });
        });
    }

    group.finish();
}

fn bench_multi_producer(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_producer");

    for producers in [1usize, 2, 4].iter() {
        let per_producer = 10_000u64;
        group.throughput(Throughput::Elements(per_producer * *producers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(producers),
            producers,
            |b, &producers| {
                b.iter(|| {
                    let pipeline: Pipeline<MultiInput<u64>, _> = Pipeline::multi_channel();
                    let received = Arc::new(AtomicU64::new(0));
                    let sink = received.clone();
                    let (input, _sub) = pipeline.filter(|x| x % 2 == 0).subscribe_values(
                        &Context::Direct,
                        move |_| {
                            sink.fetch_add(1, Ordering::Relaxed);
                        },
                    );

                    std::thread::scope(|s| {
                        for _ in 0..producers {
                            let input = input.clone();
                            s.spawn(move || {
                                for i in 0..per_producer {
                                    input.push(i).unwrap();
                                }
                            });
                        }
                    });
                    black_box(received.load(Ordering::Relaxed))
                });
            },
        );
    }

    group.finish();
}

fn bench_replay_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay_fanout");

    for subscribers in [1usize, 8, 64].iter() {
        group.throughput(Throughput::Elements(*subscribers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            subscribers,
            |b, &subscribers| {
                let pipeline: Pipeline<Input<u64>, _> = Pipeline::channel();
                let pipeline = pipeline.continuous();
                let total = Arc::new(AtomicU64::new(0));
                let _subs: Vec<_> = (0..subscribers)
                    .map(|_| {
                        let sink = total.clone();
                        pipeline.subscribe(&Context::Direct, move |_| {
                            sink.fetch_add(1, Ordering::Relaxed);
                        })
                    })
                    .collect();

                let mut i = 0u64;
                b.iter(|| {
                    pipeline.push(black_box(i)).unwrap();
                    i += 1;
                });
                black_box(total.load(Ordering::Relaxed));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_push_through_chain,
    bench_buffer_batches,
    bench_multi_producer,
    bench_replay_fanout
);
criterion_main!(benches);
