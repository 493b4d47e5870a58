//! Tick Queue Throughput Benchmark
//!
//! - Single-threaded push/pop of a batch of ticks
//! - N producer threads feeding one consumer through `pop`
//! - Full pipeline: queue → dispatch engine → stats subscriber

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use market_data_feed::market_data::{DispatchConfig, DispatchEngine, MarketStatsTracker, StatsSubscriber};
use market_data_feed::queue::TickQueue;
use market_data_feed::{Tick, TickSide};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const BATCH: usize = 10_000;
const SYMBOLS: [&str; 4] = ["AAPL", "MSFT", "GOOGL", "TSLA"];

fn make_tick(i: usize) -> Tick {
    let side = if i % 2 == 0 { TickSide::Buy } else { TickSide::Sell };
    Tick::new(
        SYMBOLS[i % SYMBOLS.len()],
        side,
        100.0 + (i % 500) as f64 / 100.0,
        (i % 100) as i64 + 1,
        Utc::now(),
    )
}

fn bench_push_pop(c: &mut Criterion) {
    let ticks: Vec<Tick> = (0..BATCH).map(make_tick).collect();

    let mut group = c.benchmark_group("queue_single_thread");
    group.throughput(Throughput::Elements(BATCH as u64));
    group.bench_function("push_then_try_pop", |b| {
        let queue = TickQueue::new();
        b.iter(|| {
            for tick in &ticks {
                queue.push(tick.clone());
            }
            while let Some(tick) = queue.try_pop() {
                black_box(tick);
            }
        });
    });
    group.finish();
}

fn bench_producers(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_producers");
    group.throughput(Throughput::Elements(BATCH as u64));

    for producers in [1usize, 2, 4] {
        group.bench_with_input(
            BenchmarkId::from_parameter(producers),
            &producers,
            |b, &producers| {
                b.iter(|| {
                    let queue = Arc::new(TickQueue::new());
                    let per_producer = BATCH / producers;

                    let handles: Vec<_> = (0..producers)
                        .map(|p| {
                            let queue = Arc::clone(&queue);
                            thread::spawn(move || {
                                for i in 0..per_producer {
                                    queue.push(make_tick(p * per_producer + i));
                                }
                            })
                        })
                        .collect();

                    for _ in 0..per_producer * producers {
                        black_box(queue.pop());
                    }
                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_dispatch_pipeline(c: &mut Criterion) {
    let ticks: Vec<Tick> = (0..BATCH).map(make_tick).collect();

    let mut group = c.benchmark_group("dispatch_pipeline");
    group.throughput(Throughput::Elements(BATCH as u64));
    group.sample_size(20);
    group.bench_function("queue_to_stats", |b| {
        let queue = Arc::new(TickQueue::new());
        let engine = DispatchEngine::with_config(
            Arc::clone(&queue),
            DispatchConfig {
                poll_interval: Duration::from_millis(1),
            },
        );
        engine.subscribe(Arc::new(StatsSubscriber::new(Arc::new(MarketStatsTracker::new()))));
        engine.start().unwrap();

        b.iter_custom(|iters| {
            let started = Instant::now();
            for _ in 0..iters {
                let target = engine.stats().ticks_dispatched + BATCH as u64;
                for tick in &ticks {
                    queue.push(tick.clone());
                }
                while engine.stats().ticks_dispatched < target {
                    thread::yield_now();
                }
            }
            started.elapsed()
        });

        engine.stop();
    });
    group.finish();
}

criterion_group!(benches, bench_push_pop, bench_producers, bench_dispatch_pipeline);
criterion_main!(benches);
