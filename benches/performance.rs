//! Performance benchmarks for event routing and the notification log.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use live_sync::{
    ConnectMode, InboundKind, MemoryTransportFactory, NotificationLog, RecycleBinEventKind,
    SyncConfig, SyncManager, SystemClock, UserIdentity,
};
use serde_json::json;
use std::sync::Arc;

fn create_manager() -> (SyncManager, Arc<MemoryTransportFactory>) {
    let factory = MemoryTransportFactory::new(ConnectMode::Accept);
    let manager = SyncManager::new(SyncConfig::default(), factory.clone());
    (manager, factory)
}

/// Benchmark folder event fan-out with varying subscriber counts
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for subscribers in [1, 10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let (manager, factory) = create_manager();
                for _ in 0..count {
                    manager
                        .subscribe_project("P1", |event| {
                            black_box(event);
                        })
                        .unwrap();
                }
                let transport = factory.latest().unwrap();
                let payload = json!({
                    "projectId": "P1",
                    "eventType": "change",
                    "fileName": "main.rs",
                    "relativePath": "src/main.rs",
                    "isFolder": false,
                    "timestamp": 1_700_000_000_000i64
                });

                b.iter(|| {
                    black_box(transport.fire("folder_sync", payload.clone()));
                });
            },
        );
    }

    group.finish();
}

/// Benchmark routing when most channels are someone else's
fn bench_many_channels(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_channels");

    for channels in [10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("channels", channels),
            &channels,
            |b, &count| {
                let (manager, factory) = create_manager();
                for p in 0..count {
                    manager.subscribe_project(format!("P{}", p), |_| {}).unwrap();
                }
                let transport = factory.latest().unwrap();
                let payload = json!({"projectId": "P0", "eventType": "add", "fileName": "a"});

                b.iter(|| {
                    black_box(transport.fire("folder_sync", payload.clone()));
                });
            },
        );
    }

    group.finish();
}

fn bench_lifecycle_event(c: &mut Criterion) {
    let (manager, factory) = create_manager();
    manager
        .subscribe_recycle_bin(UserIdentity::new("u-1", "user"), |event| {
            black_box(event);
        })
        .unwrap();
    let transport = factory.latest().unwrap();
    let payload = json!({"type": "file_deleted", "data": {"fileName": "old.txt"}});

    c.bench_function("lifecycle_event", |b| {
        b.iter(|| {
            black_box(transport.fire(InboundKind::RecycleBinEvent.wire_name(), payload.clone()));
        });
    });
}

/// Benchmark log append and queries at capacity
fn bench_notification_log(c: &mut Criterion) {
    let mut group = c.benchmark_group("notification_log");

    for capacity in [50, 500, 5000] {
        let log = NotificationLog::new(capacity, Arc::new(SystemClock));
        for i in 0..capacity {
            log.record(RecycleBinEventKind::ItemRestored, json!({ "i": i }));
        }

        group.bench_with_input(BenchmarkId::new("record", capacity), &log, |b, log| {
            b.iter(|| {
                black_box(log.record(RecycleBinEventKind::FileDeleted, json!({})));
            });
        });

        group.bench_with_input(BenchmarkId::new("has_recent", capacity), &log, |b, log| {
            b.iter(|| {
                black_box(log.has_recent(&RecycleBinEventKind::BinEmptied));
            });
        });

        group.bench_with_input(BenchmarkId::new("recent_10", capacity), &log, |b, log| {
            b.iter(|| {
                black_box(log.recent(10));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_fan_out,
    bench_many_channels,
    bench_lifecycle_event,
    bench_notification_log,
);

criterion_main!(benches);
