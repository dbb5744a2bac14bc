//! Query recording hot-path benchmarks.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sqlmeter::{
    declare_metrics, DbConfig, EventBus, Instrumentation, InstrumentationConfig, ManagedPool,
    MetricsRegistry, PoolHandle, PoolRegistry, QueryEvent, QueryRecorder,
};

fn pool(name: &str) -> PoolHandle {
    Arc::new(ManagedPool::new(DbConfig::new(name)))
}

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("recorder/record");

    let config = InstrumentationConfig::default();
    let registry = Arc::new(MetricsRegistry::new());
    let names = declare_metrics(&registry, &config).unwrap();
    let recorder = QueryRecorder::new(
        registry.clone(),
        names.queries_total.clone(),
        names.query_duration.clone(),
    );

    let primary = pool("primary");
    group.bench_function("attributed", |b| {
        let event = QueryEvent::new(primary.clone(), "User Load").with_duration_ms(12.0);
        b.iter(|| black_box(recorder.record(&event)));
    });

    group.bench_function("cached_async", |b| {
        let event = QueryEvent::new(primary.clone(), "CACHE")
            .with_cached(true)
            .with_async(true)
            .with_duration_ms(0.2);
        b.iter(|| black_box(recorder.record(&event)));
    });

    group.bench_function("detached", |b| {
        let event = QueryEvent::detached("User Load");
        b.iter(|| black_box(recorder.record(&event)));
    });

    group.finish();
}

fn bench_series_cardinality(c: &mut Criterion) {
    let mut group = c.benchmark_group("recorder/cardinality");

    for kinds in [1usize, 16, 256] {
        let config = InstrumentationConfig::default();
        let registry = Arc::new(MetricsRegistry::new());
        let names = declare_metrics(&registry, &config).unwrap();
        let recorder =
            QueryRecorder::new(registry.clone(), names.queries_total, names.query_duration);

        let primary = pool("primary");
        let events: Vec<QueryEvent> = (0..kinds)
            .map(|i| QueryEvent::new(primary.clone(), format!("Model{i} Load")).with_duration_ms(4.0))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(kinds), &events, |b, events| {
            let mut i = 0;
            b.iter(|| {
                black_box(recorder.record(&events[i % events.len()]));
                i += 1;
            });
        });
    }

    group.finish();
}

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("recorder/publish");

    let config = InstrumentationConfig::default();
    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(MetricsRegistry::new());
    let _instrumentation = Instrumentation::install(
        bus.clone(),
        registry,
        Arc::new(PoolRegistry::new()),
        &config,
    )
    .unwrap();

    let event = QueryEvent::new(pool("primary"), "SQL").with_duration_ms(1.5);
    group.bench_function("through_bus", |b| {
        b.iter(|| black_box(bus.publish(&config.channel, &event)));
    });

    group.bench_function("unsubscribed_channel", |b| {
        b.iter(|| black_box(bus.publish("sql.other", &event)));
    });

    group.finish();
}

fn bench_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("recorder/export");

    let config = InstrumentationConfig::default();
    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(MetricsRegistry::new());
    let pools = Arc::new(PoolRegistry::new());
    for name in ["primary", "replica", "analytics"] {
        pools.register(pool(name)).unwrap();
    }
    let _instrumentation =
        Instrumentation::install(bus.clone(), registry.clone(), pools.clone(), &config).unwrap();

    for name in ["primary", "replica", "analytics"] {
        let handle = pools.get(name).unwrap();
        for kind in ["User Load", "Post Load", "SQL"] {
            bus.publish(
                &config.channel,
                &QueryEvent::new(handle.clone(), kind).with_duration_ms(8.0),
            );
        }
    }

    group.bench_function("to_prometheus", |b| {
        b.iter(|| black_box(registry.to_prometheus().unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_record,
    bench_series_cardinality,
    bench_publish,
    bench_export
);
criterion_main!(benches);
