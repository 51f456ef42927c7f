//! Benchmarks for property access and link propagation
//!
//! Run with: cargo bench

use blockflow::{Direction, LinkDiscipline, PropertyContainer, RuntimeContext};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_property_access(c: &mut Criterion) {
    let ctx = RuntimeContext::standalone();
    let container = PropertyContainer::new(&ctx, "bench");
    container
        .add_ranged_property("level", Direction::Input, 0.0f64, -1.0e9, 1.0e9, "")
        .unwrap();

    let mut group = c.benchmark_group("property_access");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get", |b| {
        b.iter(|| black_box(container.property_value::<f64>(black_box("level")).unwrap()))
    });

    let mut v = 0.0;
    group.bench_function("set_ranged", |b| {
        b.iter(|| {
            v += 1.0;
            container.set_property_value("level", black_box(v)).unwrap();
        })
    });

    let events = container.subscribe();
    group.bench_function("set_with_subscriber", |b| {
        b.iter(|| {
            container.set_property_value("level", black_box(1.0f64)).unwrap();
            events.drain();
        })
    });

    group.finish();
}

fn bench_async_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("async_fan_out");

    for destinations in [1usize, 4, 16] {
        let ctx = RuntimeContext::standalone();
        let source = PropertyContainer::new(&ctx, "source");
        source.add_property("out", Direction::Output, 0i32, "").unwrap();
        let sinks: Vec<PropertyContainer> = (0..destinations)
            .map(|i| {
                let sink = PropertyContainer::new(&ctx, format!("sink{}", i));
                sink.add_property("in", Direction::Input, 0i32, "").unwrap();
                source
                    .link_property("out", &sink, "in", LinkDiscipline::Asynchronous)
                    .unwrap();
                sink
            })
            .collect();

        group.throughput(Throughput::Elements(destinations as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(destinations),
            &destinations,
            |b, _| {
                let mut n = 0i32;
                b.iter(|| {
                    n = n.wrapping_add(1);
                    source.set_property_value("out", n).unwrap();
                    black_box(source.write_output_properties(&|| false));
                })
            },
        );
        drop(sinks);
    }

    group.finish();
}

criterion_group!(benches, bench_property_access, bench_async_fan_out);
criterion_main!(benches);
