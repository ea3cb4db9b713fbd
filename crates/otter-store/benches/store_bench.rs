//! Store throughput through the op surface
//!
//! Run with: `cargo bench -p otter-store`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use otter_host::{HostContext, HostValue};
use otter_store::{StoreConfig, store_context};
use std::hint::black_box;
use tempfile::TempDir;

fn key(i: usize) -> HostValue {
    HostValue::from(format!("key{i:08}"))
}

fn value(i: usize) -> HostValue {
    HostValue::buffer(i.to_le_bytes().repeat(4))
}

fn open(dir: &TempDir) -> (HostContext, HostValue) {
    let ctx = store_context(StoreConfig::new(dir.path())).unwrap();
    let store = ctx.call("open", vec!["bench".into()]).unwrap();
    (ctx, store)
}

fn write_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    for n in [100usize, 1_000] {
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("put", n), &n, |b, &n| {
            let dir = TempDir::new().unwrap();
            let (ctx, store) = open(&dir);
            b.iter(|| {
                for i in 0..n {
                    ctx.call("put", vec![store.clone(), key(i), value(i)]).unwrap();
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("batch", n), &n, |b, &n| {
            let dir = TempDir::new().unwrap();
            let (ctx, store) = open(&dir);
            b.iter(|| {
                let batch = ctx.call("beginBatch", vec![store.clone()]).unwrap();
                for i in 0..n {
                    ctx.call("batchPut", vec![batch.clone(), key(i), value(i)])
                        .unwrap();
                }
                ctx.call("applyBatch", vec![batch]).unwrap();
            });
        });
    }

    group.finish();
}

fn read_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");
    let n = 1_000usize;
    group.throughput(Throughput::Elements(n as u64));

    let dir = TempDir::new().unwrap();
    let (ctx, store) = open(&dir);
    let batch = ctx.call("beginBatch", vec![store.clone()]).unwrap();
    for i in 0..n {
        ctx.call("batchPut", vec![batch.clone(), key(i), value(i)])
            .unwrap();
    }
    ctx.call("applyBatch", vec![batch]).unwrap();

    group.bench_function("get", |b| {
        b.iter(|| {
            for i in 0..n {
                black_box(ctx.call("get", vec![store.clone(), key(i)]).unwrap());
            }
        });
    });

    group.bench_function("iterate", |b| {
        b.iter(|| {
            let it = ctx.call("newIterator", vec![store.clone()]).unwrap();
            ctx.call("iterSeekToFirst", vec![it.clone()]).unwrap();
            while ctx.call("iterValid", vec![it.clone()]).unwrap() == HostValue::Bool(true) {
                black_box(ctx.call("iterValue", vec![it.clone()]).unwrap());
                ctx.call("iterNext", vec![it.clone()]).unwrap();
            }
            ctx.call("iterClose", vec![it]).unwrap();
        });
    });

    group.bench_function("iterate_snapshot", |b| {
        let options = HostValue::object([("useSnapshot", HostValue::Bool(true))]);
        b.iter(|| {
            let it = ctx
                .call("newIterator", vec![store.clone(), options.clone()])
                .unwrap();
            ctx.call("iterSeekToFirst", vec![it.clone()]).unwrap();
            while ctx.call("iterValid", vec![it.clone()]).unwrap() == HostValue::Bool(true) {
                black_box(ctx.call("iterKey", vec![it.clone()]).unwrap());
                ctx.call("iterNext", vec![it.clone()]).unwrap();
            }
            ctx.call("iterClose", vec![it]).unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, write_benchmarks, read_benchmarks);
criterion_main!(benches);
