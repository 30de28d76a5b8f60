//! Benchmarks for syncview-incremental.
//!
//! Target: one queued change applied at commit < 100μs on a 10k-row view

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use syncview_core::schema::{Order, SourceSchema};
use syncview_core::{Format, Row};
use syncview_incremental::{apply_change, Change, MemoryQuery, MemorySource, Node, Query, Slot, View, ViewOptions};

fn schema() -> SourceSchema {
    SourceSchema::builder("messages")
        .unwrap()
        .primary_key(&["id"])
        .unwrap()
        .order_by("createdAt", Order::Asc)
        .build()
        .unwrap()
}

fn message(id: i64) -> Row {
    Row::new().with("id", id).with("createdAt", id * 10).with("content", "hello")
}

fn bench_apply_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_change");
    let schema = schema();
    let format = Format::plural();

    for size in [100, 1000, 10000] {
        let mut slot = Slot::empty(&format);
        for id in 0..size {
            apply_change(&mut slot, &Change::add(Node::new(message(id * 2))), &schema, &format).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("add_remove_middle", size), &slot, |b, slot| {
            b.iter_batched(
                || slot.clone(),
                |mut slot| {
                    let row = message(size + 1);
                    apply_change(&mut slot, &Change::add(Node::new(row.clone())), &schema, &format).unwrap();
                    apply_change(&mut slot, &Change::remove(Node::new(row)), &schema, &format).unwrap();
                    black_box(slot)
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");

    for batch in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("queued_adds", batch), &batch, |b, &batch| {
            let source = MemorySource::new(schema());
            for id in 0..10_000 {
                source.add(message(id * 2));
            }
            let query = MemoryQuery::new("messages", &source, Format::plural());
            let view = View::new(query.materialize(), Format::plural(), ViewOptions::default());
            let mut next = 1i64;

            b.iter(|| {
                for _ in 0..batch {
                    source.add(message(next));
                    next += 2;
                }
                source.commit();
                black_box(view.current_value().root().len())
            })
        });
    }

    group.finish();
}

fn bench_initial_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialize");

    for size in [100, 1000, 10000] {
        let source = MemorySource::new(schema());
        for id in 0..size {
            source.add(message(id));
        }
        let query = MemoryQuery::new("messages", &source, Format::plural());

        group.bench_with_input(BenchmarkId::new("initial_fetch", size), &query, |b, query| {
            b.iter(|| {
                let view = View::new(query.materialize(), query.format(), ViewOptions::default());
                let len = view.current_value().root().len();
                view.destroy();
                black_box(len)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_apply_change, bench_commit, bench_initial_fetch);
criterion_main!(benches);
