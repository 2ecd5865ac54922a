use cowrite_core::protocol::codec;
use cowrite_core::{Document, LocalOp, StateVector};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn typed_document(client: u64, chars: usize) -> Document {
    let mut doc = Document::new(client);
    for i in 0..chars {
        doc.apply_local_op(LocalOp::insert(i, "a"));
    }
    doc
}

/// Benchmark sequential typing (simulates real user typing)
fn bench_sequential_typing(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_typing");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(typed_document(1, size)));
        });
    }

    group.finish();
}

/// Benchmark a large paste
fn bench_large_insert(c: &mut Criterion) {
    c.bench_function("insert_10k", |b| {
        let text = "a".repeat(10_000);
        b.iter(|| {
            let mut doc = Document::new(1);
            black_box(doc.apply_local_op(LocalOp::insert(0, text.as_str())));
        });
    });
}

/// Benchmark a full-length paste arriving from a peer
fn bench_remote_paste(c: &mut Criterion) {
    let mut source = Document::new(1);
    let update = source.apply_local_op(LocalOp::insert(0, "a".repeat(20_000)));
    c.bench_function("remote_paste_20k", |b| {
        b.iter(|| {
            let mut doc = Document::new(2);
            black_box(doc.apply_remote_update(&update));
        });
    });
}

/// Benchmark integrating a remote history into an empty replica
fn bench_remote_integration(c: &mut Criterion) {
    let mut group = c.benchmark_group("remote_integration");

    for size in [100, 1000].iter() {
        let source = typed_document(1, *size);
        let update = source.encode_state_as_update();
        group.bench_with_input(BenchmarkId::from_parameter(size), &update, |b, update| {
            b.iter(|| {
                let mut doc = Document::new(2);
                black_box(doc.apply_remote_update(update));
            });
        });
    }

    group.finish();
}

/// Benchmark concurrent inserts at the same position from many clients
fn bench_concurrent_inserts(c: &mut Criterion) {
    let updates: Vec<_> = (1..=50u64)
        .map(|client| {
            let mut doc = Document::new(client);
            doc.apply_local_op(LocalOp::insert(0, "xyz"))
        })
        .collect();

    c.bench_function("concurrent_inserts_50_clients", |b| {
        b.iter(|| {
            let mut doc = Document::new(99);
            for update in &updates {
                doc.apply_remote_update(update);
            }
            black_box(doc.len())
        });
    });
}

/// Benchmark the binary codec on a full history
fn bench_codec(c: &mut Criterion) {
    let mut doc = typed_document(1, 1000);
    doc.apply_local_op(LocalOp::delete(100, 200));
    doc.apply_local_op(LocalOp::format(0, 300, "bold", Some("true".into())));
    let update = doc.compute_diff(&StateVector::new());
    let bytes = codec::encode(&update);

    c.bench_function("encode_history", |b| b.iter(|| black_box(codec::encode(&update))));
    c.bench_function("decode_history", |b| {
        b.iter(|| black_box(codec::decode(&bytes).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_sequential_typing,
    bench_large_insert,
    bench_remote_paste,
    bench_remote_integration,
    bench_concurrent_inserts,
    bench_codec
);
criterion_main!(benches);
