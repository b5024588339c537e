//! Micro benchmarks for commit-graph lookups and record decoding.
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use grafito::{
    CommitGraph, CommitGraphWriter, GraphCommits, MemoryStore, NoProgress, ObjectId,
};

const COMMIT_COUNT: u32 = 16_384;
const LOOKUP_SAMPLES: usize = 2_048;

fn tree(n: u32) -> ObjectId {
    let mut bytes = [0u8; 20];
    bytes[..4].copy_from_slice(&n.to_be_bytes());
    ObjectId::from_bytes(bytes)
}

struct Fixture {
    graph: CommitGraph,
    sample: Vec<ObjectId>,
}

impl Fixture {
    /// A long mainline with a short-lived branch merged every 32 commits.
    fn new() -> Self {
        let mut store = MemoryStore::new();
        let mut mainline = store.commit(tree(0), &[], 1_000);
        for i in 1..COMMIT_COUNT {
            mainline = if i % 32 == 0 {
                let branch = store.commit(tree(i | 0x8000_0000), &[mainline], 1_000 + i as i64);
                store.commit(tree(i), &[mainline, branch], 1_001 + i as i64)
            } else {
                store.commit(tree(i), &[mainline], 1_000 + i as i64)
            };
        }

        let commits = GraphCommits::collect(&store, &[mainline], &mut NoProgress).unwrap();
        let mut buf = Vec::new();
        CommitGraphWriter::new(&commits)
            .write(&mut NoProgress, &mut buf)
            .unwrap();
        let graph = CommitGraph::from_bytes(buf).unwrap();

        let mut sample: Vec<ObjectId> = (0..graph.commit_count() as u32)
            .map(|pos| graph.id_at(pos).unwrap())
            .collect();
        sample.shuffle(&mut ChaCha8Rng::seed_from_u64(0xF1D0));
        sample.truncate(LOOKUP_SAMPLES);
        Self { graph, sample }
    }
}

fn graph_lookup(c: &mut Criterion) {
    let fixture = Fixture::new();
    let mut group = c.benchmark_group("graph/lookup");
    group.sample_size(50);

    group.throughput(Throughput::Elements(LOOKUP_SAMPLES as u64));
    group.bench_function("position_of", |b| {
        b.iter(|| {
            for id in &fixture.sample {
                black_box(fixture.graph.position_of(id));
            }
        });
    });

    group.throughput(Throughput::Elements(fixture.graph.commit_count() as u64));
    group.bench_function("decode_all_records", |b| {
        b.iter(|| {
            for pos in 0..fixture.graph.commit_count() as u32 {
                black_box(fixture.graph.commit_data_at(pos));
            }
        });
    });

    group.throughput(Throughput::Elements(LOOKUP_SAMPLES as u64));
    group.bench_function("lookup_then_decode", |b| {
        b.iter(|| {
            for id in &fixture.sample {
                let pos = fixture.graph.position_of(id).unwrap();
                black_box(fixture.graph.commit_data_at(pos));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, graph_lookup);
criterion_main!(benches);
