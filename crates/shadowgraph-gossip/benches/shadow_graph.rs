//! Shadow graph benchmarks
//!
//! Insertion and ancestor search on a layered DAG, the two operations on the
//! gossip hot path.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use shadowgraph_core::{CreatorId, DagEvent, GossipEvent};
use shadowgraph_gossip::ShadowGraph;
use std::sync::Arc;

const CREATORS: u64 = 16;
const DEPTH: u64 = 64;

fn layered_events(seed: u64) -> Vec<Arc<GossipEvent>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut latest: Vec<Option<Arc<GossipEvent>>> = vec![None; CREATORS as usize];
    let mut events = Vec::with_capacity((CREATORS * DEPTH) as usize);

    for round in 0..DEPTH {
        for creator in 0..CREATORS {
            let other = rng.gen_range(0..CREATORS) as usize;
            let event = Arc::new(GossipEvent::child(
                CreatorId::from_index(creator),
                latest[creator as usize].as_ref().map(|e| e.descriptor()),
                latest[other].as_ref().map(|e| e.descriptor()),
                format!("{creator}-{round}").into_bytes(),
            ));
            latest[creator as usize] = Some(event.clone());
            events.push(event);
        }
    }
    events
}

fn shadow_graph_benchmarks(c: &mut Criterion) {
    let events = layered_events(7);
    let mut group = c.benchmark_group("shadow_graph");

    group.bench_function("insert_layered_dag", |b| {
        b.iter_batched(
            || ShadowGraph::<GossipEvent>::default(),
            |graph| {
                for event in &events {
                    let _ = graph.add_event(Some(event.clone()));
                }
                graph
            },
            BatchSize::SmallInput,
        )
    });

    let graph = ShadowGraph::default();
    for event in &events {
        let _ = graph.add_event(Some(event.clone()));
    }
    group.bench_function("find_ancestors_from_tips", |b| {
        b.iter(|| {
            let tips = graph.get_tips();
            std::hint::black_box(graph.find_ancestors(&tips, |_| true).len())
        })
    });

    group.finish();
}

criterion_group!(benches, shadow_graph_benchmarks);
criterion_main!(benches);
