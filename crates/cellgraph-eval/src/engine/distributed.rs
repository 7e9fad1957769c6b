//! Full evaluation on a worker pool.
//!
//! The sorted vertices are colored greedily: sources take colors round
//! robin, every other vertex inherits the dominant color of its
//! predecessors. Each color becomes one chunk, evaluated by one worker
//! after an init handshake. The partition is only sound when no edge joins
//! two colors, so that is checked up front and anything else is left to
//! the sequential evaluator.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use cellgraph_common::CellValue;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::eval::Evaluator;
use super::graph::Graph;
use super::vertex::{MatrixValues, Vertex, VertexId};
use super::{DependencyGraph, EvalConfig, GraphError};
use crate::function_registry::FunctionRegistry;
use crate::interpreter::SheetLimits;

/// Vertices of one color and the order to evaluate them in.
#[derive(Debug)]
pub struct WorkChunk {
    pub graph: DependencyGraph,
    pub order: Vec<VertexId>,
}

#[derive(Debug)]
pub enum WorkerMessage {
    Init { chunk: WorkChunk },
    Start,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComputedValue {
    Formula(CellValue),
    Matrix(MatrixValues),
}

#[derive(Debug)]
pub enum WorkerReply {
    Initialized {
        worker: usize,
    },
    Result {
        worker: usize,
        values: Vec<(VertexId, ComputedValue)>,
        computed: usize,
    },
    Failed {
        worker: usize,
        error: GraphError,
    },
}

/// Color every vertex of `order`, a topological order of `graph`.
pub fn color_vertices(
    graph: &Graph<VertexId>,
    order: &[VertexId],
    colors: usize,
) -> FxHashMap<VertexId, usize> {
    let colors = colors.max(1);
    let mut assigned: FxHashMap<VertexId, usize> = FxHashMap::default();
    let mut next_source = 0;
    for &id in order {
        let mut counts: SmallVec<[(usize, usize); 4]> = SmallVec::new();
        for pred in graph.predecessors(id).into_iter().flatten() {
            let Some(&c) = assigned.get(pred) else {
                continue;
            };
            match counts.iter_mut().find(|(color, _)| *color == c) {
                Some((_, n)) => *n += 1,
                None => counts.push((c, 1)),
            }
        }
        let color = counts
            .iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|&(c, _)| c)
            .unwrap_or_else(|| {
                let c = next_source % colors;
                next_source += 1;
                c
            });
        assigned.insert(id, color);
    }
    assigned
}

/// First edge whose endpoints were given different colors.
pub fn crossing_edge(
    graph: &Graph<VertexId>,
    colors: &FxHashMap<VertexId, usize>,
) -> Option<(VertexId, VertexId)> {
    let mut sources: Vec<VertexId> = colors.keys().copied().collect();
    sources.sort_unstable();
    for from in sources {
        for &to in graph.adjacent_nodes(from).into_iter().flatten() {
            if let (Some(a), Some(b)) = (colors.get(&from), colors.get(&to)) {
                if a != b {
                    return Some((from, to));
                }
            }
        }
    }
    None
}

/// Evaluate the whole graph on `pool`. `Ok(None)` means the graph does not
/// partition cleanly and the caller should evaluate sequentially.
/// Returns (computed vertices, cycle errors) otherwise.
///
/// Every worker seeds its generator from a number drawn out of `rng`, so
/// random draws differ between runs exactly as they do sequentially.
pub fn evaluate_distributed(
    graph: &mut DependencyGraph,
    registry: &Arc<FunctionRegistry>,
    config: &EvalConfig,
    rng: &RefCell<SmallRng>,
    pool: &rayon::ThreadPool,
    now: f64,
) -> Result<Option<(usize, usize)>, GraphError> {
    #[cfg(feature = "tracing")]
    let _span =
        tracing::info_span!("distributed_run", workers = config.number_of_workers).entered();

    if !graph.structural_vertices().is_empty() {
        #[cfg(feature = "tracing")]
        tracing::debug!("structure-sensitive formulas present, evaluating sequentially");
        return Ok(None);
    }
    let order = graph.graph().topological_sort();
    let colors = color_vertices(graph.graph(), &order.sorted, config.number_of_workers);
    if let Some((_from, _to)) = crossing_edge(graph.graph(), &colors) {
        #[cfg(feature = "tracing")]
        tracing::debug!(from = %_from, to = %_to, "edge crosses colors, evaluating sequentially");
        return Ok(None);
    }

    let host = Evaluator {
        registry,
        rng,
        now,
        limits: config.limits(),
    };
    let cycles = host.mark_cycles(graph, &order.cycled, None)?;

    let mut members: Vec<Vec<VertexId>> = vec![Vec::new(); config.number_of_workers.max(1)];
    for &id in &order.sorted {
        if let Some(&c) = colors.get(&id) {
            members[c].push(id);
        }
    }
    let chunks: Vec<WorkChunk> = members
        .into_iter()
        .filter(|m| !m.is_empty())
        .map(|order| {
            let nodes: FxHashSet<VertexId> = order.iter().copied().collect();
            WorkChunk {
                graph: graph.subgraph(&nodes),
                order,
            }
        })
        .collect();
    if chunks.is_empty() {
        return Ok(Some((0, cycles)));
    }

    let seeds: Vec<u64> = {
        let mut rng = rng.borrow_mut();
        chunks.iter().map(|_| rng.r#gen::<u64>()).collect()
    };
    let limits = config.limits();
    let outcome = pool.in_place_scope(|scope| {
        let (reply_tx, reply_rx) = mpsc::channel();
        let mut inboxes = Vec::with_capacity(chunks.len());
        for (worker, &seed) in seeds.iter().enumerate() {
            let (tx, rx) = mpsc::channel();
            let outbox = reply_tx.clone();
            let registry: &FunctionRegistry = registry;
            scope.spawn(move |_| worker_loop(worker, rx, outbox, registry, seed, now, limits));
            inboxes.push(tx);
        }
        drop(reply_tx);
        drive_workers(chunks, inboxes, reply_rx)
    });

    let Some(replies) = outcome? else {
        #[cfg(feature = "tracing")]
        tracing::debug!("worker handshake failed, evaluating sequentially");
        return Ok(None);
    };
    let mut computed = 0;
    for (values, count) in replies {
        computed += count;
        for (id, value) in values {
            match (graph.vertex_mut(id), value) {
                (Some(Vertex::Formula(f)), ComputedValue::Formula(v)) => f.set_value(v),
                (Some(Vertex::Matrix(m)), ComputedValue::Matrix(v)) => m.values = v,
                _ => return Err(GraphError::UnknownNode(id.to_string())),
            }
        }
    }
    for &id in &order.sorted {
        if matches!(graph.vertex(id), Some(Vertex::Range(_))) {
            graph.clear_range_cache(id);
        }
    }
    Ok(Some((computed, cycles)))
}

type ChunkOutcome = (Vec<(VertexId, ComputedValue)>, usize);

/// Host side of the protocol: Init to all, wait for every Initialized,
/// Start to all, collect every Result. `Ok(None)` when a worker went away.
fn drive_workers(
    chunks: Vec<WorkChunk>,
    inboxes: Vec<Sender<WorkerMessage>>,
    replies: Receiver<WorkerReply>,
) -> Result<Option<Vec<ChunkOutcome>>, GraphError> {
    let workers = inboxes.len();
    for (inbox, chunk) in inboxes.iter().zip(chunks) {
        if inbox.send(WorkerMessage::Init { chunk }).is_err() {
            return Ok(None);
        }
    }
    let mut ready = 0;
    while ready < workers {
        match replies.recv() {
            Ok(WorkerReply::Initialized { .. }) => ready += 1,
            Ok(WorkerReply::Failed { error, .. }) => return Err(error),
            Ok(WorkerReply::Result { .. }) | Err(_) => return Ok(None),
        }
    }
    for inbox in &inboxes {
        if inbox.send(WorkerMessage::Start).is_err() {
            return Ok(None);
        }
    }

    let mut results: Vec<Option<ChunkOutcome>> = (0..workers).map(|_| None).collect();
    let mut failure = None;
    for _ in 0..workers {
        match replies.recv() {
            Ok(WorkerReply::Result {
                worker,
                values,
                computed,
            }) => {
                if let Some(slot) = results.get_mut(worker) {
                    *slot = Some((values, computed));
                }
            }
            Ok(WorkerReply::Failed { error, .. }) => failure = Some(error),
            Ok(WorkerReply::Initialized { .. }) | Err(_) => return Ok(None),
        }
    }
    if let Some(error) = failure {
        return Err(error);
    }
    Ok(results.into_iter().collect())
}

fn worker_loop(
    worker: usize,
    inbox: Receiver<WorkerMessage>,
    outbox: Sender<WorkerReply>,
    registry: &FunctionRegistry,
    seed: u64,
    now: f64,
    limits: SheetLimits,
) {
    let mut chunk = None;
    while let Ok(message) = inbox.recv() {
        match message {
            WorkerMessage::Init { chunk: c } => {
                chunk = Some(c);
                if outbox.send(WorkerReply::Initialized { worker }).is_err() {
                    return;
                }
            }
            WorkerMessage::Start => {
                let reply = match chunk.take() {
                    Some(c) => run_chunk(worker, c, registry, seed, now, limits),
                    None => WorkerReply::Failed {
                        worker,
                        error: GraphError::UnknownNode(format!("worker {worker} has no chunk")),
                    },
                };
                let _ = outbox.send(reply);
                return;
            }
        }
    }
}

fn run_chunk(
    worker: usize,
    mut chunk: WorkChunk,
    registry: &FunctionRegistry,
    seed: u64,
    now: f64,
    limits: SheetLimits,
) -> WorkerReply {
    let rng = RefCell::new(SmallRng::seed_from_u64(seed));
    let evaluator = Evaluator {
        registry,
        rng: &rng,
        now,
        limits,
    };
    let computed = match evaluator.run(&mut chunk.graph, &chunk.order, None) {
        Ok(n) => n,
        Err(error) => return WorkerReply::Failed { worker, error },
    };
    let values = chunk
        .order
        .iter()
        .filter_map(|&id| match chunk.graph.vertex(id)? {
            Vertex::Formula(f) => Some((id, ComputedValue::Formula(f.value()))),
            Vertex::Matrix(m) if m.is_formula() => {
                Some((id, ComputedValue::Matrix(m.values.clone())))
            }
            _ => None,
        })
        .collect();
    WorkerReply::Result {
        worker,
        values,
        computed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: u32) -> VertexId {
        VertexId::new(n)
    }

    fn graph(edges: &[(u32, u32)], nodes: u32) -> Graph<VertexId> {
        let mut g = Graph::new();
        for n in 0..nodes {
            g.add_node(v(n));
        }
        for &(a, b) in edges {
            g.add_edge(v(a), v(b)).unwrap();
        }
        g
    }

    #[test]
    fn independent_chains_get_separate_colors() {
        let g = graph(&[(0, 2), (1, 3), (2, 4)], 5);
        let order = g.topological_sort().sorted;
        let colors = color_vertices(&g, &order, 2);
        assert_eq!(colors[&v(0)], colors[&v(2)]);
        assert_eq!(colors[&v(2)], colors[&v(4)]);
        assert_eq!(colors[&v(1)], colors[&v(3)]);
        assert_ne!(colors[&v(0)], colors[&v(1)]);
        assert_eq!(crossing_edge(&g, &colors), None);
    }

    #[test]
    fn joins_are_reported_as_crossings() {
        let g = graph(&[(0, 2), (1, 2)], 3);
        let order = g.topological_sort().sorted;
        let colors = color_vertices(&g, &order, 2);
        // tie between the two source colors goes to the lower one
        assert_eq!(colors[&v(2)], 0);
        assert_eq!(crossing_edge(&g, &colors), Some((v(1), v(2))));
        let single = color_vertices(&g, &order, 1);
        assert_eq!(crossing_edge(&g, &single), None);
    }
}
