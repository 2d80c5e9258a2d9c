//! Relationship graph: links accounts to merchants for high-risk events.
//!
//! Build order (fixed):
//!   1. Filter events with risk_score >= threshold.
//!   2. Sample down to max_sample with the caller's seed.
//!   3. Add one undirected edge per (account, merchant) pair.
//!   4. Spring layout seeded from the same caller seed.
//!
//! The graph is rebuilt from scratch every cycle and holds no references
//! into the store.

use crate::{
    config::GraphParams,
    error::{ViewError, ViewResult},
    event::TxEvent,
    rng::{RngStream, SeededRng},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum distance used by the layout to avoid division by zero.
const MIN_DISTANCE: f64 = 0.01;
/// Mean per-node movement below which the layout is considered settled.
const SETTLE_THRESHOLD: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Account,
    Merchant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id:     String,
    pub kind:   NodeKind,
    pub degree: usize,
    pub x:      f64,
    pub y:      f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub account:  String,
    pub merchant: String,
    /// Highest risk score among the sampled events linking this pair.
    pub weight:      u32,
    pub event_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// High-risk events in the snapshot before sampling.
    pub candidate_count: usize,
    /// Events actually used to build the graph.
    pub sampled_count: usize,
}

impl RelationshipGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, kind: NodeKind, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.kind == kind && n.id == id)
    }

    pub fn edge(&self, account: &str, merchant: &str) -> Option<&GraphEdge> {
        self.edges
            .iter()
            .find(|e| e.account == account && e.merchant == merchant)
    }
}

/// Build the relationship graph for one snapshot.
pub fn build(events: &[TxEvent], params: &GraphParams, seed: u64) -> ViewResult<RelationshipGraph> {
    let candidates: Vec<&TxEvent> = events
        .iter()
        .filter(|e| e.risk_score >= params.risk_threshold)
        .collect();
    let candidate_count = candidates.len();

    let sampled: Vec<&TxEvent> = if candidate_count > params.max_sample {
        let mut rng = SeededRng::new(seed, RngStream::GraphSample);
        rng.sample_indices(candidate_count, params.max_sample)
            .into_iter()
            .map(|i| candidates[i])
            .collect()
    } else {
        candidates
    };

    let mut keys: Vec<(NodeKind, String)> = Vec::new();
    let mut index: HashMap<(NodeKind, &str), usize> = HashMap::new();
    let mut edges: Vec<GraphEdge> = Vec::new();
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    let mut edge_index: HashMap<(usize, usize), usize> = HashMap::new();

    for e in sampled.iter().copied() {
        let a = node_slot(&mut keys, &mut index, NodeKind::Account, &e.account_id);
        let m = node_slot(&mut keys, &mut index, NodeKind::Merchant, &e.merchant);
        match edge_index.get(&(a, m)) {
            Some(&slot) => {
                let edge = &mut edges[slot];
                edge.weight = edge.weight.max(e.risk_score);
                edge.event_count += 1;
            }
            None => {
                edge_index.insert((a, m), edges.len());
                pairs.push((a, m));
                edges.push(GraphEdge {
                    account:     e.account_id.clone(),
                    merchant:    e.merchant.clone(),
                    weight:      e.risk_score,
                    event_count: 1,
                });
            }
        }
    }

    let weighted: Vec<(usize, usize, f64)> = pairs
        .iter()
        .zip(&edges)
        .map(|(&(a, m), edge)| (a, m, f64::from(edge.weight)))
        .collect();
    let positions = spring_layout(keys.len(), &weighted, params, seed)?;

    let mut degree = vec![0usize; keys.len()];
    for &(a, m) in &pairs {
        degree[a] += 1;
        degree[m] += 1;
    }

    let nodes = keys
        .into_iter()
        .zip(positions)
        .zip(degree)
        .map(|(((kind, id), (x, y)), degree)| GraphNode { id, kind, degree, x, y })
        .collect();

    Ok(RelationshipGraph {
        nodes,
        edges,
        candidate_count,
        sampled_count: sampled.len(),
    })
}

fn node_slot<'a>(
    keys: &mut Vec<(NodeKind, String)>,
    index: &mut HashMap<(NodeKind, &'a str), usize>,
    kind: NodeKind,
    id: &'a str,
) -> usize {
    *index.entry((kind, id)).or_insert_with(|| {
        keys.push((kind, id.to_string()));
        keys.len() - 1
    })
}

/// Fruchterman-Reingold spring layout over `n` nodes.
///
/// Edge weights are normalized by the heaviest edge so attraction stays
/// in [0, 1]. Output coordinates are centered and rescaled to [-1, 1].
pub fn spring_layout(
    n: usize,
    edges: &[(usize, usize, f64)],
    params: &GraphParams,
    seed: u64,
) -> ViewResult<Vec<(f64, f64)>> {
    match n {
        0 => return Ok(Vec::new()),
        1 => return Ok(vec![(0.0, 0.0)]),
        _ => {}
    }

    let max_weight = edges.iter().map(|e| e.2).fold(0.0_f64, f64::max);
    let mut adjacency = vec![0.0_f64; n * n];
    for &(a, b, w) in edges {
        let norm = if max_weight > 0.0 { w / max_weight } else { 0.0 };
        adjacency[a * n + b] = norm;
        adjacency[b * n + a] = norm;
    }

    let mut rng = SeededRng::new(seed, RngStream::GraphLayout);
    let mut pos: Vec<(f64, f64)> = (0..n).map(|_| (rng.next_f64(), rng.next_f64())).collect();

    let k = if params.spring_k > 0.0 { params.spring_k } else { (1.0 / n as f64).sqrt() };
    let (min_x, max_x, min_y, max_y) = bounds(&pos);
    let mut temperature = (max_x - min_x).max(max_y - min_y) * 0.1;
    let cooling = temperature / (f64::from(params.layout_iterations) + 1.0);

    let mut disp = vec![(0.0_f64, 0.0_f64); n];
    for _ in 0..params.layout_iterations {
        for i in 0..n {
            let (mut dx, mut dy) = (0.0, 0.0);
            for j in 0..n {
                if i == j {
                    continue;
                }
                let ddx = pos[i].0 - pos[j].0;
                let ddy = pos[i].1 - pos[j].1;
                let dist = (ddx * ddx + ddy * ddy).sqrt().max(MIN_DISTANCE);
                let force = k * k / (dist * dist) - adjacency[i * n + j] * dist / k;
                dx += ddx * force;
                dy += ddy * force;
            }
            disp[i] = (dx, dy);
        }

        let mut moved = 0.0_f64;
        for (p, &(dx, dy)) in pos.iter_mut().zip(&disp) {
            let len = (dx * dx + dy * dy).sqrt().max(MIN_DISTANCE);
            let step = (dx * temperature / len, dy * temperature / len);
            p.0 += step.0;
            p.1 += step.1;
            moved += (step.0 * step.0 + step.1 * step.1).sqrt();
        }
        temperature -= cooling;
        if moved / (n as f64) < SETTLE_THRESHOLD {
            break;
        }
    }

    rescale(&mut pos);
    if pos.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return Err(ViewError::LayoutDiverged { iterations: params.layout_iterations });
    }
    Ok(pos)
}

fn bounds(pos: &[(f64, f64)]) -> (f64, f64, f64, f64) {
    pos.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(lx, hx, ly, hy), &(x, y)| (lx.min(x), hx.max(x), ly.min(y), hy.max(y)),
    )
}

/// Center on the origin and scale so the largest coordinate is 1.
fn rescale(pos: &mut [(f64, f64)]) {
    let n = pos.len() as f64;
    let (sx, sy) = pos.iter().fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
    let (cx, cy) = (sx / n, sy / n);
    let mut lim = 0.0_f64;
    for p in pos.iter_mut() {
        p.0 -= cx;
        p.1 -= cy;
        lim = lim.max(p.0.abs()).max(p.1.abs());
    }
    if lim > 0.0 {
        for p in pos.iter_mut() {
            p.0 /= lim;
            p.1 /= lim;
        }
    }
}
