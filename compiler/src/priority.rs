// priority.rs: Reaction priority assignment
//
// Topologically sorts the zero-delay view of the dependency graph (Kahn's
// algorithm) and hands out reaction priorities in that order. Ties between
// simultaneously ready nodes are broken by the smallest node handle, i.e.
// discovery order, so the result is a function of the program alone.
//
// Each reaction also gets a level: the number of reactions on the longest
// zero-delay chain that must run before it. Reactions with equal levels
// have no dependency between them and may run in parallel.
//
// Preconditions: `graph` has no zero-delay cycle (`detect_cycles` passed).
// Postconditions: every reaction has a unique rank in 0..reaction_count and
//                 rank/level both respect every zero-delay path.
// Failure modes: a node that never reaches in-degree zero → `InvariantViolation`.
// Side effects: none.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::{DependencyGraph, NodeId};
use crate::id::ReactionId;
use crate::program_index::ProgramIndex;

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Priority {
    /// Unique, dense, 0-based execution rank.
    pub rank: u32,
    /// Longest chain of reactions before this one.
    pub level: u32,
}

/// Priorities for every reaction, plus the full node order they came from.
#[derive(Debug, Clone, Default)]
pub struct PriorityTable {
    entries: BTreeMap<ReactionId, Priority>,
    by_rank: Vec<ReactionId>,
    node_order: Vec<NodeId>,
}

impl PriorityTable {
    pub fn get(&self, reaction: ReactionId) -> Option<Priority> {
        self.entries.get(&reaction).copied()
    }

    pub fn rank(&self, reaction: ReactionId) -> Option<u32> {
        self.get(reaction).map(|p| p.rank)
    }

    pub fn level(&self, reaction: ReactionId) -> Option<u32> {
        self.get(reaction).map(|p| p.level)
    }

    pub fn len(&self) -> usize {
        self.by_rank.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rank.is_empty()
    }

    /// Reactions in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (ReactionId, Priority)> + '_ {
        self.by_rank.iter().map(move |r| (*r, self.entries[r]))
    }

    pub fn max_level(&self) -> Option<u32> {
        self.entries.values().map(|p| p.level).max()
    }

    /// Topological order of every graph node, ports included.
    pub fn node_order(&self) -> &[NodeId] {
        &self.node_order
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Assign a rank and level to every reaction in `graph`.
pub fn assign_priorities(graph: &DependencyGraph) -> AnalysisResult<PriorityTable> {
    let n = graph.node_count();
    let mut in_degree = vec![0u32; n];
    for edge in graph.zero_delay_edges() {
        in_degree[edge.target.0 as usize] += 1;
    }

    // Reactions strictly before each node on its longest incoming chain.
    let mut depth = vec![0u32; n];
    let mut ready: BinaryHeap<Reverse<NodeId>> = graph
        .nodes()
        .iter()
        .filter(|node| in_degree[node.id.0 as usize] == 0)
        .map(|node| Reverse(node.id))
        .collect();

    let mut table = PriorityTable {
        node_order: Vec::with_capacity(n),
        ..PriorityTable::default()
    };

    while let Some(Reverse(id)) = ready.pop() {
        table.node_order.push(id);
        let node = graph.node(id);
        let mut carried = depth[id.0 as usize];
        if let Some(reaction) = node.reaction() {
            let priority = Priority {
                rank: table.by_rank.len() as u32,
                level: carried,
            };
            table.entries.insert(reaction, priority);
            table.by_rank.push(reaction);
            carried += 1;
        }
        for succ in graph.zero_delay_successors(id) {
            let s = succ.0 as usize;
            depth[s] = depth[s].max(carried);
            in_degree[s] -= 1;
            if in_degree[s] == 0 {
                ready.push(Reverse(succ));
            }
        }
    }

    if table.node_order.len() < n {
        let stuck = n - table.node_order.len();
        return Err(AnalysisError::invariant(format!(
            "priority assignment stalled with {} node(s) never ready; \
             the zero-delay graph is cyclic",
            stuck
        )));
    }

    debug!(
        reactions = table.len(),
        max_level = table.max_level().unwrap_or(0),
        "priorities assigned"
    );
    Ok(table)
}

// ── Verification ────────────────────────────────────────────────────────────

/// Machine-checkable evidence for priority postconditions (P1-P3).
#[derive(Debug, Clone)]
pub struct PriorityCert {
    /// P1: every reaction has exactly one priority and ranks are dense.
    pub p1_every_reaction_ranked: bool,
    /// P2: every zero-delay edge points forward in the node order, and ranks
    /// follow that order, so any zero-delay path has increasing rank.
    pub p2_paths_increase_rank: bool,
    /// P3: ordered reactions of one reactor rank in declaration order.
    pub p3_declaration_order_kept: bool,
}

impl crate::pass::StageCert for PriorityCert {
    fn all_pass(&self) -> bool {
        self.p1_every_reaction_ranked
            && self.p2_paths_increase_rank
            && self.p3_declaration_order_kept
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("P1_every_reaction_ranked", self.p1_every_reaction_ranked),
            ("P2_paths_increase_rank", self.p2_paths_increase_rank),
            ("P3_declaration_order_kept", self.p3_declaration_order_kept),
        ]
    }
}

/// Verify priority postconditions.
pub fn verify_priorities(
    table: &PriorityTable,
    graph: &DependencyGraph,
    index: &ProgramIndex<'_>,
) -> PriorityCert {
    PriorityCert {
        p1_every_reaction_ranked: verify_p1_every_reaction_ranked(table, graph),
        p2_paths_increase_rank: verify_p2_paths_increase_rank(table, graph),
        p3_declaration_order_kept: verify_p3_declaration_order_kept(table, index),
    }
}

fn verify_p1_every_reaction_ranked(table: &PriorityTable, graph: &DependencyGraph) -> bool {
    let reactions: Vec<ReactionId> = graph.reactions().map(|(_, r)| r).collect();
    if table.len() != reactions.len() || table.entries.len() != reactions.len() {
        return false;
    }
    let all_present = reactions.iter().all(|r| table.entries.contains_key(r));
    let dense = table
        .iter()
        .enumerate()
        .all(|(i, (_, p))| p.rank as usize == i);
    all_present && dense
}

fn verify_p2_paths_increase_rank(table: &PriorityTable, graph: &DependencyGraph) -> bool {
    if table.node_order.len() != graph.node_count() {
        return false;
    }
    let position: HashMap<NodeId, usize> = table
        .node_order
        .iter()
        .enumerate()
        .map(|(i, &n)| (n, i))
        .collect();
    let edges_forward = graph
        .zero_delay_edges()
        .all(|e| position[&e.source] < position[&e.target]);

    let ranks_follow_order = table
        .node_order
        .iter()
        .filter_map(|&n| graph.node(n).reaction())
        .zip(table.by_rank.iter())
        .all(|(from_order, from_rank)| from_order == *from_rank);

    let levels_respect_edges = graph.zero_delay_edges().all(|e| {
        match (graph.node(e.source).reaction(), graph.node(e.target).reaction()) {
            (Some(a), Some(b)) => table.level(a) < table.level(b),
            _ => true,
        }
    });

    edges_forward && ranks_follow_order && levels_respect_edges
}

fn verify_p3_declaration_order_kept(table: &PriorityTable, index: &ProgramIndex<'_>) -> bool {
    index.reactors_preorder().iter().all(|&reactor_id| {
        let Some(entry) = index.reactor(reactor_id) else {
            return false;
        };
        let ranks: Vec<Option<u32>> = entry
            .reactor
            .reactions
            .iter()
            .filter(|r| !r.is_unordered())
            .map(|r| table.rank(r.id))
            .collect();
        ranks.iter().all(Option::is_some) && ranks.windows(2).all(|w| w[0] < w[1])
    })
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for PriorityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PriorityTable ({} reactions)", self.len())?;
        for (reaction, p) in self.iter() {
            writeln!(f, "  r{} rank={} level={}", reaction.0, p.rank, p.level)?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
