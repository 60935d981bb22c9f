// cycles.rs: Zero-delay cycle detection
//
// Finds every strongly connected component of the zero-delay view of the
// dependency graph that contains a cycle, and reports each one with its
// members and a concrete closed path for the user.
//
// Tarjan's algorithm runs with an explicit frame stack so deep reactor
// hierarchies cannot overflow the call stack. The same routine is reused on
// the federate-level graph by boundary classification.
//
// Preconditions: `graph` was produced by `build_graph`.
// Postconditions: `CycleReport.cycles` is empty iff the zero-delay view is
//                 acyclic; cycles are sorted by their smallest member.
// Failure modes: none (a cyclic graph is a result, not a failure).
// Side effects: none.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::diag::NodeRef;
use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::{DependencyGraph, NodeId};

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CycleMember {
    pub node_id: NodeId,
    pub node: NodeRef,
    pub name: String,
}

/// One strongly connected component of the zero-delay view.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    /// Members in ascending node order.
    pub members: Vec<CycleMember>,
    /// Closed walk through the component: starts and ends at the smallest member.
    pub path: Vec<NodeId>,
    pub path_names: Vec<String>,
}

impl Cycle {
    pub fn contains(&self, node: NodeId) -> bool {
        self.members.iter().any(|m| m.node_id == node)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycles: Vec<Cycle>,
}

impl CycleReport {
    pub fn is_acyclic(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Consecutive pairs along every reported path.
    pub fn cycle_edges(&self) -> HashSet<(NodeId, NodeId)> {
        self.cycles
            .iter()
            .flat_map(|c| c.path.windows(2).map(|w| (w[0], w[1])))
            .collect()
    }

    pub fn into_result(self) -> AnalysisResult<()> {
        if self.cycles.is_empty() {
            Ok(())
        } else {
            Err(AnalysisError::GraphCycle {
                cycles: self.cycles,
            })
        }
    }
}

// ── Strongly connected components ───────────────────────────────────────────

/// Tarjan's SCC over nodes `0..node_count`.
///
/// Components come out in reverse topological order; each component's
/// members are sorted ascending.
pub fn strongly_connected_components<F, I>(
    node_count: usize,
    mut successors: F,
) -> Vec<Vec<usize>>
where
    F: FnMut(usize) -> I,
    I: IntoIterator<Item = usize>,
{
    const UNVISITED: usize = usize::MAX;

    let mut index = vec![UNVISITED; node_count];
    let mut lowlink = vec![0usize; node_count];
    let mut on_stack = vec![false; node_count];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components = Vec::new();
    // (node, its successors, next successor to visit)
    let mut frames: Vec<(usize, Vec<usize>, usize)> = Vec::new();

    for root in 0..node_count {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        frames.push((root, successors(root).into_iter().collect(), 0));

        while let Some(frame) = frames.last_mut() {
            let v = frame.0;
            if frame.2 < frame.1.len() {
                let w = frame.1[frame.2];
                frame.2 += 1;
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    let next: Vec<usize> = successors(w).into_iter().collect();
                    frames.push((w, next, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }

            frames.pop();
            if let Some(parent) = frames.last() {
                let p = parent.0;
                lowlink[p] = lowlink[p].min(lowlink[v]);
            }
            if lowlink[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.sort_unstable();
                components.push(component);
            }
        }
    }
    components
}

/// True when the component is an actual cycle: several members or a self-loop.
pub fn is_cyclic_component<F, I>(component: &[usize], mut successors: F) -> bool
where
    F: FnMut(usize) -> I,
    I: IntoIterator<Item = usize>,
{
    match component {
        [] => false,
        [only] => successors(*only).into_iter().any(|s| s == *only),
        _ => true,
    }
}

/// Shortest closed walk from `start` back to itself staying inside `members`.
pub fn shortest_cycle_through<F, I>(
    start: usize,
    members: &HashSet<usize>,
    mut successors: F,
) -> Vec<usize>
where
    F: FnMut(usize) -> I,
    I: IntoIterator<Item = usize>,
{
    let mut parent: HashMap<usize, usize> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    let mut seen = HashSet::from([start]);

    while let Some(u) = queue.pop_front() {
        for v in successors(u) {
            if !members.contains(&v) {
                continue;
            }
            if v == start {
                let mut path = vec![u];
                let mut cur = u;
                while cur != start {
                    cur = parent[&cur];
                    path.push(cur);
                }
                path.reverse();
                path.push(start);
                return path;
            }
            if seen.insert(v) {
                parent.insert(v, u);
                queue.push_back(v);
            }
        }
    }
    vec![start]
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Detect every zero-delay cycle in `graph`.
pub fn detect_cycles(graph: &DependencyGraph) -> CycleReport {
    let succ = |n: usize| {
        graph
            .zero_delay_successors(NodeId(n as u32))
            .map(|s| s.0 as usize)
            .collect::<Vec<_>>()
    };

    let mut cycles: Vec<Cycle> = strongly_connected_components(graph.node_count(), succ)
        .into_iter()
        .filter(|component| is_cyclic_component(component, succ))
        .map(|component| make_cycle(graph, &component, succ))
        .collect();
    cycles.sort_by_key(|c| c.members.first().map(|m| m.node_id));

    debug!(cycles = cycles.len(), "zero-delay cycle detection finished");
    CycleReport { cycles }
}

fn make_cycle<F>(graph: &DependencyGraph, component: &[usize], succ: F) -> Cycle
where
    F: FnMut(usize) -> Vec<usize>,
{
    let members: Vec<CycleMember> = component
        .iter()
        .map(|&n| {
            let node = graph.node(NodeId(n as u32));
            CycleMember {
                node_id: node.id,
                node: node.node_ref(),
                name: node.name.clone(),
            }
        })
        .collect();

    let member_set: HashSet<usize> = component.iter().copied().collect();
    let path: Vec<NodeId> = shortest_cycle_through(component[0], &member_set, succ)
        .into_iter()
        .map(|n| NodeId(n as u32))
        .collect();
    let path_names = path.iter().map(|&n| graph.node(n).name.clone()).collect();

    Cycle {
        members,
        path,
        path_names,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
