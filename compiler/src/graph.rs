// graph.rs: Dependency graph construction for reactor programs
//
// Walks the instantiation tree once and emits a directed graph whose nodes
// are reactions and ports and whose edges mean "happens no later than":
//
//   reaction → port      the reaction writes the port (effect)
//   port → reaction      the reaction is triggered by or reads the port
//   reaction → reaction  declaration order between consecutive ordered
//                        reactions of the same reactor
//   port → port          a connection; delayed and physical connections are
//                        kept but marked broken, so the zero-delay view
//                        skips them while boundary classification sees them
//
// Node handles are dense and issued in pre-order discovery order, which is
// the stable tie-breaker for priority assignment.
//
// Preconditions: `index` was built successfully (all references resolve).
// Postconditions: every reaction and port of the tree has exactly one node.
// Failure modes: a reference to a port without a node → `InvariantViolation`.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::diag::NodeRef;
use crate::error::{AnalysisError, AnalysisResult};
use crate::id::*;
use crate::model::{DependencyBreak, ReactorInstance};
use crate::program_index::ProgramIndex;

// ── Public types ────────────────────────────────────────────────────────────

/// Dense node handle; the value is the node's discovery index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

/// Dense edge handle in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EdgeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Reaction(ReactionId),
    Port(PortId),
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Reactor owning the reaction or port.
    pub reactor: ReactorId,
    pub name: String,
}

impl Node {
    pub fn is_reaction(&self) -> bool {
        matches!(self.kind, NodeKind::Reaction(_))
    }

    pub fn reaction(&self) -> Option<ReactionId> {
        match self.kind {
            NodeKind::Reaction(id) => Some(id),
            NodeKind::Port(_) => None,
        }
    }

    pub fn node_ref(&self) -> NodeRef {
        match self.kind {
            NodeKind::Reaction(id) => NodeRef::Reaction(id),
            NodeKind::Port(id) => NodeRef::Port(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Effect,
    Source,
    Order,
    Connection {
        connection: ConnectionId,
        broken: Option<DependencyBreak>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

impl Edge {
    /// Edges of the zero-delay view: everything but broken connections.
    pub fn is_zero_delay(&self) -> bool {
        !matches!(
            self.kind,
            EdgeKind::Connection {
                broken: Some(_),
                ..
            }
        )
    }
}

/// Reactions and ports with every dependency edge, delayed ones included.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    out_edges: Vec<Vec<EdgeId>>,
    in_edges: Vec<Vec<EdgeId>>,
    reaction_nodes: HashMap<ReactionId, NodeId>,
    port_nodes: HashMap<PortId, NodeId>,
}

impl DependencyGraph {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0 as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn reaction_node(&self, reaction: ReactionId) -> Option<NodeId> {
        self.reaction_nodes.get(&reaction).copied()
    }

    pub fn port_node(&self, port: PortId) -> Option<NodeId> {
        self.port_nodes.get(&port).copied()
    }

    /// Reaction nodes in discovery order.
    pub fn reactions(&self) -> impl Iterator<Item = (NodeId, ReactionId)> + '_ {
        self.nodes
            .iter()
            .filter_map(|n| n.reaction().map(|r| (n.id, r)))
    }

    pub fn out_edges(&self, node: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.out_edges[node.0 as usize]
            .iter()
            .map(move |&e| self.edge(e))
    }

    pub fn in_edges(&self, node: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.in_edges[node.0 as usize]
            .iter()
            .map(move |&e| self.edge(e))
    }

    pub fn zero_delay_edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(|e| e.is_zero_delay())
    }

    pub fn zero_delay_successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.out_edges(node)
            .filter(|e| e.is_zero_delay())
            .map(|e| e.target)
    }

    pub fn zero_delay_predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.in_edges(node)
            .filter(|e| e.is_zero_delay())
            .map(|e| e.source)
    }

    /// Edges realizing connections, in connection declaration order.
    pub fn connection_edges(&self) -> impl Iterator<Item = (&Edge, ConnectionId)> + '_ {
        self.edges.iter().filter_map(|e| match e.kind {
            EdgeKind::Connection { connection, .. } => Some((e, connection)),
            _ => None,
        })
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Build the dependency graph for every reaction and port in the program.
pub fn build_graph(index: &ProgramIndex<'_>) -> AnalysisResult<DependencyGraph> {
    let mut builder = GraphBuilder::new(index);
    builder.collect_nodes_from(&index.program().main)?;
    builder.add_connection_edges()?;
    let graph = builder.finish();
    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "dependency graph built"
    );
    Ok(graph)
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reactions = self.nodes.iter().filter(|n| n.is_reaction()).count();
        let broken = self.edges.iter().filter(|e| !e.is_zero_delay()).count();
        writeln!(
            f,
            "DependencyGraph ({} reactions, {} ports, {} edges)",
            reactions,
            self.nodes.len() - reactions,
            self.edges.len()
        )?;
        for node in &self.nodes {
            let successors: Vec<String> = self
                .out_edges(node.id)
                .map(|e| {
                    let target = &self.node(e.target).name;
                    if e.is_zero_delay() {
                        target.clone()
                    } else {
                        format!("({})", target)
                    }
                })
                .collect();
            if successors.is_empty() {
                writeln!(f, "  n{} {}", node.id.0, node.name)?;
            } else {
                writeln!(
                    f,
                    "  n{} {} -> {}",
                    node.id.0,
                    node.name,
                    successors.join(", ")
                )?;
            }
        }
        if broken > 0 {
            writeln!(f, "  broken connections: {}", broken)?;
        }
        Ok(())
    }
}

// ── Internal builder ────────────────────────────────────────────────────────

struct GraphBuilder<'a, 'p> {
    index: &'a ProgramIndex<'p>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    reaction_nodes: HashMap<ReactionId, NodeId>,
    port_nodes: HashMap<PortId, NodeId>,
}

impl<'a, 'p> GraphBuilder<'a, 'p> {
    fn new(index: &'a ProgramIndex<'p>) -> Self {
        GraphBuilder {
            index,
            nodes: Vec::with_capacity(index.reaction_count() + index.port_count()),
            edges: Vec::new(),
            reaction_nodes: HashMap::new(),
            port_nodes: HashMap::new(),
        }
    }

    fn add_node(&mut self, kind: NodeKind, reactor: ReactorId, name: String) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            kind,
            reactor,
            name,
        });
        id
    }

    fn add_edge(&mut self, source: NodeId, target: NodeId, kind: EdgeKind) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge {
            id,
            source,
            target,
            kind,
        });
        id
    }

    /// Node for `port`, created on first reference.
    fn port_node(&mut self, port: PortId, referrer: &str) -> AnalysisResult<NodeId> {
        if let Some(&id) = self.port_nodes.get(&port) {
            return Ok(id);
        }
        let Some(entry) = self.index.port(port) else {
            return Err(AnalysisError::invariant(format!(
                "{} references port {} which has no graph node",
                referrer, port.0
            )));
        };
        let id = self.add_node(NodeKind::Port(port), entry.owner, entry.name.clone());
        self.port_nodes.insert(port, id);
        Ok(id)
    }

    // ── Tree traversal ──────────────────────────────────────────────────

    fn collect_nodes_from(&mut self, reactor: &ReactorInstance) -> AnalysisResult<()> {
        let mut previous: Option<NodeId> = None;
        for reaction in &reactor.reactions {
            let name = self.index.reaction_name(reaction.id).to_string();
            let node = self.add_node(NodeKind::Reaction(reaction.id), reactor.id, name.clone());
            self.reaction_nodes.insert(reaction.id, node);

            for port in reaction.read_ports() {
                let port_node = self.port_node(port, &name)?;
                self.add_edge(port_node, node, EdgeKind::Source);
            }
            for port in reaction.written_ports() {
                let port_node = self.port_node(port, &name)?;
                self.add_edge(node, port_node, EdgeKind::Effect);
            }

            // Unordered reactions neither follow nor precede their siblings.
            if !reaction.is_unordered() {
                if let Some(prev) = previous {
                    self.add_edge(prev, node, EdgeKind::Order);
                }
                previous = Some(node);
            }
        }

        // Ports no reaction touches (e.g. pure pass-through boundary ports).
        for port in &reactor.ports {
            self.port_node(port.id, self.index.reactor_name(reactor.id))?;
        }

        for child in &reactor.children {
            self.collect_nodes_from(child)?;
        }
        Ok(())
    }

    fn add_connection_edges(&mut self) -> AnalysisResult<()> {
        for &conn_id in self.index.connections_in_order() {
            let Some(entry) = self.index.connection(conn_id) else {
                return Err(AnalysisError::invariant(format!(
                    "connection {} listed but not indexed",
                    conn_id.0
                )));
            };
            let conn = entry.connection;
            let referrer = format!("connection {}", conn_id.0);
            let source = self.port_node(conn.source, &referrer)?;
            let target = self.port_node(conn.target, &referrer)?;
            self.add_edge(
                source,
                target,
                EdgeKind::Connection {
                    connection: conn_id,
                    broken: conn.dependency_break(),
                },
            );
        }
        Ok(())
    }

    fn finish(self) -> DependencyGraph {
        let mut out_edges = vec![Vec::new(); self.nodes.len()];
        let mut in_edges = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            out_edges[edge.source.0 as usize].push(edge.id);
            in_edges[edge.target.0 as usize].push(edge.id);
        }
        DependencyGraph {
            nodes: self.nodes,
            edges: self.edges,
            out_edges,
            in_edges,
            reaction_nodes: self.reaction_nodes,
            port_nodes: self.port_nodes,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
