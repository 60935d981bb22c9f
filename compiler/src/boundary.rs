// boundary.rs: Federated boundary classification
//
// Given a partition of the reactor tree into execution units (federates),
// finds every connection whose endpoints live in different units and
// derives the control reactions the federated code generator must
// synthesize for it:
//
//   sender side    EmitAbsent   announce "no message at this tag" when the
//                               sending reactions finish without output
//   receiver side  WaitBounded  block readers of the target port until data,
//                               an absent message, or the safe-to-process
//                               bound on the local clock
//
// The receiver bound combines the injected network latency with the
// safe-to-process offsets of the reactions it guards; a logical delay on
// the connection relaxes it. Timing problems become diagnostics, never
// failures: an unbounded zero-delay wait is an error (E0200) under
// decentralized coordination or on a cross-federate zero-delay cycle, and
// otherwise a warning that the coordinator must arbitrate (W0200).
//
// Preconditions: `graph` is acyclic and `priorities` were assigned on it.
// Postconditions: edges and specs follow connection declaration order;
//                 each boundary edge yields one sender and one receiver spec.
// Failure modes: a partition naming unknown reactors → `InvariantViolation`.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cycles::{is_cyclic_component, strongly_connected_components};
use crate::diag::{codes, DiagKind, Diagnostic, NodeRef};
use crate::error::{AnalysisError, AnalysisResult, UnboundedEdge};
use crate::graph::DependencyGraph;
use crate::id::*;
use crate::priority::PriorityTable;
use crate::program_index::{PortWalk, ProgramIndex};
use crate::time::TimeValue;

// ── Partition ───────────────────────────────────────────────────────────────

/// Name of the unit every unassigned reactor belongs to.
pub const DEFAULT_FEDERATE: &str = "default";

/// Assignment of reactors to execution units.
///
/// A reactor belongs to the unit of its nearest assigned ancestor-or-self;
/// reactors with no assigned ancestor belong to the default unit.
#[derive(Debug, Clone)]
pub struct FederatePartition {
    names: Vec<String>,
    by_reactor: BTreeMap<ReactorId, FederateId>,
    by_path: BTreeMap<String, FederateId>,
}

impl Default for FederatePartition {
    fn default() -> Self {
        FederatePartition {
            names: vec![DEFAULT_FEDERATE.to_string()],
            by_reactor: BTreeMap::new(),
            by_path: BTreeMap::new(),
        }
    }
}

impl FederatePartition {
    /// A single-unit (non-federated) partition.
    pub fn single() -> Self {
        Self::default()
    }

    /// The unit called `name`, created on first use.
    pub fn federate(&mut self, name: &str) -> FederateId {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            return FederateId(pos as u32);
        }
        self.names.push(name.to_string());
        FederateId(self.names.len() as u32 - 1)
    }

    pub fn assign(&mut self, reactor: ReactorId, federate: &str) -> FederateId {
        let id = self.federate(federate);
        self.by_reactor.insert(reactor, id);
        id
    }

    /// Assign by hierarchical name (`main.a.b`), resolved against the index.
    pub fn assign_path(&mut self, path: &str, federate: &str) -> FederateId {
        let id = self.federate(federate);
        self.by_path.insert(path.to_string(), id);
        id
    }

    pub fn federate_name(&self, id: FederateId) -> &str {
        self.names
            .get(id.0 as usize)
            .map(String::as_str)
            .unwrap_or(DEFAULT_FEDERATE)
    }

    pub fn federate_names(&self) -> &[String] {
        &self.names
    }

    fn assigned(&self, index: &ProgramIndex<'_>, reactor: ReactorId) -> Option<FederateId> {
        self.by_reactor
            .get(&reactor)
            .or_else(|| self.by_path.get(index.reactor_name(reactor)))
            .copied()
    }

    pub fn federate_of(&self, index: &ProgramIndex<'_>, reactor: ReactorId) -> FederateId {
        index
            .ancestors_or_self(reactor)
            .into_iter()
            .find_map(|r| self.assigned(index, r))
            .unwrap_or(FederateId::DEFAULT)
    }

    /// True when the reactors of the program span more than one unit.
    pub fn is_federated(&self, index: &ProgramIndex<'_>) -> bool {
        let units: BTreeSet<FederateId> = index
            .reactors_preorder()
            .iter()
            .map(|&r| self.federate_of(index, r))
            .collect();
        units.len() > 1
    }

    /// Problems with assignments that name no reactor of the program.
    pub fn validate(&self, index: &ProgramIndex<'_>) -> Vec<String> {
        let mut problems = Vec::new();
        for reactor in self.by_reactor.keys() {
            if index.reactor(*reactor).is_none() {
                problems.push(format!(
                    "federate partition assigns unknown reactor id {}",
                    reactor.0
                ));
            }
        }
        let known: BTreeSet<&str> = index
            .reactors_preorder()
            .iter()
            .map(|&r| index.reactor_name(r))
            .collect();
        for path in self.by_path.keys() {
            if !known.contains(path.as_str()) {
                problems.push(format!("federate partition assigns unknown reactor {}", path));
            }
        }
        problems
    }
}

// ── Policy ──────────────────────────────────────────────────────────────────

/// How federates agree on tag advancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coordination {
    /// A runtime infrastructure grants tag advances; it can arbitrate waits
    /// that have no local bound.
    #[default]
    Centralized,
    /// Each federate decides from its own clock; every wait needs a bound.
    Decentralized,
}

/// Deployment-policy inputs to bound computation. No latency is assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundaryPolicy {
    #[serde(default)]
    pub coordination: Coordination,
    #[serde(default)]
    pub network_latency: Option<TimeValue>,
    /// Offset used when no guarded reaction declares one.
    #[serde(default)]
    pub default_stp: Option<TimeValue>,
}

// ── Public types ────────────────────────────────────────────────────────────

/// A connection whose endpoints lie in different execution units.
///
/// Every boundary edge gets both a sender-side and a receiver-side control
/// reaction, whatever its delay; `bound` only changes how long the receiver
/// waits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryEdge {
    pub connection: ConnectionId,
    pub name: String,
    pub source: PortId,
    pub target: PortId,
    pub sender: FederateId,
    pub receiver: FederateId,
    pub delay: Option<TimeValue>,
    pub physical: bool,
    /// Safe-to-process bound for the receiver; `None` when nothing bounds it.
    pub bound: Option<TimeValue>,
}

impl BoundaryEdge {
    /// Same-tag logical dependency across the boundary. A declared `after 0`
    /// moves to the next microstep and does not count.
    pub fn is_zero_delay(&self) -> bool {
        !self.physical && self.delay.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    EmitAbsent,
    WaitBounded,
}

/// Where the synthesized reaction goes relative to the unit's own reactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Before(ReactionId),
    After(ReactionId),
    /// No reaction of the unit touches the port.
    Unanchored,
}

/// One control reaction the federated code generator must synthesize.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlReactionSpec {
    pub connection: ConnectionId,
    pub edge: String,
    pub side: Side,
    pub kind: ControlKind,
    pub bound: Option<TimeValue>,
    pub federate: FederateId,
    /// Sender: the source port. Receiver: the target port.
    pub port: PortId,
    pub placement: Placement,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoundaryReport {
    pub edges: Vec<BoundaryEdge>,
    pub controls: Vec<ControlReactionSpec>,
    /// Edges that block federated code generation.
    pub unresolved: Vec<ConnectionId>,
}

impl BoundaryReport {
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoundaryResult {
    pub report: BoundaryReport,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Classify every connection crossing a federate boundary.
pub fn classify_boundaries(
    index: &ProgramIndex<'_>,
    graph: &DependencyGraph,
    priorities: &PriorityTable,
    partition: &FederatePartition,
    policy: &BoundaryPolicy,
) -> AnalysisResult<BoundaryResult> {
    let problems = partition.validate(index);
    if !problems.is_empty() {
        return Err(AnalysisError::malformed_model(problems));
    }
    if !partition.is_federated(index) {
        debug!("single execution unit; no boundary edges");
        return Ok(BoundaryResult::default());
    }

    let ctx = Classifier {
        index,
        graph,
        priorities,
        partition,
        policy,
    };
    let mut result = BoundaryResult::default();
    for &conn_id in index.connections_in_order() {
        if let Some(edge) = ctx.boundary_edge(conn_id) {
            result.report.edges.push(edge);
        }
    }

    let mut unbounded = Vec::new();
    let on_cycle = ctx.edges_on_federate_cycles(&result.report.edges);
    for edge in &result.report.edges {
        result
            .report
            .controls
            .extend(ctx.control_specs(edge));
        match ctx.timing_finding(edge, on_cycle.contains(&edge.connection)) {
            Some(TimingFinding::Unresolvable(reason)) => {
                result.report.unresolved.push(edge.connection);
                unbounded.push(UnboundedEdge {
                    connection: edge.connection,
                    name: edge.name.clone(),
                    reason,
                });
            }
            Some(TimingFinding::Warning(diag)) => {
                warn!(edge = %edge.name, "{}", diag.message);
                result.diagnostics.push(diag);
            }
            None => {}
        }
    }
    if !unbounded.is_empty() {
        let err = AnalysisError::UnresolvableBoundaryTiming { edges: unbounded };
        result.diagnostics.extend(err.to_diagnostics());
    }

    debug!(
        edges = result.report.edges.len(),
        controls = result.report.controls.len(),
        unresolved = result.report.unresolved.len(),
        "boundary classification finished"
    );
    Ok(result)
}

// ── Internal classifier ─────────────────────────────────────────────────────

enum TimingFinding {
    Unresolvable(String),
    Warning(Diagnostic),
}

struct Classifier<'a, 'p> {
    index: &'a ProgramIndex<'p>,
    graph: &'a DependencyGraph,
    priorities: &'a PriorityTable,
    partition: &'a FederatePartition,
    policy: &'a BoundaryPolicy,
}

impl Classifier<'_, '_> {
    fn unit_of_port(&self, port: PortId) -> FederateId {
        match self.index.port_owner(port) {
            Some(owner) => self.partition.federate_of(self.index, owner),
            None => FederateId::DEFAULT,
        }
    }

    fn unit_of_reaction(&self, reaction: ReactionId) -> FederateId {
        match self.index.reaction_owner(reaction) {
            Some(owner) => self.partition.federate_of(self.index, owner),
            None => FederateId::DEFAULT,
        }
    }

    fn boundary_edge(&self, conn_id: ConnectionId) -> Option<BoundaryEdge> {
        let conn = self.index.connection(conn_id)?.connection;
        // Connections absent from the graph cannot be boundaries of it.
        self.graph.port_node(conn.source)?;
        self.graph.port_node(conn.target)?;

        let sender = self.unit_of_port(conn.source);
        let receiver = self.unit_of_port(conn.target);
        if sender == receiver {
            return None;
        }
        let bound = self.receiver_bound(conn.target, receiver, conn.physical, conn.delay_or_zero());
        Some(BoundaryEdge {
            connection: conn_id,
            name: self.index.connection_name(conn_id),
            source: conn.source,
            target: conn.target,
            sender,
            receiver,
            delay: conn.delay,
            physical: conn.physical,
            bound,
        })
    }

    /// Reactions of `unit` reading `port` or anything it feeds at the same tag.
    fn guarded_readers(&self, port: PortId, unit: FederateId) -> Vec<ReactionId> {
        let mut ports = vec![port];
        ports.extend(self.index.dependent_ports(port, PortWalk::ZeroDelay));
        let mut readers: Vec<ReactionId> = ports
            .iter()
            .flat_map(|&p| self.index.readers_of(p).iter().copied())
            .filter(|&r| self.unit_of_reaction(r) == unit)
            .collect();
        readers.sort_unstable();
        readers.dedup();
        readers
    }

    /// Reactions of `unit` writing `port` or anything feeding it at the same tag.
    fn feeding_writers(&self, port: PortId, unit: FederateId) -> Vec<ReactionId> {
        let mut ports = vec![port];
        ports.extend(self.index.depends_on_ports(port, PortWalk::ZeroDelay));
        let mut writers: Vec<ReactionId> = ports
            .iter()
            .flat_map(|&p| self.index.writers_of(p).iter().copied())
            .filter(|&r| self.unit_of_reaction(r) == unit)
            .collect();
        writers.sort_unstable();
        writers.dedup();
        writers
    }

    fn receiver_bound(
        &self,
        target: PortId,
        receiver: FederateId,
        physical: bool,
        delay: TimeValue,
    ) -> Option<TimeValue> {
        let declared_stp = self
            .guarded_readers(target, receiver)
            .into_iter()
            .filter_map(|r| self.index.reaction(r).and_then(|e| e.reaction.stp_offset))
            .max();
        let stp = declared_stp.or(self.policy.default_stp);
        let base = match (self.policy.network_latency, stp) {
            (Some(latency), Some(stp)) => Some(latency.max(stp)),
            (latency, stp) => latency.or(stp),
        }?;
        if physical {
            Some(base)
        } else {
            Some(base.saturating_sub(delay))
        }
    }

    /// Zero-delay logical boundary edges whose federates lie on a cycle.
    fn edges_on_federate_cycles(&self, edges: &[BoundaryEdge]) -> BTreeSet<ConnectionId> {
        let units = self.partition.federate_names().len();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); units];
        for edge in edges.iter().filter(|e| e.is_zero_delay()) {
            adjacency[edge.sender.0 as usize].push(edge.receiver.0 as usize);
        }
        let succ = |n: usize| adjacency[n].clone();
        let mut component_of: HashMap<usize, usize> = HashMap::new();
        for (i, component) in strongly_connected_components(units, succ).into_iter().enumerate() {
            if is_cyclic_component(&component, succ) {
                for unit in component {
                    component_of.insert(unit, i);
                }
            }
        }
        edges
            .iter()
            .filter(|e| e.is_zero_delay())
            .filter(|e| {
                let s = component_of.get(&(e.sender.0 as usize));
                s.is_some() && s == component_of.get(&(e.receiver.0 as usize))
            })
            .map(|e| e.connection)
            .collect()
    }

    fn timing_finding(&self, edge: &BoundaryEdge, on_cycle: bool) -> Option<TimingFinding> {
        match edge.bound {
            None if edge.is_zero_delay() && on_cycle => Some(TimingFinding::Unresolvable(format!(
                "{} waits on {} within a zero-delay cycle between federates",
                self.partition.federate_name(edge.receiver),
                self.partition.federate_name(edge.sender)
            ))),
            None if edge.is_zero_delay()
                && self.policy.coordination == Coordination::Decentralized =>
            {
                Some(TimingFinding::Unresolvable(
                    "decentralized coordination needs a network latency or safe-to-process offset"
                        .to_string(),
                ))
            }
            None => Some(TimingFinding::Warning(
                Diagnostic::warning(
                    DiagKind::BoundaryTiming,
                    format!(
                        "federated connection {} has no finite safe-to-process bound",
                        edge.name
                    ),
                )
                .with_code(codes::W0200)
                .with_involved(NodeRef::Connection(edge.connection), edge.name.clone())
                .with_hint("the coordinator will arbitrate tag advancement for this edge"),
            )),
            Some(bound) if bound.is_zero() && !edge.physical && !edge.is_zero_delay() => {
                Some(TimingFinding::Warning(
                    Diagnostic::warning(
                        DiagKind::BoundaryTiming,
                        format!(
                            "delay on {} absorbs the whole safe-to-process bound",
                            edge.name
                        ),
                    )
                    .with_code(codes::W0201)
                    .with_involved(NodeRef::Connection(edge.connection), edge.name.clone()),
                ))
            }
            Some(_) => None,
        }
    }

    fn control_specs(&self, edge: &BoundaryEdge) -> [ControlReactionSpec; 2] {
        let last_writer = self
            .feeding_writers(edge.source, edge.sender)
            .into_iter()
            .max_by_key(|&r| self.priorities.rank(r));
        let first_reader = self
            .guarded_readers(edge.target, edge.receiver)
            .into_iter()
            .min_by_key(|&r| self.priorities.rank(r));
        [
            ControlReactionSpec {
                connection: edge.connection,
                edge: edge.name.clone(),
                side: Side::Sender,
                kind: ControlKind::EmitAbsent,
                bound: None,
                federate: edge.sender,
                port: edge.source,
                placement: last_writer.map_or(Placement::Unanchored, Placement::After),
            },
            ControlReactionSpec {
                connection: edge.connection,
                edge: edge.name.clone(),
                side: Side::Receiver,
                kind: ControlKind::WaitBounded,
                bound: edge.bound,
                federate: edge.receiver,
                port: edge.target,
                placement: first_reader.map_or(Placement::Unanchored, Placement::Before),
            },
        ]
    }
}

// ── Runtime port protocol ───────────────────────────────────────────────────

/// Per-tag status of a receiver-side boundary port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortStatus {
    #[default]
    Pending,
    DataReceived,
    AbsentReceived,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortEvent {
    /// A data message for the current tag.
    Data,
    /// An explicit absent message for the current tag.
    Absent,
    /// The local clock reached the safe-to-process bound.
    Timeout,
    /// The receiver advanced to a new logical tag.
    NewTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("duplicate {event:?} message: port already {status}")]
    Duplicate { status: PortStatus, event: PortEvent },
    #[error("late {event:?} message: port already timed out")]
    Late { event: PortEvent },
}

impl PortStatus {
    pub fn is_terminal(self) -> bool {
        self != PortStatus::Pending
    }

    /// The status after `event`.
    pub fn on(self, event: PortEvent) -> Result<PortStatus, ProtocolError> {
        use PortEvent::*;
        use PortStatus::*;
        match (self, event) {
            (_, NewTag) => Ok(Pending),
            (Pending, Data) => Ok(DataReceived),
            (Pending, Absent) => Ok(AbsentReceived),
            (Pending, Timeout) => Ok(TimedOut),
            // The timer may still fire once the port is resolved.
            (status, Timeout) => Ok(status),
            (TimedOut, event) => Err(ProtocolError::Late { event }),
            (status, event) => Err(ProtocolError::Duplicate { status, event }),
        }
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortStatus::Pending => "pending",
            PortStatus::DataReceived => "data-received",
            PortStatus::AbsentReceived => "absent-received",
            PortStatus::TimedOut => "timed-out",
        };
        f.write_str(s)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
