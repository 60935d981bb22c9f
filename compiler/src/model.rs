// model.rs: Elaborated program model (read-only input to the analysis)
//
// An owned instantiation tree of reactor instances with their ports,
// reactions, connections and modes, plus `ProgramBuilder` (the adapter the
// elaboration pass and tests use to produce one) and the JSON interchange
// used by the `rca` binary.
//
// Preconditions: the tree is free of instantiation cycles (guaranteed by
//                ownership: a reactor cannot contain itself).
// Postconditions: none (data only).
// Failure modes: JSON decoding errors are returned from `Program::from_json`.
// Side effects: none.

use serde::{Deserialize, Serialize};

use crate::id::*;
use crate::time::TimeValue;

// ── Ports ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// A typed communication endpoint on a reactor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortInstance {
    pub id: PortId,
    pub name: String,
    pub direction: PortDirection,
}

// ── Reactions ───────────────────────────────────────────────────────────────

/// Something a reaction can be triggered by, read, or write.
///
/// Only ports take part in the dependency graph; timers, actions and the
/// startup/shutdown triggers are carried so the model stays faithful.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRef {
    Port(PortId),
    Timer(String),
    Action(String),
    Startup,
    Shutdown,
}

impl TriggerRef {
    pub fn port(&self) -> Option<PortId> {
        match self {
            TriggerRef::Port(id) => Some(*id),
            _ => None,
        }
    }
}

/// Whether a reaction participates in its reactor's declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionOrdering {
    #[default]
    Ordered,
    /// Declared independent of textual order.
    Unordered,
}

/// One reaction body of a reactor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionInstance {
    pub id: ReactionId,
    /// 0-based declaration index within the owning reactor.
    pub index: u32,
    #[serde(default)]
    pub triggers: Vec<TriggerRef>,
    /// Read without triggering.
    #[serde(default)]
    pub sources: Vec<TriggerRef>,
    #[serde(default)]
    pub effects: Vec<TriggerRef>,
    #[serde(default)]
    pub ordering: ReactionOrdering,
    /// Mode of the owning reactor this reaction belongs to, if any.
    #[serde(default)]
    pub mode: Option<ModeId>,
    /// Safe-to-process offset declared for the reaction (federated only).
    #[serde(default)]
    pub stp_offset: Option<TimeValue>,
}

impl ReactionInstance {
    pub fn is_unordered(&self) -> bool {
        self.ordering == ReactionOrdering::Unordered
    }

    /// Ports the reaction depends on: triggers first, then sources, deduplicated.
    pub fn read_ports(&self) -> Vec<PortId> {
        let mut ports: Vec<PortId> = Vec::new();
        for port in self
            .triggers
            .iter()
            .chain(self.sources.iter())
            .filter_map(TriggerRef::port)
        {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }
        ports
    }

    /// Ports the reaction may write, deduplicated, in declaration order.
    pub fn written_ports(&self) -> Vec<PortId> {
        let mut ports: Vec<PortId> = Vec::new();
        for port in self.effects.iter().filter_map(TriggerRef::port) {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }
        ports
    }
}

// ── Connections ─────────────────────────────────────────────────────────────

/// Why a connection does not contribute a zero-delay dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyBreak {
    Physical,
    Delay(TimeValue),
}

/// A directed port-to-port connection declared in a reactor body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: PortId,
    pub target: PortId,
    #[serde(default)]
    pub delay: Option<TimeValue>,
    #[serde(default)]
    pub physical: bool,
}

impl Connection {
    /// `None` for a zero-delay logical connection.
    ///
    /// A physical connection breaks the dependency regardless of its delay.
    /// Any declared `after` breaks it too, `after 0` included, since that
    /// still advances the microstep.
    pub fn dependency_break(&self) -> Option<DependencyBreak> {
        if self.physical {
            return Some(DependencyBreak::Physical);
        }
        self.delay.map(DependencyBreak::Delay)
    }

    pub fn is_zero_delay(&self) -> bool {
        self.dependency_break().is_none()
    }

    /// Declared delay, zero when absent.
    pub fn delay_or_zero(&self) -> TimeValue {
        self.delay.unwrap_or(TimeValue::ZERO)
    }
}

// ── Modes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mode {
    pub id: ModeId,
    pub name: String,
    #[serde(default)]
    pub initial: bool,
}

// ── Reactors ────────────────────────────────────────────────────────────────

/// A node of the instantiation tree. Children are owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactorInstance {
    pub id: ReactorId,
    pub name: String,
    #[serde(default)]
    pub ports: Vec<PortInstance>,
    #[serde(default)]
    pub reactions: Vec<ReactionInstance>,
    /// Connections declared in this reactor's body.
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub children: Vec<ReactorInstance>,
    /// Modes declared by this reactor.
    #[serde(default)]
    pub modes: Vec<Mode>,
    /// Mode of the parent this instance lives in, if any.
    #[serde(default)]
    pub mode: Option<ModeId>,
}

impl ReactorInstance {
    fn new(id: ReactorId, name: &str) -> Self {
        ReactorInstance {
            id,
            name: name.to_string(),
            ports: Vec::new(),
            reactions: Vec::new(),
            connections: Vec::new(),
            children: Vec::new(),
            modes: Vec::new(),
            mode: None,
        }
    }

    /// Visit this reactor and all descendants in pre-order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a ReactorInstance)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

/// An elaborated program: the main reactor and everything it contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub main: ReactorInstance,
}

impl Program {
    pub fn from_json(text: &str) -> Result<Program, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Compact JSON; stable for a given tree, used for provenance hashing.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn reactor_count(&self) -> usize {
        let mut n = 0;
        self.main.walk(&mut |_| n += 1);
        n
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

/// Incremental construction of a `Program` with allocated IDs.
///
/// Reactors are drafted flat and assembled into the owned tree by `finish`.
///
/// # Panics
///
/// Every method taking a `ReactorId` panics when that id was not returned
/// by the same builder.
#[derive(Debug)]
pub struct ProgramBuilder {
    alloc: IdAllocator,
    root: ReactorInstance,
    /// Non-main reactors by id; slot 0 stays empty.
    drafts: Vec<Option<ReactorInstance>>,
    children: Vec<Vec<ReactorId>>,
}

impl ProgramBuilder {
    /// Start a program whose main reactor is called `main_name`.
    pub fn new(main_name: &str) -> Self {
        let mut alloc = IdAllocator::new();
        let root = alloc.alloc_reactor();
        ProgramBuilder {
            alloc,
            root: ReactorInstance::new(root, main_name),
            drafts: vec![None],
            children: vec![Vec::new()],
        }
    }

    pub fn main(&self) -> ReactorId {
        ReactorId(0)
    }

    fn draft(&mut self, reactor: ReactorId) -> &mut ReactorInstance {
        if reactor == self.main() {
            return &mut self.root;
        }
        match self.drafts.get_mut(reactor.0 as usize) {
            Some(Some(draft)) => draft,
            _ => panic!("ProgramBuilder: unknown reactor {:?}", reactor),
        }
    }

    /// Instantiate a child reactor inside `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not a reactor of this builder.
    pub fn reactor(&mut self, parent: ReactorId, name: &str) -> ReactorId {
        self.draft(parent);
        let id = self.alloc.alloc_reactor();
        self.drafts.push(Some(ReactorInstance::new(id, name)));
        self.children.push(Vec::new());
        self.children[parent.0 as usize].push(id);
        id
    }

    pub fn input(&mut self, reactor: ReactorId, name: &str) -> PortId {
        self.port(reactor, name, PortDirection::Input)
    }

    pub fn output(&mut self, reactor: ReactorId, name: &str) -> PortId {
        self.port(reactor, name, PortDirection::Output)
    }

    fn port(&mut self, reactor: ReactorId, name: &str, direction: PortDirection) -> PortId {
        let id = self.alloc.alloc_port();
        self.draft(reactor).ports.push(PortInstance {
            id,
            name: name.to_string(),
            direction,
        });
        id
    }

    /// Declare a mode of `reactor`.
    pub fn mode(&mut self, reactor: ReactorId, name: &str, initial: bool) -> ModeId {
        let id = self.alloc.alloc_mode();
        self.draft(reactor).modes.push(Mode {
            id,
            name: name.to_string(),
            initial,
        });
        id
    }

    /// Place a child reactor inside one of its parent's modes.
    pub fn place_in_mode(&mut self, child: ReactorId, mode: ModeId) {
        self.draft(child).mode = Some(mode);
    }

    /// Begin declaring the next reaction of `reactor`.
    pub fn reaction(&mut self, reactor: ReactorId) -> ReactionBuilder<'_> {
        let id = self.alloc.alloc_reaction();
        let index = self.draft(reactor).reactions.len() as u32;
        ReactionBuilder {
            owner: self.draft(reactor),
            reaction: ReactionInstance {
                id,
                index,
                triggers: Vec::new(),
                sources: Vec::new(),
                effects: Vec::new(),
                ordering: ReactionOrdering::Ordered,
                mode: None,
                stp_offset: None,
            },
        }
    }

    /// Zero-delay logical connection declared in `container`.
    pub fn connect(
        &mut self,
        container: ReactorId,
        source: PortId,
        target: PortId,
    ) -> ConnectionId {
        self.connect_with(container, source, target, None, false)
    }

    pub fn connect_delayed(
        &mut self,
        container: ReactorId,
        source: PortId,
        target: PortId,
        delay: TimeValue,
    ) -> ConnectionId {
        self.connect_with(container, source, target, Some(delay), false)
    }

    pub fn connect_physical(
        &mut self,
        container: ReactorId,
        source: PortId,
        target: PortId,
    ) -> ConnectionId {
        self.connect_with(container, source, target, None, true)
    }

    pub fn connect_with(
        &mut self,
        container: ReactorId,
        source: PortId,
        target: PortId,
        delay: Option<TimeValue>,
        physical: bool,
    ) -> ConnectionId {
        let id = self.alloc.alloc_connection();
        self.draft(container).connections.push(Connection {
            id,
            source,
            target,
            delay,
            physical,
        });
        id
    }

    /// Assemble the owned tree.
    pub fn finish(mut self) -> Program {
        let children = self.assemble_children(ReactorId(0));
        let mut main = self.root;
        main.children = children;
        Program { main }
    }

    fn assemble_children(&mut self, parent: ReactorId) -> Vec<ReactorInstance> {
        let child_ids = std::mem::take(&mut self.children[parent.0 as usize]);
        let mut out = Vec::with_capacity(child_ids.len());
        for id in child_ids {
            if let Some(mut child) = self.drafts[id.0 as usize].take() {
                child.children = self.assemble_children(id);
                out.push(child);
            }
        }
        out
    }
}

/// Declares one reaction; dropped without `build` the reaction is discarded.
pub struct ReactionBuilder<'b> {
    owner: &'b mut ReactorInstance,
    reaction: ReactionInstance,
}

impl ReactionBuilder<'_> {
    pub fn trigger(mut self, port: PortId) -> Self {
        self.reaction.triggers.push(TriggerRef::Port(port));
        self
    }

    pub fn source(mut self, port: PortId) -> Self {
        self.reaction.sources.push(TriggerRef::Port(port));
        self
    }

    pub fn effect(mut self, port: PortId) -> Self {
        self.reaction.effects.push(TriggerRef::Port(port));
        self
    }

    pub fn timer(mut self, name: &str) -> Self {
        self.reaction.triggers.push(TriggerRef::Timer(name.to_string()));
        self
    }

    pub fn action(mut self, name: &str) -> Self {
        self.reaction
            .triggers
            .push(TriggerRef::Action(name.to_string()));
        self
    }

    pub fn schedules(mut self, action: &str) -> Self {
        self.reaction
            .effects
            .push(TriggerRef::Action(action.to_string()));
        self
    }

    pub fn startup(mut self) -> Self {
        self.reaction.triggers.push(TriggerRef::Startup);
        self
    }

    pub fn unordered(mut self) -> Self {
        self.reaction.ordering = ReactionOrdering::Unordered;
        self
    }

    pub fn in_mode(mut self, mode: ModeId) -> Self {
        self.reaction.mode = Some(mode);
        self
    }

    pub fn stp(mut self, offset: TimeValue) -> Self {
        self.reaction.stp_offset = Some(offset);
        self
    }

    pub fn build(self) -> ReactionId {
        let id = self.reaction.id;
        self.owner.reactions.push(self.reaction);
        id
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
