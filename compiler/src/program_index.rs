// program_index.rs: Dense lookup tables over the instantiation tree
//
// Built once per analysis from a `Program`. Gives O(1) access to the owner
// of every port, reaction and connection, hierarchical names, reactor
// ancestry, and the derived port relations (direct and transitive
// upstream/downstream) that resolve connections through composite
// boundaries.
//
// Preconditions: `program` is an elaborated tree.
// Postconditions: every ID referenced anywhere in the tree resolves.
// Failure modes: duplicate IDs, dangling port references, declaration
//                indices out of order, connections whose endpoints are not
//                visible from the declaring reactor, or unknown modes
//                → `AnalysisError::InvariantViolation` (program model).
// Side effects: none.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{AnalysisError, AnalysisResult};
use crate::id::*;
use crate::model::*;

#[derive(Debug, Clone)]
pub struct ReactorEntry<'p> {
    pub reactor: &'p ReactorInstance,
    pub parent: Option<ReactorId>,
    pub depth: u32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct PortEntry<'p> {
    pub port: &'p PortInstance,
    pub owner: ReactorId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ReactionEntry<'p> {
    pub reaction: &'p ReactionInstance,
    pub owner: ReactorId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ConnectionEntry<'p> {
    pub connection: &'p Connection,
    /// Reactor whose body declares the connection.
    pub container: ReactorId,
}

/// Which connections a port walk may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortWalk {
    /// Every connection, delayed and physical ones included.
    All,
    /// Only zero-delay logical connections.
    ZeroDelay,
}

#[derive(Debug)]
pub struct ProgramIndex<'p> {
    program: &'p Program,
    reactors: HashMap<ReactorId, ReactorEntry<'p>>,
    ports: HashMap<PortId, PortEntry<'p>>,
    reactions: HashMap<ReactionId, ReactionEntry<'p>>,
    connections: HashMap<ConnectionId, ConnectionEntry<'p>>,
    outgoing: HashMap<PortId, Vec<ConnectionId>>,
    incoming: HashMap<PortId, Vec<ConnectionId>>,
    readers: HashMap<PortId, Vec<ReactionId>>,
    writers: HashMap<PortId, Vec<ReactionId>>,
    reactor_order: Vec<ReactorId>,
    connection_order: Vec<ConnectionId>,
}

impl<'p> ProgramIndex<'p> {
    pub fn build(program: &'p Program) -> AnalysisResult<Self> {
        let mut index = ProgramIndex {
            program,
            reactors: HashMap::new(),
            ports: HashMap::new(),
            reactions: HashMap::new(),
            connections: HashMap::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            readers: HashMap::new(),
            writers: HashMap::new(),
            reactor_order: Vec::new(),
            connection_order: Vec::new(),
        };
        let mut problems = Vec::new();
        index.collect(&program.main, None, 0, program.main.name.clone(), &mut problems);
        index.link(&mut problems);
        if problems.is_empty() {
            Ok(index)
        } else {
            Err(AnalysisError::malformed_model(problems))
        }
    }

    // ── Construction ────────────────────────────────────────────────────

    fn collect(
        &mut self,
        reactor: &'p ReactorInstance,
        parent: Option<ReactorId>,
        depth: u32,
        name: String,
        problems: &mut Vec<String>,
    ) {
        if self.reactors.contains_key(&reactor.id) {
            problems.push(format!("duplicate reactor id {} ({})", reactor.id.0, name));
            return;
        }
        self.reactor_order.push(reactor.id);

        for port in &reactor.ports {
            let port_name = format!("{}.{}", name, port.name);
            if self.ports.contains_key(&port.id) {
                problems.push(format!("duplicate port id {} ({})", port.id.0, port_name));
                continue;
            }
            self.ports.insert(
                port.id,
                PortEntry {
                    port,
                    owner: reactor.id,
                    name: port_name,
                },
            );
        }

        for (position, reaction) in reactor.reactions.iter().enumerate() {
            let reaction_name = format!("{}.reaction_{}", name, reaction.index + 1);
            if reaction.index as usize != position {
                problems.push(format!(
                    "reaction {} declared at position {} has index {}",
                    reaction_name, position, reaction.index
                ));
            }
            if self.reactions.contains_key(&reaction.id) {
                problems.push(format!(
                    "duplicate reaction id {} ({})",
                    reaction.id.0, reaction_name
                ));
                continue;
            }
            self.reactions.insert(
                reaction.id,
                ReactionEntry {
                    reaction,
                    owner: reactor.id,
                    name: reaction_name,
                },
            );
        }

        for connection in &reactor.connections {
            if self.connections.contains_key(&connection.id) {
                problems.push(format!(
                    "duplicate connection id {} (in {})",
                    connection.id.0, name
                ));
                continue;
            }
            self.connections.insert(
                connection.id,
                ConnectionEntry {
                    connection,
                    container: reactor.id,
                },
            );
            self.connection_order.push(connection.id);
        }

        self.reactors.insert(
            reactor.id,
            ReactorEntry {
                reactor,
                parent,
                depth,
                name: name.clone(),
            },
        );

        for child in &reactor.children {
            let child_name = format!("{}.{}", name, child.name);
            self.collect(child, Some(reactor.id), depth + 1, child_name, problems);
        }
    }

    /// Second pass: resolve references now that every port is known.
    fn link(&mut self, problems: &mut Vec<String>) {
        for &reactor_id in &self.reactor_order {
            let entry = &self.reactors[&reactor_id];
            let reactor = entry.reactor;
            let mode_ids: HashSet<ModeId> = reactor.modes.iter().map(|m| m.id).collect();

            for child in &reactor.children {
                if let Some(mode) = child.mode {
                    if !mode_ids.contains(&mode) {
                        problems.push(format!(
                            "reactor {}.{} placed in mode {} not declared by {}",
                            entry.name, child.name, mode.0, entry.name
                        ));
                    }
                }
            }

            for reaction in &reactor.reactions {
                let reaction_name = &self.reactions[&reaction.id].name;
                if let Some(mode) = reaction.mode {
                    if !mode_ids.contains(&mode) {
                        problems.push(format!(
                            "reaction {} placed in mode {} not declared by {}",
                            reaction_name, mode.0, entry.name
                        ));
                    }
                }
                for port in reaction.read_ports() {
                    if self.ports.contains_key(&port) {
                        self.readers.entry(port).or_default().push(reaction.id);
                    } else {
                        problems.push(format!(
                            "reaction {} reads unknown port {}",
                            reaction_name, port.0
                        ));
                    }
                }
                for port in reaction.written_ports() {
                    if self.ports.contains_key(&port) {
                        self.writers.entry(port).or_default().push(reaction.id);
                    } else {
                        problems.push(format!(
                            "reaction {} writes unknown port {}",
                            reaction_name, port.0
                        ));
                    }
                }
            }
        }

        for &conn_id in &self.connection_order {
            let entry = &self.connections[&conn_id];
            let conn = entry.connection;
            let container = entry.container;
            let source_ok = self.check_endpoint(container, conn.source, true, conn_id, problems);
            let target_ok = self.check_endpoint(container, conn.target, false, conn_id, problems);
            if source_ok && target_ok {
                self.outgoing.entry(conn.source).or_default().push(conn_id);
                self.incoming.entry(conn.target).or_default().push(conn_id);
            }
        }
    }

    /// A connection declared in `container` may read from the container's
    /// inputs or its children's outputs, and write to the container's
    /// outputs or its children's inputs.
    fn check_endpoint(
        &self,
        container: ReactorId,
        port: PortId,
        is_source: bool,
        conn: ConnectionId,
        problems: &mut Vec<String>,
    ) -> bool {
        let container_name = &self.reactors[&container].name;
        let Some(entry) = self.ports.get(&port) else {
            problems.push(format!(
                "connection {} in {} references unknown port {}",
                conn.0, container_name, port.0
            ));
            return false;
        };
        let on_container = entry.owner == container;
        let on_child = self.reactors[&entry.owner].parent == Some(container);
        let expected = match (on_container, is_source) {
            (true, true) => PortDirection::Input,
            (true, false) => PortDirection::Output,
            (false, true) => PortDirection::Output,
            (false, false) => PortDirection::Input,
        };
        if !on_container && !on_child {
            problems.push(format!(
                "connection {} in {} uses port {} that is not visible there",
                conn.0, container_name, entry.name
            ));
            return false;
        }
        if entry.port.direction != expected {
            problems.push(format!(
                "connection {} in {} uses {} as a {} but it is {:?}",
                conn.0,
                container_name,
                entry.name,
                if is_source { "source" } else { "target" },
                entry.port.direction
            ));
            return false;
        }
        true
    }

    // ── Lookups ─────────────────────────────────────────────────────────

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn main(&self) -> ReactorId {
        self.program.main.id
    }

    pub fn reactor(&self, id: ReactorId) -> Option<&ReactorEntry<'p>> {
        self.reactors.get(&id)
    }

    pub fn port(&self, id: PortId) -> Option<&PortEntry<'p>> {
        self.ports.get(&id)
    }

    pub fn reaction(&self, id: ReactionId) -> Option<&ReactionEntry<'p>> {
        self.reactions.get(&id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&ConnectionEntry<'p>> {
        self.connections.get(&id)
    }

    /// Reactors in pre-order (declaration order).
    pub fn reactors_preorder(&self) -> &[ReactorId] {
        &self.reactor_order
    }

    /// Connections in pre-order of their declaring reactor, then declaration order.
    pub fn connections_in_order(&self) -> &[ConnectionId] {
        &self.connection_order
    }

    pub fn reaction_count(&self) -> usize {
        self.reactions.len()
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn reactor_name(&self, id: ReactorId) -> &str {
        self.reactors.get(&id).map_or("<unknown>", |e| e.name.as_str())
    }

    pub fn port_name(&self, id: PortId) -> &str {
        self.ports.get(&id).map_or("<unknown>", |e| e.name.as_str())
    }

    pub fn reaction_name(&self, id: ReactionId) -> &str {
        self.reactions.get(&id).map_or("<unknown>", |e| e.name.as_str())
    }

    /// `main.a.out -> main.b.in`, with the delay or `physical` marker.
    pub fn connection_name(&self, id: ConnectionId) -> String {
        let Some(entry) = self.connections.get(&id) else {
            return "<unknown>".to_string();
        };
        let conn = entry.connection;
        let arrow = if conn.physical { "~>" } else { "->" };
        let mut name = format!(
            "{} {} {}",
            self.port_name(conn.source),
            arrow,
            self.port_name(conn.target)
        );
        if let Some(delay) = conn.delay {
            name.push_str(&format!(" after {}", delay));
        }
        name
    }

    pub fn port_owner(&self, id: PortId) -> Option<ReactorId> {
        self.ports.get(&id).map(|e| e.owner)
    }

    pub fn reaction_owner(&self, id: ReactionId) -> Option<ReactorId> {
        self.reactions.get(&id).map(|e| e.owner)
    }

    pub fn parent(&self, id: ReactorId) -> Option<ReactorId> {
        self.reactors.get(&id).and_then(|e| e.parent)
    }

    /// `id`, its parent, grandparent, ... up to the main reactor.
    pub fn ancestors_or_self(&self, id: ReactorId) -> Vec<ReactorId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Reactions that are triggered by or read `port`.
    pub fn readers_of(&self, port: PortId) -> &[ReactionId] {
        self.readers.get(&port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reactions that may write `port`.
    pub fn writers_of(&self, port: PortId) -> &[ReactionId] {
        self.writers.get(&port).map(Vec::as_slice).unwrap_or(&[])
    }

    // ── Port relations ──────────────────────────────────────────────────

    fn connection_ok(&self, id: ConnectionId, walk: PortWalk) -> Option<&'p Connection> {
        let conn = self.connections.get(&id)?.connection;
        match walk {
            PortWalk::All => Some(conn),
            PortWalk::ZeroDelay if conn.is_zero_delay() => Some(conn),
            PortWalk::ZeroDelay => None,
        }
    }

    /// Ports `port` feeds directly through a single connection.
    pub fn downstream_ports(&self, port: PortId, walk: PortWalk) -> Vec<PortId> {
        self.outgoing
            .get(&port)
            .into_iter()
            .flatten()
            .filter_map(|&c| self.connection_ok(c, walk))
            .map(|c| c.target)
            .collect()
    }

    /// Ports feeding `port` directly through a single connection.
    pub fn upstream_ports(&self, port: PortId, walk: PortWalk) -> Vec<PortId> {
        self.incoming
            .get(&port)
            .into_iter()
            .flatten()
            .filter_map(|&c| self.connection_ok(c, walk))
            .map(|c| c.source)
            .collect()
    }

    /// Every port reachable downstream of `port`, crossing composite
    /// boundaries, in breadth-first order. `port` itself is excluded.
    pub fn dependent_ports(&self, port: PortId, walk: PortWalk) -> Vec<PortId> {
        self.reach(port, |p| self.downstream_ports(p, walk))
    }

    /// Every port `port` transitively depends on, in breadth-first order.
    pub fn depends_on_ports(&self, port: PortId, walk: PortWalk) -> Vec<PortId> {
        self.reach(port, |p| self.upstream_ports(p, walk))
    }

    fn reach(&self, start: PortId, next: impl Fn(PortId) -> Vec<PortId>) -> Vec<PortId> {
        let mut seen = HashSet::from([start]);
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(port) = queue.pop_front() {
            for succ in next(port) {
                if seen.insert(succ) {
                    order.push(succ);
                    queue.push_back(succ);
                }
            }
        }
        order
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvariantSubject;
    use crate::time::{TimeUnit, TimeValue};

    /// main { a.out -> b.in; b contains inner, b.in -> inner.x }
    fn nested() -> (Program, [PortId; 3]) {
        let mut b = ProgramBuilder::new("main");
        let a = b.reactor(b.main(), "a");
        let outer = b.reactor(b.main(), "b");
        let inner = b.reactor(outer, "inner");
        let a_out = b.output(a, "out");
        let b_in = b.input(outer, "in");
        let x = b.input(inner, "x");
        b.reaction(a).timer("t").effect(a_out).build();
        b.reaction(inner).trigger(x).build();
        b.connect(b.main(), a_out, b_in);
        b.connect(outer, b_in, x);
        (b.finish(), [a_out, b_in, x])
    }

    fn expect_model_errors(program: &Program) -> Vec<String> {
        match ProgramIndex::build(program) {
            Err(AnalysisError::InvariantViolation {
                subject: InvariantSubject::ProgramModel,
                details,
                ..
            }) => details,
            other => panic!("expected model error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn hierarchical_names() {
        let (program, [a_out, _, x]) = nested();
        let index = ProgramIndex::build(&program).unwrap();
        assert_eq!(index.port_name(a_out), "main.a.out");
        assert_eq!(index.port_name(x), "main.b.inner.x");
        assert_eq!(index.reaction_name(ReactionId(0)), "main.a.reaction_1");
    }

    #[test]
    fn transitive_dependents_cross_composite_boundary() {
        let (program, [a_out, b_in, x]) = nested();
        let index = ProgramIndex::build(&program).unwrap();
        assert_eq!(index.downstream_ports(a_out, PortWalk::All), vec![b_in]);
        assert_eq!(index.dependent_ports(a_out, PortWalk::All), vec![b_in, x]);
        assert_eq!(index.depends_on_ports(x, PortWalk::All), vec![b_in, a_out]);
    }

    #[test]
    fn zero_delay_walk_stops_at_delayed_connection() {
        let mut b = ProgramBuilder::new("main");
        let a = b.reactor(b.main(), "a");
        let c = b.reactor(b.main(), "c");
        let out = b.output(a, "out");
        let inp = b.input(c, "in");
        b.connect_delayed(
            b.main(),
            out,
            inp,
            TimeValue::from_parts(1, TimeUnit::Msec).unwrap(),
        );
        let program = b.finish();
        let index = ProgramIndex::build(&program).unwrap();
        assert!(index.downstream_ports(out, PortWalk::ZeroDelay).is_empty());
        assert_eq!(index.downstream_ports(out, PortWalk::All), vec![inp]);
    }

    #[test]
    fn readers_and_writers() {
        let (program, [a_out, _, x]) = nested();
        let index = ProgramIndex::build(&program).unwrap();
        assert_eq!(index.writers_of(a_out), &[ReactionId(0)]);
        assert_eq!(index.readers_of(x), &[ReactionId(1)]);
        assert!(index.readers_of(a_out).is_empty());
    }

    #[test]
    fn ancestry() {
        let (program, _) = nested();
        let index = ProgramIndex::build(&program).unwrap();
        assert_eq!(
            index.ancestors_or_self(ReactorId(3)),
            vec![ReactorId(3), ReactorId(2), ReactorId(0)]
        );
        assert_eq!(index.reactor(ReactorId(3)).unwrap().depth, 2);
        assert_eq!(
            index.reactors_preorder(),
            &[ReactorId(0), ReactorId(1), ReactorId(2), ReactorId(3)]
        );
    }

    #[test]
    fn dangling_port_reference_is_rejected() {
        let (mut program, _) = nested();
        program.main.children[0].reactions[0]
            .effects
            .push(TriggerRef::Port(PortId(42)));
        let details = expect_model_errors(&program);
        assert_eq!(details.len(), 1);
        assert!(details[0].contains("writes unknown port 42"), "{}", details[0]);
    }

    #[test]
    fn out_of_order_reaction_index_is_rejected() {
        let (mut program, _) = nested();
        program.main.children[0].reactions[0].index = 3;
        let details = expect_model_errors(&program);
        assert!(details[0].contains("has index 3"), "{}", details[0]);
    }

    #[test]
    fn connection_across_hierarchy_levels_is_rejected() {
        let (mut program, [a_out, _, x]) = nested();
        // main cannot see a grandchild's port
        program.main.connections.push(Connection {
            id: ConnectionId(99),
            source: a_out,
            target: x,
            delay: None,
            physical: false,
        });
        let details = expect_model_errors(&program);
        assert!(details[0].contains("not visible"), "{}", details[0]);
    }

    #[test]
    fn connection_direction_is_checked() {
        let (mut program, [a_out, b_in, _]) = nested();
        program.main.connections.push(Connection {
            id: ConnectionId(99),
            source: b_in,
            target: a_out,
            delay: None,
            physical: false,
        });
        let details = expect_model_errors(&program);
        assert_eq!(details.len(), 2);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let (mut program, _) = nested();
        let dup = program.main.children[0].ports[0].clone();
        program.main.children[1].ports.push(dup);
        let details = expect_model_errors(&program);
        assert!(details[0].starts_with("duplicate port id"), "{}", details[0]);
    }

    #[test]
    fn connection_name_marks_delay_and_physical() {
        let mut b = ProgramBuilder::new("main");
        let a = b.reactor(b.main(), "a");
        let c = b.reactor(b.main(), "c");
        let out = b.output(a, "out");
        let inp = b.input(c, "in");
        let delayed = b.connect_delayed(
            b.main(),
            out,
            inp,
            TimeValue::from_parts(2, TimeUnit::Sec).unwrap(),
        );
        let physical = b.connect_physical(b.main(), out, inp);
        let program = b.finish();
        let index = ProgramIndex::build(&program).unwrap();
        assert_eq!(
            index.connection_name(delayed),
            "main.a.out -> main.c.in after 2 sec"
        );
        assert_eq!(index.connection_name(physical), "main.a.out ~> main.c.in");
    }
}
