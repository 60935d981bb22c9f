// dot.rs: Graphviz DOT output for reactor dependency graphs
//
// Transforms a DependencyGraph into DOT format suitable for rendering
// with `dot` or other Graphviz layout engines. Each reactor becomes a
// cluster nested like the instantiation tree; broken (delayed or physical)
// connections are dashed and edges on a reported cycle are red.
//
// Preconditions: `graph` was built from `index`.
// Postconditions: returns a valid DOT string representing the graph.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write};

use crate::cycles::CycleReport;
use crate::graph::*;
use crate::id::ReactorId;
use crate::model::{DependencyBreak, PortDirection, ReactorInstance};
use crate::program_index::ProgramIndex;

/// Emit the dependency graph as a Graphviz DOT string.
pub fn emit_dot(
    graph: &DependencyGraph,
    index: &ProgramIndex<'_>,
    cycles: Option<&CycleReport>,
) -> String {
    let mut buf = String::new();
    let _ = write_dot(&mut buf, graph, index, cycles);
    buf
}

fn write_dot(
    buf: &mut String,
    graph: &DependencyGraph,
    index: &ProgramIndex<'_>,
    cycles: Option<&CycleReport>,
) -> fmt::Result {
    writeln!(buf, "digraph reactors {{")?;
    writeln!(buf, "    rankdir=LR;")?;
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];")?;
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];")?;

    let mut by_reactor: HashMap<ReactorId, Vec<&Node>> = HashMap::new();
    for node in graph.nodes() {
        by_reactor.entry(node.reactor).or_default().push(node);
    }
    writeln!(buf)?;
    write_cluster(buf, &index.program().main, index, &by_reactor, "    ")?;

    let red: HashSet<(NodeId, NodeId)> = cycles.map(CycleReport::cycle_edges).unwrap_or_default();
    writeln!(buf)?;
    for edge in graph.edges() {
        let mut attrs: Vec<String> = Vec::new();
        match edge.kind {
            EdgeKind::Order => attrs.push("style=dotted".into()),
            EdgeKind::Connection {
                broken: Some(DependencyBreak::Delay(delay)),
                ..
            } => {
                attrs.push("style=dashed".into());
                attrs.push(format!("label=\"after {}\"", delay));
            }
            EdgeKind::Connection {
                broken: Some(DependencyBreak::Physical),
                ..
            } => {
                attrs.push("style=dashed".into());
                attrs.push("label=\"physical\"".into());
            }
            _ => {}
        }
        if red.contains(&(edge.source, edge.target)) {
            attrs.push("color=red".into());
            attrs.push("penwidth=2".into());
        }
        if attrs.is_empty() {
            writeln!(buf, "    n{} -> n{};", edge.source.0, edge.target.0)?;
        } else {
            writeln!(
                buf,
                "    n{} -> n{} [{}];",
                edge.source.0,
                edge.target.0,
                attrs.join(", ")
            )?;
        }
    }
    writeln!(buf, "}}")
}

fn write_cluster(
    buf: &mut String,
    reactor: &ReactorInstance,
    index: &ProgramIndex<'_>,
    by_reactor: &HashMap<ReactorId, Vec<&Node>>,
    indent: &str,
) -> fmt::Result {
    writeln!(buf, "{indent}subgraph cluster_r{} {{", reactor.id.0)?;
    writeln!(buf, "{indent}    label=\"{}\";", escape(index.reactor_name(reactor.id)))?;
    writeln!(buf, "{indent}    style=rounded;")?;
    writeln!(buf, "{indent}    color=gray50;")?;
    for node in by_reactor.get(&reactor.id).into_iter().flatten() {
        writeln!(buf, "{indent}    n{} [{}];", node.id.0, node_attrs(node, index))?;
    }
    let inner = format!("{indent}    ");
    for child in &reactor.children {
        write_cluster(buf, child, index, by_reactor, &inner)?;
    }
    writeln!(buf, "{indent}}}")
}

fn node_attrs(node: &Node, index: &ProgramIndex<'_>) -> String {
    let short = node.name.rsplit('.').next().unwrap_or(&node.name);
    match node.kind {
        NodeKind::Reaction(_) => format!("label=\"{}\", shape=box", escape(short)),
        NodeKind::Port(port) => {
            let shape = match index.port(port).map(|p| p.port.direction) {
                Some(PortDirection::Input) => "invhouse",
                _ => "house",
            };
            format!("label=\"{}\", shape={}", escape(short), shape)
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ── Tests ───────────────────────────────────────────────────────────────────
