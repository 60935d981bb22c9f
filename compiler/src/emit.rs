// emit.rs: Target emitter capability interface
//
// Code generators consume the priority table and the control-reaction
// specs through `TargetEmitter`. The analysis never inspects which emitter
// it is talking to; the implementation is picked from configuration by
// `emitter_for`.
//
// Preconditions: the context's index/partition are the ones the artifacts
//                were computed against.
// Postconditions: `finish` returns the complete rendered output.
// Failure modes: none.
// Side effects: none.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::boundary::{ControlKind, ControlReactionSpec, FederatePartition, Placement, Side};
use crate::priority::{Priority, PriorityTable};
use crate::program_index::ProgramIndex;
use crate::id::ReactionId;

/// Which emitter to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitTarget {
    #[default]
    Text,
    Json,
}

/// Names for the ids appearing in emitted artifacts.
pub struct EmitContext<'a, 'p> {
    pub index: &'a ProgramIndex<'p>,
    pub partition: &'a FederatePartition,
}

/// Per-target rendering of analysis artifacts.
pub trait TargetEmitter {
    fn emit_priority_table(&mut self, ctx: &EmitContext<'_, '_>, table: &PriorityTable);
    fn emit_control_reaction(&mut self, ctx: &EmitContext<'_, '_>, spec: &ControlReactionSpec);
    fn finish(self: Box<Self>) -> String;
}

pub fn emitter_for(target: EmitTarget) -> Box<dyn TargetEmitter> {
    match target {
        EmitTarget::Text => Box::new(TextEmitter::default()),
        EmitTarget::Json => Box::new(JsonEmitter::default()),
    }
}

/// Drive `emitter` over a table and a control list.
pub fn emit_all(
    mut emitter: Box<dyn TargetEmitter>,
    ctx: &EmitContext<'_, '_>,
    table: Option<&PriorityTable>,
    controls: &[ControlReactionSpec],
) -> String {
    if let Some(table) = table {
        emitter.emit_priority_table(ctx, table);
    }
    for spec in controls {
        emitter.emit_control_reaction(ctx, spec);
    }
    emitter.finish()
}

fn placement_text(ctx: &EmitContext<'_, '_>, placement: Placement) -> String {
    match placement {
        Placement::Before(r) => format!("before {}", ctx.index.reaction_name(r)),
        Placement::After(r) => format!("after {}", ctx.index.reaction_name(r)),
        Placement::Unanchored => "unanchored".to_string(),
    }
}

// ── Text ────────────────────────────────────────────────────────────────────

/// Human-readable listing, one line per reaction or control reaction.
#[derive(Debug, Default)]
pub struct TextEmitter {
    out: String,
    controls_started: bool,
}

impl TargetEmitter for TextEmitter {
    fn emit_priority_table(&mut self, ctx: &EmitContext<'_, '_>, table: &PriorityTable) {
        let _ = writeln!(self.out, "priorities ({} reactions):", table.len());
        for (reaction, Priority { rank, level }) in table.iter() {
            let _ = writeln!(
                self.out,
                "  {:>3}  L{}  {}",
                rank,
                level,
                ctx.index.reaction_name(reaction)
            );
        }
    }

    fn emit_control_reaction(&mut self, ctx: &EmitContext<'_, '_>, spec: &ControlReactionSpec) {
        if !self.controls_started {
            self.controls_started = true;
            let _ = writeln!(self.out, "control reactions:");
        }
        let (side, port_role) = match spec.side {
            Side::Sender => ("send", "from"),
            Side::Receiver => ("recv", "into"),
        };
        let kind = match spec.kind {
            ControlKind::EmitAbsent => "emit-absent".to_string(),
            ControlKind::WaitBounded => match spec.bound {
                Some(bound) => format!("wait-bounded {}", bound),
                None => "wait-bounded unbounded".to_string(),
            },
        };
        let _ = writeln!(
            self.out,
            "  [{}] {} {} {} {} ({})",
            ctx.partition.federate_name(spec.federate),
            side,
            kind,
            port_role,
            ctx.index.port_name(spec.port),
            placement_text(ctx, spec.placement)
        );
    }

    fn finish(self: Box<Self>) -> String {
        self.out
    }
}

// ── JSON ────────────────────────────────────────────────────────────────────

/// Machine-readable document `{ "priorities": [...], "controls": [...] }`.
#[derive(Debug, Default)]
pub struct JsonEmitter {
    priorities: Vec<Value>,
    controls: Vec<Value>,
}

fn reaction_ref(ctx: &EmitContext<'_, '_>, reaction: ReactionId) -> Value {
    json!({ "id": reaction.0, "name": ctx.index.reaction_name(reaction) })
}

impl TargetEmitter for JsonEmitter {
    fn emit_priority_table(&mut self, ctx: &EmitContext<'_, '_>, table: &PriorityTable) {
        self.priorities.extend(table.iter().map(|(reaction, p)| {
            json!({
                "reaction": reaction_ref(ctx, reaction),
                "rank": p.rank,
                "level": p.level,
            })
        }));
    }

    fn emit_control_reaction(&mut self, ctx: &EmitContext<'_, '_>, spec: &ControlReactionSpec) {
        let placement = match spec.placement {
            Placement::Before(r) => json!({ "before": reaction_ref(ctx, r) }),
            Placement::After(r) => json!({ "after": reaction_ref(ctx, r) }),
            Placement::Unanchored => Value::Null,
        };
        self.controls.push(json!({
            "connection": spec.connection.0,
            "edge": spec.edge,
            "side": spec.side,
            "kind": spec.kind,
            "bound": spec.bound,
            "federate": ctx.partition.federate_name(spec.federate),
            "port": ctx.index.port_name(spec.port),
            "placement": placement,
        }));
    }

    fn finish(self: Box<Self>) -> String {
        let doc = json!({
            "priorities": self.priorities,
            "controls": self.controls,
        });
        format!("{:#}", doc)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{classify_boundaries, BoundaryPolicy};
    use crate::graph::build_graph;
    use crate::model::ProgramBuilder;
    use crate::priority::assign_priorities;
    use crate::time::{TimeUnit, TimeValue};

    fn render(target: EmitTarget) -> String {
        let mut b = ProgramBuilder::new("main");
        let x = b.reactor(b.main(), "x");
        let y = b.reactor(b.main(), "y");
        let out = b.output(x, "out");
        let inp = b.input(y, "in");
        b.reaction(x).timer("t").effect(out).build();
        b.reaction(y).trigger(inp).build();
        b.connect(b.main(), out, inp);
        let program = b.finish();

        let index = ProgramIndex::build(&program).unwrap();
        let graph = build_graph(&index).unwrap();
        let table = assign_priorities(&graph).unwrap();
        let mut partition = FederatePartition::single();
        partition.assign(x, "fx");
        partition.assign(y, "fy");
        let policy = BoundaryPolicy {
            network_latency: Some(TimeValue::from_parts(2, TimeUnit::Msec).unwrap()),
            ..BoundaryPolicy::default()
        };
        let result = classify_boundaries(&index, &graph, &table, &partition, &policy).unwrap();
        let ctx = EmitContext {
            index: &index,
            partition: &partition,
        };
        emit_all(emitter_for(target), &ctx, Some(&table), &result.report.controls)
    }

    #[test]
    fn text_lists_priorities_then_controls() {
        let text = render(EmitTarget::Text);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "priorities (2 reactions):");
        assert_eq!(lines[1], "    0  L0  main.x.reaction_1");
        assert_eq!(lines[2], "    1  L1  main.y.reaction_1");
        assert_eq!(lines[3], "control reactions:");
        assert_eq!(
            lines[4],
            "  [fx] send emit-absent from main.x.out (after main.x.reaction_1)"
        );
        assert_eq!(
            lines[5],
            "  [fy] recv wait-bounded 2 msec into main.y.in (before main.y.reaction_1)"
        );
    }

    #[test]
    fn json_document_shape() {
        let text = render(EmitTarget::Json);
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["priorities"].as_array().unwrap().len(), 2);
        assert_eq!(doc["priorities"][1]["reaction"]["name"], "main.y.reaction_1");
        let controls = doc["controls"].as_array().unwrap();
        assert_eq!(controls.len(), 2);
        assert_eq!(controls[0]["side"], "sender");
        assert_eq!(controls[0]["kind"], "emit_absent");
        assert_eq!(controls[1]["bound"], "2 msec");
        assert_eq!(controls[1]["federate"], "fy");
        assert_eq!(controls[1]["placement"]["before"]["id"], 1);
    }

    #[test]
    fn text_without_controls_has_no_control_header() {
        let program = ProgramBuilder::new("main").finish();
        let index = ProgramIndex::build(&program).unwrap();
        let graph = build_graph(&index).unwrap();
        let table = assign_priorities(&graph).unwrap();
        let partition = FederatePartition::single();
        let ctx = EmitContext {
            index: &index,
            partition: &partition,
        };
        let text = emit_all(emitter_for(EmitTarget::Text), &ctx, Some(&table), &[]);
        assert_eq!(text, "priorities (0 reactions):\n");
    }
}
