// End-to-end analysis behavior over hand-built reactor programs.
//
// Each test builds a Program with ProgramBuilder and runs the full pass
// pipeline through `rca::pipeline`.

use rca::boundary::{ControlKind, Coordination, FederatePartition, Placement, Side};
use rca::diag::{codes, DiagKind};
use rca::graph::EdgeKind;
use rca::id::{ModeId, PortId, ReactionId};
use rca::model::{Program, ProgramBuilder};
use rca::pass::{PassId, StageCert};
use rca::pipeline::{analyze, run_analysis, AnalysisOptions, AnalysisState};
use rca::time::{TimeUnit, TimeValue};

fn ms(n: u64) -> TimeValue {
    TimeValue::from_parts(n, TimeUnit::Msec).unwrap()
}

struct PingPong {
    program: Program,
    a: ReactionId,
    b: ReactionId,
}

/// a.out -> b.in and b.out -> a.in; `back` configures the second connection.
fn ping_pong(back_delay: Option<TimeValue>, back_physical: bool) -> PingPong {
    let mut b = ProgramBuilder::new("main");
    let ra = b.reactor(b.main(), "a");
    let rb = b.reactor(b.main(), "b");
    let a_in = b.input(ra, "in");
    let a_out = b.output(ra, "out");
    let b_in = b.input(rb, "in");
    let b_out = b.output(rb, "out");
    let a = b.reaction(ra).trigger(a_in).effect(a_out).build();
    let rb_reaction = b.reaction(rb).trigger(b_in).effect(b_out).build();
    b.connect(b.main(), a_out, b_in);
    b.connect_with(b.main(), b_out, a_in, back_delay, back_physical);
    PingPong {
        program: b.finish(),
        a,
        b: rb_reaction,
    }
}

struct Pipeline {
    program: Program,
    producer: ReactionId,
    consumer: ReactionId,
    out: PortId,
    inp: PortId,
}

/// producer.out -> consumer.in, optionally delayed or physical.
fn pipeline(delay: Option<TimeValue>, physical: bool) -> Pipeline {
    let mut b = ProgramBuilder::new("main");
    let p = b.reactor(b.main(), "producer");
    let c = b.reactor(b.main(), "consumer");
    let out = b.output(p, "out");
    let inp = b.input(c, "in");
    let producer = b.reaction(p).timer("tick").effect(out).build();
    let consumer = b.reaction(c).trigger(inp).build();
    b.connect_with(b.main(), out, inp, delay, physical);
    Pipeline {
        program: b.finish(),
        producer,
        consumer,
        out,
        inp,
    }
}

fn split(producer_unit: &str, consumer_unit: &str) -> FederatePartition {
    let mut partition = FederatePartition::single();
    partition.assign_path("main.producer", producer_unit);
    partition.assign_path("main.consumer", consumer_unit);
    partition
}

// ── Cycles ──────────────────────────────────────────────────────────────────

#[test]
fn zero_delay_round_trip_is_a_cycle_without_priorities() {
    let pp = ping_pong(None, false);
    let output = analyze(&pp.program, FederatePartition::single(), AnalysisOptions::default());

    assert_eq!(output.failing_pass, Some(PassId::DetectCycles));
    assert!(output.priorities.is_none());
    assert!(output.boundaries.is_none());
    let cycles = output.cycles.expect("cycle report is kept for diagnostics");
    assert_eq!(cycles.cycles.len(), 1);
    assert_eq!(cycles.cycles[0].members.len(), 6);

    let diag = &output.diagnostics[0];
    assert_eq!(diag.code, Some(codes::E0100));
    assert_eq!(diag.kind, DiagKind::GraphCycle);
    assert_eq!(diag.involved.len(), 6);
}

#[test]
fn delay_on_one_leg_breaks_the_cycle() {
    let pp = ping_pong(Some(ms(1)), false);
    let output = analyze(&pp.program, FederatePartition::single(), AnalysisOptions::default());

    assert!(output.failing_pass.is_none());
    assert!(output.diagnostics.is_empty());
    let table = output.priorities.expect("acyclic program is ranked");
    assert_eq!(table.len(), 2);
    assert!(table.rank(pp.a) < table.rank(pp.b));
}

#[test]
fn after_zero_on_one_leg_breaks_the_cycle() {
    let pp = ping_pong(Some(TimeValue::ZERO), false);
    let output = analyze(&pp.program, FederatePartition::single(), AnalysisOptions::default());

    assert!(output.failing_pass.is_none());
    assert!(output.diagnostics.is_empty());
    let table = output.priorities.expect("microstep delay leaves the program acyclic");
    assert!(table.rank(pp.a).unwrap() < table.rank(pp.b).unwrap());
}

#[test]
fn port_only_loop_is_a_cycle() {
    // w forwards in to out with a connection, and main feeds out back to in.
    let mut b = ProgramBuilder::new("main");
    let w = b.reactor(b.main(), "w");
    let inp = b.input(w, "in");
    let out = b.output(w, "out");
    b.connect(w, inp, out);
    b.connect(b.main(), out, inp);
    let output = analyze(&b.finish(), FederatePartition::single(), AnalysisOptions::default());

    assert_eq!(output.failing_pass, Some(PassId::DetectCycles));
    let cycles = output.cycles.unwrap();
    assert_eq!(cycles.cycles.len(), 1);
    assert_eq!(cycles.cycles[0].path_names, vec!["main.w.in", "main.w.out", "main.w.in"]);
    assert_eq!(output.diagnostics[0].code, Some(codes::E0100));
}

#[test]
fn physical_leg_breaks_the_cycle_even_without_delay() {
    let pp = ping_pong(None, true);
    let output = analyze(&pp.program, FederatePartition::single(), AnalysisOptions::default());
    assert!(output.failing_pass.is_none());

    let graph = output.graph.expect("graph is built");
    let physical: Vec<_> = graph
        .edges()
        .iter()
        .filter(|e| matches!(e.kind, EdgeKind::Connection { .. }) && !e.is_zero_delay())
        .collect();
    assert_eq!(physical.len(), 1);
    assert_eq!(graph.zero_delay_edges().filter(|e| e.id == physical[0].id).count(), 0);
}

#[test]
fn reaction_reading_its_own_output_is_a_self_cycle() {
    let mut b = ProgramBuilder::new("main");
    let r = b.reactor(b.main(), "echo");
    let out = b.output(r, "out");
    b.reaction(r).source(out).effect(out).build();
    let program = b.finish();

    let output = analyze(&program, FederatePartition::single(), AnalysisOptions::default());
    assert_eq!(output.failing_pass, Some(PassId::DetectCycles));
    assert!(output.priorities.is_none());
}

// ── Modes ───────────────────────────────────────────────────────────────────

#[test]
fn reactions_in_different_modes_keep_declaration_order() {
    let mut b = ProgramBuilder::new("main");
    let src = b.reactor(b.main(), "src");
    let src_out = b.output(src, "out");
    b.reaction(src).timer("t").effect(src_out).build();

    let m = b.reactor(b.main(), "modal");
    let inp = b.input(m, "in");
    let out = b.output(m, "out");
    let idle = b.mode(m, "idle", true);
    let busy = b.mode(m, "busy", false);
    let first = b
        .reaction(m)
        .trigger(inp)
        .schedules("wake")
        .in_mode(idle)
        .build();
    let second = b.reaction(m).action("wake").effect(out).in_mode(busy).build();
    b.connect(b.main(), src_out, inp);

    let output = analyze(&b.finish(), FederatePartition::single(), AnalysisOptions::default());
    assert!(output.failing_pass.is_none());

    let graph = output.graph.unwrap();
    let n1 = graph.reaction_node(first).unwrap();
    let n2 = graph.reaction_node(second).unwrap();
    assert!(graph
        .out_edges(n1)
        .any(|e| e.target == n2 && e.kind == EdgeKind::Order));

    let table = output.priorities.unwrap();
    assert!(table.rank(first).unwrap() < table.rank(second).unwrap());
}

#[test]
fn child_in_an_inactive_mode_still_closes_a_cycle() {
    let mut b = ProgramBuilder::new("main");
    let m = b.reactor(b.main(), "modal");
    let _running = b.mode(m, "running", true);
    let paused = b.mode(m, "paused", false);
    let w = b.reactor(m, "w");
    b.place_in_mode(w, paused);
    let inp = b.input(w, "in");
    let out = b.output(w, "out");
    b.reaction(w).trigger(inp).effect(out).build();
    b.connect(m, out, inp);

    let output = analyze(&b.finish(), FederatePartition::single(), AnalysisOptions::default());
    assert_eq!(output.failing_pass, Some(PassId::DetectCycles));
    assert_eq!(output.cycles.unwrap().cycles.len(), 1);
}

#[test]
fn reaction_in_an_undeclared_mode_is_a_malformed_model() {
    let mut b = ProgramBuilder::new("main");
    let m = b.reactor(b.main(), "modal");
    let other = b.reactor(b.main(), "other");
    b.mode(m, "only", true);
    let foreign = b.mode(other, "elsewhere", true);
    b.reaction(m).startup().in_mode(foreign).build();
    b.reaction(m).timer("t").in_mode(ModeId(99)).build();

    let output = analyze(&b.finish(), FederatePartition::single(), AnalysisOptions::default());
    assert_eq!(output.failing_pass, Some(PassId::BuildGraph));
    assert!(output.graph.is_none());

    let diag = &output.diagnostics[0];
    assert_eq!(diag.code, Some(codes::E0901));
    assert_eq!(diag.kind, DiagKind::MalformedModel);
    assert_eq!(diag.cause_chain.len(), 2);
    assert!(diag.cause_chain[0].message.contains(&format!("mode {}", foreign.0)));
    assert!(diag.cause_chain[1].message.contains("mode 99"));
}

#[test]
fn child_in_an_undeclared_mode_is_a_malformed_model() {
    let mut b = ProgramBuilder::new("main");
    let m = b.reactor(b.main(), "modal");
    let w = b.reactor(m, "w");
    b.place_in_mode(w, ModeId(5));

    let output = analyze(&b.finish(), FederatePartition::single(), AnalysisOptions::default());
    assert_eq!(output.failing_pass, Some(PassId::BuildGraph));
    let diag = &output.diagnostics[0];
    assert_eq!(diag.code, Some(codes::E0901));
    assert_eq!(
        diag.cause_chain[0].message,
        "reactor main.modal.w placed in mode 5 not declared by main.modal"
    );
}

// ── Priorities ──────────────────────────────────────────────────────────────

#[test]
fn ordered_reactions_keep_declaration_order_across_reactors() {
    let mut b = ProgramBuilder::new("main");
    let r = b.reactor(b.main(), "worker");
    let other = b.reactor(b.main(), "other");
    let inp = b.input(r, "in");
    let out = b.output(other, "out");
    let first = b.reaction(r).startup().build();
    let second = b.reaction(r).trigger(inp).build();
    let third = b.reaction(r).timer("t").build();
    b.reaction(other).startup().effect(out).build();
    b.connect(b.main(), out, inp);
    let program = b.finish();

    let mut state =
        AnalysisState::new(&program, FederatePartition::single(), AnalysisOptions::default());
    run_analysis(&mut state, PassId::AssignPriorities, |_, _| {}).unwrap();
    let table = state.priorities.as_ref().unwrap();
    assert!(table.rank(first) < table.rank(second));
    assert!(table.rank(second) < table.rank(third));
    assert!(state.priority_cert.as_ref().unwrap().all_pass());
}

#[test]
fn unordered_reaction_is_free_of_sibling_order() {
    let mut b = ProgramBuilder::new("main");
    let r = b.reactor(b.main(), "worker");
    let up = b.reactor(b.main(), "up");
    let inp = b.input(r, "in");
    let out = b.output(up, "out");
    b.reaction(up).timer("t").effect(out).build();
    let ordered = b.reaction(r).trigger(inp).build();
    let unordered = b.reaction(r).startup().unordered().build();
    b.connect(b.main(), out, inp);
    let program = b.finish();

    let output = analyze(&program, FederatePartition::single(), AnalysisOptions::default());
    let table = output.priorities.unwrap();
    // The unordered reaction has no predecessor and is never forced after
    // the ordered one.
    assert_eq!(table.level(unordered), Some(0));
    assert_eq!(table.level(ordered), Some(1));
}

#[test]
fn levels_count_reactions_on_the_longest_chain() {
    let p = pipeline(None, false);
    let output = analyze(&p.program, FederatePartition::single(), AnalysisOptions::default());
    let table = output.priorities.unwrap();
    assert_eq!(table.level(p.producer), Some(0));
    assert_eq!(table.level(p.consumer), Some(1));
    assert_eq!(table.max_level(), Some(1));
}

#[test]
fn delayed_connection_does_not_order_its_endpoints() {
    let p = pipeline(Some(ms(2)), false);
    let output = analyze(&p.program, FederatePartition::single(), AnalysisOptions::default());
    let table = output.priorities.unwrap();
    assert_eq!(table.level(p.consumer), Some(0));
}

#[test]
fn composite_ports_are_followed_through_hierarchy() {
    // main { src.out -> box.in }, box { box.in -> inner.in }
    let mut b = ProgramBuilder::new("main");
    let src = b.reactor(b.main(), "src");
    let boxed = b.reactor(b.main(), "box");
    let inner = b.reactor(boxed, "inner");
    let src_out = b.output(src, "out");
    let box_in = b.input(boxed, "in");
    let inner_in = b.input(inner, "in");
    let producer = b.reaction(src).startup().effect(src_out).build();
    let consumer = b.reaction(inner).trigger(inner_in).build();
    b.connect(b.main(), src_out, box_in);
    b.connect(boxed, box_in, inner_in);
    let program = b.finish();

    let output = analyze(&program, FederatePartition::single(), AnalysisOptions::default());
    let table = output.priorities.unwrap();
    assert!(table.rank(producer) < table.rank(consumer));
    assert_eq!(table.level(consumer), Some(1));
}

// ── Boundaries ──────────────────────────────────────────────────────────────

#[test]
fn federated_zero_delay_edge_gets_one_spec_per_side() {
    let p = pipeline(None, false);
    let options = AnalysisOptions {
        network_latency: Some(ms(3)),
        ..AnalysisOptions::default()
    };
    let output = analyze(&p.program, split("x", "y"), options);
    assert!(!output.has_errors());

    let report = output.boundaries.unwrap();
    assert_eq!(report.edges.len(), 1);
    assert_eq!(report.edges[0].bound, Some(ms(3)));
    assert_eq!(report.controls.len(), 2);

    let sender = &report.controls[0];
    assert_eq!(sender.side, Side::Sender);
    assert_eq!(sender.kind, ControlKind::EmitAbsent);
    assert_eq!(sender.port, p.out);
    assert_eq!(sender.placement, Placement::After(p.producer));

    let receiver = &report.controls[1];
    assert_eq!(receiver.side, Side::Receiver);
    assert_eq!(receiver.kind, ControlKind::WaitBounded);
    assert_eq!(receiver.port, p.inp);
    assert_eq!(receiver.bound, Some(ms(3)));
    assert_eq!(receiver.placement, Placement::Before(p.consumer));
}

#[test]
fn same_graph_without_federation_has_no_specs() {
    let p = pipeline(None, false);
    let output = analyze(&p.program, FederatePartition::single(), AnalysisOptions::default());
    let report = output.boundaries.unwrap();
    assert!(report.edges.is_empty());
    assert!(report.controls.is_empty());
}

#[test]
fn reactors_in_one_named_federate_are_not_split() {
    let p = pipeline(None, false);
    let output = analyze(&p.program, split("x", "x"), AnalysisOptions::default());
    assert!(output.boundaries.unwrap().controls.is_empty());
}

#[test]
fn physical_boundary_edge_is_classified_and_unrelaxed() {
    let p = pipeline(Some(ms(4)), true);
    let options = AnalysisOptions {
        network_latency: Some(ms(10)),
        ..AnalysisOptions::default()
    };
    let output = analyze(&p.program, split("x", "y"), options);
    let graph = output.graph.unwrap();
    assert_eq!(graph.zero_delay_edges().count(), 2);

    let report = output.boundaries.unwrap();
    assert_eq!(report.controls.len(), 2);
    assert!(report.edges[0].physical);
    assert_eq!(report.edges[0].bound, Some(ms(10)));
}

#[test]
fn logical_delay_relaxes_the_bound() {
    let p = pipeline(Some(ms(4)), false);
    let options = AnalysisOptions {
        network_latency: Some(ms(10)),
        ..AnalysisOptions::default()
    };
    let output = analyze(&p.program, split("x", "y"), options);
    assert_eq!(output.boundaries.unwrap().edges[0].bound, Some(ms(6)));
}

#[test]
fn delay_absorbing_the_bound_warns() {
    let p = pipeline(Some(ms(20)), false);
    let options = AnalysisOptions {
        network_latency: Some(ms(10)),
        ..AnalysisOptions::default()
    };
    let output = analyze(&p.program, split("x", "y"), options);
    assert!(!output.has_errors());
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].code, Some(codes::W0201));
    assert_eq!(output.boundaries.unwrap().edges[0].bound, Some(TimeValue::ZERO));
}

#[test]
fn unbounded_edge_is_left_to_the_centralized_coordinator() {
    let p = pipeline(None, false);
    let output = analyze(&p.program, split("x", "y"), AnalysisOptions::default());
    assert!(!output.has_errors());
    assert!(!output.federated_output_blocked);
    assert_eq!(output.diagnostics[0].code, Some(codes::W0200));
    let report = output.boundaries.unwrap();
    assert_eq!(report.controls[1].bound, None);
    assert!(report.unresolved.is_empty());
}

#[test]
fn unbounded_edge_under_decentralized_coordination_blocks_federated_output() {
    let p = pipeline(None, false);
    let options = AnalysisOptions {
        coordination: Coordination::Decentralized,
        ..AnalysisOptions::default()
    };
    let output = analyze(&p.program, split("x", "y"), options);

    assert!(output.failing_pass.is_none());
    assert!(output.federated_output_blocked);
    assert!(output.priorities.is_some());
    assert_eq!(output.diagnostics[0].code, Some(codes::E0200));
    let report = output.boundaries.unwrap();
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.controls.len(), 2);
}

#[test]
fn declared_stp_offset_bounds_a_decentralized_edge() {
    let mut b = ProgramBuilder::new("main");
    let p = b.reactor(b.main(), "producer");
    let c = b.reactor(b.main(), "consumer");
    let out = b.output(p, "out");
    let inp = b.input(c, "in");
    b.reaction(p).timer("tick").effect(out).build();
    b.reaction(c).trigger(inp).stp(ms(7)).build();
    b.connect(b.main(), out, inp);
    let program = b.finish();

    let options = AnalysisOptions {
        coordination: Coordination::Decentralized,
        ..AnalysisOptions::default()
    };
    let output = analyze(&program, split("x", "y"), options);
    assert!(!output.federated_output_blocked);
    assert_eq!(output.boundaries.unwrap().edges[0].bound, Some(ms(7)));
}

#[test]
fn delayed_return_leg_keeps_federates_off_a_zero_delay_cycle() {
    let pp = ping_pong(Some(ms(1)), false);
    let mut partition = FederatePartition::single();
    partition.assign_path("main.a", "left");
    partition.assign_path("main.b", "right");
    let output = analyze(&pp.program, partition, AnalysisOptions::default());

    assert!(!output.federated_output_blocked);
    assert!(output
        .diagnostics
        .iter()
        .all(|d| d.code == Some(codes::W0200)));
    assert_eq!(output.boundaries.as_ref().unwrap().controls.len(), 4);
}

#[test]
fn unbounded_zero_delay_wait_in_both_directions_is_unresolvable() {
    // left.out -> right.in and right.out -> left.in, both zero-delay. The
    // reaction graph stays acyclic because left reads and writes in
    // separate reactions.
    let mut b = ProgramBuilder::new("main");
    let left = b.reactor(b.main(), "left");
    let right = b.reactor(b.main(), "right");
    let l_in = b.input(left, "in");
    let l_out = b.output(left, "out");
    let r_in = b.input(right, "in");
    let r_out = b.output(right, "out");
    b.reaction(left).timer("t").effect(l_out).build();
    b.reaction(left).trigger(l_in).build();
    b.reaction(right).trigger(r_in).effect(r_out).build();
    b.connect(b.main(), l_out, r_in);
    b.connect(b.main(), r_out, l_in);
    let program = b.finish();

    let mut partition = FederatePartition::single();
    partition.assign_path("main.left", "left");
    partition.assign_path("main.right", "right");
    let output = analyze(&program, partition, AnalysisOptions::default());

    assert!(output.failing_pass.is_none());
    assert!(output.federated_output_blocked);
    assert_eq!(
        output
            .diagnostics
            .iter()
            .filter(|d| d.code == Some(codes::E0200))
            .count(),
        2
    );
    assert_eq!(output.boundaries.unwrap().unresolved.len(), 2);
}

#[test]
fn configured_latency_resolves_the_federate_cycle() {
    let mut b = ProgramBuilder::new("main");
    let left = b.reactor(b.main(), "left");
    let right = b.reactor(b.main(), "right");
    let l_in = b.input(left, "in");
    let l_out = b.output(left, "out");
    let r_in = b.input(right, "in");
    let r_out = b.output(right, "out");
    b.reaction(left).timer("t").effect(l_out).build();
    b.reaction(left).trigger(l_in).build();
    b.reaction(right).trigger(r_in).effect(r_out).build();
    b.connect(b.main(), l_out, r_in);
    b.connect(b.main(), r_out, l_in);
    let program = b.finish();

    let mut partition = FederatePartition::single();
    partition.assign_path("main.left", "left");
    partition.assign_path("main.right", "right");
    let options = AnalysisOptions {
        network_latency: Some(ms(1)),
        ..AnalysisOptions::default()
    };
    let output = analyze(&program, partition, options);
    assert!(!output.federated_output_blocked);
    assert!(output.diagnostics.is_empty());
}

#[test]
fn rerunning_the_analysis_is_byte_identical() {
    let p = pipeline(Some(ms(2)), false);
    let options = AnalysisOptions {
        network_latency: Some(ms(5)),
        ..AnalysisOptions::default()
    };
    let first = analyze(&p.program, split("x", "y"), options);
    let second = analyze(&p.program, split("x", "y"), options);
    assert_eq!(first.canonical_output(), second.canonical_output());
    assert_eq!(first.provenance, second.provenance);
}
