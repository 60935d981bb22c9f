// pipeline.rs: Analysis state and pass orchestration
//
// Holds every pass artifact and runs the minimal set of passes for a given
// terminal PassId.
//
// Preconditions: the program and partition are set before calling run_analysis.
// Postconditions: artifacts for all required passes are populated, or
//                 has_error is set and the failing pass is reported.
// Failure modes: any pass emitting error-level diagnostics, except boundary
//                timing errors, which only block federated output.
// Side effects: calls on_pass_complete after each pass; emits tracing spans.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info_span, warn};

use crate::boundary::{
    classify_boundaries, BoundaryPolicy, BoundaryReport, Coordination, FederatePartition,
};
use crate::cycles::{detect_cycles, CycleReport};
use crate::diag::{codes, has_errors, DiagKind, Diagnostic};
use crate::error::AnalysisError;
use crate::graph::{build_graph, DependencyGraph};
use crate::model::Program;
use crate::pass::{descriptor, required_passes, PassId, StageCert};
use crate::priority::{assign_priorities, verify_priorities, PriorityCert, PriorityTable};
use crate::program_index::ProgramIndex;
use crate::time::TimeValue;

// ── Options ────────────────────────────────────────────────────────────────

/// Deployment-policy inputs and how far to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default)]
    pub coordination: Coordination,
    #[serde(default)]
    pub network_latency: Option<TimeValue>,
    #[serde(default)]
    pub default_stp: Option<TimeValue>,
    #[serde(default = "default_terminal")]
    pub terminal: PassId,
}

fn default_terminal() -> PassId {
    PassId::ClassifyBoundaries
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            coordination: Coordination::default(),
            network_latency: None,
            default_stp: None,
            terminal: default_terminal(),
        }
    }
}

impl AnalysisOptions {
    pub fn policy(&self) -> BoundaryPolicy {
        BoundaryPolicy {
            coordination: self.coordination,
            network_latency: self.network_latency,
            default_stp: self.default_stp,
        }
    }
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducibility checks and cache keys.
///
/// `model_hash`: SHA-256 of `Program::canonical_json()`.
/// `output_hash`: SHA-256 of the canonical priorities + control specs, when
/// the analysis got far enough to produce them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub model_hash: [u8; 32],
    pub output_hash: Option<[u8; 32]>,
    pub analyzer_version: &'static str,
}

impl Provenance {
    pub fn model_hash_hex(&self) -> String {
        bytes_to_hex(&self.model_hash)
    }

    pub fn output_hash_hex(&self) -> Option<String> {
        self.output_hash.as_ref().map(bytes_to_hex)
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let doc = json!({
            "model_hash": self.model_hash_hex(),
            "output_hash": self.output_hash_hex(),
            "manifest_schema_version": 1,
            "analyzer_version": self.analyzer_version,
        });
        let mut text = serde_json::to_string_pretty(&doc)?;
        text.push('\n');
        Ok(text)
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(text: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from the model and, if available, the canonical output.
pub fn compute_provenance(
    program: &Program,
    canonical_output: Option<&str>,
) -> Result<Provenance, serde_json::Error> {
    Ok(Provenance {
        model_hash: sha256(&program.canonical_json()?),
        output_hash: canonical_output.map(sha256),
        analyzer_version: env!("CARGO_PKG_VERSION"),
    })
}

/// Compact, id-based JSON of priorities and control specs.
pub fn canonical_output(
    priorities: &PriorityTable,
    boundaries: Option<&BoundaryReport>,
) -> Result<String, serde_json::Error> {
    let ranks: Vec<_> = priorities
        .iter()
        .map(|(reaction, p)| json!([reaction.0, p.rank, p.level]))
        .collect();
    let controls = boundaries.map(|b| b.controls.as_slice()).unwrap_or(&[]);
    let doc = json!({ "priorities": ranks, "controls": controls });
    serde_json::to_string(&doc)
}

// ── State ──────────────────────────────────────────────────────────────────

/// All analysis artifacts and accumulated diagnostics.
pub struct AnalysisState<'p> {
    pub program: &'p Program,
    pub partition: FederatePartition,
    pub options: AnalysisOptions,
    pub index: Option<ProgramIndex<'p>>,
    pub graph: Option<DependencyGraph>,
    pub cycles: Option<CycleReport>,
    pub priorities: Option<PriorityTable>,
    pub priority_cert: Option<PriorityCert>,
    pub boundaries: Option<BoundaryReport>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    /// Boundary timing errors: the analysis completed but federated code
    /// generation must not proceed.
    pub federated_output_blocked: bool,
    pub provenance: Option<Provenance>,
}

impl<'p> AnalysisState<'p> {
    pub fn new(
        program: &'p Program,
        partition: FederatePartition,
        options: AnalysisOptions,
    ) -> Self {
        AnalysisState {
            program,
            partition,
            options,
            index: None,
            graph: None,
            cycles: None,
            priorities: None,
            priority_cert: None,
            boundaries: None,
            diagnostics: Vec::new(),
            has_error: false,
            federated_output_blocked: false,
            provenance: None,
        }
    }

    fn artifacts_for_priorities(
        &self,
    ) -> Result<(&ProgramIndex<'p>, &DependencyGraph), AnalysisError> {
        match (self.index.as_ref(), self.graph.as_ref()) {
            (Some(index), Some(graph)) => Ok((index, graph)),
            _ => Err(AnalysisError::invariant("graph artifacts missing before use")),
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Analysis stopped because a pass reported errors.
/// The specific diagnostics are available in `AnalysisState.diagnostics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("analysis stopped in pass {}", descriptor(*failing_pass).name)]
pub struct PipelineError {
    pub failing_pass: PassId,
}

// ── Pipeline runner ────────────────────────────────────────────────────────

fn finish_pass(
    state: &mut AnalysisState<'_>,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    started: Instant,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = has_errors(&diags);
    state.diagnostics.extend(diags);
    debug!(
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "{} complete",
        descriptor(pass_id).name
    );
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → error check.
/// Boundary timing errors are recorded and set `federated_output_blocked`
/// without failing the run.
pub fn run_analysis(
    state: &mut AnalysisState<'_>,
    terminal: PassId,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        let span = info_span!("pass", name = descriptor(pass_id).name);
        let _entered = span.enter();
        let started = Instant::now();
        let diags = match run_pass(state, pass_id) {
            Ok(diags) => diags,
            Err(err) => err.to_diagnostics(),
        };
        if pass_id == PassId::ClassifyBoundaries && state.boundaries.is_some() {
            if has_errors(&diags) {
                state.federated_output_blocked = true;
            }
            on_pass_complete(pass_id, &diags);
            state.diagnostics.extend(diags);
            continue;
        }
        finish_pass(state, pass_id, diags, started, &mut on_pass_complete)?;
    }

    let provenance = state
        .priorities
        .as_ref()
        .map(|table| canonical_output(table, state.boundaries.as_ref()))
        .transpose()
        .and_then(|output| compute_provenance(state.program, output.as_deref()));
    match provenance {
        Ok(prov) => state.provenance = Some(prov),
        Err(e) => warn!("provenance not recorded: {}", e),
    }
    Ok(())
}

fn run_pass(
    state: &mut AnalysisState<'_>,
    pass_id: PassId,
) -> Result<Vec<Diagnostic>, AnalysisError> {
    match pass_id {
        PassId::BuildGraph => {
            let index = ProgramIndex::build(state.program)?;
            let graph = build_graph(&index)?;
            state.index = Some(index);
            state.graph = Some(graph);
            Ok(Vec::new())
        }
        PassId::DetectCycles => {
            let (_, graph) = state.artifacts_for_priorities()?;
            let report = detect_cycles(graph);
            let diags = match report.clone().into_result() {
                Ok(()) => Vec::new(),
                Err(err) => err.to_diagnostics(),
            };
            state.cycles = Some(report);
            Ok(diags)
        }
        PassId::AssignPriorities => {
            let (index, graph) = state.artifacts_for_priorities()?;
            let table = assign_priorities(graph)?;
            let cert = verify_priorities(&table, graph, index);
            let mut diags = Vec::new();
            if !cert.all_pass() {
                diags.push(
                    Diagnostic::error(
                        DiagKind::InvariantViolation,
                        format!("priority verification failed: {}", cert.failed().join(", ")),
                    )
                    .with_code(codes::E0900),
                );
            }
            debug!(reactions = table.len(), "priority table ready");
            state.priorities = Some(table);
            state.priority_cert = Some(cert);
            Ok(diags)
        }
        PassId::ClassifyBoundaries => {
            let (index, graph) = state.artifacts_for_priorities()?;
            let Some(priorities) = state.priorities.as_ref() else {
                return Err(AnalysisError::invariant("boundary classification before priorities"));
            };
            let policy = state.options.policy();
            let result = classify_boundaries(index, graph, priorities, &state.partition, &policy)?;
            state.boundaries = Some(result.report);
            Ok(result.diagnostics)
        }
    }
}

// ── Convenience wrapper ────────────────────────────────────────────────────

/// Owned results of a full analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub graph: Option<DependencyGraph>,
    pub cycles: Option<CycleReport>,
    pub priorities: Option<PriorityTable>,
    pub boundaries: Option<BoundaryReport>,
    pub diagnostics: Vec<Diagnostic>,
    pub failing_pass: Option<PassId>,
    pub federated_output_blocked: bool,
    pub provenance: Option<Provenance>,
}

impl AnalysisOutput {
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }

    /// Canonical output text, when priorities were produced.
    pub fn canonical_output(&self) -> Option<String> {
        let table = self.priorities.as_ref()?;
        match canonical_output(table, self.boundaries.as_ref()) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("canonical output not serialized: {}", e);
                None
            }
        }
    }
}

/// Run every pass up to `options.terminal` and collect owned results.
pub fn analyze(
    program: &Program,
    partition: FederatePartition,
    options: AnalysisOptions,
) -> AnalysisOutput {
    let mut state = AnalysisState::new(program, partition, options);
    let failing_pass = run_analysis(&mut state, options.terminal, |_, _| {})
        .err()
        .map(|e| e.failing_pass);
    AnalysisOutput {
        graph: state.graph,
        cycles: state.cycles,
        priorities: state.priorities,
        boundaries: state.boundaries,
        diagnostics: state.diagnostics,
        failing_pass,
        federated_output_blocked: state.federated_output_blocked,
        provenance: state.provenance,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
