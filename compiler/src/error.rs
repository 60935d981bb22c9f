// error.rs: Fatal analysis errors
//
// The three-way taxonomy every pass reports through. Each error also
// converts into `Diagnostic`s so a reporting sink sees one uniform stream.

use thiserror::Error;

use crate::cycles::Cycle;
use crate::diag::{codes, DiagKind, Diagnostic, NodeRef};
use crate::id::ConnectionId;

/// What an `InvariantViolation` is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantSubject {
    /// A precondition the analysis itself should have guaranteed.
    Analysis,
    /// The program model handed in by elaboration is inconsistent.
    ProgramModel,
}

/// An unbounded federated dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct UnboundedEdge {
    pub connection: ConnectionId,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("zero-delay dependency cycle detected ({} cycle(s))", cycles.len())]
    GraphCycle { cycles: Vec<Cycle> },

    #[error("invariant violated: {message}")]
    InvariantViolation {
        subject: InvariantSubject,
        message: String,
        details: Vec<String>,
    },

    #[error("no safe-to-process bound for {} federated connection(s)", edges.len())]
    UnresolvableBoundaryTiming { edges: Vec<UnboundedEdge> },
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

impl AnalysisError {
    /// A defect in the analysis itself.
    pub fn invariant(message: impl Into<String>) -> Self {
        AnalysisError::InvariantViolation {
            subject: InvariantSubject::Analysis,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// An inconsistent program model, one detail line per problem.
    pub fn malformed_model(details: Vec<String>) -> Self {
        AnalysisError::InvariantViolation {
            subject: InvariantSubject::ProgramModel,
            message: format!("malformed program model ({} problem(s))", details.len()),
            details,
        }
    }

    /// Structured diagnostics for a reporting sink.
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            AnalysisError::GraphCycle { cycles } => cycles.iter().map(cycle_diagnostic).collect(),
            AnalysisError::InvariantViolation {
                subject,
                message,
                details,
            } => {
                let (code, kind) = match subject {
                    InvariantSubject::Analysis => (codes::E0900, DiagKind::InvariantViolation),
                    InvariantSubject::ProgramModel => (codes::E0901, DiagKind::MalformedModel),
                };
                let diag = details.iter().fold(
                    Diagnostic::error(kind, message.clone()).with_code(code),
                    |d, detail| d.with_cause(detail.clone(), None),
                );
                vec![diag]
            }
            AnalysisError::UnresolvableBoundaryTiming { edges } => edges
                .iter()
                .map(|edge| {
                    Diagnostic::error(
                        DiagKind::UnresolvableBoundaryTiming,
                        format!(
                            "no safe-to-process bound for federated connection {}",
                            edge.name
                        ),
                    )
                    .with_code(codes::E0200)
                    .with_involved(NodeRef::Connection(edge.connection), edge.name.clone())
                    .with_cause(edge.reason.clone(), None)
                    .with_hint("configure a network latency or a safe-to-process offset")
                })
                .collect(),
        }
    }
}

fn cycle_diagnostic(cycle: &Cycle) -> Diagnostic {
    let mut diag = Diagnostic::error(
        DiagKind::GraphCycle,
        format!(
            "zero-delay dependency cycle through {} node(s)",
            cycle.members.len()
        ),
    )
    .with_code(codes::E0100)
    .with_cause(cycle.path_names.join(" -> "), None)
    .with_hint("break the cycle with an `after` delay or a physical connection");
    for member in &cycle.members {
        diag = diag.with_involved(member.node, member.name.clone());
    }
    diag
}
