// diag.rs: Unified diagnostics model
//
// Provides the shared diagnostic types used across all analysis passes.
// Diagnostics point at program entities (reactions, ports, connections,
// reactors, federates) rather than source spans: the textual front end is
// an external collaborator and locations are recovered from hierarchical
// names by whoever displays them.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::id::*;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0100`, `W0200`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different semantic
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    /// Zero-delay dependency cycle.
    pub const E0100: DiagCode = DiagCode("E0100");
    /// Federated zero-delay dependency without a computable safe-to-process bound.
    pub const E0200: DiagCode = DiagCode("E0200");
    /// Internal invariant violated by the analysis itself.
    pub const E0900: DiagCode = DiagCode("E0900");
    /// Program model handed to the analysis is malformed.
    pub const E0901: DiagCode = DiagCode("E0901");
    /// Boundary edge has no finite bound and relies on the coordinator.
    pub const W0200: DiagCode = DiagCode("W0200");
    /// Declared delay absorbs the whole safe-to-process bound.
    pub const W0201: DiagCode = DiagCode("W0201");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagLevel {
    Error,
    Warning,
}

/// Error taxonomy bucket a diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagKind {
    GraphCycle,
    InvariantViolation,
    MalformedModel,
    UnresolvableBoundaryTiming,
    BoundaryTiming,
}

// ── Involved entities ────────────────────────────────────────────────────

/// A program entity a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRef {
    Reactor(ReactorId),
    Port(PortId),
    Reaction(ReactionId),
    Connection(ConnectionId),
    Federate(FederateId),
}

/// An involved entity plus its hierarchical name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Involved {
    pub node: NodeRef,
    pub name: String,
}

// ── Cause record ─────────────────────────────────────────────────────────

/// One link in a cause chain explaining a diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct CauseRecord {
    pub message: String,
    pub node: Option<NodeRef>,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any analysis pass.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub kind: DiagKind,
    pub message: String,
    pub hint: Option<String>,
    pub involved: Vec<Involved>,
    pub cause_chain: Vec<CauseRecord>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, involved nodes, or causes.
    pub fn new(level: DiagLevel, kind: DiagKind, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            kind,
            message: message.into(),
            hint: None,
            involved: Vec::new(),
            cause_chain: Vec::new(),
        }
    }

    pub fn error(kind: DiagKind, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, kind, message)
    }

    pub fn warning(kind: DiagKind, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, kind, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach an involved entity.
    pub fn with_involved(mut self, node: NodeRef, name: impl Into<String>) -> Self {
        self.involved.push(Involved {
            node,
            name: name.into(),
        });
        self
    }

    /// Attach a cause record to the chain.
    pub fn with_cause(mut self, message: impl Into<String>, node: Option<NodeRef>) -> Self {
        self.cause_chain.push(CauseRecord {
            message: message.into(),
            node,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

/// True if any diagnostic in the slice is an error.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(Diagnostic::is_error)
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        for cause in &self.cause_chain {
            write!(f, "\n  note: {}", cause.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}
