// pass.rs: Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the analysis passes, their dependency edges, and the artifacts
// they produce. Used by the pipeline runner to compute the minimal pass
// subset for each --emit target.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each analysis pass (model decoding happens before the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassId {
    BuildGraph,
    DetectCycles,
    AssignPriorities,
    ClassifyBoundaries,
}

/// Machine-readable artifact identifiers. Each maps to a concrete type
/// in the analysis state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Index,        // ProgramIndex
    Graph,        // DependencyGraph
    Cycles,       // CycleReport
    Priorities,   // PriorityTable
    PriorityCert, // PriorityCert
    Boundaries,   // BoundaryReport
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about an analysis pass.
pub struct PassDescriptor {
    /// Human-readable name for logs and provenance.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// What invalidates this pass's output.
    pub invalidation_key: &'static str,
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::BuildGraph => PassDescriptor {
            name: "build_graph",
            inputs: &[],
            outputs: &[ArtifactId::Index, ArtifactId::Graph],
            invalidation_key: "program model",
            invariants: "one node per reaction and port, ids in pre-order",
        },
        PassId::DetectCycles => PassDescriptor {
            name: "detect_cycles",
            inputs: &[PassId::BuildGraph],
            outputs: &[ArtifactId::Cycles],
            invalidation_key: "graph",
            invariants: "zero-delay view is acyclic or every cycle is reported",
        },
        PassId::AssignPriorities => PassDescriptor {
            name: "assign_priorities",
            inputs: &[PassId::DetectCycles],
            outputs: &[ArtifactId::Priorities, ArtifactId::PriorityCert],
            invalidation_key: "graph",
            invariants: "P1-P3 obligations verified",
        },
        PassId::ClassifyBoundaries => PassDescriptor {
            name: "classify_boundaries",
            inputs: &[PassId::AssignPriorities],
            outputs: &[ArtifactId::Boundaries],
            invalidation_key: "graph + priorities + partition + boundary policy",
            invariants: "one sender and one receiver spec per boundary edge",
        },
    }
}

// ── Verification certificates ──────────────────────────────────────────────

/// Evidence a pass hands back about its own postconditions.
pub trait StageCert {
    fn all_pass(&self) -> bool;

    /// Each named obligation and whether it held.
    fn obligations(&self) -> Vec<(&'static str, bool)>;

    fn failed(&self) -> Vec<&'static str> {
        self.obligations()
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name)
            .collect()
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 4] = [
    PassId::BuildGraph,
    PassId::DetectCycles,
    PassId::AssignPriorities,
    PassId::ClassifyBoundaries,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_passes_graph_is_minimal() {
        assert_eq!(required_passes(PassId::BuildGraph), vec![PassId::BuildGraph]);
    }

    #[test]
    fn required_passes_priorities_skip_boundaries() {
        let passes = required_passes(PassId::AssignPriorities);
        assert_eq!(
            passes,
            vec![
                PassId::BuildGraph,
                PassId::DetectCycles,
                PassId::AssignPriorities
            ]
        );
        assert!(!passes.contains(&PassId::ClassifyBoundaries));
    }

    #[test]
    fn required_passes_boundaries_includes_all() {
        assert_eq!(required_passes(PassId::ClassifyBoundaries), ALL_PASSES.to_vec());
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(
                !desc.outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            for dep in desc.inputs {
                let dep_passes = required_passes(*pass);
                let dep_pos = dep_passes.iter().position(|p| p == dep);
                let self_pos = dep_passes.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }

    struct Fixed(Vec<(&'static str, bool)>);

    impl StageCert for Fixed {
        fn all_pass(&self) -> bool {
            self.0.iter().all(|(_, ok)| *ok)
        }

        fn obligations(&self) -> Vec<(&'static str, bool)> {
            self.0.clone()
        }
    }

    #[test]
    fn failed_lists_only_broken_obligations() {
        let cert = Fixed(vec![("A", true), ("B", false), ("C", false)]);
        assert!(!cert.all_pass());
        assert_eq!(cert.failed(), vec!["B", "C"]);
    }
}
