// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the passes that take a parsed program to a checked lowered body,
// their dependency edges, and the artifacts they produce. Used by the
// pipeline runner to compute the minimal pass subset for each --emit target.

use std::collections::HashSet;
use std::fmt;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each pass (parse excluded; it runs before the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    BuildModel,
    Lower,
    InferShapes,
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Model,        // Model
    LinearIr,     // LinearIr
    ResultShapes, // Vec<Shape>
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Passes whose outputs this pass consumes.
    pub inputs: &'static [PassId],
    pub outputs: &'static [ArtifactId],
    /// What holds after the pass succeeds (documentation only).
    pub invariants: &'static str,
}

pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::BuildModel => PassDescriptor {
            name: "build_model",
            inputs: &[],
            outputs: &[ArtifactId::Model],
            invariants: "operations known, attributes typed, operands defined earlier",
        },
        PassId::Lower => PassDescriptor {
            name: "lower",
            inputs: &[PassId::BuildModel],
            outputs: &[ArtifactId::LinearIr],
            invariants: "one expression per node, connectors wired, IO ordinals assigned",
        },
        PassId::InferShapes => PassDescriptor {
            name: "infer_shapes",
            inputs: &[PassId::Lower],
            outputs: &[ArtifactId::ResultShapes],
            invariants: "every output descriptor holds its inferred shape",
        },
        PassId::Validate => PassDescriptor {
            name: "validate",
            inputs: &[PassId::InferShapes],
            outputs: &[],
            invariants: "expression invariants, connector bookkeeping and shape agreement hold",
        },
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(descriptor(*self).name)
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

pub const ALL_PASSES: [PassId; 4] = [
    PassId::BuildModel,
    PassId::Lower,
    PassId::InferShapes,
    PassId::Validate,
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
    fn build_model_is_minimal() {
        assert_eq!(required_passes(PassId::BuildModel), vec![PassId::BuildModel]);
    }

    #[test]
    fn validate_includes_all() {
        assert_eq!(required_passes(PassId::Validate), ALL_PASSES.to_vec());
    }

    #[test]
    fn infer_shapes_skips_validate() {
        let passes = required_passes(PassId::InferShapes);
        assert_eq!(
            passes,
            vec![PassId::BuildModel, PassId::Lower, PassId::InferShapes]
        );
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let order = required_passes(*pass);
            let self_pos = order.iter().position(|p| p == pass).unwrap();
            for dep in descriptor(*pass).inputs {
                let dep_pos = order.iter().position(|p| p == dep).unwrap();
                assert!(dep_pos < self_pos, "{pass} depends on {dep} but runs first");
            }
        }
    }

    #[test]
    fn display_uses_descriptor_name() {
        assert_eq!(PassId::InferShapes.to_string(), "infer_shapes");
    }
}
