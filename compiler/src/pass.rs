// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the synthesizer's passes, their dependency edges, and the
// artifacts they produce. Used by the pipeline runner to compute minimal
// pass subsets for each --emit target. Manifest loading happens before the
// runner.

use std::collections::HashSet;
use std::fmt;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each synthesis pass (manifest loading excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Validate,
    BuildSerial,
    BuildParallel,
    Assemble,
    Render,
}

/// Machine-readable artifact identifiers. Each maps to a field of the
/// compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Validated, // validation diagnostics only
    Serial,    // Vec<Stmt>
    Parallel,  // Option<Vec<Stmt>>
    Function,  // FnDef
    Cert,      // TraversalCert
    Rendered,  // String
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a synthesis pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Validate => PassDescriptor {
            name: "validate",
            inputs: &[],
            outputs: &[ArtifactId::Validated],
            invariants: "track/index metadata consistent, options in range",
        },
        PassId::BuildSerial => PassDescriptor {
            name: "build_serial",
            inputs: &[PassId::Validate],
            outputs: &[ArtifactId::Serial],
            invariants: "four-region nest per track, calls injected, dead loops pruned",
        },
        PassId::BuildParallel => PassDescriptor {
            name: "build_parallel",
            inputs: &[PassId::Validate],
            outputs: &[ArtifactId::Parallel],
            invariants: "tiled phases only for single-track grammars",
        },
        PassId::Assemble => PassDescriptor {
            name: "assemble",
            inputs: &[PassId::BuildSerial, PassId::BuildParallel],
            outputs: &[ArtifactId::Function, ArtifactId::Cert],
            invariants: "T1-T3 obligations verified",
        },
        PassId::Render => PassDescriptor {
            name: "render",
            inputs: &[PassId::Assemble],
            outputs: &[ArtifactId::Rendered],
            invariants: "C++ text emitted",
        },
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(descriptor(*self).name)
    }
}

// ── Stage certificates ─────────────────────────────────────────────────────

/// Postcondition evidence produced by a pass.
pub trait StageCert {
    fn all_pass(&self) -> bool;
    /// Named obligations with their outcome.
    fn obligations(&self) -> Vec<(&'static str, bool)>;

    /// Names of failed obligations.
    fn failures(&self) -> Vec<&'static str> {
        self.obligations()
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name)
            .collect()
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 5] = [
    PassId::Validate,
    PassId::BuildSerial,
    PassId::BuildParallel,
    PassId::Assemble,
    PassId::Render,
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
    fn required_passes_build_serial_skips_parallel() {
        let passes = required_passes(PassId::BuildSerial);
        assert_eq!(passes, vec![PassId::Validate, PassId::BuildSerial]);
        assert!(!passes.contains(&PassId::BuildParallel));
    }

    #[test]
    fn required_passes_render_includes_all() {
        let passes = required_passes(PassId::Render);
        assert_eq!(passes.len(), 5);
        assert_eq!(passes, ALL_PASSES.to_vec());
    }

    #[test]
    fn required_passes_validate_is_minimal() {
        assert_eq!(required_passes(PassId::Validate), vec![PassId::Validate]);
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
            let order = required_passes(*pass);
            let self_pos = order.iter().position(|p| p == pass).unwrap();
            for dep in descriptor(*pass).inputs {
                let dep_pos = order.iter().position(|p| p == dep).unwrap();
                assert!(
                    dep_pos < self_pos,
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }

    #[test]
    fn display_uses_descriptor_name() {
        assert_eq!(PassId::BuildParallel.to_string(), "build_parallel");
    }

    struct Fixed(bool, bool);

    impl StageCert for Fixed {
        fn all_pass(&self) -> bool {
            self.0 && self.1
        }
        fn obligations(&self) -> Vec<(&'static str, bool)> {
            vec![("first", self.0), ("second", self.1)]
        }
    }

    #[test]
    fn failures_lists_failed_obligations() {
        assert_eq!(Fixed(true, false).failures(), vec!["second"]);
        assert!(Fixed(true, true).failures().is_empty());
    }
}
