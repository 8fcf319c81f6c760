// inject.rs — Nonterminal call placement and dead-loop elimination
//
// Post-order rewrite of a traversal. Each position knows the running indices
// bound by its enclosing loops; a tabulated nonterminal is called at the
// positions where every enclosing index is one of its own table indices.
// Loops left with neither calls nor child loops are dropped.
//
// Preconditions: grammar validated; loop variables of traversal loops are
//                the grammar's running indices.
// Postconditions: no loop without calls and without child loops; calls are
//                 appended after the child loops of their scope, in
//                 evaluation order.
// Failure modes: none.
// Side effects: none (consumes and rebuilds the statement list).

use tracing::debug;

use crate::checkpoint::LockConfig;
use crate::grammar::{Grammar, Nonterminal, Side};
use crate::ir::{Call, Expr, Stmt};

/// Which traversal the calls are placed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectMode {
    /// Single-threaded four-region nest: every scope takes calls.
    Serial,
    /// Tiled phases: only the innermost loop of a nest takes calls; tile
    /// counters do not bind indices.
    Parallel,
    /// Boundary pass after the tiles: innermost loops take the nonterminals
    /// whose indices are exactly the enclosing ones; the top level takes
    /// the index-free ones.
    Boundary,
}

struct Injector<'a> {
    order: Vec<&'a Nonterminal>,
    grammar: &'a Grammar,
    mode: InjectMode,
    lock: Option<&'a LockConfig>,
}

/// Place nonterminal calls into `stmts` and prune dead loops.
///
/// With a lock configuration, single-threaded calls are preceded by a scoped
/// exclusive lock and boundary-pass calls are followed by the release of the
/// shared lock the loop body acquired (outside any loop, the shared lock is
/// taken around them). Nothing is added where no call lands.
pub fn inject_calls(
    stmts: Vec<Stmt>,
    grammar: &Grammar,
    mode: InjectMode,
    lock: Option<&LockConfig>,
) -> Vec<Stmt> {
    let injector = Injector {
        order: grammar.tabulated_in_order(),
        grammar,
        mode,
        lock,
    };
    injector.rewrite(stmts, &[], false)
}

impl Injector<'_> {
    fn binds_scope(&self, var: &str) -> bool {
        match self.mode {
            InjectMode::Serial => true,
            InjectMode::Parallel | InjectMode::Boundary => self.grammar.is_running_index(var),
        }
    }

    fn rewrite(&self, stmts: Vec<Stmt>, scope: &[String], in_loop: bool) -> Vec<Stmt> {
        let had_loops = stmts.iter().any(Stmt::is_loop);

        let mut body: Vec<Stmt> = stmts
            .into_iter()
            .filter_map(|stmt| match stmt {
                Stmt::For(mut l) => {
                    let mut inner_scope = scope.to_vec();
                    if self.binds_scope(l.var_name()) {
                        inner_scope.push(l.var_name().to_string());
                    }
                    l.body = self.rewrite(std::mem::take(&mut l.body), &inner_scope, true);
                    if l.is_live() {
                        Some(Stmt::For(l))
                    } else {
                        debug!(var = l.var_name(), "pruned empty loop");
                        None
                    }
                }
                other => Some(other),
            })
            .collect();

        // Tiled and boundary nests only compute at their innermost level.
        let defer = had_loops
            && match self.mode {
                InjectMode::Serial => false,
                InjectMode::Parallel => true,
                InjectMode::Boundary => in_loop,
            };
        if defer {
            return body;
        }

        let calls: Vec<Stmt> = self
            .order
            .iter()
            .filter_map(|nt| self.call_for(nt, scope))
            .map(Stmt::NtCall)
            .collect();
        if calls.is_empty() {
            return body;
        }
        debug!(scope = ?scope, calls = calls.len(), "injected calls");

        match (self.lock, self.mode) {
            (Some(lock), InjectMode::Serial) => {
                body.push(lock.scoped());
                body.extend(calls);
            }
            (Some(lock), InjectMode::Boundary) => {
                // loop bodies acquired the shared side when they were built
                if !in_loop {
                    body.push(lock.acquire_shared());
                }
                body.extend(calls);
                body.push(lock.release_shared());
            }
            _ => body.extend(calls),
        }
        body
    }

    /// The call of `nt` at a position with `scope` bound, if it belongs there.
    fn call_for(&self, nt: &Nonterminal, scope: &[String]) -> Option<Call> {
        let mut matched = 0;
        let mut args = Vec::new();
        for table in &nt.tables {
            for (side, slot) in table.live_slots() {
                if scope.iter().any(|v| v == &slot.var) {
                    matched += 1;
                }
                args.push(match side {
                    Side::Left => Expr::var(&slot.var).minus(Expr::Const(1)),
                    Side::Right => Expr::var(&slot.var),
                });
            }
        }
        if matched != scope.len() {
            return None;
        }
        if self.mode == InjectMode::Boundary && nt.live_index_count() != scope.len() {
            return None;
        }
        Some(Call {
            callee: nt.callee(),
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Dims;
    use crate::ir::{collect_callees, for_each_loop};
    use crate::render::render_stmts;
    use crate::traversal::{build_serial_traversal, LoopStyle};

    fn serial(g: &Grammar) -> Vec<Stmt> {
        let stmts = build_serial_traversal(g, LoopStyle::Serial).unwrap();
        inject_calls(stmts, g, InjectMode::Serial, None)
    }

    #[test]
    fn full_index_nonterminal_lands_in_all_four_regions() {
        let g = Grammar::new("g", 1).with_tabulated("s", &[Dims::Both]);
        insta::assert_snapshot!(render_stmts(&serial(&g)), @r"
        for (unsigned int t_0_j = 0; t_0_j < t_0_seq.size(); ++t_0_j) {
            for (unsigned int t_0_i = t_0_j + 1; t_0_i > 1; t_0_i--) {
                nt_tabulate_s(t_0_i - 1, t_0_j);
            }
            unsigned int t_0_i = 1;
            nt_tabulate_s(t_0_i - 1, t_0_j);
        }
        unsigned int t_0_j = t_0_seq.size();
        for (unsigned int t_0_i = t_0_j + 1; t_0_i > 1; t_0_i--) {
            nt_tabulate_s(t_0_i - 1, t_0_j);
        }
        unsigned int t_0_i = 1;
        nt_tabulate_s(t_0_i - 1, t_0_j);
        ");
    }

    #[test]
    fn row_only_nonterminal_skips_column_scopes() {
        let g = Grammar::new("g", 1).with_tabulated("r", &[Dims::RowOnly]);
        insta::assert_snapshot!(render_stmts(&serial(&g)), @r"
        unsigned int t_0_j = t_0_seq.size();
        for (unsigned int t_0_i = t_0_j + 1; t_0_i > 1; t_0_i--) {
            nt_tabulate_r(t_0_i - 1);
        }
        unsigned int t_0_i = 1;
        nt_tabulate_r(t_0_i - 1);
        ");
    }

    #[test]
    fn calls_follow_evaluation_order() {
        let g = Grammar::new("g", 1)
            .with_tabulated("a", &[Dims::Both])
            .with_tabulated("b", &[Dims::Both])
            .with_order(&["b", "a"]);
        let stmts = serial(&g);
        let callees = collect_callees(&stmts);
        assert_eq!(&callees[..2], &["nt_tabulate_b", "nt_tabulate_a"]);
    }

    #[test]
    fn untabulated_nonterminals_are_never_called() {
        let g = Grammar::new("g", 1)
            .with_tabulated("s", &[Dims::Both])
            .with_nonterminal(Nonterminal::untabulated("helper"));
        assert!(!collect_callees(&serial(&g)).contains(&"nt_tabulate_helper"));
    }

    #[test]
    fn scoped_lock_precedes_serial_calls() {
        let g = Grammar::new("g", 1).with_tabulated("c", &[Dims::Constant]);
        let lock = LockConfig::default();
        let stmts = build_serial_traversal(&g, LoopStyle::Serial).unwrap();
        let out = inject_calls(stmts, &g, InjectMode::Serial, Some(&lock));
        let text = render_stmts(&out);
        assert!(text.ends_with("std::lock_guard<fair_mutex> lock(mutex);\nnt_tabulate_c();\n"));
        assert_eq!(text.matches("lock_guard").count(), 1);
    }

    #[test]
    fn tile_counters_do_not_bind_scope() {
        let g = Grammar::new("g", 1).with_tabulated("s", &[Dims::Both]);
        let phases = crate::tiling::build_parallel_phases(g.track(crate::id::TrackId(0)), None).unwrap();
        let out = inject_calls(phases, &g, InjectMode::Parallel, None);
        let mut innermost = Vec::new();
        for_each_loop(&out, &mut |l| {
            if l.direct_call_count() > 0 {
                innermost.push(l.var_name().to_string());
                assert_eq!(l.direct_loop_count(), 0);
            }
        });
        assert_eq!(innermost, vec!["t_0_i", "t_0_i"]);
    }

    #[test]
    fn parallel_phases_vanish_without_full_index_nonterminals() {
        let g = Grammar::new("g", 1).with_tabulated("c", &[Dims::ColumnOnly]);
        let phases = crate::tiling::build_parallel_phases(g.track(crate::id::TrackId(0)), None).unwrap();
        assert!(inject_calls(phases, &g, InjectMode::Parallel, None).is_empty());
    }

    #[test]
    fn boundary_pass_separates_index_shapes() {
        let g = Grammar::new("g", 1)
            .with_tabulated("s", &[Dims::Both])
            .with_tabulated("r", &[Dims::RowOnly])
            .with_tabulated("c", &[Dims::ColumnOnly])
            .with_tabulated("k", &[Dims::Constant]);
        let pass = crate::tiling::build_boundary_pass(g.track(crate::id::TrackId(0)), None).unwrap();
        let out = inject_calls(pass, &g, InjectMode::Boundary, None);
        insta::assert_snapshot!(render_stmts(&out), @r"
        for (unsigned int t_0_j = max_tiles_n; t_0_j < t_0_seq.size() + 1; ++t_0_j) {
            for (unsigned int t_0_i = t_0_j + 1; t_0_i > 0; t_0_i--) {
                nt_tabulate_s(t_0_i - 1, t_0_j);
            }
        }
        unsigned int t_0_j = t_0_seq.size();
        for (unsigned int t_0_i = t_0_j + 1; t_0_i > 0; t_0_i--) {
            nt_tabulate_r(t_0_i - 1);
        }
        unsigned int t_0_i = 1;
        for (unsigned int t_0_j = 0; t_0_j < t_0_seq.size() + 1; ++t_0_j) {
            nt_tabulate_c(t_0_j);
        }
        nt_tabulate_k();
        ");
    }

    #[test]
    fn boundary_release_follows_calls() {
        let g = Grammar::new("g", 1).with_tabulated("r", &[Dims::RowOnly]);
        let lock = LockConfig::default();
        let opts = crate::checkpoint::CheckpointOptions::default();
        let pass =
            crate::tiling::build_boundary_pass(g.track(crate::id::TrackId(0)), Some(&opts)).unwrap();
        let out = inject_calls(pass, &g, InjectMode::Boundary, Some(&lock));
        let text = render_stmts(&out);
        assert!(text.contains(
            "    mutex.lock_shared();\n    nt_tabulate_r(t_0_i - 1);\n    mutex.unlock_shared();\n"
        ));
        // the edge loop and the first-column loop hold no calls
        assert_eq!(text.matches("mutex.lock_shared()").count(), 1);
    }
}
