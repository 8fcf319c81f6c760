// checkpoint.rs — Resumable loop-index state
//
// Every running index and tile-progress counter is persisted by the external
// serializer. A per-variable `<var>_loaded` flag decides whether the next
// loop start uses its normal value (flag set) or substitutes the persisted
// one (flag clear); the start expression post-increments the flag, so a
// persisted value is consumed exactly once.
//
// Preconditions: running-index names are unique (grammar validated).
// Postconditions: declarations initialize every flag to "loaded" unless
//                 `load_flag` is set and the persisted value is non-zero.
// Failure modes: none.
// Side effects: none.

use serde::Serialize;

use crate::grammar::Grammar;
use crate::ir::{AssignOp, CType, CfgBlock, Expr, Lock, LockOp, Stmt};

/// Tile progress counters of the parallel path, in declaration order.
pub const OUTER_LOOP_1: &str = "outer_loop_1_idx";
pub const OUTER_LOOP_2: &str = "outer_loop_2_idx";
pub const INNER_LOOP_2: &str = "inner_loop_2_idx";

/// Build-time override of the default tile size.
pub const TILE_SIZE_SYMBOL: &str = "TILE_SIZE";

pub const LOADED_SUFFIX: &str = "_loaded";

/// Names of the lock the generated code synchronizes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockConfig {
    pub mutex: String,
    pub mutex_type: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        LockConfig {
            mutex: "mutex".into(),
            mutex_type: "fair_mutex".into(),
        }
    }
}

impl LockConfig {
    fn stmt(&self, op: LockOp) -> Stmt {
        Stmt::Lock(Lock {
            op,
            mutex: self.mutex.clone(),
            mutex_type: self.mutex_type.clone(),
        })
    }

    pub fn acquire_shared(&self) -> Stmt {
        self.stmt(LockOp::AcquireShared)
    }

    pub fn release_shared(&self) -> Stmt {
        self.stmt(LockOp::ReleaseShared)
    }

    pub fn scoped(&self) -> Stmt {
        self.stmt(LockOp::Scoped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointOptions {
    /// Runtime flag honoring persisted indices.
    pub load_flag: String,
    pub lock: LockConfig,
}

impl Default for CheckpointOptions {
    fn default() -> Self {
        CheckpointOptions {
            load_flag: "load_checkpoint".into(),
            lock: LockConfig::default(),
        }
    }
}

pub fn loaded_flag(var: &str) -> String {
    format!("{var}{LOADED_SUFFIX}")
}

/// `(<var>_loaded++) ? <default> : <var>`
pub fn resumable_start(var: &str, default: Expr) -> Expr {
    Expr::cond(Expr::post_inc(loaded_flag(var)), default, Expr::var(var))
}

/// `int <var>_loaded = !<load_flag> || !<var>;`
pub fn loaded_flag_decl(var: &str, opts: &CheckpointOptions) -> Stmt {
    Stmt::Decl {
        ty: CType::Int,
        name: loaded_flag(var),
        value: Expr::var(&opts.load_flag)
            .not()
            .or(Expr::var(var).not()),
    }
}

/// Loaded flags for every running index, track by track, left before right.
pub fn loaded_flag_decls(grammar: &Grammar, opts: &CheckpointOptions) -> Vec<Stmt> {
    grammar
        .tracks
        .iter()
        .flat_map(|t| [loaded_flag_decl(&t.left, opts), loaded_flag_decl(&t.right, opts)])
        .collect()
}

/// `unsigned int tile_size = <default>;` followed by the `TILE_SIZE` override.
pub fn tile_size_decl(name: &str, default: u32) -> Vec<Stmt> {
    vec![
        Stmt::Decl {
            ty: CType::Size,
            name: name.into(),
            value: Expr::Const(i64::from(default)),
        },
        Stmt::Cfg(CfgBlock {
            symbol: TILE_SIZE_SYMBOL.into(),
            negated: false,
            then: vec![Stmt::Assign {
                name: name.into(),
                op: AssignOp::Set,
                value: Expr::var(TILE_SIZE_SYMBOL),
            }],
            otherwise: Vec::new(),
        }),
    ]
}

pub fn start_var(counter: &str) -> String {
    format!("{counter}_start")
}

/// Declarations preceding the parallel region when checkpointing: the tile
/// size (shared by all threads), the tile-progress flags and the resumed
/// start value of each tiled outer loop.
pub fn parallel_prelude(opts: &CheckpointOptions, tile_size_var: &str, default_tile_size: u32) -> Vec<Stmt> {
    let mut stmts = tile_size_decl(tile_size_var, default_tile_size);
    for counter in [OUTER_LOOP_1, OUTER_LOOP_2, INNER_LOOP_2] {
        stmts.push(loaded_flag_decl(counter, opts));
    }
    let starts = [
        (OUTER_LOOP_1, resumable_start(OUTER_LOOP_1, Expr::Const(0))),
        (
            OUTER_LOOP_2,
            resumable_start(OUTER_LOOP_2, Expr::var(tile_size_var)),
        ),
        (INNER_LOOP_2, Expr::var(INNER_LOOP_2)),
    ];
    for (counter, value) in starts {
        stmts.push(Stmt::Decl {
            ty: CType::Int,
            name: start_var(counter),
            value,
        });
    }
    stmts
}
