// synth.rs — Variant assembly for the `cyk()` table-filling function
//
// Builds the single-threaded traversal and, for single-track grammars, the
// tiled parallel one, then joins them behind `#ifndef _OPENMP`:
//
//   void cyk() {
//     [checkpoint flags]
//   #ifndef _OPENMP
//     single-threaded nest
//   #else
//     [checkpoint prelude]
//     #pragma omp parallel
//     { tile setup; phases A, B }
//     tile setup; phase C
//   #endif
//   }
//
// Preconditions: grammar passed `grammar::validate`, options passed
//                `validate_options`.
// Postconditions: `verify_function` holds for the assembled function.
// Failure modes: parallel path required for a multi-track grammar (E0200);
//                builder invariant violations (E0700).
// Side effects: none.

use serde::Serialize;
use tracing::{debug, warn};

use crate::checkpoint::{self, CheckpointOptions};
use crate::diag::{codes, Diagnostic};
use crate::grammar::{is_generated_identifier, Grammar};
use crate::id::TrackId;
use crate::inject::{inject_calls, InjectMode};
use crate::ir::{collect_callees, for_each_loop, CfgBlock, FnDef, LockOp, Stmt};
use crate::pass::{PassId, StageCert};
use crate::pipeline::{run_pipeline, CompilationState};
use crate::tiling::{self, TILE_SIZE};
use crate::traversal::{build_serial_traversal, LoopStyle};

pub const OPENMP_SYMBOL: &str = "_OPENMP";

// ── Options ─────────────────────────────────────────────────────────────────

/// Whether to emit the tiled parallel variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelMode {
    /// Emit it when the grammar allows; warn otherwise.
    Auto,
    /// Emit it; a multi-track grammar is an error.
    Always,
    /// Single-threaded code only.
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthOptions {
    pub function_name: String,
    pub parallel: ParallelMode,
    /// Default tile side; the generated code honors a `TILE_SIZE` override.
    pub tile_size: u32,
    pub checkpoint: Option<CheckpointOptions>,
}

impl Default for SynthOptions {
    fn default() -> Self {
        SynthOptions {
            function_name: "cyk".into(),
            parallel: ParallelMode::Auto,
            tile_size: 32,
            checkpoint: None,
        }
    }
}

impl SynthOptions {
    pub fn with_checkpoint(mut self) -> Self {
        self.checkpoint = Some(CheckpointOptions::default());
        self
    }

    pub fn with_parallel(mut self, mode: ParallelMode) -> Self {
        self.parallel = mode;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }
}

pub fn validate_options(opts: &SynthOptions) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    if opts.tile_size == 0 {
        diags.push(
            Diagnostic::error(codes::E0107, "tile size must be positive")
                .with_subject("option 'tile_size'"),
        );
    }
    diags
}

/// Reject option identifiers that a running index would shadow or that the
/// generated code already declares.
pub fn validate_option_names(grammar: &Grammar, opts: &SynthOptions) -> Vec<Diagnostic> {
    let mut named = vec![("function_name", opts.function_name.as_str())];
    if let Some(c) = &opts.checkpoint {
        named.push(("load_flag", c.load_flag.as_str()));
        named.push(("mutex", c.lock.mutex.as_str()));
        named.push(("mutex_type", c.lock.mutex_type.as_str()));
    }
    let mut diags = Vec::new();
    for (option, ident) in named {
        let clash = if grammar.is_running_index(ident) {
            "a running index"
        } else if is_generated_identifier(ident) {
            "an identifier of the generated code"
        } else {
            continue;
        };
        diags.push(
            Diagnostic::error(
                codes::E0110,
                format!("identifier '{ident}' collides with {clash}"),
            )
            .with_subject(format!("option '{option}'")),
        );
    }
    diags
}

// ── Parallel plan ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ParallelPlan {
    pub enabled: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Decide whether the parallel variant is emitted. Tiling is defined for a
/// single track only.
pub fn parallel_plan(grammar: &Grammar, opts: &SynthOptions) -> ParallelPlan {
    let tracks = grammar.track_count();
    let subject = format!("grammar '{}'", grammar.name);
    let message = format!("parallel traversal needs a single-track grammar, found {tracks} tracks");
    match (opts.parallel, tracks) {
        (ParallelMode::Never, _) => ParallelPlan {
            enabled: false,
            diagnostics: Vec::new(),
        },
        (_, 1) => ParallelPlan {
            enabled: true,
            diagnostics: Vec::new(),
        },
        (ParallelMode::Always, _) => ParallelPlan {
            enabled: false,
            diagnostics: vec![Diagnostic::error(codes::E0200, message)
                .with_subject(subject)
                .with_hint("use `--parallel auto` to fall back to the single-threaded traversal")],
        },
        (ParallelMode::Auto, _) => {
            warn!(grammar = %grammar.name, tracks, "skipping parallel variant");
            ParallelPlan {
                enabled: false,
                diagnostics: vec![Diagnostic::warning(
                    codes::W0200,
                    format!("{message}; emitting the single-threaded traversal only"),
                )
                .with_subject(subject)],
            }
        }
    }
}

// ── Variants ────────────────────────────────────────────────────────────────

/// Multi-track nest with calls injected.
pub fn build_serial_variant(grammar: &Grammar, opts: &SynthOptions) -> Result<Vec<Stmt>, Diagnostic> {
    let style = match opts.checkpoint {
        Some(_) => LoopStyle::Resumable,
        None => LoopStyle::Serial,
    };
    let nest = build_serial_traversal(grammar, style)?;
    let lock = opts.checkpoint.as_ref().map(|c| &c.lock);
    Ok(inject_calls(nest, grammar, InjectMode::Serial, lock))
}

/// Contents of the `_OPENMP` branch for a single-track grammar.
pub fn build_parallel_variant(grammar: &Grammar, opts: &SynthOptions) -> Result<Vec<Stmt>, Diagnostic> {
    let cp = opts.checkpoint.as_ref();
    let lock = cp.map(|c| &c.lock);
    let track = grammar.track(TrackId(0));
    // The checkpoint prelude declares tile_size for both the region and phase C.
    let declare_tile_size = cp.is_none();

    let mut stmts = Vec::new();
    if let Some(c) = cp {
        stmts.extend(checkpoint::parallel_prelude(c, TILE_SIZE, opts.tile_size));
    }
    stmts.push(Stmt::raw("#pragma omp parallel"));

    let mut region = tiling::tile_prelude(track, opts.tile_size, declare_tile_size);
    let phases = inject_calls(
        tiling::build_parallel_phases(track, cp)?,
        grammar,
        InjectMode::Parallel,
        lock,
    );
    if phases.is_empty() {
        debug!("no nonterminal indexes both sides; tile phases omitted");
    } else {
        region.push(tiling::omp_for_pragma(cp.is_some()));
        region.push(Stmt::raw("// OPENMP < 3 requires signed int here ..."));
        region.extend(phases);
    }
    region.push(Stmt::raw("// end parallel"));
    stmts.push(Stmt::Block(region));

    stmts.extend(tiling::tile_prelude(track, opts.tile_size, declare_tile_size));
    stmts.extend(inject_calls(
        tiling::build_boundary_pass(track, cp)?,
        grammar,
        InjectMode::Boundary,
        lock,
    ));
    Ok(stmts)
}

/// Join the variants into the generated function.
pub fn assemble(
    grammar: &Grammar,
    opts: &SynthOptions,
    serial: Vec<Stmt>,
    parallel: Option<Vec<Stmt>>,
) -> FnDef {
    let mut body = Vec::new();
    if let Some(c) = &opts.checkpoint {
        body.extend(checkpoint::loaded_flag_decls(grammar, c));
    }
    match parallel {
        Some(parallel) => body.push(Stmt::Cfg(CfgBlock {
            symbol: OPENMP_SYMBOL.into(),
            negated: true,
            then: serial,
            otherwise: parallel,
        })),
        None => body.extend(serial),
    }
    FnDef {
        name: opts.function_name.clone(),
        body,
    }
}

// ── Certificate ─────────────────────────────────────────────────────────────

/// Machine-checkable evidence for traversal postconditions (T1-T3).
#[derive(Debug, Clone)]
pub struct TraversalCert {
    /// T1: every loop holds a call or a child loop.
    pub t1_no_empty_loops: bool,
    /// T2: the single-threaded variant calls every tabulated nonterminal.
    pub t2_all_tabulated_called: bool,
    /// T3: shared lock acquisitions and releases pair up per loop body.
    pub t3_locks_balanced: bool,
}

impl StageCert for TraversalCert {
    fn all_pass(&self) -> bool {
        self.t1_no_empty_loops && self.t2_all_tabulated_called && self.t3_locks_balanced
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("T1_no_empty_loops", self.t1_no_empty_loops),
            ("T2_all_tabulated_called", self.t2_all_tabulated_called),
            ("T3_locks_balanced", self.t3_locks_balanced),
        ]
    }
}

pub fn verify_function(f: &FnDef, grammar: &Grammar) -> TraversalCert {
    let mut t1 = true;
    let mut t3 = lock_balance(&f.body) == 0;
    for_each_loop(&f.body, &mut |l| {
        t1 &= l.is_live();
        t3 &= lock_balance(&l.body) == 0;
    });

    let serial = serial_part(f);
    let callees = collect_callees(serial);
    let t2 = grammar
        .tabulated_in_order()
        .iter()
        .all(|nt| callees.contains(&nt.callee().as_str()));

    TraversalCert {
        t1_no_empty_loops: t1,
        t2_all_tabulated_called: t2,
        t3_locks_balanced: t3,
    }
}

/// Statements compiled without OpenMP.
pub fn serial_part(f: &FnDef) -> &[Stmt] {
    f.body
        .iter()
        .find_map(|s| match s {
            Stmt::Cfg(cfg) if cfg.symbol == OPENMP_SYMBOL && cfg.negated => Some(&cfg.then[..]),
            _ => None,
        })
        .unwrap_or(&f.body)
}

// Acquisitions minus releases at one loop level; blocks and build-time
// branches belong to the level, nested loops do not.
fn lock_balance(stmts: &[Stmt]) -> i64 {
    stmts
        .iter()
        .map(|s| match s {
            Stmt::Lock(l) => match l.op {
                LockOp::AcquireShared => 1,
                LockOp::ReleaseShared => -1,
                LockOp::Scoped => 0,
            },
            Stmt::Block(inner) => lock_balance(inner),
            Stmt::Cfg(cfg) => lock_balance(&cfg.then) + lock_balance(&cfg.otherwise),
            _ => 0,
        })
        .sum()
}

// ── One-shot entry point ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SynthResult {
    pub function: Option<FnDef>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Validate, build and assemble `cyk()` for `grammar`.
pub fn synthesize(grammar: &Grammar, opts: &SynthOptions) -> SynthResult {
    let mut state = CompilationState::new(grammar.clone(), opts.clone());
    // Failures are recorded in the state's diagnostics.
    let _ = run_pipeline(&mut state, PassId::Assemble, |_, _| {});
    SynthResult {
        function: state.function,
        diagnostics: state.diagnostics,
    }
}
