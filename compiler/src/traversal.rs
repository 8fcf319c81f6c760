// traversal.rs — Triangular loop-nest construction
//
// Builds the four-region traversal of one track and composes it across all
// tracks. Each region instantiates a copy of the shared inner block:
//
//   for (t_x_j ...) {           column loop
//     for (t_x_i ...) { A }     interior cells, rows j..1
//     t_x_i = 1;  B             first row
//   }
//   t_x_j = n;
//   for (t_x_i ...) { C }       last column, rows n..1
//   t_x_i = 1;  D               corner cell (0, n)
//
// Loops come back empty of calls; `inject` places the calls afterwards.
//
// Preconditions: grammar validated (tracks present, index names unique).
// Postconditions: every loop variable is followed by its end-state binding
//                 wherever later statements read it.
// Failure modes: loop / end-state name mismatch (E0700).
// Side effects: none.

use tracing::debug;

use crate::checkpoint::resumable_start;
use crate::diag::{codes, Diagnostic};
use crate::grammar::{Grammar, Track};
use crate::id::TrackId;
use crate::ir::{Binding, CType, Expr, ForLoop, Step, Stmt};

// ── Bounded loops ───────────────────────────────────────────────────────────

/// A loop together with the binding of its variable to the first value the
/// loop did not reach.
#[derive(Debug, Clone)]
pub struct BoundedLoop {
    pub for_loop: ForLoop,
    pub end_state: Binding,
}

impl BoundedLoop {
    pub fn new(for_loop: ForLoop, end_state: Binding) -> Result<Self, Diagnostic> {
        if for_loop.var_name() != end_state.name() {
            return Err(Diagnostic::error(
                codes::E0700,
                format!(
                    "loop over '{}' paired with end state of '{}'",
                    for_loop.var_name(),
                    end_state.name()
                ),
            ));
        }
        Ok(BoundedLoop {
            for_loop,
            end_state,
        })
    }

    /// The loop followed by its end-state statement.
    pub fn into_stmts(self) -> [Stmt; 2] {
        [Stmt::For(self.for_loop), self.end_state.into_stmt()]
    }
}

/// How a traversal loop binds its variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStyle {
    /// Fresh `unsigned int` locals.
    Serial,
    /// Assign the persisted globals; the start consumes the checkpoint once.
    Resumable,
    /// Inside a tile of the parallel region: fresh locals, signed rows.
    Tiled,
}

/// Upper limit of a column loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnEnd {
    /// `j < seq.size()`
    Sequence,
    /// `j < seq.size() + 1`
    SequenceInclusive,
    /// `j < bound`
    Until(Expr),
}

fn binding(style: LoopStyle, ty: CType, var: &str, start: Expr) -> Binding {
    match style {
        LoopStyle::Resumable => Binding::Reuse {
            name: var.into(),
            value: resumable_start(var, start),
        },
        LoopStyle::Serial | LoopStyle::Tiled => Binding::Declare {
            ty,
            name: var.into(),
            value: start,
        },
    }
}

/// Ascending loop over the track's right running index.
pub fn column_loop(
    track: &Track,
    start: Expr,
    end: ColumnEnd,
    style: LoopStyle,
) -> Result<BoundedLoop, Diagnostic> {
    let init = binding(style, CType::Size, &track.right, start);
    let (limit, end_value) = match end {
        ColumnEnd::Sequence => (Expr::seq_len(&track.seq), Expr::seq_len(&track.seq)),
        ColumnEnd::SequenceInclusive => (
            Expr::seq_len(&track.seq).plus(Expr::Const(1)),
            Expr::seq_len(&track.seq),
        ),
        ColumnEnd::Until(bound) => (bound.clone(), bound),
    };
    let end_state = init.rebound(end_value);
    let cond = Expr::var(&track.right).less(limit);
    BoundedLoop::new(ForLoop::new(init, cond, Step::Increment), end_state)
}

/// Descending loop over the track's left running index, stopping above
/// `floor`. The end state is row 1, the last row an interior loop visits.
pub fn row_loop(
    track: &Track,
    start: Expr,
    floor: Expr,
    style: LoopStyle,
) -> Result<BoundedLoop, Diagnostic> {
    let ty = match style {
        LoopStyle::Tiled => CType::Int,
        LoopStyle::Serial | LoopStyle::Resumable => CType::Size,
    };
    let init = binding(style, ty, &track.left, start);
    let end_state = init.rebound(Expr::Const(1));
    let cond = Expr::var(&track.left).greater(floor);
    BoundedLoop::new(ForLoop::new(init, cond, Step::Decrement), end_state)
}

/// `for (int var = start; var < end; var += stride)`
pub fn tile_loop(var: &str, start: Expr, end: Expr, stride: &str) -> ForLoop {
    ForLoop::new(
        Binding::Declare {
            ty: CType::Int,
            name: var.into(),
            value: start,
        },
        Expr::var(var).less(end),
        Step::By(Expr::var(stride)),
    )
}

/// Rows start one past the current column so `left - 1` reaches the diagonal.
pub fn row_start(track: &Track) -> Expr {
    Expr::var(&track.right).plus(Expr::Const(1))
}

// ── Regions ─────────────────────────────────────────────────────────────────

/// The four-region traversal of `track` around copies of `inner`.
pub fn build_track_regions(
    grammar: &Grammar,
    track: TrackId,
    inner: &[Stmt],
    style: LoopStyle,
) -> Result<Vec<Stmt>, Diagnostic> {
    let t = grammar.track(track);

    // A
    let mut interior = row_loop(t, row_start(t), Expr::Const(1), style)?;
    interior.for_loop.body = inner.to_vec();
    let mut column = column_loop(t, Expr::Const(0), ColumnEnd::Sequence, style)?;
    column.for_loop.body.extend(interior.into_stmts());
    // B
    column.for_loop.body.extend(inner.iter().cloned());

    let mut stmts = Vec::with_capacity(inner.len() + 4);
    stmts.extend(column.into_stmts());

    // C
    let mut last_column = row_loop(t, row_start(t), Expr::Const(1), style)?;
    last_column.for_loop.body = inner.to_vec();
    stmts.extend(last_column.into_stmts());

    // D
    stmts.extend(inner.iter().cloned());

    debug!(%track, inner = inner.len(), "built track regions");
    Ok(stmts)
}

/// Nest the regions of every track, last track innermost.
pub fn build_serial_traversal(grammar: &Grammar, style: LoopStyle) -> Result<Vec<Stmt>, Diagnostic> {
    let mut block = Vec::new();
    for track in grammar.track_ids().rev() {
        block = build_track_regions(grammar, track, &block, style)?;
    }
    Ok(block)
}
