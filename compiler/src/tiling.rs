// tiling.rs — Tiled traversal of a single-track triangle
//
// Splits the table into square tiles of side `tile_size`:
//
//   Phase A  diagonal tiles, mutually independent (one work-shared loop)
//   Phase B  off-diagonal tiles by diagonal offset z; the tiles of one
//            offset are independent, offsets run in order
//   Phase C  serial pass after the join: the ragged right edge including the
//            last column, then the first row and the first column for
//            nonterminals that index only one side
//
// Cells of A and B satisfy `z <= row <= col < max_tiles_n`; Phase C covers
// `col >= max_tiles_n`, so no both-index cell is visited twice.
//
// Preconditions: single-track grammar.
// Postconditions: phases hold empty loops; `inject` populates them.
// Failure modes: loop / end-state mismatch (E0700).
// Side effects: none.

use crate::checkpoint::{self, CheckpointOptions, INNER_LOOP_2, OUTER_LOOP_1, OUTER_LOOP_2};
use crate::diag::Diagnostic;
use crate::grammar::Track;
use crate::ir::{AssignOp, CType, Expr, Stmt};
use crate::traversal::{column_loop, row_loop, row_start, tile_loop, ColumnEnd, LoopStyle};

pub const TILE_SIZE: &str = "tile_size";
pub const MAX_TILES: &str = "max_tiles";
pub const MAX_TILES_N: &str = "max_tiles_n";

const Z: &str = "z";
const Y: &str = "y";
const X: &str = "x";

/// Identifiers the tiled variant and the checkpoint prelude declare or
/// reference, apart from the per-variable loaded flags.
pub fn generated_identifiers() -> Vec<String> {
    let mut names: Vec<String> = [
        TILE_SIZE,
        MAX_TILES,
        MAX_TILES_N,
        Z,
        Y,
        X,
        checkpoint::TILE_SIZE_SYMBOL,
    ]
    .into_iter()
    .map(String::from)
    .collect();
    for counter in [OUTER_LOOP_1, OUTER_LOOP_2, INNER_LOOP_2] {
        names.push(counter.into());
        names.push(checkpoint::start_var(counter));
    }
    names
}

/// Tile-size setup shared by the parallel region and the boundary pass.
/// `declare` is false when the checkpoint prelude already declared
/// `tile_size` in an enclosing scope.
pub fn tile_prelude(track: &Track, default_tile_size: u32, declare: bool) -> Vec<Stmt> {
    let mut stmts = if declare {
        checkpoint::tile_size_decl(TILE_SIZE, default_tile_size)
    } else {
        Vec::new()
    };
    stmts.push(Stmt::Assert(Expr::var(TILE_SIZE)));
    stmts.push(Stmt::Decl {
        ty: CType::Size,
        name: MAX_TILES.into(),
        value: Expr::seq_len(&track.seq).div(Expr::var(TILE_SIZE)),
    });
    stmts.push(Stmt::Decl {
        ty: CType::Int,
        name: MAX_TILES_N.into(),
        value: Expr::var(MAX_TILES).times(Expr::var(TILE_SIZE)),
    });
    stmts
}

fn assign(name: &str, op: AssignOp, value: Expr) -> Stmt {
    Stmt::Assign {
        name: name.into(),
        op,
        value,
    }
}

/// Work-sharing pragma for the tile loops.
pub fn omp_for_pragma(checkpointing: bool) -> Stmt {
    if checkpointing {
        Stmt::raw("#pragma omp for ordered schedule(dynamic)")
    } else {
        Stmt::raw("#pragma omp for")
    }
}

/// Phases A and B. The caller places the work-sharing pragma for Phase A's
/// outer loop; Phase B carries its own.
pub fn build_parallel_phases(
    track: &Track,
    checkpoint: Option<&CheckpointOptions>,
) -> Result<Vec<Stmt>, Diagnostic> {
    let ts = || Expr::var(TILE_SIZE);
    let z = || Expr::var(Z);
    let y = || Expr::var(Y);

    // A: column in [z, z + tile_size), rows j+1 down to z exclusive
    let row = row_loop(track, row_start(track), z(), LoopStyle::Tiled)?;
    let mut col = column_loop(track, z(), ColumnEnd::Until(z().plus(ts())), LoopStyle::Tiled)?;
    col.for_loop.body.push(Stmt::For(row.for_loop));

    let start_z = match checkpoint {
        Some(_) => Expr::var(checkpoint::start_var(OUTER_LOOP_1)),
        None => Expr::Const(0),
    };
    let mut loop_z = tile_loop(Z, start_z, Expr::var(MAX_TILES_N), TILE_SIZE);
    if let Some(opts) = checkpoint {
        loop_z.body.push(opts.lock.acquire_shared());
    }
    loop_z.body.push(Stmt::For(col.for_loop));
    if let Some(opts) = checkpoint {
        loop_z.body.push(Stmt::raw("#pragma omp ordered"));
        loop_z.body.push(Stmt::Block(vec![
            Stmt::raw(
                "// force omp to wait for all threads to finish their current batch (of size tile_size)",
            ),
            assign(OUTER_LOOP_1, AssignOp::Add, ts()),
            opts.lock.release_shared(),
        ]));
    }

    // B: x = y - z + tile_size; column in [y, y + tile_size), rows x down to x - tile_size
    let row_b = row_loop(track, Expr::var(X), Expr::var(X).minus(ts()), LoopStyle::Tiled)?;
    let mut col_b = column_loop(track, y(), ColumnEnd::Until(y().plus(ts())), LoopStyle::Tiled)?;
    col_b.for_loop.body.push(Stmt::For(row_b.for_loop));

    let start_y = match checkpoint {
        Some(_) => Expr::cond(
            Expr::var(checkpoint::loaded_flag(INNER_LOOP_2)),
            z(),
            Expr::var(checkpoint::start_var(INNER_LOOP_2)),
        ),
        None => z(),
    };
    let mut loop_y = tile_loop(Y, start_y, Expr::var(MAX_TILES_N), TILE_SIZE);
    if let Some(opts) = checkpoint {
        loop_y.body.push(assign(
            &checkpoint::loaded_flag(INNER_LOOP_2),
            AssignOp::Add,
            Expr::Const(1),
        ));
        loop_y.body.push(opts.lock.acquire_shared());
    }
    loop_y.body.push(Stmt::Decl {
        ty: CType::Size,
        name: X.into(),
        value: y().minus(z()).plus(ts()),
    });
    loop_y.body.push(Stmt::For(col_b.for_loop));
    if let Some(opts) = checkpoint {
        loop_y.body.push(Stmt::raw("#pragma omp ordered"));
        loop_y.body.push(Stmt::Block(vec![
            assign(INNER_LOOP_2, AssignOp::Add, ts()),
            assign(OUTER_LOOP_2, AssignOp::Set, z()),
            opts.lock.release_shared(),
        ]));
    }

    let start_z2 = match checkpoint {
        Some(_) => Expr::var(checkpoint::start_var(OUTER_LOOP_2)),
        None => ts(),
    };
    let mut loop_z2 = tile_loop(Z, start_z2, Expr::var(MAX_TILES_N), TILE_SIZE);
    loop_z2.body.push(omp_for_pragma(checkpoint.is_some()));
    loop_z2.body.push(Stmt::For(loop_y));
    if checkpoint.is_some() {
        loop_z2
            .body
            .push(assign(INNER_LOOP_2, AssignOp::Set, z().plus(ts())));
    }

    Ok(vec![Stmt::For(loop_z), Stmt::For(loop_z2)])
}

/// Phase C: the serial boundary pass after the parallel region.
pub fn build_boundary_pass(
    track: &Track,
    checkpoint: Option<&CheckpointOptions>,
) -> Result<Vec<Stmt>, Diagnostic> {
    let style = match checkpoint {
        Some(_) => LoopStyle::Resumable,
        None => LoopStyle::Serial,
    };
    let lock = || checkpoint.map(|opts| opts.lock.acquire_shared());

    // ragged edge: columns max_tiles_n..=n, rows j+1 down to 0 exclusive
    let mut row = row_loop(track, row_start(track), Expr::Const(0), style)?;
    row.for_loop.body.extend(lock());
    let mut col = column_loop(
        track,
        Expr::var(MAX_TILES_N),
        ColumnEnd::SequenceInclusive,
        style,
    )?;
    col.for_loop.body.push(Stmt::For(row.for_loop));

    // first row: row-only nonterminals for every row
    let mut first_row = row_loop(track, row_start(track), Expr::Const(0), style)?;
    first_row.for_loop.body.extend(lock());

    // first column: column-only nonterminals for every column
    let mut first_col = column_loop(track, Expr::Const(0), ColumnEnd::SequenceInclusive, style)?;
    first_col.for_loop.body.extend(lock());

    let mut stmts = Vec::with_capacity(5);
    stmts.extend(col.into_stmts());
    stmts.extend(first_row.into_stmts());
    stmts.push(Stmt::For(first_col.for_loop));
    Ok(stmts)
}
