// Coverage and ordering tests for synthesized traversals.
//
// Each generated function is executed by the IR simulator for concrete
// sequence lengths; the recorded calls are checked against the cell set a
// nonterminal's table indices describe and against the evaluation order
// a CYK recurrence needs.

use std::collections::{HashMap, HashSet};

use cyksynth::grammar::{Dims, Grammar};
use cyksynth::ir::FnDef;
use cyksynth::simulate::{simulate, SimConfig, Trace};
use cyksynth::synth::{synthesize, ParallelMode, SynthOptions};

// ── Helpers ─────────────────────────────────────────────────────────────────

fn function(g: &Grammar, opts: &SynthOptions) -> FnDef {
    let r = synthesize(g, opts);
    r.function
        .unwrap_or_else(|| panic!("synthesis failed: {:?}", r.diagnostics))
}

fn run(f: &FnDef, cfg: &SimConfig) -> Trace {
    simulate(f, cfg).unwrap_or_else(|e| panic!("simulation failed: {e}"))
}

fn serial_trace(g: &Grammar, lengths: &[usize]) -> Trace {
    let f = function(g, &SynthOptions::default());
    run(&f, &SimConfig::for_grammar(g, lengths))
}

fn tiled_trace(g: &Grammar, n: usize, tile: i64) -> Trace {
    let f = function(g, &SynthOptions::default());
    let cfg = SimConfig::for_grammar(g, &[n])
        .define("_OPENMP")
        .define_value("TILE_SIZE", tile);
    run(&f, &cfg)
}

/// Every `(i, j)` with `0 <= i <= j <= n`.
fn triangle(n: i64) -> HashSet<Vec<i64>> {
    (0..=n)
        .flat_map(|j| (0..=j).map(move |i| vec![i, j]))
        .collect()
}

fn assert_each_once(cells: &[Vec<i64>], expected: &HashSet<Vec<i64>>) {
    let mut counts: HashMap<&Vec<i64>, usize> = HashMap::new();
    for c in cells {
        *counts.entry(c).or_default() += 1;
    }
    for (cell, count) in &counts {
        assert_eq!(*count, 1, "cell {:?} computed {} times", cell, count);
        assert!(expected.contains(*cell), "cell {:?} outside the table", cell);
    }
    assert_eq!(counts.len(), expected.len(), "missing cells");
}

/// Cell `(i, j)` comes after every `(i', j')` with `i <= i' <= j' <= j`.
fn assert_subcells_first(cells: &[Vec<i64>]) {
    let position: HashMap<(i64, i64), usize> = cells
        .iter()
        .enumerate()
        .map(|(pos, c)| ((c[0], c[1]), pos))
        .collect();
    for (pos, c) in cells.iter().enumerate() {
        let (i, j) = (c[0], c[1]);
        for jj in i..=j {
            for ii in i..=jj {
                if (ii, jj) == (i, j) {
                    continue;
                }
                let before = position[&(ii, jj)];
                assert!(
                    before < pos,
                    "({ii}, {jj}) computed after ({i}, {j})"
                );
            }
        }
    }
}

/// The subword `(i, j)` a call computes for sequence length `n`.
fn subword(dims: Dims, args: &[i64], n: i64) -> (i64, i64) {
    match dims {
        Dims::Both => (args[0], args[1]),
        Dims::RowOnly => (args[0], n),
        Dims::ColumnOnly => (0, args[0]),
        Dims::Constant => (0, n),
    }
}

/// Every call comes after the calls it may read: cells of the same
/// nonterminal on strictly enclosed subwords, and full-index cells on
/// enclosed subwords (the same subword only when evaluated earlier).
/// Row-only and column-only tables are not ordered against each other.
/// `shapes` lists callees in evaluation order.
fn assert_dependencies_first(trace: &Trace, shapes: &[(&str, Dims)], n: i64) {
    let calls: Vec<(usize, (i64, i64))> = trace
        .calls()
        .map(|(callee, args)| {
            let rank = shapes
                .iter()
                .position(|(name, _)| *name == callee)
                .unwrap_or_else(|| panic!("unexpected call {callee}"));
            (rank, subword(shapes[rank].1, args, n))
        })
        .collect();
    for (pos, &(rank, (i, j))) in calls.iter().enumerate() {
        for &(later, (k, l)) in &calls[pos + 1..] {
            let enclosed = i <= k && l <= j;
            let strict = enclosed && (k, l) != (i, j);
            let same_table = later == rank && strict;
            let full_index = shapes[later].1 == Dims::Both && enclosed && (strict || later < rank);
            assert!(
                !(same_table || full_index),
                "{} {:?} computed after {} {:?}",
                shapes[later].0,
                (k, l),
                shapes[rank].0,
                (i, j)
            );
        }
    }
}

fn nussinov() -> Grammar {
    Grammar::new("nussinov", 1).with_tabulated("s", &[Dims::Both])
}

fn mixed() -> Grammar {
    Grammar::new("mixed", 1)
        .with_tabulated("s", &[Dims::Both])
        .with_tabulated("r", &[Dims::RowOnly])
        .with_tabulated("c", &[Dims::ColumnOnly])
        .with_tabulated("k", &[Dims::Constant])
}

// ── Single-threaded traversal ───────────────────────────────────────────────

#[test]
fn serial_covers_triangle_once() {
    let g = nussinov();
    for n in 0..=9 {
        let cells = serial_trace(&g, &[n]).cells("nt_tabulate_s");
        assert_each_once(&cells, &triangle(n as i64));
    }
}

#[test]
fn serial_computes_subcells_first() {
    let g = nussinov();
    for n in [1, 4, 7] {
        assert_subcells_first(&serial_trace(&g, &[n]).cells("nt_tabulate_s"));
    }
}

#[test]
fn serial_row_column_and_constant_shapes() {
    let g = mixed();
    let n = 5;
    let trace = serial_trace(&g, &[n]);
    let rows: HashSet<Vec<i64>> = (0..=n as i64).map(|i| vec![i]).collect();

    assert_each_once(&trace.cells("nt_tabulate_r"), &rows);
    assert_each_once(&trace.cells("nt_tabulate_c"), &rows);
    assert_eq!(trace.cells("nt_tabulate_k"), vec![Vec::<i64>::new()]);
    assert_each_once(&trace.cells("nt_tabulate_s"), &triangle(n as i64));
}

#[test]
fn serial_row_only_runs_bottom_up() {
    let g = Grammar::new("g", 1).with_tabulated("r", &[Dims::RowOnly]);
    let cells = serial_trace(&g, &[3]).cells("nt_tabulate_r");
    assert_eq!(cells, vec![vec![3], vec![2], vec![1], vec![0]]);
}

#[test]
fn serial_column_only_runs_left_to_right() {
    let g = Grammar::new("g", 1).with_tabulated("c", &[Dims::ColumnOnly]);
    let cells = serial_trace(&g, &[3]).cells("nt_tabulate_c");
    assert_eq!(cells, vec![vec![0], vec![1], vec![2], vec![3]]);
}

#[test]
fn nonterminals_of_one_cell_follow_evaluation_order() {
    let g = Grammar::new("g", 1)
        .with_tabulated("a", &[Dims::Both])
        .with_tabulated("b", &[Dims::Both])
        .with_order(&["b", "a"]);
    let trace = serial_trace(&g, &[3]);
    let calls: Vec<(&str, &[i64])> = trace.calls().collect();
    for pair in calls.chunks(2) {
        assert_eq!(pair[0].0, "nt_tabulate_b");
        assert_eq!(pair[1].0, "nt_tabulate_a");
        assert_eq!(pair[0].1, pair[1].1);
    }
}

#[test]
fn multi_track_covers_product_of_triangles() {
    let g = Grammar::new("align", 2).with_tabulated("a", &[Dims::Both, Dims::Both]);
    let (n0, n1) = (3, 2);
    let cells = serial_trace(&g, &[n0, n1]).cells("nt_tabulate_a");
    let expected: HashSet<Vec<i64>> = triangle(n0 as i64)
        .iter()
        .flat_map(|a| {
            triangle(n1 as i64)
                .into_iter()
                .map(move |b| [a.clone(), b].concat())
        })
        .collect();
    assert_each_once(&cells, &expected);

    // track 0 is the outer order; track 1 varies fastest
    assert!(cells.iter().take(6).all(|c| c[0] == 0 && c[1] == 0));
    assert_eq!(cells[6][..2], [1, 1]);
}

#[test]
fn multi_track_mixed_shapes() {
    let g = Grammar::new("align", 2).with_tabulated("g", &[Dims::RowOnly, Dims::ColumnOnly]);
    let cells = serial_trace(&g, &[2, 3]).cells("nt_tabulate_g");
    let expected: HashSet<Vec<i64>> = (0..=2)
        .flat_map(|i| (0..=3).map(move |j| vec![i, j]))
        .collect();
    assert_each_once(&cells, &expected);
}

#[test]
fn empty_sequences_compute_origin_only() {
    let g = mixed();
    let trace = serial_trace(&g, &[0]);
    assert_eq!(trace.cells("nt_tabulate_s"), vec![vec![0, 0]]);
    assert_eq!(trace.cells("nt_tabulate_r"), vec![vec![0]]);
    assert_eq!(trace.cells("nt_tabulate_c"), vec![vec![0]]);
}

// ── Tiled traversal ─────────────────────────────────────────────────────────

#[test]
fn tiled_covers_triangle_once() {
    let g = nussinov();
    for (n, tile) in [(12, 4), (13, 4), (3, 4), (8, 1), (10, 3), (16, 16)] {
        let cells = tiled_trace(&g, n, tile).cells("nt_tabulate_s");
        assert_each_once(&cells, &triangle(n as i64));
    }
}

#[test]
fn tiled_serialization_respects_dependencies() {
    let g = nussinov();
    for (n, tile) in [(12, 4), (11, 2), (9, 3)] {
        assert_subcells_first(&tiled_trace(&g, n, tile).cells("nt_tabulate_s"));
    }
}

#[test]
fn tile_phases_for_n12_tile4() {
    let g = nussinov();
    let cells = tiled_trace(&g, 12, 4).cells("nt_tabulate_s");
    // the tile phases cover exactly the columns below max_tiles_n
    let tiled: Vec<&Vec<i64>> = cells.iter().filter(|c| c[1] < 12).collect();
    assert_eq!(tiled.len(), 78);

    // phase A: diagonal tiles first, starting at 0, 4 and 8
    let diagonal: Vec<(i64, i64)> = tiled
        .iter()
        .take(30)
        .map(|c| (c[0] / 4, c[1] / 4))
        .collect();
    assert!(diagonal.iter().all(|(r, col)| r == col));
    let starts: Vec<i64> = {
        let mut s: Vec<i64> = diagonal.iter().map(|(r, _)| r * 4).collect();
        s.dedup();
        s
    };
    assert_eq!(starts, vec![0, 4, 8]);

    // phase B: (z, y) tile pairs with z in {4, 8} and z <= y < 12
    let mut pairs: Vec<(i64, i64)> = tiled
        .iter()
        .skip(30)
        .map(|c| {
            let y = c[1] / 4 * 4;
            let z = y - c[0] / 4 * 4;
            (z, y)
        })
        .collect();
    pairs.dedup();
    assert_eq!(pairs, vec![(4, 4), (4, 8), (8, 8)]);
}

#[test]
fn tiled_boundary_handles_every_shape() {
    let g = mixed();
    let n = 10;
    let trace = tiled_trace(&g, n, 4);
    let rows: HashSet<Vec<i64>> = (0..=n as i64).map(|i| vec![i]).collect();
    assert_each_once(&trace.cells("nt_tabulate_s"), &triangle(n as i64));
    assert_each_once(&trace.cells("nt_tabulate_r"), &rows);
    assert_each_once(&trace.cells("nt_tabulate_c"), &rows);
    assert_eq!(trace.cells("nt_tabulate_k").len(), 1);
}

#[test]
fn tile_larger_than_sequence_leaves_everything_to_the_boundary() {
    let g = nussinov();
    let trace = tiled_trace(&g, 5, 8);
    let cells = trace.cells("nt_tabulate_s");
    assert_each_once(&cells, &triangle(5));
    // boundary order: columns left to right, rows bottom-up
    assert_eq!(cells[0], vec![0, 0]);
    assert_eq!(cells[1], vec![1, 1]);
    assert_eq!(cells[2], vec![0, 1]);
}

#[test]
fn serial_and_tiled_variants_compute_the_same_cells() {
    let g = mixed();
    let serial: HashSet<(String, Vec<i64>)> = serial_trace(&g, &[7])
        .calls()
        .map(|(c, a)| (c.to_string(), a.to_vec()))
        .collect();
    let tiled: HashSet<(String, Vec<i64>)> = tiled_trace(&g, 7, 2)
        .calls()
        .map(|(c, a)| (c.to_string(), a.to_vec()))
        .collect();
    assert_eq!(serial, tiled);
}

#[test]
fn variants_compute_dependencies_first_across_nonterminals() {
    let g = mixed()
        .with_tabulated("t", &[Dims::Both])
        .with_order(&["s", "r", "c", "t", "k"]);
    let shapes = [
        ("nt_tabulate_s", Dims::Both),
        ("nt_tabulate_r", Dims::RowOnly),
        ("nt_tabulate_c", Dims::ColumnOnly),
        ("nt_tabulate_t", Dims::Both),
        ("nt_tabulate_k", Dims::Constant),
    ];
    for n in [0, 4, 7] {
        assert_dependencies_first(&serial_trace(&g, &[n]), &shapes, n as i64);
    }
    for (n, tile) in [(9, 3), (13, 4), (5, 8)] {
        assert_dependencies_first(&tiled_trace(&g, n, tile), &shapes, n as i64);
    }
}

#[test]
fn tiled_boundary_runs_row_only_before_column_only() {
    let trace = tiled_trace(&mixed(), 6, 2);
    let callees: Vec<&str> = trace.calls().map(|(c, _)| c).collect();
    let last_row = callees.iter().rposition(|c| *c == "nt_tabulate_r").unwrap();
    let first_col = callees.iter().position(|c| *c == "nt_tabulate_c").unwrap();
    let last_full = callees.iter().rposition(|c| *c == "nt_tabulate_s").unwrap();
    assert!(last_full < last_row && last_row < first_col);
    assert_eq!(callees.last(), Some(&"nt_tabulate_k"));
}

#[test]
fn never_mode_ignores_openmp_define() {
    let g = nussinov();
    let f = function(&g, &SynthOptions::default().with_parallel(ParallelMode::Never));
    let plain = run(&f, &SimConfig::for_grammar(&g, &[6]));
    let with_omp = run(&f, &SimConfig::for_grammar(&g, &[6]).define("_OPENMP"));
    assert_eq!(plain, with_omp);
}
