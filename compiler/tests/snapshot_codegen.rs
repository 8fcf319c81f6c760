// Snapshot tests: lock generated C++ output to detect unintended behavior changes.
//
// Uses the library API (synthesize → render) directly. Snapshots are inline
// `insta` snapshots; run `cargo insta review` after intentional output
// changes to update them.

use cyksynth::diag::codes;
use cyksynth::grammar::{Dims, Grammar};
use cyksynth::render::render_function;
use cyksynth::synth::{synthesize, ParallelMode, SynthOptions};

fn cpp(g: &Grammar, opts: &SynthOptions) -> String {
    let r = synthesize(g, opts);
    let f = r
        .function
        .unwrap_or_else(|| panic!("synthesis failed: {:?}", r.diagnostics));
    render_function(&f)
}

#[test]
fn nussinov_default() {
    let g = Grammar::new("nussinov", 1).with_tabulated("s", &[Dims::Both]);
    insta::assert_snapshot!(cpp(&g, &SynthOptions::default()), @r"
    void cyk() {
    #ifndef _OPENMP
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
    #else
        #pragma omp parallel
        {
            unsigned int tile_size = 32;
    #ifdef TILE_SIZE
            tile_size = TILE_SIZE;
    #endif
            assert(tile_size);
            unsigned int max_tiles = t_0_seq.size() / tile_size;
            int max_tiles_n = max_tiles * tile_size;
            #pragma omp for
            // OPENMP < 3 requires signed int here ...
            for (int z = 0; z < max_tiles_n; z += tile_size) {
                for (unsigned int t_0_j = z; t_0_j < z + tile_size; ++t_0_j) {
                    for (int t_0_i = t_0_j + 1; t_0_i > z; t_0_i--) {
                        nt_tabulate_s(t_0_i - 1, t_0_j);
                    }
                }
            }
            for (int z = tile_size; z < max_tiles_n; z += tile_size) {
                #pragma omp for
                for (int y = z; y < max_tiles_n; y += tile_size) {
                    unsigned int x = y - z + tile_size;
                    for (unsigned int t_0_j = y; t_0_j < y + tile_size; ++t_0_j) {
                        for (int t_0_i = x; t_0_i > x - tile_size; t_0_i--) {
                            nt_tabulate_s(t_0_i - 1, t_0_j);
                        }
                    }
                }
            }
            // end parallel
        }
        unsigned int tile_size = 32;
    #ifdef TILE_SIZE
        tile_size = TILE_SIZE;
    #endif
        assert(tile_size);
        unsigned int max_tiles = t_0_seq.size() / tile_size;
        int max_tiles_n = max_tiles * tile_size;
        for (unsigned int t_0_j = max_tiles_n; t_0_j < t_0_seq.size() + 1; ++t_0_j) {
            for (unsigned int t_0_i = t_0_j + 1; t_0_i > 0; t_0_i--) {
                nt_tabulate_s(t_0_i - 1, t_0_j);
            }
        }
        unsigned int t_0_j = t_0_seq.size();
        unsigned int t_0_i = 1;
    #endif
    }
    ");
}

#[test]
fn resumable_single_threaded() {
    let g = Grammar::new("nussinov", 1).with_tabulated("s", &[Dims::Both]);
    let opts = SynthOptions::default()
        .with_parallel(ParallelMode::Never)
        .with_checkpoint();
    insta::assert_snapshot!(cpp(&g, &opts), @r"
    void cyk() {
        int t_0_i_loaded = !load_checkpoint || !t_0_i;
        int t_0_j_loaded = !load_checkpoint || !t_0_j;
        for (t_0_j = (t_0_j_loaded++) ? 0 : t_0_j; t_0_j < t_0_seq.size(); ++t_0_j) {
            for (t_0_i = (t_0_i_loaded++) ? t_0_j + 1 : t_0_i; t_0_i > 1; t_0_i--) {
                std::lock_guard<fair_mutex> lock(mutex);
                nt_tabulate_s(t_0_i - 1, t_0_j);
            }
            t_0_i = 1;
            std::lock_guard<fair_mutex> lock(mutex);
            nt_tabulate_s(t_0_i - 1, t_0_j);
        }
        t_0_j = t_0_seq.size();
        for (t_0_i = (t_0_i_loaded++) ? t_0_j + 1 : t_0_i; t_0_i > 1; t_0_i--) {
            std::lock_guard<fair_mutex> lock(mutex);
            nt_tabulate_s(t_0_i - 1, t_0_j);
        }
        t_0_i = 1;
        std::lock_guard<fair_mutex> lock(mutex);
        nt_tabulate_s(t_0_i - 1, t_0_j);
    }
    ");
}

#[test]
fn multi_track_dead_loops_are_pruned() {
    let g = Grammar::new("pair", 2).with_tabulated("g", &[Dims::RowOnly, Dims::Constant]);
    let r = synthesize(&g, &SynthOptions::default());
    assert_eq!(r.diagnostics.len(), 1);
    assert_eq!(r.diagnostics[0].code, Some(codes::W0200));
    insta::assert_snapshot!(render_function(&r.function.unwrap()), @r"
    void cyk() {
        unsigned int t_0_j = t_0_seq.size();
        for (unsigned int t_0_i = t_0_j + 1; t_0_i > 1; t_0_i--) {
            unsigned int t_1_j = t_1_seq.size();
            unsigned int t_1_i = 1;
            nt_tabulate_g(t_0_i - 1);
        }
        unsigned int t_0_i = 1;
        unsigned int t_1_j = t_1_seq.size();
        unsigned int t_1_i = 1;
        nt_tabulate_g(t_0_i - 1);
    }
    ");
}

#[test]
fn custom_function_and_callee_names() {
    let g = Grammar::new("g", 1).with_nonterminal(
        cyksynth::grammar::Nonterminal::tabulated(
            "k",
            vec![cyksynth::grammar::TableDim::default()],
        )
        .with_callee("fill_k"),
    );
    let mut opts = SynthOptions::default().with_parallel(ParallelMode::Never);
    opts.function_name = "fill_tables".into();
    insta::assert_snapshot!(cpp(&g, &opts), @r"
    void fill_tables() {
        unsigned int t_0_j = t_0_seq.size();
        unsigned int t_0_i = 1;
        fill_k();
    }
    ");
}
