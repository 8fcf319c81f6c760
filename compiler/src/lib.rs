// cyksynth — CYK traversal synthesizer
//
// Library root. Builds the table-filling loop nest of an ADP grammar as a
// loop IR, with an optional tiled OpenMP variant, and renders it to C++.

pub mod checkpoint;
pub mod diag;
pub mod grammar;
pub mod id;
pub mod inject;
pub mod ir;
pub mod pass;
pub mod pipeline;
pub mod render;
pub mod simulate;
pub mod synth;
pub mod tiling;
pub mod traversal;
