// pipeline.rs — Compilation state and pass orchestration
//
// Holds all pass artifacts and runs the minimal set of passes for a given
// terminal PassId.
//
// Preconditions: grammar and options are set before calling run_pipeline.
// Postconditions: all artifacts for required passes are populated, or has_error is set.
// Failure modes: any pass emitting error-level diagnostics.
// Side effects: calls on_pass_complete callback after each pass for immediate display.

use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::diag::{codes, has_errors, Diagnostic};
use crate::grammar::Grammar;
use crate::ir::{FnDef, Stmt};
use crate::pass::{required_passes, PassId, StageCert};
use crate::synth::{SynthOptions, TraversalCert};

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible builds and cache-key use.
///
/// `manifest_hash`: SHA-256 of the raw manifest text.
/// `options_fingerprint`: SHA-256 of the options' compact JSON.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub manifest_hash: [u8; 32],
    pub options_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

#[derive(Serialize)]
struct BuildInfo<'a> {
    manifest_hash: String,
    options_fingerprint: String,
    compiler_version: &'a str,
}

impl Provenance {
    /// Hex string of the manifest hash (64 characters).
    pub fn manifest_hash_hex(&self) -> String {
        bytes_to_hex(&self.manifest_hash)
    }

    /// Hex string of the options fingerprint (64 characters).
    pub fn options_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.options_fingerprint)
    }

    /// Serialize provenance as JSON for `--emit build-info`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let info = BuildInfo {
            manifest_hash: self.manifest_hash_hex(),
            options_fingerprint: self.options_fingerprint_hex(),
            compiler_version: self.compiler_version,
        };
        let mut text = serde_json::to_string_pretty(&info)?;
        text.push('\n');
        Ok(text)
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from manifest text and options.
pub fn compute_provenance(
    manifest: &str,
    options: &SynthOptions,
) -> serde_json::Result<Provenance> {
    let canonical = serde_json::to_string(options)?;
    Ok(Provenance {
        manifest_hash: sha256(manifest.as_bytes()),
        options_fingerprint: sha256(canonical.as_bytes()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Artifact storage ───────────────────────────────────────────────────────

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub grammar: Grammar,
    pub options: SynthOptions,
    pub serial: Option<Vec<Stmt>>,
    /// `Some(None)` once planning decided against the parallel variant.
    pub parallel: Option<Option<Vec<Stmt>>>,
    pub function: Option<FnDef>,
    pub cert: Option<TraversalCert>,
    pub rendered: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
}

impl CompilationState {
    pub fn new(grammar: Grammar, options: SynthOptions) -> Self {
        Self {
            grammar,
            options,
            serial: None,
            parallel: None,
            function: None,
            cert: None,
            rendered: None,
            diagnostics: Vec::new(),
            has_error: false,
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug, Error)]
#[error("pass `{failing_pass}` failed")]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
}

/// Per-pass post-processing: callback, accumulate, log, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = has_errors(&diags);
    state.diagnostics.extend(diags);
    info!(
        pass = %pass_id,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "pass complete"
    );
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

// Upstream artifact missing: a pass ran out of order.
fn missing(pass_id: PassId, artifact: &str) -> Vec<Diagnostic> {
    vec![Diagnostic::error(
        codes::E0700,
        format!("{artifact} not available to pass `{pass_id}`"),
    )]
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → log → error check.
///
/// Preconditions: `state.grammar` and `state.options` are set.
/// Postconditions: artifacts for all passes in `required_passes(terminal)` are populated,
///   or `state.has_error` is true.
/// Failure modes: any pass producing error-level diagnostics; certificate failure.
/// Side effects: calls `on_pass_complete` after each pass for immediate diagnostic display.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        let t = Instant::now();
        let diags = match pass_id {
            PassId::Validate => {
                let mut diags = crate::grammar::validate(&state.grammar);
                diags.extend(crate::synth::validate_options(&state.options));
                diags.extend(crate::synth::validate_option_names(
                    &state.grammar,
                    &state.options,
                ));
                diags
            }
            PassId::BuildSerial => {
                match crate::synth::build_serial_variant(&state.grammar, &state.options) {
                    Ok(stmts) => {
                        state.serial = Some(stmts);
                        Vec::new()
                    }
                    Err(d) => vec![d],
                }
            }
            PassId::BuildParallel => {
                let plan = crate::synth::parallel_plan(&state.grammar, &state.options);
                let mut diags = plan.diagnostics;
                if plan.enabled {
                    match crate::synth::build_parallel_variant(&state.grammar, &state.options) {
                        Ok(stmts) => state.parallel = Some(Some(stmts)),
                        Err(d) => diags.push(d),
                    }
                } else {
                    state.parallel = Some(None);
                }
                diags
            }
            PassId::Assemble => match (state.serial.take(), state.parallel.take()) {
                (Some(serial), Some(parallel)) => {
                    let f = crate::synth::assemble(&state.grammar, &state.options, serial, parallel);
                    let cert = crate::synth::verify_function(&f, &state.grammar);
                    let mut diags = Vec::new();
                    if !cert.all_pass() {
                        diags.push(
                            Diagnostic::error(
                                codes::E0600,
                                format!(
                                    "traversal verification failed: {}",
                                    cert.failures().join(", ")
                                ),
                            )
                            .with_subject(format!("function '{}'", f.name)),
                        );
                    }
                    state.function = Some(f);
                    state.cert = Some(cert);
                    diags
                }
                _ => missing(pass_id, "loop variants"),
            },
            PassId::Render => match &state.function {
                Some(f) => {
                    state.rendered = Some(crate::render::render_function(f));
                    Vec::new()
                }
                None => missing(pass_id, "assembled function"),
            },
        };
        finish_pass(state, pass_id, diags, t.elapsed(), &mut on_pass_complete)?;
    }
    Ok(())
}
