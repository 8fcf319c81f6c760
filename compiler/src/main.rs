use clap::Parser;
use std::path::PathBuf;

use cyksynth::pass::PassId;
use cyksynth::pipeline::{compute_provenance, run_pipeline, CompilationState};
use cyksynth::simulate::{simulate, SimConfig};
use cyksynth::synth::{ParallelMode, SynthOptions};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    /// C++ source of the table-filling function
    Cpp,
    /// Nonterminal calls the function performs for the given lengths
    Trace,
    /// Provenance JSON (manifest hash, options fingerprint, version)
    BuildInfo,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Parallel {
    Auto,
    Always,
    Never,
}

impl From<Parallel> for ParallelMode {
    fn from(p: Parallel) -> Self {
        match p {
            Parallel::Auto => ParallelMode::Auto,
            Parallel::Always => ParallelMode::Always,
            Parallel::Never => ParallelMode::Never,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "cyksynth",
    version,
    about = "CYK traversal synthesizer: emits table-filling loop nests for ADP grammars"
)]
struct Cli {
    /// Grammar manifest (.json)
    manifest: PathBuf,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Cpp)]
    emit: EmitStage,

    /// Tiled OpenMP variant
    #[arg(long, value_enum, default_value_t = Parallel::Auto)]
    parallel: Parallel,

    /// Default tile side of the parallel variant
    #[arg(long, default_value_t = 32)]
    tile_size: u32,

    /// Emit the checkpoint-resumable variant
    #[arg(long)]
    checkpoint: bool,

    /// Name of the generated function
    #[arg(long, default_value = "cyk")]
    function: String,

    /// Sequence length per track, for --emit trace (repeatable)
    #[arg(long = "length", value_name = "N")]
    lengths: Vec<usize>,

    /// Build-time symbol for --emit trace, e.g. _OPENMP or TILE_SIZE=4 (repeatable)
    #[arg(short = 'D', long = "define", value_name = "SYM[=V]")]
    defines: Vec<String>,

    /// Print passes and timing
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "cyksynth=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn sim_config(cli: &Cli, state: &CompilationState) -> Result<SimConfig, String> {
    if cli.lengths.len() != state.grammar.track_count() {
        return Err(format!(
            "--emit trace needs one --length per track ({} given, {} tracks)",
            cli.lengths.len(),
            state.grammar.track_count()
        ));
    }
    let mut cfg = SimConfig::for_grammar(&state.grammar, &cli.lengths);
    for def in &cli.defines {
        cfg = match def.split_once('=') {
            Some((sym, value)) => {
                let v = value
                    .parse()
                    .map_err(|_| format!("--define {def}: value is not an integer"))?;
                cfg.define_value(sym, v)
            }
            None => cfg.define(def),
        };
    }
    if let Some(cp) = &state.options.checkpoint {
        cfg = cfg.checkpoint_state(&state.grammar, cp, false);
    }
    Ok(cfg)
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // ── Load manifest ──
    let (grammar, text) = match cyksynth::grammar::load_manifest(&cli.manifest) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("cyksynth: error: {}", e);
            std::process::exit(2);
        }
    };

    let mut options = SynthOptions::default()
        .with_parallel(cli.parallel.into())
        .with_tile_size(cli.tile_size);
    options.function_name = cli.function.clone();
    if cli.checkpoint {
        options = options.with_checkpoint();
    }

    // ── Build info needs no synthesis ──
    if let EmitStage::BuildInfo = cli.emit {
        let json = compute_provenance(&text, &options).and_then(|p| p.to_json());
        match json {
            Ok(json) => write_output(&cli, &json),
            Err(e) => {
                eprintln!("cyksynth: error: build info: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // ── Run pipeline ──
    let terminal = match cli.emit {
        EmitStage::Cpp => PassId::Render,
        EmitStage::Trace | EmitStage::BuildInfo => PassId::Assemble,
    };
    let mut state = CompilationState::new(grammar, options);
    let result = run_pipeline(&mut state, terminal, |pass, diags| {
        for d in diags {
            eprintln!("cyksynth: {}", d);
        }
        tracing::debug!(%pass, diagnostics = diags.len(), "pass finished");
    });
    if let Err(e) = result {
        eprintln!("cyksynth: error: {}", e);
        std::process::exit(1);
    }

    match cli.emit {
        EmitStage::Cpp => match &state.rendered {
            Some(text) => write_output(&cli, text),
            None => {
                eprintln!("cyksynth: error: render produced no output");
                std::process::exit(1);
            }
        },
        EmitStage::Trace => {
            let Some(function) = &state.function else {
                eprintln!("cyksynth: error: assemble produced no function");
                std::process::exit(1);
            };
            let cfg = match sim_config(&cli, &state) {
                Ok(cfg) => cfg,
                Err(msg) => {
                    eprintln!("cyksynth: error: {}", msg);
                    std::process::exit(2);
                }
            };
            match simulate(function, &cfg) {
                Ok(trace) => {
                    let mut out = String::new();
                    for event in &trace.events {
                        out.push_str(&event.to_string());
                        out.push('\n');
                    }
                    write_output(&cli, &out);
                }
                Err(e) => {
                    eprintln!("cyksynth: error: simulation: {}", e);
                    std::process::exit(1);
                }
            }
        }
        EmitStage::BuildInfo => {}
    }
}

fn write_output(cli: &Cli, text: &str) {
    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("cyksynth: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
            if cli.verbose {
                eprintln!("cyksynth: wrote {}", path.display());
            }
        }
        None => print!("{}", text),
    }
}
