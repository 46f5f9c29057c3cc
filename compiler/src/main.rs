use clap::Parser;
use std::path::PathBuf;

use pdim::parallel_dims::RepresentativePolicy;
use pdim::pass::PassId;
use pdim::pipeline::{compute_provenance, run_pipeline, CompilationState, PipelineOptions};

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    /// Parsed syntax tree (debug format)
    Ast,
    /// Lowered fusion with compute-at sets
    Fusion,
    /// Parallel dimension map, one line per used axis
    Dims,
    /// Parallel dimension map as JSON
    Json,
    /// Source hash and dimension-map fingerprint
    BuildInfo,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Representative {
    First,
    #[value(name = "lowest_id")]
    LowestId,
    Launch,
}

impl From<Representative> for RepresentativePolicy {
    fn from(r: Representative) -> Self {
        match r {
            Representative::First => RepresentativePolicy::FirstCollected,
            Representative::LowestId => RepresentativePolicy::LowestId,
            Representative::Launch => RepresentativePolicy::LaunchParam,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "pdim",
    version,
    about = "Resolves the launch dimension of every parallel axis in a fused GPU kernel"
)]
struct Cli {
    /// Input .fus fusion description
    source: PathBuf,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Dims)]
    emit: EmitStage,

    /// Dimension choice for parallel axes shared by unequal domains
    /// (overrides `set representative`)
    #[arg(long, value_enum)]
    representative: Option<Representative>,

    /// Output file path (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print compiler phases and timing
    #[arg(long)]
    verbose: bool,
}

fn write_output(cli: &Cli, text: &str) {
    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("pdim: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
            if cli.verbose {
                eprintln!("pdim: wrote {}", path.display());
            }
        }
        None => print!("{}", text),
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        eprintln!("pdim: source = {}", cli.source.display());
        eprintln!("pdim: emit   = {:?}", cli.emit);
    }

    // ── Read and parse source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("pdim: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    let parse_result = pdim::parser::parse(&source);
    if !parse_result.errors.is_empty() {
        for err in &parse_result.errors {
            eprintln!("pdim: parse error: {}", err);
        }
        std::process::exit(1);
    }
    let program = match parse_result.program {
        Some(p) => p,
        None => {
            eprintln!("pdim: parse failed with no output");
            std::process::exit(1);
        }
    };

    if cli.verbose {
        eprintln!("pdim: parsed {} statements", program.statements.len());
    }

    if matches!(cli.emit, EmitStage::Ast) {
        write_output(&cli, &format!("{:#?}\n", program));
        return;
    }

    // ── Passes ──
    let terminal = match cli.emit {
        EmitStage::Fusion => PassId::ComputeAt,
        _ => PassId::ParallelDims,
    };
    let overrides = PipelineOptions {
        representative: cli.representative.map(Into::into),
    };
    let mut state = CompilationState::new(program);
    let result = run_pipeline(&mut state, terminal, &overrides, cli.verbose, |_, diags| {
        for diag in diags {
            eprintln!("pdim: {}", diag);
        }
    });
    if result.is_err() {
        std::process::exit(1);
    }

    // ── Emit ──
    let text = match cli.emit {
        EmitStage::Ast => unreachable!(),
        EmitStage::Fusion => match (&state.fusion, &state.compute_at) {
            (Some(fusion), Some(map)) => format!("{}{}", fusion, map.describe(fusion)),
            _ => String::new(),
        },
        EmitStage::Dims => state.dim_map.as_ref().map(|m| m.to_string()).unwrap_or_default(),
        EmitStage::Json => {
            let entries = state.dim_map.as_ref().map(|m| m.entries()).unwrap_or_default();
            match serde_json::to_string_pretty(&entries) {
                Ok(json) => json + "\n",
                Err(e) => {
                    eprintln!("pdim: error: {}", e);
                    std::process::exit(2);
                }
            }
        }
        EmitStage::BuildInfo => {
            let provenance = compute_provenance(&source, state.dim_map.as_ref());
            provenance.to_json()
        }
    };
    write_output(&cli, &text);
}
