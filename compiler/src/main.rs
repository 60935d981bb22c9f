use clap::Parser;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use rca::boundary::{ControlReactionSpec, Coordination, FederatePartition};
use rca::diag::Diagnostic;
use rca::emit::{emit_all, emitter_for, EmitContext, EmitTarget};
use rca::model::Program;
use rca::pass::PassId;
use rca::pipeline::{run_analysis, AnalysisOptions, AnalysisState};
use rca::time::{describe_errors, TimeValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Priority table followed by control reactions
    All,
    Priorities,
    Controls,
    Graph,
    Dot,
    Json,
    BuildInfo,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum TargetArg {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CoordinationArg {
    Centralized,
    Decentralized,
}

#[derive(Parser, Debug)]
#[command(
    name = "rca",
    version,
    about = "Reactor causality analyzer: dependency graph, priorities and federated boundary specs"
)]
struct Cli {
    /// Elaborated program model (JSON)
    program: PathBuf,

    /// Federation file (JSON) assigning reactors to federates
    #[arg(long)]
    federation: Option<PathBuf>,

    /// What to print
    #[arg(long, value_enum, default_value_t = EmitStage::All)]
    emit: EmitStage,

    /// Emitter for priorities and control reactions
    #[arg(long, value_enum, default_value_t = TargetArg::Text)]
    target: TargetArg,

    /// Coordination mode (overrides the federation file)
    #[arg(long, value_enum)]
    coordination: Option<CoordinationArg>,

    /// Assumed network latency, e.g. "5 msec" (overrides the federation file)
    #[arg(long, value_parser = parse_time_arg)]
    network_latency: Option<TimeValue>,

    /// Safe-to-process offset for reactions that declare none
    #[arg(long, value_parser = parse_time_arg)]
    default_stp: Option<TimeValue>,

    /// Log pass timings and summary counts
    #[arg(long)]
    verbose: bool,
}

fn parse_time_arg(s: &str) -> Result<TimeValue, String> {
    s.parse::<TimeValue>().map_err(|errors| describe_errors(&errors))
}

/// `--federation` file contents.
#[derive(Debug, Default, Deserialize)]
struct FederationFile {
    #[serde(default)]
    coordination: Option<Coordination>,
    #[serde(default)]
    network_latency: Option<TimeValue>,
    #[serde(default)]
    default_stp: Option<TimeValue>,
    /// Hierarchical reactor name → federate name.
    #[serde(default)]
    federates: BTreeMap<String, String>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_or_exit(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("rca: error: {}: {}", path.display(), e);
            std::process::exit(2);
        }
    }
}

fn json_or_exit(text: Result<String, serde_json::Error>) -> String {
    match text {
        Ok(text) => text,
        Err(e) => {
            eprintln!("rca: error: cannot serialize output: {}", e);
            std::process::exit(2);
        }
    }
}

fn terminal_for(emit: EmitStage) -> PassId {
    match emit {
        EmitStage::Graph => PassId::BuildGraph,
        EmitStage::Dot => PassId::DetectCycles,
        EmitStage::Priorities => PassId::AssignPriorities,
        EmitStage::All | EmitStage::Controls | EmitStage::Json | EmitStage::BuildInfo => {
            PassId::ClassifyBoundaries
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!(program = %cli.program.display(), emit = ?cli.emit, "rca starting");

    // ── Read inputs ──
    let program = match Program::from_json(&read_or_exit(&cli.program)) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("rca: error: {}: invalid program model: {}", cli.program.display(), e);
            std::process::exit(2);
        }
    };
    debug!(reactors = program.reactor_count(), "program model loaded");

    let federation = match &cli.federation {
        Some(path) => match serde_json::from_str::<FederationFile>(&read_or_exit(path)) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("rca: error: {}: invalid federation file: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => FederationFile::default(),
    };

    let mut partition = FederatePartition::single();
    for (reactor, federate) in &federation.federates {
        partition.assign_path(reactor, federate);
    }

    let coordination = match cli.coordination {
        Some(CoordinationArg::Centralized) => Coordination::Centralized,
        Some(CoordinationArg::Decentralized) => Coordination::Decentralized,
        None => federation.coordination.unwrap_or_default(),
    };
    let terminal = terminal_for(cli.emit);
    let options = AnalysisOptions {
        coordination,
        network_latency: cli.network_latency.or(federation.network_latency),
        default_stp: cli.default_stp.or(federation.default_stp),
        terminal,
    };

    // ── Run the analysis ──
    let mut state = AnalysisState::new(&program, partition, options);
    let result = run_analysis(&mut state, terminal, |_, diags: &[Diagnostic]| {
        for diag in diags {
            eprintln!("rca: {}", diag);
        }
    });

    // Graph views are useful precisely when the analysis failed.
    match cli.emit {
        EmitStage::Graph => {
            match &state.graph {
                Some(graph) => print!("{}", graph),
                None => std::process::exit(1),
            }
            return;
        }
        EmitStage::Dot => {
            match (&state.graph, &state.index) {
                (Some(graph), Some(index)) => {
                    print!("{}", rca::dot::emit_dot(graph, index, state.cycles.as_ref()))
                }
                _ => std::process::exit(1),
            }
            return;
        }
        _ => {}
    }

    if result.is_err() {
        std::process::exit(1);
    }

    let (Some(index), Some(table)) = (state.index.as_ref(), state.priorities.as_ref()) else {
        std::process::exit(1);
    };
    let ctx = EmitContext {
        index,
        partition: &state.partition,
    };
    let target = match cli.target {
        TargetArg::Text => EmitTarget::Text,
        TargetArg::Json => EmitTarget::Json,
    };
    let controls: &[ControlReactionSpec] =
        match (&state.boundaries, state.federated_output_blocked) {
            (Some(report), false) => report.controls.as_slice(),
            _ => &[],
        };

    match cli.emit {
        EmitStage::All => print!("{}", emit_all(emitter_for(target), &ctx, Some(table), controls)),
        EmitStage::Priorities => {
            print!("{}", emit_all(emitter_for(target), &ctx, Some(table), &[]))
        }
        EmitStage::Controls => print!("{}", emit_all(emitter_for(target), &ctx, None, controls)),
        EmitStage::Json => {
            let doc = serde_json::json!({
                "priorities": table.iter().map(|(r, p)| serde_json::json!({
                    "reaction": index.reaction_name(r),
                    "rank": p.rank,
                    "level": p.level,
                })).collect::<Vec<_>>(),
                "boundaries": state.boundaries,
                "diagnostics": state.diagnostics,
            });
            println!("{}", json_or_exit(serde_json::to_string_pretty(&doc)));
        }
        EmitStage::BuildInfo => {
            if let Some(prov) = &state.provenance {
                print!("{}", json_or_exit(prov.to_json()));
            }
        }
        EmitStage::Graph | EmitStage::Dot => {}
    }

    if state.federated_output_blocked {
        std::process::exit(1);
    }
}
