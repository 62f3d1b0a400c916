//! Memory-swap rewrite CLI.
//!
//! Provides the `memswap` binary. `rewrite` runs the swap-insertion and
//! ordering passes over a training graph serialized as JSON; `inspect`
//! lists the nodes the pass would swap, with their rank gaps, without
//! changing anything.
//!
//! Pass options come from the `MEMSWAP_*` environment variables, then
//! from command-line flags, which take precedence.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;

use memswap_core::{KernelRegistry, TrainingGraph};
use memswap_passes::candidate::first_long_lived_edge;
use memswap_passes::topology::TopologyIndexer;
use memswap_passes::{run_memory_swap, MemorySwapConfig, PassError};

/// Memory-swap graph rewriting tools.
#[derive(Parser)]
#[command(name = "memswap", about = "Memory-swap graph rewriting tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Insert swap-out/swap-in pairs and write the rewritten graph.
    Rewrite {
        /// Path to the input graph (JSON).
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the rewritten graph (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Minimum rank gap, exclusive, for a backward read to be swapped.
        #[arg(short, long)]
        min_distance: Option<usize>,

        /// Restrict swap origins to this op type. Repeatable.
        #[arg(short, long = "target-op")]
        target_op: Vec<String>,
    },

    /// List swap candidates without rewriting.
    Inspect {
        /// Path to the input graph (JSON).
        #[arg(short, long)]
        input: PathBuf,

        /// Minimum rank gap, exclusive, for a backward read to be swapped.
        #[arg(short, long)]
        min_distance: Option<usize>,
    },
}

/// One row of `inspect` output.
#[derive(Serialize)]
struct CandidateRow {
    node: String,
    op: String,
    rank: usize,
    consumer: String,
    gap: usize,
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Rewrite {
            input,
            output,
            min_distance,
            target_op,
        } => run_rewrite(&input, output.as_deref(), min_distance, target_op),
        Commands::Inspect {
            input,
            min_distance,
        } => run_inspect(&input, min_distance),
    };
    process::exit(exit_code);
}

/// Exit code for a pass-layer error: 3 for bad configuration input, 1 for
/// everything else.
fn exit_code(err: &PassError) -> i32 {
    match err {
        PassError::InvalidConfig { .. } => 3,
        _ => 1,
    }
}

/// Overlays command-line flags on an environment-derived config.
fn apply_flags(
    mut config: MemorySwapConfig,
    min_distance: Option<usize>,
    target_op: Vec<String>,
) -> MemorySwapConfig {
    if let Some(distance) = min_distance {
        config.min_topo_distance = distance;
    }
    if !target_op.is_empty() {
        config.target_op_types = target_op;
    }
    config
}

/// Every swap node must resolve to a registered kernel and sit on the
/// slow memory tier.
fn check_swap_nodes(graph: &TrainingGraph) -> Result<(), String> {
    let registry = KernelRegistry::with_builtins();
    for id in graph.node_ids() {
        let Some(node) = graph.node(id).filter(|n| n.is_swap()) else {
            continue;
        };
        let def = registry
            .resolve(graph, id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("no kernel registered for swap node '{}'", node.name))?;
        if !node.placement.is_slow_tier() {
            return Err(format!(
                "swap node '{}' is placed on {:?}, not the slow tier",
                node.name, node.placement
            ));
        }
        tracing::debug!(node = %node.name, kernel = %def.op, version = def.since_version, "swap kernel resolved");
    }
    Ok(())
}

fn load_graph(path: &Path) -> Result<TrainingGraph, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read '{}': {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("failed to parse '{}': {}", path.display(), e))
}

/// Execute the rewrite subcommand.
///
/// Returns exit code: 0 = success, 1 = pass failure, 3 = I/O, parse or
/// configuration error.
fn run_rewrite(
    input: &Path,
    output: Option<&Path>,
    min_distance: Option<usize>,
    target_op: Vec<String>,
) -> i32 {
    let config = match MemorySwapConfig::from_env() {
        Ok(c) => apply_flags(c, min_distance, target_op),
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code(&e);
        }
    };

    let mut graph = match load_graph(input) {
        Ok(g) => g,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 3;
        }
    };

    let report = match run_memory_swap(&mut graph, &config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Memory swap failed: {}", e);
            return exit_code(&e);
        }
    };

    if let Err(msg) = check_swap_nodes(&graph) {
        eprintln!("Error: {}", msg);
        return 1;
    }

    let json = match serde_json::to_string_pretty(&graph) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: failed to serialize graph: {}", e);
            return 3;
        }
    };
    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, json) {
                eprintln!("Error: failed to write '{}': {}", path.display(), e);
                return 3;
            }
            // Report goes to stdout when the graph does not.
            let summary = serde_json::to_string_pretty(&report).unwrap_or_else(|e| {
                format!("{{\"error\": \"failed to serialize report: {}\"}}", e)
            });
            println!("{}", summary);
        }
        None => println!("{}", json),
    }
    0
}

/// Execute the inspect subcommand.
///
/// Returns exit code: 0 = success, 1 = analysis failure, 3 = I/O, parse or
/// configuration error.
fn run_inspect(input: &Path, min_distance: Option<usize>) -> i32 {
    let config = match MemorySwapConfig::from_env() {
        Ok(c) => apply_flags(c, min_distance, Vec::new()),
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code(&e);
        }
    };

    let graph = match load_graph(input) {
        Ok(g) => g,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 3;
        }
    };

    let mut ranks = TopologyIndexer::new();
    let mut rows = Vec::new();
    for id in graph.node_ids() {
        let Some(node) = graph.node(id) else {
            continue;
        };
        if !config.targets(&node.op.op_type) {
            continue;
        }
        let found = match first_long_lived_edge(&graph, id, config.min_topo_distance, &mut ranks) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };
        let Some((edge, gap)) = found else {
            continue;
        };
        let rank = match ranks.rank_of(&graph, id) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };
        rows.push(CandidateRow {
            node: node.name.clone(),
            op: node.op.to_string(),
            rank,
            consumer: graph
                .node(edge.target)
                .map(|n| n.name.clone())
                .unwrap_or_default(),
            gap,
        });
    }

    let json = serde_json::to_string_pretty(&rows)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize candidates: {}\"}}", e));
    println!("{}", json);
    0
}
