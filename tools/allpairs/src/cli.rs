//! CLI commands for allpairs

use std::path::{Path, PathBuf};

use allpairs_core::{
    solve, write_graph, DistributedEngine, GeneratorConfig, Graph, ParallelStats, RoundPolicy,
    Report, Solution, SolverConfig, Strategy, TcpCommunicator, TransportConfig,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};

#[derive(Parser)]
#[command(name = "allpairs")]
#[command(version)]
#[command(about = "All-pairs shortest paths with the Floyd-Warshall algorithm", long_about = None)]
pub struct Cli {
    /// TOML solver configuration; command line flags override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct OutputArgs {
    /// Print only the summary, not the distance matrix
    #[arg(long)]
    pub no_matrix: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Single-threaded reference computation
    Serial {
        /// Adjacency file, one line per vertex
        input: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Row-partitioned worker threads
    Parallel {
        /// Adjacency file, one line per vertex
        input: PathBuf,

        /// Worker threads (defaults to the config file, then the CPU count)
        #[arg(short, long)]
        threads: Option<usize>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Ranks splitting the intermediate vertices, in-process or over TCP
    Distributed {
        /// Adjacency file, one line per vertex (every rank reads it)
        input: PathBuf,

        /// Run every rank as a thread of this process
        #[arg(long, conflicts_with_all = ["rank", "coordinator"])]
        local: bool,

        /// Number of ranks
        #[arg(short = 'n', long)]
        world_size: Option<usize>,

        /// This process's rank; 0 is the coordinator
        #[arg(long, requires = "coordinator")]
        rank: Option<usize>,

        /// Coordinator address (rank 0 binds it, the others connect)
        #[arg(long, requires = "rank")]
        coordinator: Option<String>,

        /// classic, per-rank, stable, stable:<max> or a fixed round count
        #[arg(long)]
        rounds: Option<RoundPolicy>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Write a random adjacency file
    Generate {
        /// Output file
        output: PathBuf,

        #[arg(long, default_value_t = 100)]
        nodes: usize,

        /// Outgoing edges per node (the mean with --random-edges)
        #[arg(long, default_value_t = 5)]
        edges: usize,

        /// Vary the edge count per node
        #[arg(long)]
        random_edges: bool,

        #[arg(long, default_value_t = 1)]
        min_weight: u32,

        #[arg(long, default_value_t = 100)]
        max_weight: u32,

        /// Seed for a reproducible graph
        #[arg(long)]
        seed: Option<u64>,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;

        match self.command {
            Commands::Serial { input, output } => {
                let graph = load_graph(&input)?;
                let config = SolverConfig {
                    strategy: Strategy::Serial,
                    ..config
                };
                let solution = solve(&graph, &config)?;
                print_solution(&graph, &solution, output);
            }
            Commands::Parallel {
                input,
                threads,
                output,
            } => {
                let graph = load_graph(&input)?;
                let config = SolverConfig {
                    strategy: Strategy::Parallel,
                    threads: threads.unwrap_or(config.threads),
                    ..config
                };
                let solution = solve(&graph, &config)?;
                print_solution(&graph, &solution, output);
                if let Some(stats) = &solution.parallel {
                    print_thread_table(stats);
                }
            }
            Commands::Distributed {
                input,
                local,
                world_size,
                rank,
                coordinator,
                rounds,
                output,
            } => {
                let graph = load_graph(&input)?;
                let rounds = rounds.unwrap_or(config.rounds);

                match (local, rank, coordinator) {
                    (false, Some(rank), Some(coordinator)) => {
                        let world_size = world_size
                            .context("--world-size is required when running as a rank")?;
                        run_rank(
                            &graph,
                            rank,
                            world_size,
                            &coordinator,
                            rounds,
                            &config.transport,
                            output,
                        )?;
                    }
                    _ => {
                        let config = SolverConfig {
                            strategy: Strategy::Distributed,
                            ranks: world_size.unwrap_or(config.ranks),
                            rounds,
                            ..config
                        };
                        let solution = solve(&graph, &config)?;
                        print_solution(&graph, &solution, output);
                    }
                }
            }
            Commands::Generate {
                output,
                nodes,
                edges,
                random_edges,
                min_weight,
                max_weight,
                seed,
            } => {
                let generator = GeneratorConfig {
                    nodes,
                    edges_per_node: edges,
                    random_edges,
                    min_weight,
                    max_weight,
                    seed,
                };
                let written = write_graph(&output, &generator)
                    .with_context(|| format!("failed to write {}", output.display()))?;
                println!("Wrote {written} nodes to {}", output.display());
            }
        }

        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<SolverConfig> {
    match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            SolverConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))
        }
        None => Ok(SolverConfig::default()),
    }
}

fn load_graph(path: &Path) -> Result<Graph> {
    let graph = Graph::from_path(path)
        .with_context(|| format!("failed to read graph from {}", path.display()))?;
    info!(
        "Loaded {}: {} vertices, {} edges",
        path.display(),
        graph.vertex_count(),
        graph.edge_count()
    );
    Ok(graph)
}

/// One rank of a multi-process run; only rank 0 prints the result
fn run_rank(
    graph: &Graph,
    rank: usize,
    world_size: usize,
    coordinator: &str,
    rounds: RoundPolicy,
    transport: &TransportConfig,
    output: OutputArgs,
) -> Result<()> {
    let comm = if rank == 0 {
        TcpCommunicator::coordinator(coordinator, world_size, transport)
            .with_context(|| format!("failed to coordinate on {coordinator}"))?
    } else {
        TcpCommunicator::connect(coordinator, rank, world_size, transport)
            .with_context(|| format!("rank {rank} failed to join {coordinator}"))?
    };

    let outcome = DistributedEngine::new(comm, rounds)?.run(graph)?;
    match outcome.matrix {
        Some(matrix) => {
            let solution = Solution {
                matrix,
                strategy: Strategy::Distributed,
                total_weight: graph.total_weight(),
                elapsed: outcome.elapsed,
                parallel: None,
                rounds: Some(outcome.rounds),
            };
            print_solution(graph, &solution, output);
        }
        None => info!(
            "Rank {rank} finished: k in {:?}, {} rounds, {:.3}s",
            outcome.k_range,
            outcome.rounds,
            outcome.elapsed.as_secs_f64()
        ),
    }
    Ok(())
}

fn print_solution(graph: &Graph, solution: &Solution, output: OutputArgs) {
    let report = Report::new(&solution.matrix, solution.total_weight);
    if !output.no_matrix {
        println!("{report}");
    }

    println!("Strategy: {}", solution.strategy);
    println!("Vertices: {}", graph.vertex_count());
    println!("Edges: {}", graph.edge_count());
    println!("Unreachable pairs: {}", report.unreachable_pairs());
    if let Some(rounds) = solution.rounds {
        println!("Rounds: {rounds}");
    }
    println!("Time: {:.3}s", solution.elapsed.as_secs_f64());
}

fn print_thread_table(stats: &ParallelStats) {
    println!();
    println!("{:<8}{:<16}{:>10}", "Thread", "Rows", "Time");
    for worker in &stats.workers {
        let rows = format!("{}..{}", worker.rows.start, worker.rows.end);
        println!(
            "{:<8}{:<16}{:>9.3}s",
            worker.thread_id,
            rows,
            worker.elapsed.as_secs_f64()
        );
    }
    if stats.skipped_reads() > 0 {
        println!("Skipped relaxations: {}", stats.skipped_reads());
    }
}
