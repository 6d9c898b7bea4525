//! # allpairs CLI
//!
//! All-pairs shortest paths over an adjacency file, computed serially, with
//! worker threads, or across cooperating ranks:
//!
//! ```text
//! allpairs serial graph.txt
//! allpairs parallel --threads 8 graph.txt
//! allpairs distributed --local --world-size 4 graph.txt
//! allpairs distributed --rank 0 --world-size 3 --coordinator 0.0.0.0:7700 graph.txt
//! allpairs generate --nodes 500 --seed 7 graph.txt
//! ```

use clap::Parser;
use log::error;

mod cli;

fn main() {
    let cli = cli::Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = cli.run() {
        error!("{e:#}");
        std::process::exit(1);
    }
}
