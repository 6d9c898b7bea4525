//! Solver configuration
//!
//! Loaded from a TOML file and then overridden by command line flags:
//!
//! ```toml
//! strategy = "distributed"
//! threads = 8
//! ranks = 4
//! rounds = "per-rank"          # or "per_rank", { fixed = 5 }, { until_stable = { max_rounds = 16 } }
//!
//! [transport]
//! connect_retries = 50
//! retry_delay_ms = 100
//! max_vertices = 16384         # caps the size of a received frame
//! ```

use std::fmt;
use std::path::Path;

use allpairs_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::distributed::RoundPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Serial,
    #[default]
    Parallel,
    Distributed,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Serial => write!(f, "serial"),
            Strategy::Parallel => write!(f, "parallel"),
            Strategy::Distributed => write!(f, "distributed"),
        }
    }
}

/// How peers reach the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_retries: u32,
    pub retry_delay_ms: u64,
    /// Largest graph a link will carry; frames beyond `max_vertices`² weights are refused
    pub max_vertices: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_retries: 50,
            retry_delay_ms: 100,
            max_vertices: 16_384,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub strategy: Strategy,
    /// Worker threads for the parallel engine
    pub threads: usize,
    /// Ranks for the distributed engine
    pub ranks: usize,
    pub rounds: RoundPolicy,
    pub transport: TransportConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            threads: num_cpus::get().max(1),
            ranks: 1,
            rounds: RoundPolicy::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl SolverConfig {
    pub fn serial() -> Self {
        Self {
            strategy: Strategy::Serial,
            ..Self::default()
        }
    }

    pub fn parallel(threads: usize) -> Self {
        Self {
            strategy: Strategy::Parallel,
            threads,
            ..Self::default()
        }
    }

    pub fn distributed(ranks: usize, rounds: RoundPolicy) -> Self {
        Self {
            strategy: Strategy::Distributed,
            ranks,
            rounds,
            ..Self::default()
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::InvalidConfig("threads must be at least 1".to_string()));
        }
        if self.ranks == 0 {
            return Err(Error::InvalidConfig("ranks must be at least 1".to_string()));
        }
        if self.transport.max_vertices == 0 {
            return Err(Error::InvalidConfig(
                "transport.max_vertices must be at least 1".to_string(),
            ));
        }
        self.rounds.validate()
    }
}
