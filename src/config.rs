use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::solver::SolveOptions;

pub const BIND_ADDR_VAR: &str = "SOLVER_BIND_ADDR";
pub const DATA_DIR_VAR: &str = "SOLVER_DATA_DIR";
pub const SEED_VAR: &str = "SOLVER_SEED";
pub const TIME_LIMIT_VAR: &str = "SOLVER_TIME_LIMIT_SECS";

/// Service settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// Used when a request does not carry its own options.
    pub default_options: SolveOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_dir: PathBuf::from("data"),
            default_options: SolveOptions::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable lookup; unset variables keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(addr) = lookup(BIND_ADDR_VAR) {
            config.bind_addr = parse(BIND_ADDR_VAR, addr)?;
        }
        if let Some(dir) = lookup(DATA_DIR_VAR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(seed) = lookup(SEED_VAR) {
            config.default_options.seed = parse(SEED_VAR, seed)?;
        }
        if let Some(secs) = lookup(TIME_LIMIT_VAR) {
            config.default_options.time_limit_secs = Some(parse(TIME_LIMIT_VAR, secs)?);
        }
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value })
}
