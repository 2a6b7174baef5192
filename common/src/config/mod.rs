mod config;
pub mod load_style;

use std::fs::File;
use std::io::Read;
use std::path::Path;

pub use config::{AppServerConfig, BaseConfig, DispatchConfig, HandleConfig};
use load_style::Format;

use crate::err::CasError;

/// Reads an [`AppServerConfig`] from a TOML or YAML file. The two
/// mandatory environment variables from §6 (`APPL_SERVER_SHM_KEY`,
/// `AS_ID`) are read separately by the caller, not through this path.
pub fn read_config<P: AsRef<Path>>(path: P, format: Format) -> Result<AppServerConfig, CasError> {
    let mut file = File::open(path.as_ref())?;
    let mut s = String::new();
    file.read_to_string(&mut s)
        .map_err(|e| CasError::Internal(format!("reading config file: {e}")))?;

    match format {
        Format::Toml => toml::from_str(&s).map_err(|e| CasError::Internal(format!("parsing TOML config: {e}"))),
        Format::Yaml => serde_yaml::from_str(&s).map_err(|e| CasError::Internal(format!("parsing YAML config: {e}"))),
    }
}

/// §6: `APPL_SERVER_SHM_KEY` (int, mandatory) and `AS_ID` (int,
/// mandatory). Missing either is a fatal startup error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerEnv {
    pub shm_key: i32,
    pub as_id: i32,
}

impl BrokerEnv {
    pub fn from_process_env() -> Result<Self, CasError> {
        let shm_key = read_required_env_int("APPL_SERVER_SHM_KEY")?;
        let as_id = read_required_env_int("AS_ID")?;
        Ok(BrokerEnv { shm_key, as_id })
    }
}

fn read_required_env_int(name: &str) -> Result<i32, CasError> {
    let raw = std::env::var(name)
        .map_err(|_| CasError::Internal(format!("missing mandatory environment variable {name}")))?;
    raw.trim()
        .parse::<i32>()
        .map_err(|_| CasError::Internal(format!("environment variable {name} is not an integer: {raw}")))
}
