use serde::{Deserialize, Serialize};

/// Which serialization the configuration file on disk is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    Toml,
    Yaml,
}

impl Default for Format {
    fn default() -> Self {
        Format::Toml
    }
}
