use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "cas_server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "rust-us")]
#[command(about = "Client Application Server: handles one broker-handed-off client connection")]
#[command(long_about = None)]
pub struct CliArgs {
    /// Path to the server's configuration file (TOML or YAML).
    #[arg(short, long, help = "Path to loaded configuration file", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "enable debug logging", default_value_t = false)]
    pub debug: bool,
}
