//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::observability::logging::LogFormat;

/// Route requests to Consul-registered services by the first label of
/// their host name.
#[derive(Debug, Parser)]
#[command(name = "consul-gateway", version, about, long_about = None)]
#[command(override_usage = "consul-gateway [OPTIONS] [[PROTOCOL] ADDRESS]")]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Where to listen when no socket is passed in: `ADDRESS` (tcp) or
    /// `PROTOCOL ADDRESS`.
    #[arg(value_name = "LISTEN", num_args = 0..=2)]
    pub listen: Vec<String>,
}
