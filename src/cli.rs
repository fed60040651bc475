use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "lcr",
    version,
    about = "Terminal dashboard for a local container registry and the workloads it feeds."
)]
pub struct CliArgs {
    /// Namespace for workloads and deployments
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Workload refresh interval in milliseconds
    #[arg(long)]
    pub refresh_ms: Option<u64>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write logs to this file while the dashboard is open
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Read configuration from this file instead of the usual locations
    #[arg(long)]
    pub config: Option<PathBuf>,
}
