use std::path::PathBuf;

use clap::Parser;

use crate::model::finding::FindingFilter;

/// Synchronise Dependency-Track findings with Azure DevOps work items.
///
/// Runs in dry-run mode unless `--apply` is given.
#[derive(Parser, Debug)]
#[command(name = "dt-azure-sync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Perform remote changes instead of only logging them
    #[arg(long)]
    pub apply: bool,

    /// Re-create work items whose link points at a missing work item
    #[arg(long)]
    pub fix_references: bool,

    /// Minimum CVSS score, applied to both v2 and v3
    #[arg(long, value_name = "SCORE")]
    pub cvss_min_score: Option<f64>,

    /// Minimum CVSS v2 score (overrides --cvss-min-score)
    #[arg(long, value_name = "SCORE")]
    pub cvss2_min_score: Option<f64>,

    /// Minimum CVSS v3 score (overrides --cvss-min-score)
    #[arg(long, value_name = "SCORE")]
    pub cvss3_min_score: Option<f64>,

    /// Also load suppressed findings
    #[arg(long)]
    pub load_suppressed: bool,

    /// Also load findings of inactive projects
    #[arg(long)]
    pub load_inactive: bool,

    /// Mapping policy: a built-in name or a policy TOML file
    #[arg(long, value_name = "NAME|FILE")]
    pub mapper: Option<String>,

    /// Description template for new work items
    #[arg(long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Config file (default: ~/.dt-azure-sync/config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `dt_azure_sync=debug`. Falls back to RUST_LOG.
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn finding_filter(&self) -> FindingFilter {
        let shared = self.cvss_min_score.unwrap_or(0.0);
        FindingFilter {
            min_cvss2: self.cvss2_min_score.unwrap_or(shared),
            min_cvss3: self.cvss3_min_score.unwrap_or(shared),
            include_suppressed: self.load_suppressed,
            include_inactive: self.load_inactive,
        }
    }
}
