use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{SyncError, SyncResult};
use crate::model::analysis::AnalysisState;
use crate::model::finding::Finding;
use crate::model::work_item::WorkItemState;

use super::table_policy::TablePolicy;
use super::wrapper::{AnalysisWrapper, WorkItemWrapper};

/// Hook points a policy may replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverridePoint {
    ProcessFinding,
    NewWorkItem,
    WorkItemToAnalysis,
    AnalysisToWorkItem,
    PostMapWorkItem,
}

impl OverridePoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverridePoint::ProcessFinding => "process_finding",
            OverridePoint::NewWorkItem => "new_work_item",
            OverridePoint::WorkItemToAnalysis => "map_work_item_to_analysis",
            OverridePoint::AnalysisToWorkItem => "map_analysis_to_work_item",
            OverridePoint::PostMapWorkItem => "post_map_work_item",
        }
    }
}

impl fmt::Display for OverridePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides which findings are synced and how states translate between the two systems.
///
/// Every method has a default, so a policy only implements the hooks it replaces
/// and reports them through [`MappingPolicy::override_points`].
pub trait MappingPolicy: Send + Sync {
    fn name(&self) -> &str;

    fn override_points(&self) -> Vec<OverridePoint> {
        Vec::new()
    }

    /// Checked once at startup; an error aborts the run before any finding is touched.
    fn validate(&self) -> SyncResult<()> {
        Ok(())
    }

    /// Pre-filter: findings for which this returns false are skipped.
    fn process_finding(&self, _finding: &Finding) -> bool {
        true
    }

    /// Called on the wrapper of a work item about to be created.
    fn new_work_item(&self, _finding: &Finding, _work_item: &mut WorkItemWrapper) {}

    fn map_work_item_to_analysis(&self, work_item: &WorkItemWrapper, analysis: &mut AnalysisWrapper) {
        let (state, suppressed) = work_item_state_to_analysis(work_item.state());
        analysis.set_state(state);
        analysis.set_suppressed(suppressed);
    }

    fn map_analysis_to_work_item(&self, analysis: &AnalysisWrapper, work_item: &mut WorkItemWrapper) {
        work_item.set_state(analysis_state_to_work_item(analysis.state()));
    }

    /// Runs after [`MappingPolicy::map_analysis_to_work_item`], before changes are read.
    fn post_map_work_item(
        &self,
        _finding: &Finding,
        _analysis: &AnalysisWrapper,
        _work_item: &mut WorkItemWrapper,
    ) {
    }
}

/// `New` clears the triage, `Closed`/`Removed` resolve and suppress, anything else is in triage.
pub fn work_item_state_to_analysis(state: WorkItemState) -> (AnalysisState, bool) {
    match state {
        WorkItemState::New => (AnalysisState::NotSet, false),
        WorkItemState::Closed | WorkItemState::Removed => (AnalysisState::Resolved, true),
        WorkItemState::Active | WorkItemState::Resolved => (AnalysisState::InTriage, false),
    }
}

pub fn analysis_state_to_work_item(state: AnalysisState) -> WorkItemState {
    match state {
        AnalysisState::InTriage | AnalysisState::Exploitable => WorkItemState::Active,
        AnalysisState::Resolved | AnalysisState::FalsePositive | AnalysisState::NotAffected => {
            WorkItemState::Closed
        }
        AnalysisState::NotSet => WorkItemState::New,
    }
}

/// The built-in state mapping, with every finding processed.
#[derive(Debug, Default)]
pub struct DefaultPolicy;

impl MappingPolicy for DefaultPolicy {
    fn name(&self) -> &str {
        "default"
    }
}

/// Resolves `--mapper`: a built-in policy name or a path to a policy file.
pub fn load_policy(selector: Option<&str>) -> SyncResult<Arc<dyn MappingPolicy>> {
    let policy: Arc<dyn MappingPolicy> = match selector {
        None | Some("default") => Arc::new(DefaultPolicy),
        Some(other) => {
            let path = Path::new(other);
            if !path.is_file() {
                return Err(SyncError::Config(format!(
                    "mapping policy '{other}' is neither a built-in policy nor a readable policy file"
                )));
            }
            Arc::new(TablePolicy::from_file(path)?)
        }
    };

    policy.validate()?;

    let points = policy.override_points();
    if points.is_empty() {
        tracing::info!("Mapping policy '{}' uses the built-in mapping", policy.name());
    } else {
        let names: Vec<&str> = points.iter().map(OverridePoint::as_str).collect();
        tracing::info!(
            "Mapping policy '{}' overrides: {}",
            policy.name(),
            names.join(", ")
        );
    }

    Ok(policy)
}
