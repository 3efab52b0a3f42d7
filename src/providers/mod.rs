pub mod azure_devops;
pub mod dependency_track;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::analysis::{Analysis, AnalysisRequest};
use crate::model::finding::{Finding, FindingFilter};
use crate::model::work_item::{PatchOperation, WorkItem, WorkItemType};

#[async_trait]
pub trait FindingSource: Send + Sync {
    async fn load_findings(&self, filter: &FindingFilter) -> Result<Vec<Finding>>;
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Current analysis of a finding; an empty analysis if none was recorded yet.
    async fn get_analysis(&self, finding: &Finding) -> Result<Analysis>;
    async fn update_analysis(&self, request: &AnalysisRequest) -> Result<()>;
}

/// Work item tracking of one project.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    fn project(&self) -> &str;
    async fn get_work_item(&self, id: u64) -> Result<WorkItem, StoreError>;
    async fn create_work_item(
        &self,
        work_item_type: &str,
        document: &[PatchOperation],
    ) -> Result<WorkItem, StoreError>;
    async fn update_work_item(
        &self,
        id: u64,
        document: &[PatchOperation],
    ) -> Result<WorkItem, StoreError>;
    async fn list_work_item_types(&self) -> Result<Vec<WorkItemType>, StoreError>;
}

/// Work item type names tried in order when none is configured.
const PREFERRED_WORK_ITEM_TYPES: [&str; 3] = ["Issue", "Bug", "Task"];

/// Picks the type new work items are created with: the first preferred type the
/// project offers, else its first enabled type.
pub fn find_best_work_item_type(types: &[WorkItemType]) -> Option<&WorkItemType> {
    let enabled = || types.iter().filter(|t| !t.is_disabled);
    PREFERRED_WORK_ITEM_TYPES
        .iter()
        .find_map(|name| enabled().find(|t| t.name == *name))
        .or_else(|| enabled().next())
}
