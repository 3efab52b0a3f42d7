use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::Instrument;

use crate::error::{StoreError, SyncError, SyncResult};
use crate::model::analysis::{Analysis, AnalysisComment};
use crate::model::finding::{Finding, FindingFilter};
use crate::model::work_item::{pretty_changes, WorkItem};
use crate::providers::{self, AnalysisStore, FindingSource, WorkItemStore};
use crate::util::template::DescriptionTemplate;

use super::link;
use super::policy::MappingPolicy;
use super::recency::{self, Side};
use super::wrapper::{AnalysisWrapper, WorkItemWrapper};

/// Title of newly created work items unless the mapping policy sets one.
pub const DEFAULT_TITLE: &str = "New Finding";

/// Run-wide settings, fixed at startup.
pub struct SyncOptions {
    /// Issue remote mutations; otherwise only log what would change.
    pub apply: bool,
    /// Re-create work items whose link points at a work item that cannot be loaded.
    pub fix_references: bool,
    pub filter: FindingFilter,
    pub default_area_path: Option<String>,
    pub work_item_type: Option<String>,
    pub policy: Arc<dyn MappingPolicy>,
    pub template: DescriptionTemplate,
}

/// Per-run counters. In dry-run mode they count simulated changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub loaded: usize,
    pub filtered_out: usize,
    pub created: usize,
    pub work_items_updated: usize,
    pub analyses_updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct SyncEngine<'a> {
    options: &'a SyncOptions,
    findings: &'a dyn FindingSource,
    analyses: &'a dyn AnalysisStore,
    work_items: &'a dyn WorkItemStore,
    work_item_type: OnceCell<String>,
}

fn mutation_error(target: &'static str, err: impl fmt::Display) -> SyncError {
    SyncError::RemoteMutation {
        target,
        reason: format!("{err:#}"),
    }
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        options: &'a SyncOptions,
        findings: &'a dyn FindingSource,
        analyses: &'a dyn AnalysisStore,
        work_items: &'a dyn WorkItemStore,
    ) -> Self {
        Self {
            options,
            findings,
            analyses,
            work_items,
            work_item_type: OnceCell::new(),
        }
    }

    /// Syncs every finding that passes the filters. A failing finding is logged and
    /// counted; only failing to load the findings themselves aborts the run.
    pub async fn run(&self) -> SyncResult<SyncSummary> {
        let findings = self.findings.load_findings(&self.options.filter).await?;
        let mut summary = SyncSummary {
            loaded: findings.len(),
            ..Default::default()
        };

        for finding in &findings {
            if !self.options.policy.process_finding(finding) {
                tracing::debug!("Skipping {finding}: filtered out by mapping policy");
                summary.filtered_out += 1;
                continue;
            }

            let span = tracing::info_span!(
                "finding",
                project = %finding.project_label(),
                component = %finding.component_label(),
                vulnerability = %finding.vulnerability.vuln_id,
            );
            async {
                if let Err(e) = self.sync_finding(finding, &mut summary).await {
                    tracing::error!("{e:#}");
                    summary.failed += 1;
                }
            }
            .instrument(span)
            .await;
        }

        Ok(summary)
    }

    async fn sync_finding(&self, finding: &Finding, summary: &mut SyncSummary) -> SyncResult<()> {
        let mut analysis = self.analyses.get_analysis(finding).await?;

        let mut work_item = match link::read_work_item_url(&analysis) {
            None => self.create_linked(finding, &mut analysis, summary).await?,
            Some(url) => {
                let id = link::resolve_work_item_id(&url)?;
                match self.work_items.get_work_item(id).await {
                    Ok(item) => WorkItemWrapper::new(item),
                    // Only a rejected id breaks the link; transport failures fail the finding.
                    Err(StoreError::Other(e)) => {
                        return Err(SyncError::Remote(e.context(format!("loading work item {id}"))))
                    }
                    Err(e @ StoreError::NotFound(_)) => {
                        let err = SyncError::LinkResolution {
                            id,
                            reason: e.to_string(),
                        };
                        if !self.options.fix_references {
                            tracing::error!("{err}; leaving finding for manual review");
                            summary.skipped += 1;
                            return Ok(());
                        }
                        tracing::error!("{err}; creating a new work item");
                        self.create_linked(finding, &mut analysis, summary).await?
                    }
                }
            }
        };

        let id = work_item
            .id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "new".into());
        let span = tracing::info_span!("work_item", id = %id);
        self.reconcile(finding, analysis, &mut work_item, summary)
            .instrument(span)
            .await
    }

    /// Builds the creation document for a finding's first work item.
    async fn new_work_item_wrapper(&self, finding: &Finding) -> SyncResult<WorkItemWrapper> {
        let mut wrapper = WorkItemWrapper::default();
        wrapper.set_title(DEFAULT_TITLE);
        if let Some(area_path) = &self.options.default_area_path {
            wrapper.set_area_path(area_path.clone());
        }
        if let Some(work_item_type) = &self.options.work_item_type {
            wrapper.set_work_item_type(work_item_type.clone());
        }

        self.options.policy.new_work_item(finding, &mut wrapper);
        let description = self.options.template.render(finding, &wrapper);
        wrapper.set_description(description);

        if wrapper.work_item_type().is_none() {
            wrapper.set_work_item_type(self.default_work_item_type().await?.clone());
        }
        Ok(wrapper)
    }

    async fn default_work_item_type(&self) -> SyncResult<&String> {
        self.work_item_type
            .get_or_try_init(|| async {
                let types = self
                    .work_items
                    .list_work_item_types()
                    .await
                    .map_err(|e| SyncError::Remote(e.into()))?;
                let best = providers::find_best_work_item_type(&types).ok_or_else(|| {
                    SyncError::Config(format!(
                        "project '{}' has no enabled work item type",
                        self.work_items.project()
                    ))
                })?;
                tracing::info!("Creating work items of type '{}'", best.name);
                Ok::<_, SyncError>(best.name.clone())
            })
            .await
    }

    /// Creates the work item and the link comment pointing at it. In dry-run mode
    /// nothing is written and an empty placeholder work item is returned.
    async fn create_linked(
        &self,
        finding: &Finding,
        analysis: &mut Analysis,
        summary: &mut SyncSummary,
    ) -> SyncResult<WorkItemWrapper> {
        let mut wrapper = self.new_work_item_wrapper(finding).await?;
        let work_item_type = wrapper.work_item_type().unwrap_or_default().to_string();
        let changes = wrapper.changes();

        if !self.options.apply {
            tracing::info!(
                "Would create work item of type '{work_item_type}': {}",
                pretty_changes(&changes)
            );
            wrapper.update_work_item(WorkItem::default());
            // Stand-in for the link comment a real run would write.
            analysis
                .analysis_comments
                .push(AnalysisComment::new(link::link_comment(""), wrapper.changed_date()));
            summary.created += 1;
            return Ok(wrapper);
        }

        let created = self
            .work_items
            .create_work_item(&work_item_type, &changes)
            .await
            .map_err(|e| mutation_error("work item", e))?;
        let url = created
            .url
            .clone()
            .ok_or_else(|| mutation_error("work item", "created work item has no URL"))?;
        wrapper.update_work_item(created);

        self.analyses
            .update_analysis(&link::link_request(finding, &url))
            .await
            .map_err(|e| mutation_error("analysis", format!("link to {url} not recorded: {e}")))?;
        // Stamped with the work item's change date so the analysis side wins the first pass.
        analysis
            .analysis_comments
            .push(AnalysisComment::new(link::link_comment(&url), wrapper.changed_date()));

        tracing::info!(
            "Created work item {} of type '{work_item_type}'",
            wrapper.id().unwrap_or_default()
        );
        summary.created += 1;
        Ok(wrapper)
    }

    async fn reconcile(
        &self,
        finding: &Finding,
        analysis: Analysis,
        work_item: &mut WorkItemWrapper,
        summary: &mut SyncSummary,
    ) -> SyncResult<()> {
        let (side, changed_at) = recency::resolve(work_item.changed_date(), &analysis.analysis_comments);
        let mut analysis = AnalysisWrapper::new(analysis, finding);
        let policy = &self.options.policy;

        match side {
            Side::WorkItem => {
                tracing::debug!("Work item is newer ({changed_at})");
                policy.map_work_item_to_analysis(work_item, &mut analysis);
                if !analysis.has_changes() {
                    tracing::debug!("Analysis is up to date");
                    summary.unchanged += 1;
                    return Ok(());
                }

                let pretty = analysis.request().pretty();
                if self.options.apply {
                    self.analyses
                        .update_analysis(analysis.request())
                        .await
                        .map_err(|e| mutation_error("analysis", e))?;
                    tracing::info!("Updated analysis: {pretty}");
                } else {
                    tracing::info!("Would update analysis: {pretty}");
                }
                summary.analyses_updated += 1;
            }
            Side::Analysis => {
                tracing::debug!("Analysis is newer ({changed_at})");
                policy.map_analysis_to_work_item(&analysis, work_item);
                policy.post_map_work_item(finding, &analysis, work_item);

                let changes = work_item.changes();
                if changes.is_empty() {
                    tracing::debug!("Work item is up to date");
                    summary.unchanged += 1;
                    return Ok(());
                }

                let pretty = pretty_changes(&changes);
                if !self.options.apply {
                    tracing::info!("Would update work item with the changes: {pretty}");
                    summary.work_items_updated += 1;
                    return Ok(());
                }

                let id = work_item
                    .id()
                    .ok_or_else(|| mutation_error("work item", "work item has no id"))?;
                match self.work_items.update_work_item(id, &changes).await {
                    Ok(updated) => {
                        work_item.update_work_item(updated);
                        tracing::info!("Updated work item: {pretty}");
                        summary.work_items_updated += 1;
                    }
                    Err(StoreError::NotFound(id)) => {
                        tracing::error!("Work item {id} no longer exists, update skipped");
                        summary.skipped += 1;
                    }
                    Err(e) => return Err(mutation_error("work item", e)),
                }
            }
        }
        Ok(())
    }
}
