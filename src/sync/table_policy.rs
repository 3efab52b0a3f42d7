//! Mapping policy read from a TOML file.
//!
//! ```toml
//! [filter]
//! min_cvss3 = 7.0
//! severities = ["CRITICAL", "HIGH"]
//!
//! [new_work_item]
//! title = "{{ vuln_id }} in {{ component }}"
//! work_item_type = "Bug"
//! tags = ["dependency-track"]
//!
//! [work_item_to_analysis]
//! Done = { state = "RESOLVED", suppressed = true, details = "Fixed upstream" }
//!
//! [analysis_to_work_item]
//! EXPLOITABLE = "Committed"
//!
//! [post_map_fields]
//! "Microsoft.VSTS.Common.Priority" = 1
//! ```
//!
//! Sections that are absent keep the built-in behaviour; table lookups that miss
//! fall back to the built-in mapping.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{SyncError, SyncResult};
use crate::model::analysis::AnalysisState;
use crate::model::finding::Finding;
use crate::model::work_item::{WorkItemField, WorkItemState};
use crate::util::template;

use super::policy::{self, MappingPolicy, OverridePoint};
use super::wrapper::{AnalysisWrapper, WorkItemWrapper};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyFile {
    filter: Option<FilterSection>,
    new_work_item: Option<NewWorkItemSection>,
    work_item_to_analysis: Option<BTreeMap<String, AnalysisTarget>>,
    analysis_to_work_item: Option<BTreeMap<String, String>>,
    post_map_fields: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterSection {
    min_cvss2: Option<f64>,
    min_cvss3: Option<f64>,
    #[serde(default)]
    severities: Vec<String>,
    #[serde(default)]
    projects: Vec<String>,
    #[serde(default)]
    latest_version_only: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NewWorkItemSection {
    title: Option<String>,
    work_item_type: Option<String>,
    area_path: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnalysisTarget {
    state: String,
    suppressed: Option<bool>,
    justification: Option<String>,
    response: Option<String>,
    details: Option<String>,
}

#[derive(Debug, Clone)]
struct AnalysisRule {
    state: AnalysisState,
    suppressed: Option<bool>,
    justification: Option<String>,
    response: Option<String>,
    details: Option<String>,
}

#[derive(Debug)]
pub struct TablePolicy {
    name: String,
    filter: Option<FilterSection>,
    new_work_item: Option<NewWorkItemSection>,
    work_item_to_analysis: Option<BTreeMap<String, AnalysisRule>>,
    analysis_to_work_item: Option<BTreeMap<AnalysisState, String>>,
    post_map_fields: Option<BTreeMap<String, Value>>,
}

impl TablePolicy {
    pub fn from_file(path: &Path) -> SyncResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read mapping policy {}: {e}", path.display()))
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "policy".into());
        Self::parse(&name, &contents)
            .map_err(|e| SyncError::Config(format!("mapping policy {}: {e}", path.display())))
    }

    fn parse(name: &str, contents: &str) -> Result<Self, String> {
        let file: PolicyFile = toml::from_str(contents).map_err(|e| e.to_string())?;

        let work_item_to_analysis = file
            .work_item_to_analysis
            .map(|table| {
                table
                    .into_iter()
                    .map(|(work_item_state, target)| {
                        if work_item_state.trim().is_empty() {
                            return Err("empty work item state name".to_string());
                        }
                        let state = AnalysisState::parse(&target.state).ok_or_else(|| {
                            format!(
                                "unknown analysis state '{}' for work item state '{work_item_state}'",
                                target.state
                            )
                        })?;
                        Ok((
                            work_item_state,
                            AnalysisRule {
                                state,
                                suppressed: target.suppressed,
                                justification: target.justification,
                                response: target.response,
                                details: target.details,
                            },
                        ))
                    })
                    .collect::<Result<BTreeMap<_, _>, String>>()
            })
            .transpose()?;

        let analysis_to_work_item = file
            .analysis_to_work_item
            .map(|table| {
                table
                    .into_iter()
                    .map(|(analysis_state, work_item_state)| {
                        let state = AnalysisState::parse(&analysis_state)
                            .ok_or_else(|| format!("unknown analysis state '{analysis_state}'"))?;
                        if work_item_state.trim().is_empty() {
                            return Err(format!("empty work item state for '{analysis_state}'"));
                        }
                        Ok((state, work_item_state))
                    })
                    .collect::<Result<BTreeMap<_, _>, String>>()
            })
            .transpose()?;

        let policy = Self {
            name: name.to_string(),
            filter: file.filter,
            new_work_item: file.new_work_item,
            work_item_to_analysis,
            analysis_to_work_item,
            post_map_fields: file.post_map_fields,
        };
        if policy.override_points().is_empty() {
            return Err("defines no override points".into());
        }
        Ok(policy)
    }
}

impl MappingPolicy for TablePolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn override_points(&self) -> Vec<OverridePoint> {
        let mut points = Vec::new();
        if self.filter.is_some() {
            points.push(OverridePoint::ProcessFinding);
        }
        if self.new_work_item.is_some() {
            points.push(OverridePoint::NewWorkItem);
        }
        if self.work_item_to_analysis.is_some() {
            points.push(OverridePoint::WorkItemToAnalysis);
        }
        if self.analysis_to_work_item.is_some() {
            points.push(OverridePoint::AnalysisToWorkItem);
        }
        if self.post_map_fields.is_some() {
            points.push(OverridePoint::PostMapWorkItem);
        }
        points
    }

    fn validate(&self) -> SyncResult<()> {
        if let Some(fields) = &self.post_map_fields {
            if let Some(bad) = fields.keys().find(|k| k.trim().is_empty() || k.contains('/')) {
                return Err(SyncError::Config(format!(
                    "mapping policy '{}': invalid field reference name '{bad}'",
                    self.name
                )));
            }
        }
        Ok(())
    }

    fn process_finding(&self, finding: &Finding) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        let v = &finding.vulnerability;
        if let Some(min) = filter.min_cvss2 {
            if v.cvss_v2_base_score.unwrap_or(0.0) < min {
                return false;
            }
        }
        if let Some(min) = filter.min_cvss3 {
            if v.cvss_v3_base_score.unwrap_or(0.0) < min {
                return false;
            }
        }
        if !filter.severities.is_empty() {
            let severity = v.severity.as_deref().unwrap_or("UNASSIGNED");
            if !filter.severities.iter().any(|s| s.eq_ignore_ascii_case(severity)) {
                return false;
            }
        }
        if !filter.projects.is_empty() {
            let project = finding.component.project_name.as_deref().unwrap_or_default();
            if !filter.projects.iter().any(|p| p == project) {
                return false;
            }
        }
        if filter.latest_version_only && !finding.is_latest() {
            return false;
        }
        true
    }

    fn new_work_item(&self, finding: &Finding, work_item: &mut WorkItemWrapper) {
        let Some(section) = &self.new_work_item else {
            return;
        };
        if let Some(title) = &section.title {
            work_item.set_title(template::render(title, &template::finding_vars(finding), false));
        }
        if let Some(area_path) = &section.area_path {
            work_item.set_area_path(area_path.clone());
        }
        if let Some(work_item_type) = &section.work_item_type {
            work_item.set_work_item_type(work_item_type.clone());
        }
        for tag in &section.tags {
            work_item.add_tag(tag);
        }
    }

    fn map_work_item_to_analysis(&self, work_item: &WorkItemWrapper, analysis: &mut AnalysisWrapper) {
        let raw_state = work_item
            .get(WorkItemField::State.reference_name())
            .and_then(Value::as_str);
        let rule = raw_state.and_then(|s| self.work_item_to_analysis.as_ref()?.get(s));
        let Some(rule) = rule else {
            let (state, suppressed) = policy::work_item_state_to_analysis(work_item.state());
            analysis.set_state(state);
            analysis.set_suppressed(suppressed);
            return;
        };

        analysis.set_state(rule.state);
        if let Some(suppressed) = rule.suppressed {
            analysis.set_suppressed(suppressed);
        }
        if let Some(justification) = &rule.justification {
            analysis.set_justification(justification.clone());
        }
        if let Some(response) = &rule.response {
            analysis.set_response(response.clone());
        }
        if let Some(details) = &rule.details {
            analysis.set_details(details.clone());
        }
    }

    fn map_analysis_to_work_item(&self, analysis: &AnalysisWrapper, work_item: &mut WorkItemWrapper) {
        let mapped = self
            .analysis_to_work_item
            .as_ref()
            .and_then(|table| table.get(&analysis.state()));
        match mapped {
            Some(state) => match WorkItemState::parse(state) {
                Some(known) => work_item.set_state(known),
                None => {
                    work_item.set(WorkItemField::State.reference_name(), state.clone());
                }
            },
            None => work_item.set_state(policy::analysis_state_to_work_item(analysis.state())),
        }
    }

    fn post_map_work_item(
        &self,
        _finding: &Finding,
        _analysis: &AnalysisWrapper,
        work_item: &mut WorkItemWrapper,
    ) {
        if let Some(fields) = &self.post_map_fields {
            for (field, value) in fields {
                work_item.set(field, value.clone());
            }
        }
    }
}
