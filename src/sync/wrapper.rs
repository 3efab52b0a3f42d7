//! Mutable views over the remote records a sync pass reads and writes.
//!
//! Both wrappers only record a mutation when the new value differs from the
//! value currently visible through the wrapper, so repeated mapping steps never
//! produce redundant remote writes.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::analysis::{Analysis, AnalysisRequest, AnalysisState};
use crate::model::finding::Finding;
use crate::model::work_item::{field_path, PatchOperation, WorkItem, WorkItemField, WorkItemState};

/// A work item snapshot plus the field edits pending against it.
#[derive(Debug, Clone, Default)]
pub struct WorkItemWrapper {
    work_item: WorkItem,
    work_item_type: Option<String>,
    /// Field reference name to latest value, in first-write order.
    pending: Vec<(String, Value)>,
}

impl WorkItemWrapper {
    pub fn new(work_item: WorkItem) -> Self {
        Self {
            work_item,
            work_item_type: None,
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<u64> {
        self.work_item.id
    }

    pub fn work_item_type(&self) -> Option<&str> {
        self.work_item_type.as_deref()
    }

    pub fn set_work_item_type(&mut self, work_item_type: impl Into<String>) {
        self.work_item_type = Some(work_item_type.into());
    }

    /// Moves the wrapper onto a fresh snapshot and drops all pending edits.
    pub fn update_work_item(&mut self, work_item: WorkItem) {
        self.work_item = work_item;
        self.pending.clear();
    }

    /// Current value of a field: the pending edit if any, else the snapshot value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.pending
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
            .or_else(|| self.work_item.field(field))
    }

    /// Records `field = value` unless that is already the field's current value.
    /// Returns whether anything was recorded.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.get(field) == Some(&value) {
            return false;
        }
        match self.pending.iter_mut().find(|(name, _)| name == field) {
            Some(entry) => entry.1 = value,
            None => self.pending.push((field.to_string(), value)),
        }
        true
    }

    fn get_str(&self, field: WorkItemField) -> Option<&str> {
        self.get(field.reference_name()).and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str(WorkItemField::Title)
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.set(WorkItemField::Title.reference_name(), title.into());
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.set(WorkItemField::Description.reference_name(), description.into());
    }

    pub fn area_path(&self) -> Option<&str> {
        self.get_str(WorkItemField::AreaPath)
    }

    pub fn set_area_path(&mut self, area_path: impl Into<String>) {
        self.set(WorkItemField::AreaPath.reference_name(), area_path.into());
    }

    pub fn tags(&self) -> Vec<String> {
        self.get_str(WorkItemField::Tags)
            .map(|raw| {
                raw.split(';')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Adds a tag to `System.Tags` if it is not already present.
    pub fn add_tag(&mut self, tag: &str) {
        let mut tags = self.tags();
        if tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return;
        }
        tags.push(tag.to_string());
        self.set(WorkItemField::Tags.reference_name(), tags.join("; "));
    }

    /// Lifecycle state; a missing or unrecognised value reads as `New`.
    pub fn state(&self) -> WorkItemState {
        match self.get_str(WorkItemField::State) {
            None => WorkItemState::New,
            Some(raw) => WorkItemState::parse(raw).unwrap_or_else(|| {
                tracing::warn!("Unmapped work item state '{raw}', treating as New");
                WorkItemState::New
            }),
        }
    }

    pub fn set_state(&mut self, state: WorkItemState) {
        self.set(WorkItemField::State.reference_name(), state.as_str());
    }

    pub fn changed_date(&self) -> DateTime<Utc> {
        self.work_item.changed_date()
    }

    /// Pending edits as a patch document, one `add` per field in first-write order.
    pub fn changes(&self) -> Vec<PatchOperation> {
        self.pending
            .iter()
            .map(|(field, value)| PatchOperation::add(field_path(field), value.clone()))
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// An analysis snapshot plus the update request accumulated against it.
#[derive(Debug, Clone)]
pub struct AnalysisWrapper {
    analysis: Analysis,
    request: AnalysisRequest,
}

impl AnalysisWrapper {
    pub fn new(analysis: Analysis, finding: &Finding) -> Self {
        Self {
            analysis,
            request: AnalysisRequest::for_finding(finding),
        }
    }

    pub fn request(&self) -> &AnalysisRequest {
        &self.request
    }

    pub fn has_changes(&self) -> bool {
        self.request.has_changes()
    }

    pub fn state(&self) -> AnalysisState {
        self.analysis.analysis_state
    }

    pub fn set_state(&mut self, state: AnalysisState) {
        if self.analysis.analysis_state != state {
            self.analysis.analysis_state = state;
            self.request.analysis_state = Some(state);
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.analysis.is_suppressed
    }

    pub fn set_suppressed(&mut self, suppressed: bool) {
        if self.analysis.is_suppressed != suppressed {
            self.analysis.is_suppressed = suppressed;
            self.request.suppressed = Some(suppressed);
        }
    }

    pub fn justification(&self) -> Option<&str> {
        self.analysis.analysis_justification.as_deref()
    }

    pub fn set_justification(&mut self, justification: impl Into<String>) {
        let justification = justification.into();
        if self.justification() != Some(justification.as_str()) {
            self.analysis.analysis_justification = Some(justification.clone());
            self.request.analysis_justification = Some(justification);
        }
    }

    pub fn response(&self) -> Option<&str> {
        self.analysis.analysis_response.as_deref()
    }

    pub fn set_response(&mut self, response: impl Into<String>) {
        let response = response.into();
        if self.response() != Some(response.as_str()) {
            self.analysis.analysis_response = Some(response.clone());
            self.request.analysis_response = Some(response);
        }
    }

    pub fn details(&self) -> Option<&str> {
        self.analysis.analysis_details.as_deref()
    }

    pub fn set_details(&mut self, details: impl Into<String>) {
        let details = details.into();
        if self.details() != Some(details.as_str()) {
            self.analysis.analysis_details = Some(details.clone());
            self.request.analysis_details = Some(details);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn work_item(state: &str) -> WorkItem {
        let mut item = WorkItem {
            id: Some(5),
            ..Default::default()
        };
        item.fields.insert("System.State".into(), json!(state));
        item
    }

    #[test]
    fn setting_current_state_produces_no_changes() {
        let mut wrapper = WorkItemWrapper::new(work_item("New"));
        wrapper.set_state(WorkItemState::New);
        assert!(wrapper.changes().is_empty());
        assert!(!wrapper.has_changes());
    }

    #[test]
    fn last_write_wins_for_the_same_field() {
        let mut wrapper = WorkItemWrapper::new(work_item("New"));
        wrapper.set_state(WorkItemState::Active);
        wrapper.set_state(WorkItemState::Closed);
        let changes = wrapper.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].op, "add");
        assert_eq!(changes[0].path, "/fields/System.State");
        assert_eq!(changes[0].value, json!("Closed"));
        assert_eq!(wrapper.state(), WorkItemState::Closed);
    }

    #[test]
    fn redundant_write_compares_against_pending_value() {
        let mut wrapper = WorkItemWrapper::new(work_item("New"));
        wrapper.set_state(WorkItemState::Active);
        assert!(!wrapper.set(WorkItemField::State.reference_name(), "Active"));
        assert_eq!(wrapper.changes().len(), 1);
    }

    #[test]
    fn changes_keep_first_write_order() {
        let mut wrapper = WorkItemWrapper::default();
        wrapper.set_title("New Finding");
        wrapper.set_area_path("Shop\\Security");
        wrapper.set_description("<p>x</p>");
        wrapper.set_title("CVE-2021-44228");
        let paths: Vec<_> = wrapper.changes().into_iter().map(|c| c.path).collect();
        assert_eq!(
            paths,
            [
                "/fields/System.Title",
                "/fields/System.AreaPath",
                "/fields/System.Description"
            ]
        );
        assert_eq!(wrapper.title(), Some("CVE-2021-44228"));
    }

    #[test]
    fn update_work_item_clears_pending_edits() {
        let mut wrapper = WorkItemWrapper::new(work_item("New"));
        wrapper.set_state(WorkItemState::Active);
        wrapper.update_work_item(work_item("Active"));
        assert!(wrapper.changes().is_empty());
        assert_eq!(wrapper.state(), WorkItemState::Active);
        wrapper.set_state(WorkItemState::Active);
        assert!(wrapper.changes().is_empty());
    }

    #[test]
    fn unknown_or_missing_state_reads_as_new() {
        assert_eq!(WorkItemWrapper::default().state(), WorkItemState::New);
        assert_eq!(
            WorkItemWrapper::new(work_item("Committed")).state(),
            WorkItemState::New
        );
    }

    #[test]
    fn unknown_remote_state_is_still_overwritten() {
        let mut wrapper = WorkItemWrapper::new(work_item("Committed"));
        wrapper.set_state(WorkItemState::New);
        assert_eq!(wrapper.changes().len(), 1);
    }

    #[test]
    fn add_tag_is_case_insensitive_and_appends() {
        let mut item = work_item("New");
        item.fields.insert("System.Tags".into(), json!("security; sca"));
        let mut wrapper = WorkItemWrapper::new(item);
        wrapper.add_tag("SCA");
        assert!(!wrapper.has_changes());
        wrapper.add_tag("dependency-track");
        assert_eq!(wrapper.tags(), ["security", "sca", "dependency-track"]);
    }

    fn finding() -> Finding {
        let mut finding = Finding::default();
        finding.component.project = "p".into();
        finding.component.uuid = "c".into();
        finding.vulnerability.uuid = "v".into();
        finding
    }

    #[test]
    fn analysis_setters_write_through_only_on_change() {
        let analysis = Analysis {
            analysis_state: AnalysisState::InTriage,
            ..Default::default()
        };
        let mut wrapper = AnalysisWrapper::new(analysis, &finding());
        wrapper.set_state(AnalysisState::InTriage);
        wrapper.set_suppressed(false);
        assert!(!wrapper.has_changes());

        wrapper.set_state(AnalysisState::Resolved);
        wrapper.set_suppressed(true);
        wrapper.set_justification("CODE_NOT_REACHABLE");
        wrapper.set_justification("CODE_NOT_REACHABLE");
        assert_eq!(wrapper.state(), AnalysisState::Resolved);
        assert!(wrapper.is_suppressed());

        let request = wrapper.request();
        assert_eq!(request.project, "p");
        assert_eq!(request.analysis_state, Some(AnalysisState::Resolved));
        assert_eq!(request.suppressed, Some(true));
        assert_eq!(request.analysis_justification.as_deref(), Some("CODE_NOT_REACHABLE"));
        assert!(request.analysis_response.is_none());
    }
}
