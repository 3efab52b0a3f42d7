use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Azure DevOps work item as returned by the work item tracking API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl WorkItem {
    pub fn field(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// `System.ChangedDate`, or the Unix epoch when the item carries none.
    pub fn changed_date(&self) -> DateTime<Utc> {
        self.field(WorkItemField::ChangedDate.reference_name())
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Lifecycle state of a work item. Process templates may define more states;
/// those are read as [`WorkItemState::New`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkItemState {
    New,
    Active,
    Resolved,
    Closed,
    Removed,
}

impl WorkItemState {
    pub const ALL: [WorkItemState; 5] = [
        WorkItemState::New,
        WorkItemState::Active,
        WorkItemState::Resolved,
        WorkItemState::Closed,
        WorkItemState::Removed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemState::New => "New",
            WorkItemState::Active => "Active",
            WorkItemState::Resolved => "Resolved",
            WorkItemState::Closed => "Closed",
            WorkItemState::Removed => "Removed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkItemField {
    Title,
    Description,
    AreaPath,
    State,
    ChangedDate,
    Tags,
}

impl WorkItemField {
    pub fn reference_name(&self) -> &'static str {
        match self {
            WorkItemField::Title => "System.Title",
            WorkItemField::Description => "System.Description",
            WorkItemField::AreaPath => "System.AreaPath",
            WorkItemField::State => "System.State",
            WorkItemField::ChangedDate => "System.ChangedDate",
            WorkItemField::Tags => "System.Tags",
        }
    }
}

/// JSON patch path of a field, e.g. `/fields/System.State`.
pub fn field_path(reference_name: &str) -> String {
    format!("/fields/{reference_name}")
}

/// One JSON patch operation of a work item create/update document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: "add".into(),
            path: path.into(),
            value,
        }
    }
}

/// Renders a patch document as `System.Title="…", System.State="Closed"`.
pub fn pretty_changes(changes: &[PatchOperation]) -> String {
    changes
        .iter()
        .map(|c| {
            let name = c.path.strip_prefix("/fields/").unwrap_or(&c.path);
            let value = match &c.value {
                Value::String(s) if s.chars().count() > 80 => {
                    format!("\"{}…\"", s.chars().take(80).collect::<String>())
                }
                other => other.to_string(),
            };
            format!("{name}={value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemType {
    pub name: String,
    pub reference_name: String,
    #[serde(default)]
    pub is_disabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_azure_work_item() {
        let item: WorkItem = serde_json::from_str(
            r#"{
                "id": 16142,
                "rev": 3,
                "url": "https://dev.azure.com/org/_apis/wit/workItems/16142",
                "fields": {
                    "System.State": "Active",
                    "System.ChangedDate": "2024-05-02T10:15:00.123Z"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(item.id, Some(16142));
        assert_eq!(item.changed_date().timestamp(), 1_714_644_900);
    }

    #[test]
    fn empty_work_item_changed_at_epoch() {
        assert_eq!(WorkItem::default().changed_date(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn state_parse_is_exact() {
        assert_eq!(WorkItemState::parse("Closed"), Some(WorkItemState::Closed));
        assert_eq!(WorkItemState::parse("closed"), None);
        assert_eq!(WorkItemState::parse("Committed"), None);
    }

    #[test]
    fn field_paths() {
        assert_eq!(field_path(WorkItemField::State.reference_name()), "/fields/System.State");
        assert_eq!(field_path("Custom.Risk"), "/fields/Custom.Risk");
    }

    #[test]
    fn pretty_changes_strips_field_prefix_and_truncates() {
        let long = "x".repeat(100);
        let changes = vec![
            PatchOperation::add("/fields/System.State", Value::from("Closed")),
            PatchOperation::add("/fields/System.Description", Value::from(long)),
        ];
        let pretty = pretty_changes(&changes);
        assert!(pretty.starts_with("System.State=\"Closed\", System.Description=\""));
        assert!(pretty.ends_with("…\""));
    }
}
