use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::finding::Finding;

/// Prefix of comments whose body carries their own timestamp.
pub const TIMESTAMP_COMMENT_PREFIX: &str = "Synchronized at: ";

/// Triage state of a finding in Dependency-Track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnalysisState {
    #[default]
    NotSet,
    InTriage,
    Exploitable,
    Resolved,
    FalsePositive,
    NotAffected,
}

impl AnalysisState {
    pub const ALL: [AnalysisState; 6] = [
        AnalysisState::NotSet,
        AnalysisState::InTriage,
        AnalysisState::Exploitable,
        AnalysisState::Resolved,
        AnalysisState::FalsePositive,
        AnalysisState::NotAffected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisState::NotSet => "NOT_SET",
            AnalysisState::InTriage => "IN_TRIAGE",
            AnalysisState::Exploitable => "EXPLOITABLE",
            AnalysisState::Resolved => "RESOLVED",
            AnalysisState::FalsePositive => "FALSE_POSITIVE",
            AnalysisState::NotAffected => "NOT_AFFECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl From<String> for AnalysisState {
    fn from(value: String) -> Self {
        Self::parse(&value).unwrap_or_else(|| {
            tracing::warn!("Unknown analysis state '{value}', treating as NOT_SET");
            AnalysisState::NotSet
        })
    }
}

impl From<AnalysisState> for String {
    fn from(value: AnalysisState) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisComment {
    /// Epoch milliseconds, set by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commenter: Option<String>,
}

impl AnalysisComment {
    pub fn new(comment: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(at.timestamp_millis()),
            comment: comment.into(),
            commenter: None,
        }
    }

    /// When the comment was written: the server timestamp, or the time embedded after
    /// [`TIMESTAMP_COMMENT_PREFIX`] in the body.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        if let Some(millis) = self.timestamp {
            return Utc.timestamp_millis_opt(millis).single();
        }
        let raw = self.comment.strip_prefix(TIMESTAMP_COMMENT_PREFIX)?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }
}

/// Dependency-Track's triage record for one finding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(default)]
    pub analysis_state: AnalysisState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_justification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_details: Option<String>,
    #[serde(default)]
    pub analysis_comments: Vec<AnalysisComment>,
    #[serde(default)]
    pub is_suppressed: bool,
}

impl Analysis {
    /// Most recent comment starting with `prefix`. Comments with equal or missing
    /// timestamps are ordered by position, later ones winning.
    pub fn find_comment(&self, prefix: &str) -> Option<&AnalysisComment> {
        self.analysis_comments
            .iter()
            .enumerate()
            .filter(|(_, c)| c.comment.starts_with(prefix))
            .max_by_key(|(i, c)| (c.created_at(), *i))
            .map(|(_, c)| c)
    }
}

/// Payload of `PUT /api/v1/analysis`. Unset fields are left untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub project: String,
    pub component: String,
    pub vulnerability: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_state: Option<AnalysisState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_justification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppressed: Option<bool>,
}

impl AnalysisRequest {
    pub fn for_finding(finding: &Finding) -> Self {
        Self {
            project: finding.component.project.clone(),
            component: finding.component.uuid.clone(),
            vulnerability: finding.vulnerability.uuid.clone(),
            ..Default::default()
        }
    }

    pub fn has_changes(&self) -> bool {
        self.analysis_state.is_some()
            || self.analysis_justification.is_some()
            || self.analysis_response.is_some()
            || self.analysis_details.is_some()
            || self.comment.is_some()
            || self.suppressed.is_some()
    }

    /// `key=value` summary of the fields this request sets.
    pub fn pretty(&self) -> String {
        let mut parts = Vec::new();
        if let Some(state) = self.analysis_state {
            parts.push(format!("state={state}"));
        }
        if let Some(j) = &self.analysis_justification {
            parts.push(format!("justification={j}"));
        }
        if let Some(r) = &self.analysis_response {
            parts.push(format!("response={r}"));
        }
        if let Some(d) = &self.analysis_details {
            parts.push(format!("details={d:?}"));
        }
        if let Some(s) = self.suppressed {
            parts.push(format!("suppressed={s}"));
        }
        if let Some(c) = &self.comment {
            parts.push(format!("comment={c:?}"));
        }
        parts.join(", ")
    }
}
