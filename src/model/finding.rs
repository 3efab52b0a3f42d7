use serde::{Deserialize, Serialize};
use std::fmt;

/// A vulnerability reported against a component of a Dependency-Track project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub component: Component,
    pub vulnerability: Vulnerability,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    /// UUID of the owning project.
    pub project: String,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub project_version: Option<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub uuid: String,
    pub vuln_id: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "cvssV2BaseScore")]
    pub cvss_v2_base_score: Option<f64>,
    #[serde(default, rename = "cvssV3BaseScore")]
    pub cvss_v3_base_score: Option<f64>,
}

/// Server-side filters applied when loading findings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindingFilter {
    pub min_cvss2: f64,
    pub min_cvss3: f64,
    pub include_suppressed: bool,
    pub include_inactive: bool,
}

impl Finding {
    pub fn project_label(&self) -> String {
        format!(
            "{}:{}",
            self.component.project_name.as_deref().unwrap_or(&self.component.project),
            self.component.project_version.as_deref().unwrap_or("None")
        )
    }

    pub fn component_label(&self) -> String {
        format!(
            "{}:{}",
            self.component.name,
            self.component.version.as_deref().unwrap_or("None")
        )
    }

    /// True when the finding belongs to the newest known version of its component.
    pub fn is_latest(&self) -> bool {
        match (&self.component.project_version, &self.component.latest_version) {
            (Some(current), Some(latest)) => current == latest,
            _ => false,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{}",
            self.project_label(),
            self.component_label(),
            self.vulnerability.vuln_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding() -> Finding {
        serde_json::from_str(
            r#"{
                "component": {
                    "uuid": "c-1",
                    "name": "log4j-core",
                    "version": "2.14.1",
                    "project": "p-1",
                    "projectName": "shop",
                    "projectVersion": "1.2.0",
                    "latestVersion": "2.17.1"
                },
                "vulnerability": {
                    "uuid": "v-1",
                    "vulnId": "CVE-2021-44228",
                    "severity": "CRITICAL",
                    "cvssV3BaseScore": 10.0
                },
                "analysis": { "isSuppressed": false }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn deserializes_dependency_track_finding() {
        let f = finding();
        assert_eq!(f.component.project, "p-1");
        assert_eq!(f.vulnerability.cvss_v3_base_score, Some(10.0));
        assert_eq!(f.vulnerability.cvss_v2_base_score, None);
    }

    #[test]
    fn display_includes_project_component_and_vulnerability() {
        assert_eq!(
            finding().to_string(),
            "shop:1.2.0;log4j-core:2.14.1;CVE-2021-44228"
        );
    }

    #[test]
    fn missing_versions_render_as_none() {
        let mut f = finding();
        f.component.project_version = None;
        f.component.project_name = None;
        assert_eq!(f.project_label(), "p-1:None");
    }

    #[test]
    fn is_latest_compares_project_and_latest_version() {
        let mut f = finding();
        assert!(!f.is_latest());
        f.component.latest_version = Some("1.2.0".into());
        assert!(f.is_latest());
        f.component.latest_version = None;
        assert!(!f.is_latest());
    }
}
