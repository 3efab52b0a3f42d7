use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

use crate::model::finding::Finding;
use crate::sync::wrapper::WorkItemWrapper;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-z0-9_]+)\s*\}\}").unwrap());

const DEFAULT_DESCRIPTION: &str = r#"<h2>{{ vuln_id }}: {{ vuln_title }}</h2>
<p><b>Severity:</b> {{ severity }} (CVSS v3: {{ cvss3 }}, CVSS v2: {{ cvss2 }})</p>
<p><b>Component:</b> {{ component }} {{ component_version }}<br/>
<b>Project:</b> {{ project }} {{ project_version }}<br/>
<b>Source:</b> {{ source }}</p>
<p>{{ description }}</p>
"#;

/// Template variables describing a finding.
pub fn finding_vars(finding: &Finding) -> Vec<(&'static str, String)> {
    let c = &finding.component;
    let v = &finding.vulnerability;
    let score = |s: Option<f64>| s.map(|s| format!("{s:.1}")).unwrap_or_else(|| "n/a".into());
    vec![
        ("vuln_id", v.vuln_id.clone()),
        ("vuln_title", v.title.clone().unwrap_or_default()),
        ("severity", v.severity.clone().unwrap_or_else(|| "UNASSIGNED".into())),
        ("cvss2", score(v.cvss_v2_base_score)),
        ("cvss3", score(v.cvss_v3_base_score)),
        ("source", v.source.clone().unwrap_or_default()),
        ("description", v.description.clone().unwrap_or_default()),
        ("component", c.name.clone()),
        ("component_version", c.version.clone().unwrap_or_default()),
        ("project", c.project_name.clone().unwrap_or_else(|| c.project.clone())),
        ("project_version", c.project_version.clone().unwrap_or_default()),
    ]
}

/// Replaces `{{ name }}` placeholders. Unknown names are left as written.
pub fn render(template: &str, vars: &[(&str, String)], escape: bool) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            match vars.iter().find(|(k, _)| *k == name) {
                Some((_, value)) if escape => escape_html(value),
                Some((_, value)) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// HTML template for the description of newly created work items.
#[derive(Debug, Clone)]
pub struct DescriptionTemplate {
    source: String,
}

impl Default for DescriptionTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

impl DescriptionTemplate {
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        Ok(Self { source })
    }

    /// Renders with the finding's variables plus `title` and `area_path` of the work item.
    pub fn render(&self, finding: &Finding, work_item: &WorkItemWrapper) -> String {
        let mut vars = finding_vars(finding);
        vars.push(("title", work_item.title().unwrap_or_default().to_string()));
        vars.push(("area_path", work_item.area_path().unwrap_or_default().to_string()));
        render(&self.source, &vars, true)
    }
}
