use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;

use super::{AnalysisStore, FindingSource};
use crate::config::DependencyTrackConfig;
use crate::model::analysis::{Analysis, AnalysisRequest};
use crate::model::finding::{Finding, FindingFilter};

const PAGE_SIZE: usize = 100;

pub struct DependencyTrackClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl DependencyTrackClient {
    pub fn new(config: &DependencyTrackConfig, proxy: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(!config.verify_ssl);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("Invalid proxy URL")?);
        }
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: builder.build().context("Failed to build Dependency-Track client")?,
        })
    }
}

/// Query parameters of `GET /api/v1/finding` for one page.
fn finding_query(filter: &FindingFilter, page: usize) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("showInactive", filter.include_inactive.to_string()),
        ("showSuppressed", filter.include_suppressed.to_string()),
        ("pageNumber", page.to_string()),
        ("pageSize", PAGE_SIZE.to_string()),
    ];
    if filter.min_cvss2 > 0.0 {
        query.push(("cvssv2From", filter.min_cvss2.to_string()));
    }
    if filter.min_cvss3 > 0.0 {
        query.push(("cvssv3From", filter.min_cvss3.to_string()));
    }
    query
}

#[async_trait]
impl FindingSource for DependencyTrackClient {
    async fn load_findings(&self, filter: &FindingFilter) -> Result<Vec<Finding>> {
        let url = format!("{}/api/v1/finding", self.base_url);
        let mut findings = Vec::new();

        for page in 1.. {
            let resp = self
                .client
                .get(&url)
                .header("X-Api-Key", &self.api_key)
                .header("Accept", "application/json")
                .query(&finding_query(filter, page))
                .send()
                .await
                .context("Dependency-Track findings request failed")?;

            if !resp.status().is_success() {
                bail!("Loading findings failed with status {}", resp.status());
            }

            let batch: Vec<Finding> = resp
                .json()
                .await
                .context("Failed to parse Dependency-Track findings")?;
            let last_page = batch.len() < PAGE_SIZE;
            findings.extend(batch);
            if last_page {
                break;
            }
        }

        tracing::debug!("Loaded {} findings", findings.len());
        Ok(findings)
    }
}

#[async_trait]
impl AnalysisStore for DependencyTrackClient {
    async fn get_analysis(&self, finding: &Finding) -> Result<Analysis> {
        let resp = self
            .client
            .get(format!("{}/api/v1/analysis", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .header("Accept", "application/json")
            .query(&[
                ("project", finding.component.project.as_str()),
                ("component", finding.component.uuid.as_str()),
                ("vulnerability", finding.vulnerability.uuid.as_str()),
            ])
            .send()
            .await
            .context("Dependency-Track analysis request failed")?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(Analysis::default()),
            status if status.is_success() => {
                // An analysis that was never written comes back as an empty body.
                let body = resp.text().await.context("Failed to read analysis")?;
                if body.trim().is_empty() {
                    return Ok(Analysis::default());
                }
                serde_json::from_str(&body).context("Failed to parse analysis")
            }
            status => bail!("Loading analysis failed with status {status}"),
        }
    }

    async fn update_analysis(&self, request: &AnalysisRequest) -> Result<()> {
        let resp = self
            .client
            .put(format!("{}/api/v1/analysis", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .json(request)
            .send()
            .await
            .context("Dependency-Track analysis update failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Analysis update rejected with status {status}: {body}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(query: &'a [(&str, String)], key: &str) -> Option<&'a str> {
        query.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn query_omits_zero_scores() {
        let query = finding_query(&FindingFilter::default(), 1);
        assert_eq!(value(&query, "showInactive"), Some("false"));
        assert_eq!(value(&query, "showSuppressed"), Some("false"));
        assert_eq!(value(&query, "pageNumber"), Some("1"));
        assert_eq!(value(&query, "cvssv2From"), None);
        assert_eq!(value(&query, "cvssv3From"), None);
    }

    #[test]
    fn query_carries_filters() {
        let filter = FindingFilter {
            min_cvss2: 5.0,
            min_cvss3: 7.5,
            include_suppressed: true,
            include_inactive: true,
        };
        let query = finding_query(&filter, 3);
        assert_eq!(value(&query, "showSuppressed"), Some("true"));
        assert_eq!(value(&query, "cvssv2From"), Some("5"));
        assert_eq!(value(&query, "cvssv3From"), Some("7.5"));
        assert_eq!(value(&query, "pageNumber"), Some("3"));
    }

    #[test]
    fn client_trims_trailing_slash() {
        let config = DependencyTrackConfig {
            url: "https://dtrack.example.com/".into(),
            api_key: "key".into(),
            verify_ssl: true,
        };
        let client = DependencyTrackClient::new(&config, None).unwrap();
        assert_eq!(client.base_url, "https://dtrack.example.com");
    }
}
