use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Response, StatusCode};
use serde::Deserialize;

use super::WorkItemStore;
use crate::config::AzureConfig;
use crate::error::StoreError;
use crate::model::work_item::{PatchOperation, WorkItem, WorkItemType};

const API_VERSION: &str = "7.1";

pub struct AzureDevOpsClient {
    base_url: String,
    project: String,
    auth_header: String,
    client: reqwest::Client,
}

impl AzureDevOpsClient {
    pub fn new(config: &AzureConfig, proxy: Option<&str>) -> anyhow::Result<Self> {
        // Personal access tokens go in the password slot with an empty user name.
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!(":{}", config.api_key));
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("Invalid proxy URL")?);
        }
        Ok(Self {
            base_url: config.org_url.trim_end_matches('/').to_string(),
            project: config.project.clone(),
            auth_header: format!("Basic {encoded}"),
            client: builder.build().context("Failed to build Azure DevOps client")?,
        })
    }

    fn wit_url(&self, resource: &str) -> String {
        format!(
            "{}/{}/_apis/wit/{resource}?api-version={API_VERSION}",
            self.base_url,
            urlencoding::encode(&self.project)
        )
    }

    async fn read_work_item(resp: Response, id: Option<u64>) -> Result<WorkItem, StoreError> {
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(StoreError::NotFound(id));
            }
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Azure DevOps returned {status}: {}", error_message(&body)).into());
        }
        Ok(resp
            .json()
            .await
            .context("Failed to parse Azure DevOps work item")?)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct TypeList {
    value: Vec<WorkItemType>,
}

/// The `message` of an Azure DevOps error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.chars().take(300).collect())
}

#[async_trait]
impl WorkItemStore for AzureDevOpsClient {
    fn project(&self) -> &str {
        &self.project
    }

    async fn get_work_item(&self, id: u64) -> Result<WorkItem, StoreError> {
        let resp = self
            .client
            .get(self.wit_url(&format!("workitems/{id}")))
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Azure DevOps work item request failed")?;
        Self::read_work_item(resp, Some(id)).await
    }

    async fn create_work_item(
        &self,
        work_item_type: &str,
        document: &[PatchOperation],
    ) -> Result<WorkItem, StoreError> {
        let resource = format!("workitems/${}", urlencoding::encode(work_item_type));
        let resp = self
            .client
            .post(self.wit_url(&resource))
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json-patch+json")
            .body(serde_json::to_vec(document).context("Failed to encode patch document")?)
            .send()
            .await
            .context("Azure DevOps work item creation failed")?;
        Self::read_work_item(resp, None).await
    }

    async fn update_work_item(
        &self,
        id: u64,
        document: &[PatchOperation],
    ) -> Result<WorkItem, StoreError> {
        let resp = self
            .client
            .patch(self.wit_url(&format!("workitems/{id}")))
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json-patch+json")
            .body(serde_json::to_vec(document).context("Failed to encode patch document")?)
            .send()
            .await
            .context("Azure DevOps work item update failed")?;
        Self::read_work_item(resp, Some(id)).await
    }

    async fn list_work_item_types(&self) -> Result<Vec<WorkItemType>, StoreError> {
        let resp = self
            .client
            .get(self.wit_url("workitemtypes"))
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Azure DevOps work item types request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Listing work item types failed with {status}: {}", error_message(&body)).into());
        }
        let list: TypeList = resp
            .json()
            .await
            .context("Failed to parse work item types")?;
        Ok(list.value)
    }
}
