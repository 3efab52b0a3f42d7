use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::SyncError;

/// Contents of `config.toml`. Every value can also come from the environment.
#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub dependency_track: Option<DependencyTrackSection>,
    pub azure: Option<AzureSection>,
    pub proxy: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DependencyTrackSection {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub verify_ssl: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AzureSection {
    pub org_url: Option<String>,
    pub api_key: Option<String>,
    pub project: Option<String>,
    pub default_area_path: Option<String>,
    pub work_item_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DependencyTrackConfig {
    pub url: String,
    pub api_key: String,
    pub verify_ssl: bool,
}

#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub org_url: String,
    pub api_key: String,
    pub project: String,
    pub default_area_path: Option<String>,
    pub work_item_type: Option<String>,
}

/// Connection settings for both services, fully resolved.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub dependency_track: DependencyTrackConfig,
    pub azure: AzureConfig,
    pub proxy: Option<String>,
}

pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dt-azure-sync")
        .join("config.toml")
}

/// Reads the config file. A missing file at the default location is not an error.
pub fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (default_config_path(), false),
    };
    if !explicit && !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: FileConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

/// Truthy spellings accepted for boolean environment variables.
pub fn parse_true(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Merges file values with the environment (environment wins) and checks required settings.
pub fn resolve(
    file: FileConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, SyncError> {
    let dt = file.dependency_track.unwrap_or_default();
    let az = file.azure.unwrap_or_default();

    let setting = |name: &str, from_file: Option<String>| non_empty(env(name)).or(non_empty(from_file));
    let required = |name: &str, from_file: Option<String>| {
        setting(name, from_file)
            .ok_or_else(|| SyncError::Config(format!("missing required setting {name}")))
    };

    let verify_ssl = match env("OWASP_DTRACK_VERIFY_SSL") {
        Some(v) => parse_true(&v),
        None => dt.verify_ssl.unwrap_or(true),
    };

    Ok(AppConfig {
        dependency_track: DependencyTrackConfig {
            url: required("OWASP_DTRACK_URL", dt.url)?,
            api_key: required("OWASP_DTRACK_API_KEY", dt.api_key)?,
            verify_ssl,
        },
        azure: AzureConfig {
            org_url: required("AZURE_ORG_URL", az.org_url)?,
            api_key: required("AZURE_API_KEY", az.api_key)?,
            project: required("AZURE_PROJECT", az.project)?,
            default_area_path: setting("AZURE_WORK_ITEM_DEFAULT_AREA_PATH", az.default_area_path),
            work_item_type: setting("AZURE_WORK_ITEM_TYPE", az.work_item_type),
        },
        proxy: non_empty(env("HTTPS_PROXY"))
            .or_else(|| non_empty(env("HTTP_PROXY")))
            .or(non_empty(file.proxy)),
    })
}

/// Loads the config file and the environment. Every failure is a configuration error.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, SyncError> {
    let file = load_file_config(path).map_err(|e| SyncError::Config(format!("{e:#}")))?;
    resolve(file, |name| std::env::var(name).ok())
}
