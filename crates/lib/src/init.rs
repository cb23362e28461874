//! Initialize the configuration directory: create `~/.concierge` and a template config.
//!
//! The template leaves every secret empty, so the relay refuses to start until they are filled
//! in (or provided through the environment).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{
    Config, DEFAULT_AIRTABLE_BASE_URL, DEFAULT_AIRTABLE_TABLE, DEFAULT_AIRTABLE_VIEW,
    DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL, DEFAULT_TIMEOUT_SECS,
};

/// Template written by `init`: defaults spelled out, secrets blank.
pub fn template_config() -> Config {
    let mut config = Config::default();
    config.openai.api_key = Some(String::new());
    config.openai.base_url = Some(DEFAULT_OPENAI_BASE_URL.to_string());
    config.openai.model = Some(DEFAULT_OPENAI_MODEL.to_string());
    config.openai.timeout_secs = Some(DEFAULT_TIMEOUT_SECS);
    config.airtable.api_key = Some(String::new());
    config.airtable.base_id = Some(String::new());
    config.airtable.base_url = Some(DEFAULT_AIRTABLE_BASE_URL.to_string());
    config.airtable.table = Some(DEFAULT_AIRTABLE_TABLE.to_string());
    config.airtable.view = Some(DEFAULT_AIRTABLE_VIEW.to_string());
    config.airtable.timeout_secs = Some(DEFAULT_TIMEOUT_SECS);
    config.delivery.webhook_url = Some(String::new());
    config.delivery.timeout_secs = Some(DEFAULT_TIMEOUT_SECS);
    config
}

/// Create the config directory and write the template config if the file does not exist.
/// An existing config file is left untouched. Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let text = serde_json::to_string_pretty(&template_config())
            .context("serializing template config")?;
        std::fs::write(config_path, text)
            .with_context(|| format!("writing template config to {}", config_path.display()))?;
        log::info!("created template config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;

    #[test]
    fn writes_template_that_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let out = init_config_dir(&path).unwrap();
        assert_eq!(out, dir.path().join("nested"));

        let (config, _) = load_config(Some(path)).unwrap();
        assert_eq!(config.airtable.table.as_deref(), Some("Properties"));
        let err = config.validate().unwrap_err();
        assert_eq!(err.0.len(), 4);
    }

    #[test]
    fn keeps_existing_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"gateway":{"port":9999}}"#).unwrap();
        init_config_dir(&path).unwrap();
        let (config, _) = load_config(Some(path)).unwrap();
        assert_eq!(config.gateway.port, 9999);
    }
}
