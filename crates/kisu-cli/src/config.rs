//! Optional TOML file settings, merged under command-line flags.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use kisu_qidb::{ItemDatabaseConfig, ItemDatabaseLogSettings};

/// Namespace used when neither the file nor a flag names one.
pub const DEFAULT_NAMESPACE: &str = "kisu";

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database: DatabaseSection,
}

/// The `[database]` table. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub namespace: Option<String>,
    pub cache_size: Option<usize>,
    pub save_rate: Option<usize>,
    pub logs: Option<ItemDatabaseLogSettings>,
}

/// Values given on the command line.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub namespace: Option<String>,
    pub cache_size: Option<usize>,
    pub save_rate: Option<usize>,
}

impl FileConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid config file")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Item store configuration: flags first, then the file, then defaults.
    pub fn resolve(&self, overrides: &Overrides) -> ItemDatabaseConfig {
        let db = &self.database;
        let namespace = overrides
            .namespace
            .clone()
            .or_else(|| db.namespace.clone())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let mut config = ItemDatabaseConfig::new(namespace);
        if let Some(cache_size) = overrides.cache_size.or(db.cache_size) {
            config = config.with_cache_size(cache_size);
        }
        if let Some(save_rate) = overrides.save_rate.or(db.save_rate) {
            config = config.with_save_rate(save_rate);
        }
        if let Some(logs) = &db.logs {
            config = config.with_logs(logs.clone());
        }
        config
    }
}
