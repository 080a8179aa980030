use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::store::memory::DEFAULT_PAGE_SIZE;
use crate::store::{ConnectionMode, ConsistencyLevel, Protocol};

/// Which adapter the CLI queries through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Cosmos,
    Mongo,
    Raven,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreKind,
    pub cosmos: CosmosConfig,
    pub mongo: MongoConfig,
    pub raven: RavenConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CosmosConfig {
    pub database_id: String,
    pub collection_id: Option<String>,
    /// Route queries to one partition. Unset means cross-partition queries.
    pub partition_key: Option<String>,
    pub consistency_level: ConsistencyLevel,
    pub connection_mode: ConnectionMode,
    pub connection_protocol: Protocol,
}

impl Default for CosmosConfig {
    fn default() -> Self {
        Self {
            database_id: "querysource".to_string(),
            collection_id: None,
            partition_key: None,
            consistency_level: ConsistencyLevel::Session,
            connection_mode: ConnectionMode::Direct,
            connection_protocol: Protocol::Tcp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MongoConfig {
    pub database_id: String,
    pub collection_id: Option<String>,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            database_id: "querysource".to_string(),
            collection_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RavenConfig {
    pub collection_id: Option<String>,
    pub index_name: Option<String>,
    pub is_map_reduce: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub page_size: usize,
    /// Document field used for partition routing.
    pub partition_field: Option<String>,
    /// Simulated per-request latency in milliseconds.
    pub latency_ms: Option<u64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            partition_field: None,
            latency_ms: None,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("querysource")
            .join("config.toml")
    }

    /// Load from `path`, or from the default location.
    ///
    /// A missing default file yields `Config::default()`; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }
}
