use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use extract::{ModelSettings, RetryConfig, RetryPolicy};
use matching::ScorePolicy;
use serde::{Deserialize, Serialize};

use crate::audit::Stage;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelSettings,
    pub retry: RetrySettings,
    pub limits: LimitsConfig,
    pub scoring: ScoringConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    #[serde(flatten)]
    pub backoff: RetryConfig,
    pub scope: RetryScope,
}

/// Which pipelines wrap their model call in the backoff loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryScope {
    pub extraction: bool,
    pub matching: bool,
    pub full_pipeline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest document text accepted by the single-call analysis endpoint.
    pub max_process_chars: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub policy: ScorePolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Default for RetryScope {
    fn default() -> Self {
        Self {
            extraction: false,
            matching: false,
            full_pipeline: true,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_process_chars: 100_000,
        }
    }
}

impl RetrySettings {
    pub fn policy_for(&self, stage: Stage) -> RetryPolicy {
        let enabled = match stage {
            Stage::AiProcessing => self.scope.extraction,
            Stage::ProductMatching => self.scope.matching,
            Stage::FullPipeline => self.scope.full_pipeline,
        };
        if enabled {
            RetryPolicy::from(&self.backoff)
        } else {
            RetryPolicy::none()
        }
    }
}

impl AppConfig {
    /// Defaults, then the JSON file named by `APP_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("APP_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.model.api_key = Some(key);
        }
        if let Some(path) = var("CATALOG_PATH") {
            self.catalog.path = Some(PathBuf::from(path));
        }
        if let Some(addr) = var("BIND_ADDR") {
            self.server.bind_addr = addr;
        }
    }
}
