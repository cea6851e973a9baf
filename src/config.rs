use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::protect::{compile_glob, ProtectionRules};

/// Plugin configuration, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub enabled: bool,
    /// Extensions the engines never touch (case-insensitive).
    pub protected_extensions: Vec<String>,
    /// `*`/`?` globs matched against full path and base name.
    pub protected_patterns: Vec<String>,
    /// `provider/model` globs for which passes are skipped.
    pub skip_models: Vec<String>,
    /// Run finalization on the first pass after the session goes idle.
    pub finalize_on_idle: bool,
    /// Send a savings summary into the session when it goes idle.
    pub notify_on_idle: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            protected_extensions: Vec::new(),
            protected_patterns: vec![".env".into(), "*.env".into(), "*.pem".into()],
            skip_models: Vec::new(),
            finalize_on_idle: true,
            notify_on_idle: true,
        }
    }
}

impl Config {
    /// Load the config, writing defaults first if the file does not exist.
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => serde_json::from_str(&json).map_err(|e| ConfigError::Parse(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path).await?;
                info!(path = %path.display(), "created default config");
                Ok(config)
            }
            Err(e) => Err(ConfigError::Io(e.to_string())),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| ConfigError::Io(e.to_string()))
    }

    pub fn protection(&self) -> ProtectionRules {
        ProtectionRules::new(&self.protected_extensions, &self.protected_patterns)
    }

    /// Whether passes are disabled for this model.
    pub fn skips_model(&self, qualified_model: &str) -> bool {
        self.skip_models.iter().any(|pattern| {
            compile_glob(pattern)
                .map(|re| re.is_match(qualified_model))
                .unwrap_or(false)
        })
    }
}
