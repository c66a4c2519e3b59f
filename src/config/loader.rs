//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources, lowest precedence first:
//!
//! 1. [`RelayConfig::default`]
//! 2. a TOML file: the explicit path, else `RELAY_CONFIG`, else nothing
//! 3. environment variables `RELAY__SECTION__KEY`, e.g. `RELAY__QUEUE__NAME`

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::RelayConfig;
use crate::error::{EventBusError, Result};

/// Names the config file when no path is passed explicitly
pub const CONFIG_PATH_ENV: &str = "RELAY_CONFIG";

const ENV_PREFIX: &str = "RELAY";
const ENV_SEPARATOR: &str = "__";

/// Loaded, validated configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: RelayConfig,
    environment: String,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> Result<Arc<ConfigManager>> {
        let path = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_from_file(path.as_deref())
    }

    /// Load configuration from a specific file. The file must exist when a
    /// path is given.
    pub fn load_from_file(path: Option<&Path>) -> Result<Arc<ConfigManager>> {
        Self::load_with_env(path, None)
    }

    /// Load with an explicit set of environment variables instead of the
    /// process environment. Useful for testing without touching global state.
    pub fn load_with_env(
        path: Option<&Path>,
        vars: Option<HashMap<String, String>>,
    ) -> Result<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        debug!(
            environment = %environment,
            path = ?path,
            "Loading relay configuration"
        );

        let mut builder = Config::builder()
            .add_source(Config::try_from(&RelayConfig::default())?);

        if let Some(path) = path {
            if !path.is_file() {
                return Err(EventBusError::configuration(
                    "loader",
                    format!("configuration file not found: {}", path.display()),
                ));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(vars),
        );

        let config: RelayConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            environment = %environment,
            queue = %config.queue.name,
            num_workers = config.worker.num_workers,
            batch_size = config.queue.batch_size,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            config_path: path.map(Path::to_path_buf),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Deployment environment detected at load time
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// `RELAY_ENV`, then `APP_ENV`, defaulting to `development`
    pub fn detect_environment() -> String {
        env::var("RELAY_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
