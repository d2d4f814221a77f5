//! Configuration loading for the HarmonAI generation worker.
//!
//! # Configuration Philosophy
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): things fixed for the life of a worker -
//!   scratch paths, bind address, telemetry, object storage, deployment values.
//!
//! - **Bootstrap** (`BootstrapConfig`): the model services loaded once at
//!   worker start and shared by every request.
//!
//! # Usage
//!
//! ```rust,no_run
//! use harmonconf::HarmonConfig;
//!
//! let config = HarmonConfig::load().expect("Failed to load config");
//!
//! println!("Scratch dir: {}", config.infra.paths.output_dir.display());
//! println!("HTTP: {}", config.infra.bind.addr());
//!
//! for (name, url) in &config.bootstrap.models {
//!     println!("Model {}: {}", name, url);
//! }
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/harmonai/config.toml` (system)
//! 2. `~/.config/harmonai/config.toml` (user)
//! 3. `./harmonai.toml` (local override, or `--config PATH`)
//! 4. Environment variables (`HARMONAI_*`, `S3_BUCKET_NAME`, `RUST_LOG`,
//!    `OTEL_EXPORTER_OTLP_ENDPOINT`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! output_dir = "/tmp/outputs"
//!
//! [bind]
//! http_port = 8000
//!
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//!
//! [storage]
//! backend = "s3"
//! endpoint_url = "https://t3.storage.dev"
//!
//! [deployment]
//! gpu = "L40S"
//! scaledown_window_secs = 15
//!
//! [bootstrap.models]
//! ace_step = "http://127.0.0.1:2030"
//! qwen = "http://127.0.0.1:2020"
//! sdxl_turbo = "http://127.0.0.1:2031"
//! ```

pub mod bootstrap;
pub mod infra;
pub mod loader;

pub use bootstrap::{BootstrapConfig, LlmConfig, ModelsConfig};
pub use infra::{
    BindConfig, DeploymentConfig, InfraConfig, PathsConfig, StorageBackend, StorageConfig,
    TelemetryConfig,
};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HarmonConfig {
    #[serde(flatten)]
    pub infra: InfraConfig,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl HarmonConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an explicit file taking the place of `./harmonai.toml`.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and env vars contributed.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = HarmonConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand so sections come out in a stable, readable order
        let mut output = String::new();

        output.push_str("# HarmonAI Configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "output_dir = {}\n",
            quoted(&self.infra.paths.output_dir.display().to_string())
        ));
        output.push_str(&format!(
            "storage_dir = {}\n",
            quoted(&self.infra.paths.storage_dir.display().to_string())
        ));

        output.push_str("\n[bind]\n");
        output.push_str(&format!("host = {}\n", quoted(&self.infra.bind.host)));
        output.push_str(&format!("http_port = {}\n", self.infra.bind.http_port));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "otlp_endpoint = {}\n",
            quoted(&self.infra.telemetry.otlp_endpoint)
        ));
        output.push_str(&format!(
            "log_level = {}\n",
            quoted(&self.infra.telemetry.log_level)
        ));

        output.push_str("\n[storage]\n");
        output.push_str(&format!(
            "backend = {}\n",
            quoted(&self.infra.storage.backend.to_string())
        ));
        output.push_str(&format!(
            "endpoint_url = {}\n",
            quoted(&self.infra.storage.endpoint_url)
        ));
        output.push_str(&format!("bucket = {}\n", quoted(&self.infra.storage.bucket)));
        output.push_str(&format!("region = {}\n", quoted(&self.infra.storage.region)));
        output.push_str(&format!(
            "virtual_addressing = {}\n",
            self.infra.storage.virtual_addressing
        ));

        output.push_str("\n[deployment]\n");
        output.push_str(&format!("gpu = {}\n", quoted(&self.infra.deployment.gpu)));
        output.push_str(&format!(
            "scaledown_window_secs = {}\n",
            self.infra.deployment.scaledown_window_secs
        ));

        output.push_str("\n[bootstrap.models]\n");
        let mut models: Vec<_> = self.bootstrap.models.iter().collect();
        models.sort_by_key(|(k, _)| *k);
        for (name, url) in models {
            output.push_str(&format!("{} = {}\n", quoted_key(name), quoted(url)));
        }

        output.push_str("\n[bootstrap.llm]\n");
        output.push_str(&format!("model = {}\n", quoted(&self.bootstrap.llm.model)));
        output.push_str(&format!(
            "max_new_tokens = {}\n",
            self.bootstrap.llm.max_new_tokens
        ));

        output
    }
}

/// A TOML basic string, escaped.
fn quoted(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

/// Bare keys stay bare; anything else is quoted.
fn quoted_key(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare {
        key.to_string()
    } else {
        quoted(key)
    }
}
