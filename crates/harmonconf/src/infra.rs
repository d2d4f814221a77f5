//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem paths used by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Scratch directory for generated audio and cover images before upload.
    /// Default: /tmp/outputs
    #[serde(default = "PathsConfig::default_output_dir")]
    pub output_dir: PathBuf,

    /// Root for the filesystem storage backend.
    /// Default: ~/.local/share/harmonai/objects
    #[serde(default = "PathsConfig::default_storage_dir")]
    pub storage_dir: PathBuf,
}

impl PathsConfig {
    fn default_output_dir() -> PathBuf {
        PathBuf::from("/tmp/outputs")
    }

    fn default_storage_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/harmonai/objects"))
            .unwrap_or_else(|| PathBuf::from(".local/share/harmonai/objects"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: Self::default_output_dir(),
            storage_dir: Self::default_storage_dir(),
        }
    }
}

/// Network bind address for the HTTP endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// Default: 8000
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_http_port() -> u16 {
        8000
    }

    /// `host:port` suitable for a socket bind.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            http_port: Self::default_http_port(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint. Empty disables export and keeps console logging only.
    #[serde(default)]
    pub otlp_endpoint: String,

    /// Log filter directive (trace, debug, info, warn, error, or a full EnvFilter).
    /// Default: info,harmonai=debug
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info,harmonai=debug".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: String::new(),
            log_level: Self::default_log_level(),
        }
    }
}

/// Where uploaded artifacts go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// S3-compatible object storage.
    #[default]
    S3,
    /// Local directory, for development and tests.
    Filesystem,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "filesystem" | "fs" | "local" => Ok(Self::Filesystem),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::S3 => write!(f, "s3"),
            Self::Filesystem => write!(f, "filesystem"),
        }
    }
}

/// Object storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// S3 endpoint URL.
    /// Default: https://t3.storage.dev
    #[serde(default = "StorageConfig::default_endpoint_url")]
    pub endpoint_url: String,

    /// Bucket name. Usually supplied through `S3_BUCKET_NAME`.
    #[serde(default)]
    pub bucket: String,

    /// Signing region.
    /// Default: auto
    #[serde(default = "StorageConfig::default_region")]
    pub region: String,

    /// Virtual-hosted style addressing (`bucket.endpoint/key`) instead of path style.
    #[serde(default = "StorageConfig::default_virtual_addressing")]
    pub virtual_addressing: bool,
}

impl StorageConfig {
    fn default_endpoint_url() -> String {
        "https://t3.storage.dev".to_string()
    }

    fn default_region() -> String {
        "auto".to_string()
    }

    fn default_virtual_addressing() -> bool {
        true
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            endpoint_url: Self::default_endpoint_url(),
            bucket: String::new(),
            region: Self::default_region(),
            virtual_addressing: Self::default_virtual_addressing(),
        }
    }
}

/// Values describing the GPU worker deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// GPU class the worker is provisioned on. Informational.
    #[serde(default = "DeploymentConfig::default_gpu")]
    pub gpu: String,

    /// Seconds of inactivity before the worker shuts itself down. 0 = never.
    #[serde(default)]
    pub scaledown_window_secs: u64,
}

impl DeploymentConfig {
    fn default_gpu() -> String {
        "L40S".to_string()
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            gpu: Self::default_gpu(),
            scaledown_window_secs: 0,
        }
    }
}

/// Infrastructure configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InfraConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub deployment: DeploymentConfig,
}
