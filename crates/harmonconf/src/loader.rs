//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, HarmonConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local). Only existing files are returned.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/harmonai/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("harmonai/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("harmonai.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load a TOML file and layer it over `config`.
pub fn apply_file(config: &mut HarmonConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Layer the values present in a TOML document over `config`.
///
/// Keys absent from the document leave the existing value alone, so files
/// stack in discovery order.
pub fn apply_toml(config: &mut HarmonConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("output_dir").and_then(|v| v.as_str()) {
            config.infra.paths.output_dir = expand_path(v);
        }
        if let Some(v) = paths.get("storage_dir").and_then(|v| v.as_str()) {
            config.infra.paths.storage_dir = expand_path(v);
        }
    }

    if let Some(bind) = table.get("bind").and_then(|v| v.as_table()) {
        if let Some(v) = bind.get("host").and_then(|v| v.as_str()) {
            config.infra.bind.host = v.to_string();
        }
        if let Some(v) = bind.get("http_port").and_then(|v| v.as_integer()) {
            config.infra.bind.http_port = u16::try_from(v)
                .map_err(|_| parse_err(format!("bind.http_port {} is not a valid port", v)))?;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.infra.telemetry.otlp_endpoint = v.to_string();
        }
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.infra.telemetry.log_level = v.to_string();
        }
    }

    if let Some(storage) = table.get("storage").and_then(|v| v.as_table()) {
        if let Some(v) = storage.get("backend").and_then(|v| v.as_str()) {
            config.infra.storage.backend = v.parse().map_err(parse_err)?;
        }
        if let Some(v) = storage.get("endpoint_url").and_then(|v| v.as_str()) {
            config.infra.storage.endpoint_url = v.to_string();
        }
        if let Some(v) = storage.get("bucket").and_then(|v| v.as_str()) {
            config.infra.storage.bucket = v.to_string();
        }
        if let Some(v) = storage.get("region").and_then(|v| v.as_str()) {
            config.infra.storage.region = v.to_string();
        }
        if let Some(v) = storage.get("virtual_addressing").and_then(|v| v.as_bool()) {
            config.infra.storage.virtual_addressing = v;
        }
    }

    if let Some(deployment) = table.get("deployment").and_then(|v| v.as_table()) {
        if let Some(v) = deployment.get("gpu").and_then(|v| v.as_str()) {
            config.infra.deployment.gpu = v.to_string();
        }
        if let Some(v) = deployment.get("scaledown_window_secs").and_then(|v| v.as_integer()) {
            config.infra.deployment.scaledown_window_secs = u64::try_from(v).map_err(|_| {
                parse_err(format!("deployment.scaledown_window_secs {} must be >= 0", v))
            })?;
        }
    }

    if let Some(bootstrap) = table.get("bootstrap").and_then(|v| v.as_table()) {
        if let Some(models) = bootstrap.get("models").and_then(|v| v.as_table()) {
            for (name, url) in models {
                if let Some(url) = url.as_str() {
                    config.bootstrap.models.insert(name.clone(), url.to_string());
                }
            }
        }

        if let Some(llm) = bootstrap.get("llm").and_then(|v| v.as_table()) {
            if let Some(v) = llm.get("model").and_then(|v| v.as_str()) {
                config.bootstrap.llm.model = v.to_string();
            }
            if let Some(v) = llm.get("max_new_tokens").and_then(|v| v.as_integer()) {
                config.bootstrap.llm.max_new_tokens = u32::try_from(v).map_err(|_| {
                    parse_err(format!("bootstrap.llm.max_new_tokens {} is out of range", v))
                })?;
            }
        }
    }

    Ok(())
}

/// Apply process environment overrides to config.
pub fn apply_env_overrides(config: &mut HarmonConfig, sources: &mut ConfigSources) {
    apply_env_overrides_from(config, sources, env::vars());
}

/// Apply overrides from an explicit set of variables.
///
/// Unparsable numeric values are ignored, matching the file loader's lenience
/// for missing keys.
pub fn apply_env_overrides_from<I>(config: &mut HarmonConfig, sources: &mut ConfigSources, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut vars: Vec<(String, String)> = vars.into_iter().collect();
    // Standard OTEL and RUST_LOG vars win over their HARMONAI_ twins, so apply them last.
    vars.sort_by_key(|(key, _)| matches!(key.as_str(), "OTEL_EXPORTER_OTLP_ENDPOINT" | "RUST_LOG"));

    for (key, value) in vars {
        let applied = match key.as_str() {
            "HARMONAI_OUTPUT_DIR" => {
                config.infra.paths.output_dir = expand_path(&value);
                true
            }
            "HARMONAI_STORAGE_DIR" => {
                config.infra.paths.storage_dir = expand_path(&value);
                true
            }
            "HARMONAI_HOST" => {
                config.infra.bind.host = value;
                true
            }
            "HARMONAI_HTTP_PORT" => match value.parse() {
                Ok(port) => {
                    config.infra.bind.http_port = port;
                    true
                }
                Err(_) => false,
            },
            "HARMONAI_OTLP_ENDPOINT" | "OTEL_EXPORTER_OTLP_ENDPOINT" => {
                config.infra.telemetry.otlp_endpoint = value;
                true
            }
            "HARMONAI_LOG_LEVEL" | "RUST_LOG" => {
                config.infra.telemetry.log_level = value;
                true
            }
            "HARMONAI_STORAGE_BACKEND" => match value.parse() {
                Ok(backend) => {
                    config.infra.storage.backend = backend;
                    true
                }
                Err(_) => false,
            },
            "HARMONAI_S3_ENDPOINT" => {
                config.infra.storage.endpoint_url = value;
                true
            }
            "HARMONAI_S3_REGION" => {
                config.infra.storage.region = value;
                true
            }
            "S3_BUCKET_NAME" | "HARMONAI_S3_BUCKET" => {
                config.infra.storage.bucket = value;
                true
            }
            "HARMONAI_SCALEDOWN_WINDOW" => match value.parse() {
                Ok(secs) => {
                    config.infra.deployment.scaledown_window_secs = secs;
                    true
                }
                Err(_) => false,
            },
            "HARMONAI_LLM_MODEL" => {
                config.bootstrap.llm.model = value;
                true
            }
            _ => {
                // Model endpoints (HARMONAI_MODEL_<NAME>)
                if let Some(model_name) = key.strip_prefix("HARMONAI_MODEL_") {
                    config.bootstrap.models.insert(model_name.to_lowercase(), value);
                    true
                } else {
                    false
                }
            }
        };

        if applied {
            sources.env_overrides.push(key);
        }
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
