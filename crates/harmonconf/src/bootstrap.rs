//! Bootstrap configuration - model services the worker loads at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Model service endpoints, keyed by model name.
pub type ModelsConfig = HashMap<String, String>;

/// Key for the audio diffusion service.
pub const ACE_STEP: &str = "ace_step";
/// Key for the instruction-tuned language model service.
pub const QWEN: &str = "qwen";
/// Key for the text-to-image service.
pub const SDXL_TURBO: &str = "sdxl_turbo";

/// Default model endpoints for bootstrap.
pub fn default_models() -> ModelsConfig {
    let mut models = HashMap::new();
    models.insert(QWEN.to_string(), "http://127.0.0.1:2020".to_string());
    models.insert(ACE_STEP.to_string(), "http://127.0.0.1:2030".to_string());
    models.insert(SDXL_TURBO.to_string(), "http://127.0.0.1:2031".to_string());
    models
}

/// Language model call settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model id sent with chat completion requests.
    #[serde(default = "LlmConfig::default_model")]
    pub model: String,

    /// Upper bound on generated tokens per derivation.
    #[serde(default = "LlmConfig::default_max_new_tokens")]
    pub max_new_tokens: u32,
}

impl LlmConfig {
    fn default_model() -> String {
        "Qwen/Qwen2-7B-Instruct".to_string()
    }

    fn default_max_new_tokens() -> u32 {
        512
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: Self::default_model(),
            max_new_tokens: Self::default_max_new_tokens(),
        }
    }
}

/// Bootstrap configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default = "default_models")]
    pub models: ModelsConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

impl BootstrapConfig {
    /// URL for a named model service, if configured.
    pub fn model_url(&self, name: &str) -> Option<&str> {
        self.models.get(name).map(String::as_str)
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            llm: LlmConfig::default(),
        }
    }
}
