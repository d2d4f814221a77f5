//! Model collaborators: audio diffusion, language model, image diffusion.
//!
//! Each model sits behind a narrow async trait. The worker loads one
//! [`Models`] at startup and every request shares it read-only.

pub mod http;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use harmonconf::bootstrap::{ACE_STEP, QWEN, SDXL_TURBO};
use harmonconf::HarmonConfig;
use serde::Serialize;

use crate::params::GenerationParameters;

/// Named arguments for one audio generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioRequest {
    pub prompt: String,
    pub lyrics: String,
    pub audio_duration: f64,
    pub infer_step: i64,
    pub guidance_scale: f64,
    /// Omitted when the pipeline should use its own seeding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_seeds: Option<String>,
    pub scheduler_type: String,
    pub cfg_type: String,
    pub omega_scale: f64,
    pub guidance_interval: f64,
    pub guidance_interval_decay: f64,
    pub min_guidance_scale: f64,
    pub use_erg_tag: bool,
    pub use_erg_lyric: bool,
    pub use_erg_diffusion: bool,
    pub oss_steps: Vec<i64>,
}

impl AudioRequest {
    /// Build the arguments for `prompt` and `lyrics` under `params`.
    ///
    /// The instrumental toggle is applied here, so `lyrics` may be replaced
    /// by the sentinel.
    pub fn new(prompt: &str, lyrics: &str, params: &GenerationParameters) -> Self {
        Self {
            prompt: prompt.to_string(),
            lyrics: params.effective_lyrics(lyrics).to_string(),
            audio_duration: params.audio_duration,
            infer_step: params.infer_step,
            guidance_scale: params.guidance_scale,
            manual_seeds: Some(params.manual_seeds()),
            scheduler_type: params.scheduler_type.clone(),
            cfg_type: params.cfg_type.clone(),
            omega_scale: params.omega_scale,
            guidance_interval: params.guidance_interval,
            guidance_interval_decay: params.guidance_interval_decay,
            min_guidance_scale: params.min_guidance_scale,
            use_erg_tag: params.use_erg_tag,
            use_erg_lyric: params.use_erg_lyric,
            use_erg_diffusion: params.use_erg_diffusion,
            oss_steps: params.oss_steps.clone(),
        }
    }

    /// Same arguments with pipeline-chosen seeding.
    pub fn without_seed(mut self) -> Self {
        self.manual_seeds = None;
        self
    }
}

/// Arguments for one text-to-image call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
}

/// Audio diffusion pipeline.
///
/// The pipeline writes its result to `output_path` instead of returning it;
/// callers read the file back afterwards.
#[async_trait]
pub trait AudioPipeline: Send + Sync {
    async fn synthesize(&self, request: &AudioRequest, output_path: &Path) -> Result<()>;
}

/// Instruction-following language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send `instruction` as a single user turn and return the decoded reply.
    async fn complete(&self, instruction: &str) -> Result<String>;
}

/// Text-to-image pipeline. Returns encoded images (PNG), possibly several.
#[async_trait]
pub trait ImagePipeline: Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<Vec<u8>>>;
}

/// Model handles loaded once per worker.
#[derive(Clone)]
pub struct Models {
    pub audio: Arc<dyn AudioPipeline>,
    pub llm: Arc<dyn LanguageModel>,
    pub image: Arc<dyn ImagePipeline>,
    /// (name, url) for each configured service, for health output.
    pub endpoints: Vec<(String, String)>,
}

impl Models {
    /// Assemble handles from already-constructed collaborators.
    pub fn new(
        audio: Arc<dyn AudioPipeline>,
        llm: Arc<dyn LanguageModel>,
        image: Arc<dyn ImagePipeline>,
    ) -> Self {
        Self {
            audio,
            llm,
            image,
            endpoints: Vec::new(),
        }
    }

    /// Connect to the model services named in the bootstrap config.
    ///
    /// Each service is health-checked once; an unreachable service is logged and the
    /// worker starts anyway, since the platform may still be bringing GPUs up.
    pub async fn load(config: &HarmonConfig) -> Result<Self> {
        let url_for = |name: &str| {
            config
                .bootstrap
                .model_url(name)
                .map(str::to_string)
                .with_context(|| format!("No URL configured for model service '{}'", name))
        };

        let ace_step_url = url_for(ACE_STEP)?;
        let qwen_url = url_for(QWEN)?;
        let sdxl_url = url_for(SDXL_TURBO)?;

        let audio = http::AceStepClient::new(&ace_step_url)?;
        let llm = http::QwenClient::new(&qwen_url, &config.bootstrap.llm)?;
        let image = http::SdxlTurboClient::new(&sdxl_url)?;

        for (name, service) in [
            (ACE_STEP, audio.service()),
            (QWEN, llm.service()),
            (SDXL_TURBO, image.service()),
        ] {
            match service.health().await {
                Ok(()) => tracing::info!("   {} ready at {}", name, service.base_url()),
                Err(e) => tracing::warn!("   {} not reachable at {}: {}", name, service.base_url(), e),
            }
        }

        let mut endpoints = vec![
            (ACE_STEP.to_string(), ace_step_url),
            (QWEN.to_string(), qwen_url),
            (SDXL_TURBO.to_string(), sdxl_url),
        ];
        endpoints.sort();

        Ok(Self {
            audio: Arc::new(audio),
            llm: Arc::new(llm),
            image: Arc::new(image),
            endpoints,
        })
    }
}
