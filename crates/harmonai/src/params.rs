//! Generation parameters shared by every structured endpoint.
//!
//! Values are forwarded to the audio pipeline as-is. Nothing here checks
//! ranges; a negative duration or an unknown scheduler name is the audio
//! service's problem to reject.

use serde::{Deserialize, Serialize};

/// Lyrics sent to the audio pipeline when the caller asks for no vocals.
pub const INSTRUMENTAL_SENTINEL: &str = "[instrumental]";

/// Knobs for one audio generation.
///
/// Every field has a default, so an empty JSON object is a valid request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParameters {
    /// Target length in seconds.
    pub audio_duration: f64,
    /// -1 asks the pipeline to pick a random seed.
    pub seed: i64,
    pub guidance_scale: f64,
    pub infer_step: i64,
    /// Skip vocals; lyrics become [`INSTRUMENTAL_SENTINEL`].
    pub instrumental: bool,
    pub scheduler_type: String,
    pub cfg_type: String,
    pub omega_scale: f64,
    pub guidance_interval: f64,
    pub guidance_interval_decay: f64,
    pub min_guidance_scale: f64,
    pub use_erg_tag: bool,
    pub use_erg_lyric: bool,
    pub use_erg_diffusion: bool,
    /// Explicit step indices for the sampler, in order.
    pub oss_steps: Vec<i64>,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            audio_duration: 180.0,
            seed: -1,
            guidance_scale: 15.0,
            infer_step: 60,
            instrumental: false,
            scheduler_type: "euler".to_string(),
            cfg_type: "apg".to_string(),
            omega_scale: 10.0,
            guidance_interval: 0.5,
            guidance_interval_decay: 0.0,
            min_guidance_scale: 3.0,
            use_erg_tag: true,
            use_erg_lyric: true,
            use_erg_diffusion: true,
            oss_steps: Vec::new(),
        }
    }
}

impl GenerationParameters {
    /// Seed in the string form the audio pipeline expects for `manual_seeds`.
    pub fn manual_seeds(&self) -> String {
        self.seed.to_string()
    }

    /// Lyrics to hand the audio pipeline, honoring the instrumental toggle.
    pub fn effective_lyrics<'a>(&self, lyrics: &'a str) -> &'a str {
        if self.instrumental {
            INSTRUMENTAL_SENTINEL
        } else {
            lyrics
        }
    }

    /// Fixed settings used by the smoke-test endpoint.
    pub fn smoke_test() -> Self {
        Self {
            audio_duration: 221.42547916666666,
            ..Self::default()
        }
    }
}
