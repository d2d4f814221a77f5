//! The generation pipeline: resolve text, render audio and cover, upload, tag.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::artifact::{ArtifactKind, ScratchFile};
use crate::derive::TextDeriver;
use crate::models::{AudioRequest, ImageRequest, Models};
use crate::params::GenerationParameters;
use crate::request::{GenerateMusicResponse, GenerateMusicResponseS3, GenerationRequest, SongSource};
use crate::storage::ObjectStore;

/// Cover art is rendered from the audio prompt plus this suffix.
pub const COVER_PROMPT_SUFFIX: &str = ", album cover art";
pub const COVER_INFERENCE_STEPS: u32 = 2;
pub const COVER_GUIDANCE_SCALE: f64 = 0.0;

pub const SMOKE_PROMPT: &str = "electronic rap";
pub const SMOKE_LYRICS: &str = "[verse]
Waves on the bass, pulsing in the speakers,
Turn the dial up, we chasing six-figure features,
Grinding on the beats, codes in the creases,
Digital hustler, midnight in sneakers.

[chorus]
Electro vibes, hearts beat with the hum,
Urban legends ride, we ain't ever numb,
Circuits sparking live, tapping on the drum,
Living on the edge, never succumb.

[verse]
Synthesizers blaze, city lights a glow,
Rhythm in the haze, moving with the flow,
Swagger on stage, energy to blow,
From the blocks to the booth, you already know.

[bridge]
Night's electric, streets full of dreams,
Bass hits collective, bursting at seams,
Hustle perspective, all in the schemes,
Rise and reflective, ain't no in-betweens.

[verse]
Vibin' with the crew, sync in the wire,
Got the dance moves, fire in the attire,
Rhythm and blues, soul's our supplier,
Run the digital zoo, higher and higher.

[chorus]
Electro vibes, hearts beat with the hum,
Urban legends ride, we ain't ever numb,
Circuits sparking live, tapping on the drum,
Living on the edge, never succumb.";

/// Prompt and lyrics ready for the audio model, plus the text to tag from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSong {
    pub prompt: String,
    /// Empty when derivation was skipped for an instrumental.
    pub lyrics: String,
    pub categorize_from: String,
}

/// Runs requests against the worker's models and object store.
#[derive(Clone)]
pub struct GenerationService {
    models: Models,
    deriver: TextDeriver,
    store: Arc<dyn ObjectStore>,
    output_dir: PathBuf,
}

impl GenerationService {
    pub fn new(models: Models, store: Arc<dyn ObjectStore>, output_dir: impl Into<PathBuf>) -> Self {
        let deriver = TextDeriver::new(models.llm.clone());
        Self {
            models,
            deriver,
            store,
            output_dir: output_dir.into(),
        }
    }

    pub fn models(&self) -> &Models {
        &self.models
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Fill in whatever text the caller didn't supply.
    ///
    /// Lyrics are never derived for an instrumental; the audio request
    /// swaps in the sentinel anyway.
    pub async fn resolve(&self, request: &GenerationRequest) -> Result<ResolvedSong> {
        let instrumental = request.params.instrumental;

        match &request.source {
            SongSource::Description {
                full_described_song,
            } => {
                let prompt = self.deriver.derive_prompt(full_described_song).await?;
                let lyrics = if instrumental {
                    String::new()
                } else {
                    self.deriver.derive_lyrics(full_described_song).await?
                };
                Ok(ResolvedSong {
                    prompt,
                    lyrics,
                    categorize_from: full_described_song.clone(),
                })
            }
            SongSource::CustomLyrics { prompt, lyrics } => Ok(ResolvedSong {
                prompt: prompt.clone(),
                lyrics: lyrics.clone(),
                categorize_from: prompt.clone(),
            }),
            SongSource::DescribedLyrics {
                prompt,
                described_lyrics,
            } => {
                let lyrics = if instrumental {
                    String::new()
                } else {
                    self.deriver.derive_lyrics(described_lyrics).await?
                };
                Ok(ResolvedSong {
                    prompt: prompt.clone(),
                    lyrics,
                    categorize_from: prompt.clone(),
                })
            }
        }
    }

    /// Full pipeline for a structured request.
    #[tracing::instrument(
        name = "pipeline.generate",
        skip(self, request),
        fields(source = request.source.kind(), instrumental = request.params.instrumental)
    )]
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerateMusicResponseS3> {
        let song = self.resolve(&request).await?;
        self.render_and_upload(&song, &request.params).await
    }

    /// Audio, upload, cover, upload, categories. Strictly in that order.
    pub async fn render_and_upload(
        &self,
        song: &ResolvedSong,
        params: &GenerationParameters,
    ) -> Result<GenerateMusicResponseS3> {
        let audio_request = AudioRequest::new(&song.prompt, &song.lyrics, params);
        tracing::info!(prompt = %audio_request.prompt, "🎵 Rendering audio");
        tracing::debug!(lyrics = %audio_request.lyrics, "Lyrics");

        let audio = self.synthesize_audio(&audio_request).await?;
        let s3_key = audio.upload(self.store.as_ref()).await?;
        tracing::info!(key = %s3_key, "   Audio stored");

        let cover = self.synthesize_cover(&song.prompt).await?;
        let cover_image_s3_key = cover.upload(self.store.as_ref()).await?;
        tracing::info!(key = %cover_image_s3_key, "   Cover stored");

        let categories = self.deriver.derive_categories(&song.categorize_from).await?;

        Ok(GenerateMusicResponseS3 {
            s3_key,
            cover_image_s3_key,
            categories,
        })
    }

    /// Render audio into a fresh scratch file.
    pub async fn synthesize_audio(&self, request: &AudioRequest) -> Result<ScratchFile> {
        let file = ScratchFile::allocate(&self.output_dir, ArtifactKind::Audio).await?;
        self.models.audio.synthesize(request, file.path()).await?;
        Ok(file)
    }

    /// Render cover art for `prompt` into a fresh scratch file.
    pub async fn synthesize_cover(&self, prompt: &str) -> Result<ScratchFile> {
        let request = ImageRequest {
            prompt: format!("{}{}", prompt, COVER_PROMPT_SUFFIX),
            num_inference_steps: COVER_INFERENCE_STEPS,
            guidance_scale: COVER_GUIDANCE_SCALE,
        };

        let image = self
            .models
            .image
            .generate(&request)
            .await?
            .into_iter()
            .next()
            .context("Image model returned no images")?;

        let file = ScratchFile::allocate(&self.output_dir, ArtifactKind::CoverImage).await?;
        tokio::fs::write(file.path(), &image)
            .await
            .with_context(|| format!("Failed to write cover to {}", file.path().display()))?;
        Ok(file)
    }

    /// Fixed prompt and lyrics, audio returned inline. Nothing is uploaded.
    #[tracing::instrument(name = "pipeline.smoke", skip(self))]
    pub async fn generate_smoke(&self) -> Result<GenerateMusicResponse> {
        let request = AudioRequest::new(SMOKE_PROMPT, SMOKE_LYRICS, &GenerationParameters::smoke_test())
            .without_seed();

        let audio = self.synthesize_audio(&request).await?;
        let bytes = audio.read().await?;
        audio.remove().await?;

        Ok(GenerateMusicResponse {
            audio_data: BASE64.encode(bytes),
        })
    }
}
