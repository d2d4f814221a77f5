//! Request and response bodies for the generation endpoints.
//!
//! Each endpoint has its own body type. They are converted into a single
//! [`GenerationRequest`] at the HTTP boundary, so the pipeline never has to
//! guess which fields were supplied.

use serde::{Deserialize, Serialize};

use crate::params::GenerationParameters;

/// Body of `/generate_from_description`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateFromDescriptionRequest {
    #[serde(flatten)]
    pub params: GenerationParameters,
    pub full_described_song: String,
}

/// Body of `/generate_with_lyrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateWithCustomLyricsRequest {
    #[serde(flatten)]
    pub params: GenerationParameters,
    pub prompt: String,
    pub lyrics: String,
}

/// Body of `/generate_with_described_lyrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateWithDescribedLyricsRequest {
    #[serde(flatten)]
    pub params: GenerationParameters,
    pub prompt: String,
    pub described_lyrics: String,
}

/// What the caller gave us to start from.
#[derive(Debug, Clone, PartialEq)]
pub enum SongSource {
    /// One free-text description; prompt and lyrics are both derived.
    Description { full_described_song: String },
    /// Prompt and lyrics used verbatim.
    CustomLyrics { prompt: String, lyrics: String },
    /// Prompt used verbatim; lyrics derived from a description of them.
    DescribedLyrics {
        prompt: String,
        described_lyrics: String,
    },
}

impl SongSource {
    /// Short label for logs and spans.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Description { .. } => "description",
            Self::CustomLyrics { .. } => "custom_lyrics",
            Self::DescribedLyrics { .. } => "described_lyrics",
        }
    }
}

/// A structured generation request with its source resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub source: SongSource,
    pub params: GenerationParameters,
}

impl From<GenerateFromDescriptionRequest> for GenerationRequest {
    fn from(request: GenerateFromDescriptionRequest) -> Self {
        Self {
            source: SongSource::Description {
                full_described_song: request.full_described_song,
            },
            params: request.params,
        }
    }
}

impl From<GenerateWithCustomLyricsRequest> for GenerationRequest {
    fn from(request: GenerateWithCustomLyricsRequest) -> Self {
        Self {
            source: SongSource::CustomLyrics {
                prompt: request.prompt,
                lyrics: request.lyrics,
            },
            params: request.params,
        }
    }
}

impl From<GenerateWithDescribedLyricsRequest> for GenerationRequest {
    fn from(request: GenerateWithDescribedLyricsRequest) -> Self {
        Self {
            source: SongSource::DescribedLyrics {
                prompt: request.prompt,
                described_lyrics: request.described_lyrics,
            },
            params: request.params,
        }
    }
}

/// Response of `/generate`: the WAV file, base64 encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateMusicResponse {
    pub audio_data: String,
}

/// Response of the structured endpoints: storage keys plus genre tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateMusicResponseS3 {
    pub s3_key: String,
    pub cover_image_s3_key: String,
    pub categories: Vec<String>,
}
