//! Client for a running HarmonAI worker.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::request::{
    GenerateFromDescriptionRequest, GenerateMusicResponse, GenerateMusicResponseS3,
    GenerateWithCustomLyricsRequest, GenerateWithDescribedLyricsRequest,
};
use crate::telemetry::inject_trace_context;

#[derive(Debug, Clone)]
pub struct HarmonClient {
    base_url: String,
    client: reqwest::Client,
}

impl HarmonClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Smoke-test generation; returns the decoded WAV bytes.
    pub async fn smoke(&self) -> Result<Vec<u8>> {
        let response: GenerateMusicResponse = self.post("/generate", None::<&()>).await?;
        BASE64
            .decode(response.audio_data)
            .context("Server returned invalid base64 audio")
    }

    pub async fn from_description(
        &self,
        request: &GenerateFromDescriptionRequest,
    ) -> Result<GenerateMusicResponseS3> {
        self.post("/generate_from_description", Some(request)).await
    }

    pub async fn with_lyrics(
        &self,
        request: &GenerateWithCustomLyricsRequest,
    ) -> Result<GenerateMusicResponseS3> {
        self.post("/generate_with_lyrics", Some(request)).await
    }

    pub async fn with_described_lyrics(
        &self,
        request: &GenerateWithDescribedLyricsRequest,
    ) -> Result<GenerateMusicResponseS3> {
        self.post("/generate_with_described_lyrics", Some(request)).await
    }

    async fn post<B, R>(&self, path: &str, body: Option<&B>) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.post(&url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = inject_trace_context(builder)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            anyhow::bail!("{} returned {}: {}", url, status, error_text);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}
