//! HTTP clients for the model services.
//!
//! Each model runs as its own GPU service; these clients speak its JSON
//! protocol and propagate the current trace via `traceparent`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use harmonconf::LlmConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{AudioPipeline, AudioRequest, ImagePipeline, ImageRequest, LanguageModel};
use crate::telemetry::inject_trace_context;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared plumbing for one model service.
///
/// Generation calls carry no timeout; a song can take minutes to render.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    name: &'static str,
    base_url: String,
    client: reqwest::Client,
    health_client: reqwest::Client,
}

impl ServiceClient {
    pub fn new(name: &'static str, base_url: &str) -> Result<Self> {
        let health_client = reqwest::Client::builder()
            .timeout(HEALTH_TIMEOUT)
            .build()
            .context("Failed to build health check client")?;

        Ok(Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            health_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `/health`; any 2xx counts as ready.
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let resp = self
            .health_client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("{} health check failed", self.name))?;

        if !resp.status().is_success() {
            anyhow::bail!("{} health check returned {}", self.name, resp.status());
        }
        Ok(())
    }

    /// POST `body` to `path` and decode the JSON reply.
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let builder = inject_trace_context(self.client.post(&url).json(body));

        let resp = match builder.send().await {
            Ok(r) => r,
            Err(e) if e.is_connect() => {
                anyhow::bail!(
                    "{} service unavailable at {} - is it running? Error: {}",
                    self.name,
                    self.base_url,
                    e
                )
            }
            Err(e) => anyhow::bail!("HTTP error calling {} service: {}", self.name, e),
        };

        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(5);

            tracing::warn!(
                service = self.name,
                retry_after = retry_after,
                "GPU busy"
            );
            anyhow::bail!("{} GPU busy, retry after {}s", self.name, retry_after);
        }

        if !status.is_success() {
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            anyhow::bail!("{} API error {}: {}", self.name, status, error_text);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.name))
    }
}

// --- ACE-Step audio ---

#[derive(Debug, Deserialize)]
struct AceStepResponse {
    audio_base64: String,
}

/// Audio diffusion service client.
#[derive(Debug, Clone)]
pub struct AceStepClient {
    service: ServiceClient,
}

impl AceStepClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            service: ServiceClient::new("ACE-Step", base_url)?,
        })
    }

    pub fn service(&self) -> &ServiceClient {
        &self.service
    }
}

#[async_trait]
impl AudioPipeline for AceStepClient {
    #[tracing::instrument(
        name = "model.ace_step.synthesize",
        skip(self, request),
        fields(
            audio.duration = request.audio_duration,
            audio.infer_step = request.infer_step,
            audio.bytes = tracing::field::Empty,
        )
    )]
    async fn synthesize(&self, request: &AudioRequest, output_path: &Path) -> Result<()> {
        let response: AceStepResponse = self.service.post_json("/generate", request).await?;

        let audio = BASE64
            .decode(&response.audio_base64)
            .context("Failed to decode audio_base64")?;
        tracing::Span::current().record("audio.bytes", audio.len());

        tokio::fs::write(output_path, &audio)
            .await
            .with_context(|| format!("Failed to write audio to {}", output_path.display()))?;
        Ok(())
    }
}

// --- Qwen language model ---

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Language model client for an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone)]
pub struct QwenClient {
    service: ServiceClient,
    model: String,
    max_tokens: u32,
}

impl QwenClient {
    pub fn new(base_url: &str, llm: &LlmConfig) -> Result<Self> {
        Ok(Self {
            service: ServiceClient::new("Qwen", base_url)?,
            model: llm.model.clone(),
            max_tokens: llm.max_new_tokens,
        })
    }

    pub fn service(&self) -> &ServiceClient {
        &self.service
    }
}

#[async_trait]
impl LanguageModel for QwenClient {
    #[tracing::instrument(
        name = "model.qwen.complete",
        skip(self, instruction),
        fields(llm.model = %self.model, llm.reply_len = tracing::field::Empty)
    )]
    async fn complete(&self, instruction: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: instruction,
            }],
            max_tokens: self.max_tokens,
        };

        let response: ChatCompletionResponse = self
            .service
            .post_json("/v1/chat/completions", &request)
            .await?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("Qwen returned no completion")?;

        tracing::Span::current().record("llm.reply_len", reply.len());
        Ok(reply)
    }
}

// --- SDXL-Turbo images ---

#[derive(Debug, Deserialize)]
struct SdxlResponse {
    images: Vec<String>,
}

/// Text-to-image service client.
#[derive(Debug, Clone)]
pub struct SdxlTurboClient {
    service: ServiceClient,
}

impl SdxlTurboClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            service: ServiceClient::new("SDXL-Turbo", base_url)?,
        })
    }

    pub fn service(&self) -> &ServiceClient {
        &self.service
    }
}

#[async_trait]
impl ImagePipeline for SdxlTurboClient {
    #[tracing::instrument(
        name = "model.sdxl_turbo.generate",
        skip(self, request),
        fields(image.steps = request.num_inference_steps, image.count = tracing::field::Empty)
    )]
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<Vec<u8>>> {
        let response: SdxlResponse = self.service.post_json("/generate", request).await?;

        let images = response
            .images
            .iter()
            .map(|b64| BASE64.decode(b64).context("Failed to decode image"))
            .collect::<Result<Vec<_>>>()?;

        tracing::Span::current().record("image.count", images.len());
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    const WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt rendered";

    /// Serve `app` on an ephemeral local port; returns its base URL.
    async fn serve(app: Router) -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), server)
    }

    /// Route that records each JSON body and answers with `reply`.
    fn recording(seen: &Arc<Mutex<Vec<Value>>>, reply: Value) -> axum::routing::MethodRouter {
        let seen = seen.clone();
        post(move |Json(body): Json<Value>| {
            let seen = seen.clone();
            let reply = reply.clone();
            async move {
                seen.lock().unwrap().push(body);
                Json(reply)
            }
        })
    }

    fn audio_request() -> AudioRequest {
        AudioRequest::new("ambient, 90 BPM", "[verse]\nhum", &Default::default())
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ServiceClient::new("test", "http://127.0.0.1:2030/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:2030");
    }

    #[test]
    fn test_chat_request_shape() {
        let request = ChatCompletionRequest {
            model: "Qwen/Qwen2-7B-Instruct",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
            max_tokens: 512,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "Qwen/Qwen2-7B-Instruct");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["max_tokens"], 512);
    }

    #[test]
    fn test_chat_response_parsing() {
        let response: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "Pop, Rock"}}]}"#,
        )
        .unwrap();
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("Pop, Rock")
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_reports_name() {
        // Port 9 (discard) is closed on test hosts
        let client = AceStepClient::new("http://127.0.0.1:9").unwrap();
        let request = AudioRequest::new("ambient", "", &Default::default());
        let dir = tempfile::tempdir().unwrap();
        let err = client
            .synthesize(&request, &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ACE-Step"));
        assert!(!dir.path().join("out.wav").exists());
    }

    #[tokio::test]
    async fn test_ace_step_writes_decoded_audio() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().route(
            "/generate",
            recording(&seen, json!({ "audio_base64": BASE64.encode(WAV) })),
        );
        let (url, server) = serve(app).await;

        let client = AceStepClient::new(&url).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("song.wav");
        client.synthesize(&audio_request(), &out).await.unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), WAV);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["prompt"], "ambient, 90 BPM");
        assert_eq!(seen[0]["lyrics"], "[verse]\nhum");

        server.abort();
    }

    #[tokio::test]
    async fn test_ace_step_rejects_bad_base64() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().route(
            "/generate",
            recording(&seen, json!({ "audio_base64": "not base64!" })),
        );
        let (url, server) = serve(app).await;

        let client = AceStepClient::new(&url).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("song.wav");
        let err = client.synthesize(&audio_request(), &out).await.unwrap_err();

        assert!(err.to_string().contains("audio_base64"));
        assert!(!out.exists());

        server.abort();
    }

    #[tokio::test]
    async fn test_busy_gpu_reports_retry_after() {
        let app = Router::new().route(
            "/generate",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("retry-after", "7")],
                    "busy",
                )
            }),
        );
        let (url, server) = serve(app).await;

        let client = AceStepClient::new(&url).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("song.wav");
        let err = client.synthesize(&audio_request(), &out).await.unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("ACE-Step GPU busy"), "{}", msg);
        assert!(msg.contains("retry after 7s"), "{}", msg);
        assert!(!out.exists());

        server.abort();
    }

    #[tokio::test]
    async fn test_busy_gpu_without_header_defaults_retry() {
        let app = Router::new().route(
            "/generate",
            post(|| async { StatusCode::TOO_MANY_REQUESTS }),
        );
        let (url, server) = serve(app).await;

        let client = SdxlTurboClient::new(&url).unwrap();
        let request = ImageRequest {
            prompt: "cover".to_string(),
            num_inference_steps: 2,
            guidance_scale: 0.0,
        };
        let err = client.generate(&request).await.unwrap_err();
        assert!(err.to_string().contains("SDXL-Turbo GPU busy, retry after 5s"));

        server.abort();
    }

    #[tokio::test]
    async fn test_server_error_body_is_surfaced() {
        let app = Router::new().route(
            "/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "CUDA out of memory") }),
        );
        let (url, server) = serve(app).await;

        let client = AceStepClient::new(&url).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = client
            .synthesize(&audio_request(), &dir.path().join("song.wav"))
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("ACE-Step API error 500"), "{}", msg);
        assert!(msg.contains("CUDA out of memory"), "{}", msg);

        server.abort();
    }

    #[tokio::test]
    async fn test_qwen_extracts_first_choice() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().route(
            "/v1/chat/completions",
            recording(
                &seen,
                json!({
                    "choices": [
                        { "index": 0, "message": { "role": "assistant", "content": " Pop, Rock\n" } },
                        { "index": 1, "message": { "role": "assistant", "content": "Jazz" } }
                    ]
                }),
            ),
        );
        let (url, server) = serve(app).await;

        let llm = LlmConfig {
            model: "test-model".to_string(),
            max_new_tokens: 64,
        };
        let client = QwenClient::new(&url, &llm).unwrap();
        let reply = client.complete("name some genres").await.unwrap();
        assert_eq!(reply, " Pop, Rock\n");

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["model"], "test-model");
        assert_eq!(seen[0]["max_tokens"], 64);
        assert_eq!(seen[0]["messages"][0]["content"], "name some genres");

        server.abort();
    }

    #[tokio::test]
    async fn test_qwen_empty_choices_is_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().route(
            "/v1/chat/completions",
            recording(&seen, json!({ "choices": [] })),
        );
        let (url, server) = serve(app).await;

        let client = QwenClient::new(&url, &LlmConfig::default()).unwrap();
        let err = client.complete("hello").await.unwrap_err();
        assert!(err.to_string().contains("no completion"));

        server.abort();
    }

    #[tokio::test]
    async fn test_sdxl_decodes_every_image() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().route(
            "/generate",
            recording(
                &seen,
                json!({ "images": [BASE64.encode(b"first png"), BASE64.encode(b"second png")] }),
            ),
        );
        let (url, server) = serve(app).await;

        let client = SdxlTurboClient::new(&url).unwrap();
        let request = ImageRequest {
            prompt: "synthwave, album cover art".to_string(),
            num_inference_steps: 2,
            guidance_scale: 0.0,
        };
        let images = client.generate(&request).await.unwrap();

        assert_eq!(images, vec![b"first png".to_vec(), b"second png".to_vec()]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["prompt"], "synthwave, album cover art");
        assert_eq!(seen[0]["num_inference_steps"], 2);

        server.abort();
    }

    #[tokio::test]
    async fn test_health_checks_status() {
        let app = Router::new().route("/health", get(|| async { "ok" }));
        let (url, server) = serve(app).await;
        let client = ServiceClient::new("ACE-Step", &url).unwrap();
        client.health().await.unwrap();
        server.abort();

        let app = Router::new().route(
            "/health",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let (url, server) = serve(app).await;
        let client = ServiceClient::new("Qwen", &url).unwrap();
        let err = client.health().await.unwrap_err();
        assert!(err.to_string().contains("Qwen health check returned 503"));
        server.abort();
    }
}
