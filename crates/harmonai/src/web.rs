//! HTTP surface: the four generation endpoints plus health and discovery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::pipeline::GenerationService;
use crate::request::{
    GenerateFromDescriptionRequest, GenerateMusicResponse, GenerateMusicResponseS3,
    GenerateWithCustomLyricsRequest, GenerateWithDescribedLyricsRequest,
};

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub service: GenerationService,
    pub activity: Arc<ActivityTracker>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: GenerationService) -> Self {
        Self {
            service,
            activity: Arc::new(ActivityTracker::new()),
            started_at: Instant::now(),
        }
    }
}

/// Any pipeline fault, reported as a 500 with a JSON body.
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self.0, "Request failed");
        let body = Json(serde_json::json!({ "error": format!("{:#}", self.0) }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_root))
        .route("/health", get(handle_health))
        .route("/generate", post(generate))
        .route("/generate_from_description", post(generate_from_description))
        .route("/generate_with_lyrics", post(generate_with_lyrics))
        .route(
            "/generate_with_described_lyrics",
            post(generate_with_described_lyrics),
        )
        .layer(middleware::from_fn_with_state(
            state.activity.clone(),
            observe_request,
        ))
        .with_state(state)
}

async fn serve_root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "HarmonAI",
        "version": env!("CARGO_PKG_VERSION"),
        "links": {
            "health": "GET /health",
            "generate": "POST /generate",
            "generate_from_description": "POST /generate_from_description",
            "generate_with_lyrics": "POST /generate_with_lyrics",
            "generate_with_described_lyrics": "POST /generate_with_described_lyrics",
        }
    }))
}

async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let models: serde_json::Map<String, serde_json::Value> = state
        .service
        .models()
        .endpoints
        .iter()
        .map(|(name, url)| (name.clone(), serde_json::Value::String(url.clone())))
        .collect();

    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "in_flight": state.activity.in_flight(),
        "models": models,
        "storage": state.service.store().describe(),
    }))
}

async fn generate(State(state): State<AppState>) -> Result<Json<GenerateMusicResponse>, AppError> {
    Ok(Json(state.service.generate_smoke().await?))
}

async fn generate_from_description(
    State(state): State<AppState>,
    Json(body): Json<GenerateFromDescriptionRequest>,
) -> Result<Json<GenerateMusicResponseS3>, AppError> {
    Ok(Json(state.service.generate(body.into()).await?))
}

async fn generate_with_lyrics(
    State(state): State<AppState>,
    Json(body): Json<GenerateWithCustomLyricsRequest>,
) -> Result<Json<GenerateMusicResponseS3>, AppError> {
    Ok(Json(state.service.generate(body.into()).await?))
}

async fn generate_with_described_lyrics(
    State(state): State<AppState>,
    Json(body): Json<GenerateWithDescribedLyricsRequest>,
) -> Result<Json<GenerateMusicResponseS3>, AppError> {
    Ok(Json(state.service.generate(body.into()).await?))
}

/// Wrap each request in a span parented on its `traceparent`, and count it
/// as activity for the idle window.
async fn observe_request(
    State(activity): State<Arc<ActivityTracker>>,
    request: Request,
    next: Next,
) -> Response {
    let traceparent = request
        .headers()
        .get("traceparent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let span = crate::span_with_parent!(
        traceparent.as_deref(),
        "http.request",
        http.method = %request.method(),
        http.path = %request.uri().path(),
        http.status = tracing::field::Empty
    );

    let _guard = activity.begin();
    let response = next.run(request).instrument(span.clone()).await;
    span.record("http.status", response.status().as_u16());
    response
}

/// Counts in-flight requests and remembers when the last one ended.
#[derive(Debug)]
pub struct ActivityTracker {
    in_flight: AtomicUsize,
    last_activity: Mutex<Instant>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Mark a request as started; dropping the guard marks it finished.
    pub fn begin(&self) -> ActivityGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        ActivityGuard { tracker: self }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Time since the last request started or finished.
    pub fn idle_for(&self) -> Duration {
        match self.last_activity.lock() {
            Ok(last) => last.elapsed(),
            Err(poisoned) => poisoned.into_inner().elapsed(),
        }
    }

    /// True once nothing is running and nothing has happened for `window`.
    pub fn is_idle(&self, window: Duration) -> bool {
        self.in_flight() == 0 && self.idle_for() >= window
    }

    fn touch(&self) {
        match self.last_activity.lock() {
            Ok(mut last) => *last = Instant::now(),
            Err(poisoned) => *poisoned.into_inner() = Instant::now(),
        }
    }
}

pub struct ActivityGuard<'a> {
    tracker: &'a ActivityTracker,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.tracker.touch();
    }
}

/// Cancel `shutdown` once the worker has been idle for `window`.
///
/// Returns immediately when cancelled from elsewhere.
pub async fn watch_idle(
    activity: Arc<ActivityTracker>,
    window: Duration,
    shutdown: CancellationToken,
) {
    let poll = (window / 4).clamp(Duration::from_millis(10), Duration::from_secs(1));
    let mut interval = tokio::time::interval(poll);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {
                if activity.is_idle(window) {
                    tracing::info!(
                        "💤 Idle for {}s, scaling down",
                        activity.idle_for().as_secs()
                    );
                    shutdown.cancel();
                    return;
                }
            }
        }
    }
}
