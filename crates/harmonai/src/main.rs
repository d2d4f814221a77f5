//! harmonai - song generation worker and request client
//!
//! Subcommands:
//! - `harmonai serve` - Run the HTTP worker
//! - `harmonai request <url> ...` - Call a running worker
//! - `harmonai config` - Print the effective configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use harmonai::client::HarmonClient;
use harmonai::models::Models;
use harmonai::params::GenerationParameters;
use harmonai::pipeline::GenerationService;
use harmonai::request::{
    GenerateFromDescriptionRequest, GenerateMusicResponseS3, GenerateWithCustomLyricsRequest,
    GenerateWithDescribedLyricsRequest,
};
use harmonai::web::{self, AppState};
use harmonai::{storage, telemetry};
use harmonconf::HarmonConfig;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "harmonai")]
#[command(about = "Song generation worker: prompt and lyrics to audio and cover art")]
#[command(version)]
struct Cli {
    /// Config file used in place of ./harmonai.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the generation worker
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// OTLP gRPC endpoint (overrides config, e.g. "127.0.0.1:4317")
        #[arg(long)]
        otlp_endpoint: Option<String>,
    },

    /// Send a request to a running worker
    Request {
        /// Worker base URL (e.g. http://127.0.0.1:8000)
        url: String,

        #[command(subcommand)]
        kind: RequestKind,
    },

    /// Show the effective configuration and where it came from
    Config,
}

#[derive(Subcommand)]
enum RequestKind {
    /// Fixed smoke-test song, returned inline
    Smoke {
        /// Where to write the decoded WAV
        #[arg(short, long, default_value = "output.wav")]
        output: PathBuf,
    },

    /// Generate everything from one description
    Description {
        full_described_song: String,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Use the given prompt and lyrics verbatim
    Lyrics {
        prompt: String,

        /// Lyrics text, or @path to read them from a file
        lyrics: String,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Use the given prompt; write lyrics from a description of them
    DescribedLyrics {
        prompt: String,
        described_lyrics: String,

        #[command(flatten)]
        params: ParamArgs,
    },
}

/// Commonly tweaked generation parameters. The rest keep their defaults.
#[derive(Args)]
struct ParamArgs {
    #[arg(long)]
    instrumental: bool,

    /// Song length in seconds
    #[arg(long)]
    duration: Option<f64>,

    #[arg(long)]
    seed: Option<i64>,

    #[arg(long)]
    infer_step: Option<i64>,

    #[arg(long)]
    guidance_scale: Option<f64>,
}

impl ParamArgs {
    fn into_params(self) -> GenerationParameters {
        let defaults = GenerationParameters::default();
        GenerationParameters {
            instrumental: self.instrumental,
            audio_duration: self.duration.unwrap_or(defaults.audio_duration),
            seed: self.seed.unwrap_or(defaults.seed),
            infer_step: self.infer_step.unwrap_or(defaults.infer_step),
            guidance_scale: self.guidance_scale.unwrap_or(defaults.guidance_scale),
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            otlp_endpoint,
        } => {
            let mut config = HarmonConfig::load_from(cli.config.as_deref())
                .context("Failed to load configuration")?;
            if let Some(port) = port {
                config.infra.bind.http_port = port;
            }
            if let Some(endpoint) = otlp_endpoint {
                config.infra.telemetry.otlp_endpoint = endpoint;
            }
            serve(config).await
        }
        Commands::Request { url, kind } => {
            telemetry::init_cli();
            request(&url, kind).await
        }
        Commands::Config => {
            let (config, sources) = HarmonConfig::load_with_sources_from(cli.config.as_deref())
                .context("Failed to load configuration")?;
            for file in &sources.files {
                println!("# loaded: {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# env: {}", var);
            }
            if !sources.files.is_empty() || !sources.env_overrides.is_empty() {
                println!();
            }
            print!("{}", config.to_toml());
            Ok(())
        }
    }
}

async fn serve(config: HarmonConfig) -> Result<()> {
    telemetry::init(&config.infra.telemetry).context("Failed to initialize telemetry")?;

    tracing::info!("🎶 HarmonAI worker starting");
    tracing::info!("   GPU: {}", config.infra.deployment.gpu);
    tracing::info!(
        "   Scratch dir: {}",
        config.infra.paths.output_dir.display()
    );

    tracing::info!("🤖 Loading models...");
    let models = Models::load(&config).await.context("Failed to load models")?;

    tracing::info!("📦 Connecting object storage...");
    let store = storage::from_config(&config.infra)
        .await
        .context("Failed to initialize object storage")?;
    tracing::info!("   Storage: {}", store.describe());

    let service = GenerationService::new(models, store, &config.infra.paths.output_dir);
    let state = AppState::new(service);
    let shutdown = CancellationToken::new();

    let window = config.infra.deployment.scaledown_window_secs;
    if window > 0 {
        tracing::info!("   Scaledown window: {}s", window);
        tokio::spawn(web::watch_idle(
            state.activity.clone(),
            Duration::from_secs(window),
            shutdown.clone(),
        ));
    }

    let app = web::router(state);

    let addr = config.infra.bind.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("🎶 HarmonAI ready!");
    tracing::info!("   Generate: POST http://{}/generate_from_description", addr);
    tracing::info!("   Health: GET http://{}/health", addr);

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Server error")?;

    tracing::info!("Shutdown complete");
    telemetry::shutdown()?;
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = sigterm() => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}

async fn request(url: &str, kind: RequestKind) -> Result<()> {
    let client = HarmonClient::new(url);

    let result = match kind {
        RequestKind::Smoke { output } => {
            let audio = client.smoke().await?;
            tokio::fs::write(&output, &audio)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote {} bytes to {}", audio.len(), output.display());
            return Ok(());
        }
        RequestKind::Description {
            full_described_song,
            params,
        } => {
            client
                .from_description(&GenerateFromDescriptionRequest {
                    params: params.into_params(),
                    full_described_song,
                })
                .await?
        }
        RequestKind::Lyrics {
            prompt,
            lyrics,
            params,
        } => {
            let lyrics = match lyrics.strip_prefix('@') {
                Some(path) => tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read lyrics from {}", path))?,
                None => lyrics,
            };
            client
                .with_lyrics(&GenerateWithCustomLyricsRequest {
                    params: params.into_params(),
                    prompt,
                    lyrics,
                })
                .await?
        }
        RequestKind::DescribedLyrics {
            prompt,
            described_lyrics,
            params,
        } => {
            client
                .with_described_lyrics(&GenerateWithDescribedLyricsRequest {
                    params: params.into_params(),
                    prompt,
                    described_lyrics,
                })
                .await?
        }
    };

    print_stored(&result);
    Ok(())
}

fn print_stored(result: &GenerateMusicResponseS3) {
    println!("audio:      {}", result.s3_key);
    println!("cover:      {}", result.cover_image_s3_key);
    println!("categories: {}", result.categories.join(", "));
}
