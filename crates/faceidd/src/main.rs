use anyhow::{Context, Result};
use clap::Parser;
use faceid_core::Backend;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod engine;
mod models;
mod routes;
mod server;

use config::{Config, LogFormat};
use engine::EngineSettings;
use routes::AppState;
use server::ServeOptions;

/// Face ID verification HTTP service.
#[derive(Parser, Debug)]
#[command(name = "faceidd", version)]
struct Args {
    /// TOML configuration file (overrides FACEID_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (defaults to $PORT, then 8000)
    #[arg(long)]
    port: Option<u16>,

    /// Seconds an idle keep-alive connection stays open
    #[arg(long)]
    timeout_keep_alive: Option<u64>,

    /// Seconds to wait for open connections on shutdown
    #[arg(long)]
    timeout_graceful_shutdown: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.timeout_keep_alive {
            config.keep_alive_secs = secs;
        }
        if let Some(secs) = self.timeout_graceful_shutdown {
            config.shutdown_grace_secs = secs;
        }
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().with_target(false).compact())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => Config::from_lookup(|key| match key {
            "FACEID_CONFIG" => Some(path.display().to_string()),
            _ => std::env::var(key).ok(),
        }),
        None => Config::from_env(),
    };
    let mut config = loaded.context("failed to load configuration")?;
    args.apply(&mut config);

    init_logging(config.log_format);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "faceidd starting");

    let backend = Backend::from_ctx_id(config.ctx_id);
    let settings = EngineSettings {
        rotation_angles: config.rotation_angles.clone(),
        policy: config.policy.clone(),
        scorer: config.confidence_scorer(),
    };
    let engine = engine::spawn_engine(&config.model_pack(), config.det_size, backend, settings)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let options = ServeOptions {
        keep_alive: config.keep_alive(),
        shutdown_grace: config.shutdown_grace(),
    };
    tracing::info!(
        %addr,
        keep_alive = ?options.keep_alive,
        shutdown_grace = ?options.shutdown_grace,
        "faceidd ready"
    );

    let app = routes::router(AppState {
        engine,
        config: Arc::new(config),
    });
    server::serve(listener, app, options).await;

    tracing::info!("faceidd shut down");
    Ok(())
}
