use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use conclave_server::{LocalEngine, RoomRegistry, ServerConfig, SignalingService, signaling_router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conclave-server")]
#[command(about = "SFU signaling server")]
struct Cli {
    /// JSON config file. Missing fields take their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the signaling listen address.
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Overrides the public address put into ICE candidates.
    #[arg(long)]
    announced_ip: Option<String>,
}

impl Cli {
    fn load_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(ip) = &self.announced_ip {
            config.transport.announced_ip = Some(ip.clone());
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    println!("{}", "Starting Conclave signaling server...".green().bold());

    let engine = LocalEngine::new(config.transport.clone());
    let registry = RoomRegistry::new(Arc::new(engine), config.router.clone());
    let service = SignalingService::new(registry);

    // browser clients usually come from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = signaling_router(service).layer(cors);

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;

    println!("   {} ws://{}/ws", "Signaling:".cyan(), config.listen);
    println!(
        "   {} {}",
        "Codecs:   ".cyan(),
        config
            .router
            .media_codecs
            .iter()
            .map(|c| c.mime_type.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!(addr = %config.listen, "Signaling server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server failed")?;

    Ok(())
}
