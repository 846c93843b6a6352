use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use m3u_player::{
    config::Config,
    ingestor::{download_playlist, parse_m3u, read_playlist_file},
    models::{Liveness, PlaylistSnapshot, ALL_CATEGORIES},
    persistence::{FilePlaylistStore, PlaylistStore},
    services::{ChannelCatalog, LivenessProber, ProbeOutcome, ReqwestFetcher},
};

#[derive(Parser)]
#[command(name = "m3u-player")]
#[command(version)]
#[command(about = "Load an M3U playlist, check which channels are reachable and list them")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Playlist file to load
    #[arg(value_name = "FILE", conflicts_with = "url")]
    playlist: Option<PathBuf>,

    /// Download the playlist from this URL instead
    #[arg(short, long, value_name = "URL")]
    url: Option<String>,

    /// Skip the liveness check
    #[arg(long)]
    no_probe: bool,

    /// Only list channels in this category
    #[arg(long, default_value = ALL_CATEGORIES)]
    category: String,

    /// Save the loaded playlist as the shared snapshot
    #[arg(long)]
    publish: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("m3u_player={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting m3u-player v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    let fetcher = Arc::new(ReqwestFetcher::from_config(&config.prober)?);

    let content = match (&cli.playlist, &cli.url) {
        (Some(path), _) => read_playlist_file(path).await?,
        (None, Some(url)) => {
            let client = reqwest::Client::builder()
                .user_agent(config.prober.user_agent.clone())
                .build()?;
            download_playlist(&client, url).await?
        }
        (None, None) => bail!("Pass a playlist file or --url"),
    };

    let catalog = ChannelCatalog::new().into_handle();
    catalog.write().await.load(parse_m3u(&content));

    if cli.publish {
        let store = FilePlaylistStore::from_config(&config.storage);
        let uploaded_by = std::env::var("USER").ok();
        store
            .save(&PlaylistSnapshot::new(content.clone(), uploaded_by))
            .await?;
    }

    if !cli.no_probe {
        let prober = LivenessProber::new(fetcher, config.prober.clone());
        if let ProbeOutcome::Completed(summary) = prober.probe_catalog(&catalog, true).await {
            info!(
                "{} of {} channels reachable",
                summary.reachable, summary.probed
            );
        }
    }

    let catalog = catalog.read().await;
    let categories: Vec<_> = catalog.categories().iter().map(String::as_str).collect();
    println!("Categories: {}", categories.join(", "));

    for channel in catalog.filter(&cli.category) {
        let marker = match channel.liveness {
            Liveness::Reachable => "+",
            Liveness::Unreachable => "-",
            Liveness::Unknown => "?",
        };
        println!(
            "{} [{}] {}  {}",
            marker, channel.category, channel.name, channel.stream_url
        );
    }

    Ok(())
}
