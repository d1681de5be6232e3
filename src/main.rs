use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tts_harvest::config::HarvestConfig;
use tts_harvest::system::health::HealthServer;
use tts_harvest::voice::vocabulary::Vocabulary;

#[derive(Parser)]
#[command(name = "tts-harvest")]
#[command(about = "Synthesize a vocabulary into audio files through a web TTS page", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// JSON vocabulary (`[{"text": .., "key": ..}]`); built-in table when omitted
    #[arg(long)]
    vocabulary: Option<PathBuf>,

    /// Directory receiving the audio files
    #[arg(long, short)]
    output_dir: Option<PathBuf>,

    /// Serve GET /health on this port and stay up after the batch
    #[arg(long)]
    health_port: Option<u16>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Chrome/Chromium executable
    #[arg(long)]
    chrome: Option<PathBuf>,

    /// Launch Chromium with --no-sandbox (containers running as root)
    #[arg(long)]
    no_sandbox: bool,
}

impl Cli {
    fn into_config(self) -> Result<(HarvestConfig, Option<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::load(path)?,
            None => HarvestConfig::default(),
        };
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if self.health_port.is_some() {
            config.health_port = self.health_port;
        }
        if self.headful {
            config.browser.headless = false;
        }
        if self.chrome.is_some() {
            config.browser.executable = self.chrome;
        }
        if self.no_sandbox {
            config.browser.no_sandbox = true;
        }
        Ok((config, self.vocabulary))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (config, vocabulary_path) = Cli::parse().into_config()?;
    let vocabulary = match vocabulary_path {
        Some(path) => Vocabulary::load(&path)?,
        None => Vocabulary::builtin(),
    };

    // Independent of the batch: up before it starts, still up after it ends.
    let health = match config.health_port {
        Some(port) => {
            Some(HealthServer::start(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await?)
        }
        None => None,
    };

    info!(
        "harvesting {} terms into {}",
        vocabulary.len(),
        config.output_dir.display()
    );
    let report = tts_harvest::harvest(&config, &vocabulary).await?;
    if report.failed() > 0 {
        warn!(
            "{} term(s) failed; run again to retry them",
            report.failed()
        );
    }

    if let Some(server) = health {
        info!("batch done, serving health checks on {} until Ctrl-C", server.addr());
        tokio::signal::ctrl_c().await?;
        server.shutdown();
    }
    Ok(())
}
