pub mod batch;
pub mod config;
pub mod error;
pub mod net;
pub mod system;
pub mod voice;

use anyhow::Result;

use crate::batch::{BatchReport, BatchRunner};
use crate::config::HarvestConfig;
use crate::net::downloader::Downloader;
use crate::system::browser::ChromiumLauncher;
use crate::system::files::FsArtifactStore;
use crate::voice::session::SynthesisSession;
use crate::voice::vocabulary::Vocabulary;

/// Run the whole vocabulary through Chromium and the downloader.
///
/// Only setup failures are returned; per-term failures end up in the report.
pub async fn harvest(config: &HarvestConfig, vocabulary: &Vocabulary) -> Result<BatchReport> {
    let session = SynthesisSession::new(
        ChromiumLauncher::new(
            config.browser.clone(),
            config.synthesis.navigation_timeout(),
        ),
        config.synthesis.clone(),
    );
    let store = FsArtifactStore::new(&config.output_dir, &config.extension);
    let downloader = Downloader::new(&config.download)?;

    let runner = BatchRunner::new(session, store, downloader);
    Ok(runner.run(vocabulary).await)
}
