use std::path::{Path, PathBuf};

use tracing::{error, info, info_span, Instrument};

use crate::error::TermError;
use crate::net::downloader::Downloader;
use crate::system::files::ArtifactStore;
use crate::voice::session::Synthesizer;
use crate::voice::vocabulary::{TermEntry, Vocabulary};

#[derive(Debug)]
pub enum TermOutcome {
    /// The artifact was already present.
    Skipped,
    Downloaded { path: PathBuf, bytes: u64 },
    Failed(TermError),
}

#[derive(Debug)]
pub struct TermReport {
    pub output_key: String,
    pub outcome: TermOutcome,
}

/// Per-term outcomes, in vocabulary order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub terms: Vec<TermReport>,
}

impl BatchReport {
    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, TermOutcome::Downloaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TermOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TermOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&TermOutcome) -> bool) -> usize {
        self.terms.iter().filter(|t| pred(&t.outcome)).count()
    }
}

/// Walks a vocabulary term by term: skip what exists, synthesize and
/// download the rest. A failing term never stops the run.
pub struct BatchRunner<S, A> {
    synthesizer: S,
    store: A,
    downloader: Downloader,
}

impl<S: Synthesizer, A: ArtifactStore> BatchRunner<S, A> {
    pub fn new(synthesizer: S, store: A, downloader: Downloader) -> Self {
        Self {
            synthesizer,
            store,
            downloader,
        }
    }

    pub async fn run(&self, vocabulary: &Vocabulary) -> BatchReport {
        let mut report = BatchReport::default();
        let total = vocabulary.len();

        for (index, entry) in vocabulary.entries().iter().enumerate() {
            let span = info_span!("term", key = %entry.output_key, n = index + 1, of = total);
            let outcome = match self.process_term(entry).instrument(span.clone()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    span.in_scope(|| error!("giving up on '{}': {}", entry.source_text, e));
                    TermOutcome::Failed(e)
                }
            };
            report.terms.push(TermReport {
                output_key: entry.output_key.clone(),
                outcome,
            });
        }

        info!(
            "batch finished: {} downloaded, {} skipped, {} failed",
            report.downloaded(),
            report.skipped(),
            report.failed()
        );
        report
    }

    async fn process_term(&self, entry: &TermEntry) -> Result<TermOutcome, TermError> {
        let path = self.store.path_for(&entry.output_key);
        if self.store.exists(&entry.output_key).await {
            info!("{} already exists, skipping", path.display());
            return Ok(TermOutcome::Skipped);
        }

        let result = self.synthesizer.synthesize(&entry.source_text).await?;

        self.store
            .prepare()
            .await
            .map_err(|source| TermError::Filesystem {
                path: path.parent().map(Path::to_path_buf).unwrap_or_default(),
                source,
            })?;
        let bytes = self.downloader.download(&result.audio_locator, &path).await?;

        info!("saved {} ({} bytes)", path.display(), bytes);
        Ok(TermOutcome::Downloaded { path, bytes })
    }
}
