use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, warn};

use super::page::{PageDriver, PageLauncher};
use crate::config::SynthesisConfig;
use crate::error::SynthesisError;

/// Where the synthesized audio can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisResult {
    pub audio_locator: Url,
}

/// Turns a phrase into an audio locator.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, source_text: &str) -> Result<SynthesisResult, SynthesisError>;
}

/// Drives the remote synthesis page, one fresh browser per call.
pub struct SynthesisSession<L> {
    launcher: L,
    config: SynthesisConfig,
}

impl<L: PageLauncher> SynthesisSession<L> {
    pub fn new(launcher: L, config: SynthesisConfig) -> Self {
        Self { launcher, config }
    }

    async fn navigate(&self, page: &mut dyn PageDriver) -> Result<(), SynthesisError> {
        let url = self.config.page_url.as_str();
        let timeout = self.config.navigation_timeout();
        let max_attempts = self.config.navigation.max_attempts();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match tokio::time::timeout(timeout, page.goto(url)).await {
                Ok(Ok(())) => {
                    debug!("loaded {} (attempt {})", url, attempt);
                    return Ok(());
                }
                Ok(Err(e)) => last_error = format!("{:#}", e),
                Err(_) => last_error = format!("timed out after {:?}", timeout),
            }

            if attempt < max_attempts {
                warn!(
                    "navigation attempt {}/{} failed: {}; retrying",
                    attempt, max_attempts, last_error
                );
                tokio::time::sleep(self.config.navigation.backoff()).await;
            }
        }

        Err(SynthesisError::NavigationFailed {
            url: url.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }

    async fn submit(
        &self,
        page: &mut dyn PageDriver,
        source_text: &str,
    ) -> Result<(), SynthesisError> {
        let selectors = &self.config.selectors;
        page.fill(&selectors.text_input, source_text)
            .await
            .map_err(|e| ui_error("filling the text input", e))?;
        page.click(&selectors.voice)
            .await
            .map_err(|e| ui_error("selecting the voice", e))?;
        page.click(&selectors.convert)
            .await
            .map_err(|e| ui_error("starting the conversion", e))?;
        Ok(())
    }

    async fn await_result(&self, page: &mut dyn PageDriver) -> Result<(), SynthesisError> {
        let selector = self.config.selectors.result_audio.as_str();
        let timeout = self.config.result_timeout();
        let interval = self.config.poll_interval();

        let poll = async {
            loop {
                match page.exists(selector).await {
                    Ok(true) => break,
                    Ok(false) => {}
                    // The result region is re-rendered while converting.
                    Err(e) => debug!("result check failed: {:#}", e),
                }
                tokio::time::sleep(interval).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| SynthesisError::ResultTimeout(timeout))
    }

    async fn extract(&self, page: &mut dyn PageDriver) -> Result<SynthesisResult, SynthesisError> {
        let selector = self.config.selectors.audio_source.as_str();
        let src = page
            .attribute(selector, "src")
            .await
            .map_err(|e| ui_error("reading the audio source", e))?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                SynthesisError::MissingLocator(format!("'{}' has no src attribute", selector))
            })?;

        // Relative sources resolve against the synthesis page.
        let base = Url::parse(&self.config.page_url)
            .map_err(|e| SynthesisError::MissingLocator(e.to_string()))?;
        let audio_locator = base
            .join(&src)
            .map_err(|e| SynthesisError::MissingLocator(format!("'{}': {}", src, e)))?;

        Ok(SynthesisResult { audio_locator })
    }

    async fn drive(
        &self,
        page: &mut dyn PageDriver,
        source_text: &str,
    ) -> Result<SynthesisResult, SynthesisError> {
        self.navigate(page).await?;
        self.submit(page, source_text).await?;
        self.await_result(page).await?;
        self.extract(page).await
    }
}

#[async_trait]
impl<L: PageLauncher> Synthesizer for SynthesisSession<L> {
    async fn synthesize(&self, source_text: &str) -> Result<SynthesisResult, SynthesisError> {
        let mut page = self
            .launcher
            .launch()
            .await
            .map_err(|e| SynthesisError::Launch(format!("{:#}", e)))?;

        let outcome = self.drive(page.as_mut(), source_text).await;

        // Released on every path, whatever `drive` returned.
        if let Err(e) = page.close().await {
            warn!("failed to release browser: {:#}", e);
        }
        outcome
    }
}

fn ui_error(step: &'static str, err: anyhow::Error) -> SynthesisError {
    SynthesisError::Ui {
        step,
        message: format!("{:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::{anyhow, Result};

    use super::*;
    use crate::config::RetryPolicy;

    #[derive(Default)]
    struct Counters {
        launched: AtomicUsize,
        closed: AtomicUsize,
        goto_calls: AtomicUsize,
        actions: Mutex<Vec<String>>,
    }

    #[derive(Clone)]
    struct StubLauncher {
        navigation_failures: usize,
        hang_on_goto: bool,
        missing_voice: bool,
        result_appears: bool,
        src: Option<String>,
        counters: Arc<Counters>,
    }

    impl StubLauncher {
        fn healthy() -> Self {
            Self {
                navigation_failures: 0,
                hang_on_goto: false,
                missing_voice: false,
                result_appears: true,
                src: Some("https://cdn.example/audio/abc.mp3".to_string()),
                counters: Arc::default(),
            }
        }

        fn open_pages(&self) -> usize {
            self.counters.launched.load(Ordering::SeqCst) - self.counters.closed.load(Ordering::SeqCst)
        }
    }

    struct StubPage {
        setup: StubLauncher,
        failures_left: usize,
    }

    #[async_trait]
    impl PageDriver for StubPage {
        async fn goto(&mut self, url: &str) -> Result<()> {
            self.setup.counters.goto_calls.fetch_add(1, Ordering::SeqCst);
            if self.setup.hang_on_goto {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(anyhow!("net::ERR_CONNECTION_RESET at {}", url));
            }
            Ok(())
        }

        async fn fill(&mut self, selector: &str, text: &str) -> Result<()> {
            self.setup.counters.actions.lock().unwrap().push(format!("fill {} {}", selector, text));
            Ok(())
        }

        async fn click(&mut self, selector: &str) -> Result<()> {
            if self.setup.missing_voice && selector == "#voice" {
                return Err(anyhow!("no node found for selector {}", selector));
            }
            self.setup.counters.actions.lock().unwrap().push(format!("click {}", selector));
            Ok(())
        }

        async fn exists(&mut self, _selector: &str) -> Result<bool> {
            Ok(self.setup.result_appears)
        }

        async fn attribute(&mut self, _selector: &str, _name: &str) -> Result<Option<String>> {
            Ok(self.setup.src.clone())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.setup.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl PageLauncher for StubLauncher {
        async fn launch(&self) -> Result<Box<dyn PageDriver>> {
            self.counters.launched.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubPage {
                setup: self.clone(),
                failures_left: self.navigation_failures,
            }))
        }
    }

    fn fast_config() -> SynthesisConfig {
        let mut config = SynthesisConfig {
            page_url: "https://tts.example/text-to-speech/hindi-india".to_string(),
            navigation: RetryPolicy::new(3, Duration::from_millis(1)),
            navigation_timeout_ms: 50,
            result_timeout_ms: 50,
            poll_interval_ms: 5,
            ..SynthesisConfig::default()
        };
        config.selectors.text_input = "#text".to_string();
        config.selectors.voice = "#voice".to_string();
        config.selectors.convert = "#convert".to_string();
        config
    }

    #[tokio::test]
    async fn submits_text_and_returns_locator() {
        let launcher = StubLauncher::healthy();
        let session = SynthesisSession::new(launcher.clone(), fast_config());

        let result = session.synthesize("सौ").await.unwrap();

        assert_eq!(result.audio_locator.as_str(), "https://cdn.example/audio/abc.mp3");
        assert_eq!(
            *launcher.counters.actions.lock().unwrap(),
            ["fill #text सौ", "click #voice", "click #convert"]
        );
        assert_eq!(launcher.open_pages(), 0);
    }

    #[tokio::test]
    async fn recovers_after_two_navigation_failures() {
        let launcher = StubLauncher {
            navigation_failures: 2,
            ..StubLauncher::healthy()
        };
        let session = SynthesisSession::new(launcher.clone(), fast_config());

        assert!(session.synthesize("एक").await.is_ok());
        assert_eq!(launcher.counters.goto_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_three_navigation_failures() {
        let launcher = StubLauncher {
            navigation_failures: 3,
            ..StubLauncher::healthy()
        };
        let session = SynthesisSession::new(launcher.clone(), fast_config());

        let err = session.synthesize("एक").await.unwrap_err();

        assert!(matches!(err, SynthesisError::NavigationFailed { attempts: 3, .. }));
        assert_eq!(launcher.counters.goto_calls.load(Ordering::SeqCst), 3);
        // Nothing is submitted once navigation is abandoned.
        assert!(launcher.counters.actions.lock().unwrap().is_empty());
        assert_eq!(launcher.open_pages(), 0);
    }

    #[tokio::test]
    async fn hung_navigation_counts_as_failed_attempt() {
        let launcher = StubLauncher {
            hang_on_goto: true,
            ..StubLauncher::healthy()
        };
        let session = SynthesisSession::new(launcher.clone(), fast_config());

        let err = session.synthesize("दो").await.unwrap_err();

        match err {
            SynthesisError::NavigationFailed { attempts, last_error, .. } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("timed out"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_result_times_out() {
        let launcher = StubLauncher {
            result_appears: false,
            ..StubLauncher::healthy()
        };
        let session = SynthesisSession::new(launcher.clone(), fast_config());

        let err = session.synthesize("तीन").await.unwrap_err();

        assert!(matches!(err, SynthesisError::ResultTimeout(_)));
        assert_eq!(launcher.open_pages(), 0);
    }

    #[tokio::test]
    async fn missing_control_is_a_ui_error() {
        let launcher = StubLauncher {
            missing_voice: true,
            ..StubLauncher::healthy()
        };
        let session = SynthesisSession::new(launcher.clone(), fast_config());

        let err = session.synthesize("चार").await.unwrap_err();

        assert!(matches!(err, SynthesisError::Ui { step: "selecting the voice", .. }));
        assert_eq!(launcher.open_pages(), 0);
    }

    #[tokio::test]
    async fn relative_source_resolves_against_page() {
        let launcher = StubLauncher {
            src: Some("/uploads/tts/xyz.mp3".to_string()),
            ..StubLauncher::healthy()
        };
        let session = SynthesisSession::new(launcher, fast_config());

        let result = session.synthesize("पाँच").await.unwrap();
        assert_eq!(result.audio_locator.as_str(), "https://tts.example/uploads/tts/xyz.mp3");
    }

    #[tokio::test]
    async fn empty_source_is_reported() {
        let launcher = StubLauncher {
            src: Some("  ".to_string()),
            ..StubLauncher::healthy()
        };
        let session = SynthesisSession::new(launcher, fast_config());

        assert!(matches!(
            session.synthesize("छह").await,
            Err(SynthesisError::MissingLocator(_))
        ));
    }

    #[tokio::test]
    async fn no_browser_leaks_across_failing_calls() {
        let launcher = StubLauncher {
            navigation_failures: usize::MAX,
            ..StubLauncher::healthy()
        };
        let session = SynthesisSession::new(launcher.clone(), fast_config());

        for _ in 0..5 {
            assert!(session.synthesize("सात").await.is_err());
            assert_eq!(launcher.open_pages(), 0);
        }
        assert_eq!(launcher.counters.launched.load(Ordering::SeqCst), 5);
    }
}
