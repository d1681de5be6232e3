use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// Synthesis page of the remote TTS service (Hindi voices).
pub const DEFAULT_PAGE_URL: &str = "https://ttsfree.com/text-to-speech/hindi-india";

/// Codec extension of the stored artifacts.
pub const DEFAULT_EXTENSION: &str = "mp3";

/// Attempts allowed for loading the synthesis page.
pub const NAVIGATION_ATTEMPTS: u32 = 3;

/// Attempts allowed for fetching one audio file.
pub const DOWNLOAD_ATTEMPTS: u32 = 5;

/// Fixed pause between two attempts of the same operation.
pub const BACKOFF_MS: u64 = 5_000;

/// Upper bound for a single page load and for the result to show up.
pub const PAGE_TIMEOUT_MS: u64 = 90_000;

/// Number of attempts and fixed pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts,
            backoff_ms: backoff.as_millis() as u64,
        }
    }

    pub const fn navigation() -> Self {
        Self {
            attempts: NAVIGATION_ATTEMPTS,
            backoff_ms: BACKOFF_MS,
        }
    }

    pub const fn download() -> Self {
        Self {
            attempts: DOWNLOAD_ATTEMPTS,
            backoff_ms: BACKOFF_MS,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// A zero budget still makes one attempt.
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }
}

/// A retry table as written in the file; absent fields keep the policy default.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RetryOverrides {
    attempts: Option<u32>,
    backoff_ms: Option<u64>,
}

impl RetryOverrides {
    fn apply_to(self, base: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts.unwrap_or(base.attempts),
            backoff_ms: self.backoff_ms.unwrap_or(base.backoff_ms),
        }
    }
}

fn navigation_retry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RetryPolicy, D::Error> {
    Ok(RetryOverrides::deserialize(deserializer)?.apply_to(RetryPolicy::navigation()))
}

fn download_retry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RetryPolicy, D::Error> {
    Ok(RetryOverrides::deserialize(deserializer)?.apply_to(RetryPolicy::download()))
}

/// CSS selectors for the controls of the synthesis page.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PageSelectors {
    pub text_input: String,
    pub voice: String,
    pub convert: String,
    pub result_audio: String,
    pub audio_source: String,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            text_input: r#"textarea[name="input_text"]"#.to_string(),
            voice: "#voice_name_bin > div:nth-of-type(2)".to_string(),
            convert: "#frm_tts > div:nth-of-type(2) > div:nth-of-type(2) > div:nth-of-type(1) > a"
                .to_string(),
            result_audio: "#progessResults > div:nth-of-type(2) > audio".to_string(),
            audio_source: "#progessResults > div:nth-of-type(2) > audio > source".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub page_url: String,
    #[serde(deserialize_with = "navigation_retry")]
    pub navigation: RetryPolicy,
    pub navigation_timeout_ms: u64,
    pub result_timeout_ms: u64,
    /// How often the page is polled for the result audio element.
    pub poll_interval_ms: u64,
    pub selectors: PageSelectors,
}

impl SynthesisConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            page_url: DEFAULT_PAGE_URL.to_string(),
            navigation: RetryPolicy::navigation(),
            navigation_timeout_ms: PAGE_TIMEOUT_MS,
            result_timeout_ms: PAGE_TIMEOUT_MS,
            poll_interval_ms: 500,
            selectors: PageSelectors::default(),
        }
    }
}

/// Chromium launch options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub headless: bool,
    pub no_sandbox: bool,
    pub executable: Option<PathBuf>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            no_sandbox: false,
            executable: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    #[serde(deserialize_with = "download_retry")]
    pub retry: RetryPolicy,
    pub request_timeout_ms: u64,
}

impl DownloadConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::download(),
            request_timeout_ms: PAGE_TIMEOUT_MS,
        }
    }
}

/// Top-level configuration of a harvest run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Directory receiving `<output_key>.<extension>` files.
    pub output_dir: PathBuf,
    pub extension: String,
    /// Port for the liveness endpoint; disabled when unset.
    pub health_port: Option<u16>,
    pub browser: BrowserOptions,
    pub synthesis: SynthesisConfig,
    pub download: DownloadConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("mp3_files"),
            extension: DEFAULT_EXTENSION.to_string(),
            health_port: None,
            browser: BrowserOptions::default(),
            synthesis: SynthesisConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

impl HarvestConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.extension.is_empty() || self.extension.contains(['/', '\\', '.']) {
            return Err(ConfigError::Invalid(format!(
                "extension '{}' is not a bare file extension",
                self.extension
            )));
        }
        reqwest::Url::parse(&self.synthesis.page_url).map_err(|e| {
            ConfigError::Invalid(format!("page_url '{}': {}", self.synthesis.page_url, e))
        })?;
        Ok(())
    }
}
