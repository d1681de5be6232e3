use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::VocabularyError;

/// One phrase to synthesize and the file stem its audio is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TermEntry {
    #[serde(rename = "text")]
    pub source_text: String,
    #[serde(rename = "key")]
    pub output_key: String,
}

impl TermEntry {
    pub fn new(source_text: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            output_key: output_key.into(),
        }
    }
}

/// Ordered, validated set of terms. Immutable once built.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    entries: Vec<TermEntry>,
}

impl Vocabulary {
    /// Rejects empty, unsafe or repeated output keys; a repeated key would
    /// make two terms write the same artifact.
    pub fn new(entries: Vec<TermEntry>) -> Result<Self, VocabularyError> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !is_safe_key(&entry.output_key) {
                return Err(VocabularyError::UnsafeKey(entry.output_key.clone()));
            }
            if !seen.insert(entry.output_key.as_str()) {
                return Err(VocabularyError::DuplicateKey(entry.output_key.clone()));
            }
        }
        Ok(Self { entries })
    }

    pub fn from_pairs<S, K>(pairs: impl IntoIterator<Item = (S, K)>) -> Result<Self, VocabularyError>
    where
        S: Into<String>,
        K: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(text, key)| TermEntry::new(text, key))
                .collect(),
        )
    }

    /// Parses a JSON array of `{ "text": .., "key": .. }` objects.
    pub fn from_json_str(content: &str) -> Result<Self, VocabularyError> {
        let entries: Vec<TermEntry> = serde_json::from_str(content)?;
        Self::new(entries)
    }

    pub fn load(path: &Path) -> Result<Self, VocabularyError> {
        let content = std::fs::read_to_string(path).map_err(|source| VocabularyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Hindi number words followed by the numerals 0 to 100.
    pub fn builtin() -> Self {
        let mut entries = vec![
            TermEntry::new("सौ", "Hundred"),
            TermEntry::new("हजार", "Thousand"),
        ];
        entries.extend((0..=100).map(|i| TermEntry::new(i.to_string(), i.to_string())));
        Self { entries }
    }

    pub fn entries(&self) -> &[TermEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_safe_key(key: &str) -> bool {
    !key.trim().is_empty()
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\', '\0'])
}
