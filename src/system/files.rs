use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

/// Decides whether a term already has its artifact.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Deterministic destination of the artifact for `output_key`.
    fn path_for(&self, output_key: &str) -> PathBuf;

    async fn exists(&self, output_key: &str) -> bool;

    /// Make the destination writable, e.g. create the output directory.
    async fn prepare(&self) -> io::Result<()>;
}

/// Artifacts are plain files `<root>/<output_key>.<extension>`; a file's
/// presence marks the term as done.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
    extension: String,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn path_for(&self, output_key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", output_key, self.extension))
    }

    async fn exists(&self, output_key: &str) -> bool {
        fs::metadata(self.path_for(output_key))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    async fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }
}

/// Sibling scratch file a download is staged in before it is renamed.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Write `bytes` so that `path` either holds all of them or does not exist.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let staging = staging_path(path);
    let result = async {
        fs::write(&staging, bytes).await?;
        fs::rename(&staging, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&staging).await;
    }
    result
}
