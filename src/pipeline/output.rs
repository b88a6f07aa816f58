//! Output location management.
//!
//! The pipeline owns its output directory for the length of a run: stale
//! audio, chunk directories and the duration index are removed before
//! processing, and chunks awaiting stitching live in a scratch directory
//! that is removed on every exit path.

use crate::defaults;
use crate::error::{NarrateError, Result};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Suffix of files being written by [`write_atomic`].
const PARTIAL_SUFFIX: &str = "partial";

/// Paths of every artifact a run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    root: PathBuf,
    durations_file: String,
    scratch_dir: String,
    extension: String,
}

impl OutputLayout {
    pub fn new(
        root: impl Into<PathBuf>,
        durations_file: impl Into<String>,
        scratch_dir: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            durations_file: durations_file.into(),
            scratch_dir: scratch_dir.into(),
            extension: defaults::AUDIO_EXTENSION.to_string(),
        }
    }

    /// Layout with the stock file names under `root`.
    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        Self::new(root, defaults::DURATIONS_FILE, defaults::SCRATCH_DIR)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check that the index and scratch names stay inside the root.
    ///
    /// The scratch directory is removed recursively after the run, so `.`,
    /// `..`, absolute paths and nested paths are refused.
    ///
    /// # Errors
    /// `OutputSetup` naming the offending entry.
    pub fn check_names(&self) -> Result<()> {
        for (what, name) in [
            ("durations file", &self.durations_file),
            ("scratch directory", &self.scratch_dir),
        ] {
            if !is_plain_name(name) {
                return Err(NarrateError::OutputSetup {
                    path: self.root.join(name).display().to_string(),
                    message: format!("{what} must be a single file name, got {name:?}"),
                });
            }
        }
        Ok(())
    }

    pub fn durations_path(&self) -> PathBuf {
        self.root.join(&self.durations_file)
    }

    pub fn scratch_path(&self) -> PathBuf {
        self.root.join(&self.scratch_dir)
    }

    /// `<root>/<index>.wav`
    pub fn section_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("{index}.{}", self.extension))
    }

    /// `<root>/<index>/`
    pub fn section_dir(&self, index: usize) -> PathBuf {
        self.root.join(index.to_string())
    }

    /// `<root>/<index>/<chunk>.wav`
    pub fn chunk_path(&self, index: usize, chunk: usize) -> PathBuf {
        self.section_dir(index)
            .join(format!("{chunk}.{}", self.extension))
    }

    /// Scratch file for one chunk; `None` for a section spoken by one fixed voice.
    pub fn scratch_chunk_path(&self, index: usize, chunk: Option<usize>) -> PathBuf {
        let name = match chunk {
            Some(c) => format!("section_{index}_chunk_{c}.{}", self.extension),
            None => format!("section_{index}_single.{}", self.extension),
        };
        self.scratch_path().join(name)
    }

    fn is_owned_file(&self, name: &str) -> bool {
        name == self.durations_file
            || name.ends_with(&format!(".{}", self.extension))
            || name.ends_with(&format!(".{PARTIAL_SUFFIX}"))
    }
}

/// `true` when `name` is exactly one normal path component.
pub fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Clear artifacts of a previous run, creating the directory if needed.
///
/// Removes every subdirectory, every audio file and the duration index.
/// Unrelated files are left alone. Returns how many entries were removed.
///
/// # Errors
/// `OutputSetup` if the layout names escape the root, or the directory
/// cannot be listed, cleared or created.
pub async fn prepare(layout: &OutputLayout) -> Result<usize> {
    layout.check_names()?;
    let root = layout.root();
    let setup_err = |e: io::Error| NarrateError::OutputSetup {
        path: root.display().to_string(),
        message: e.to_string(),
    };

    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(root).await.map_err(setup_err)?;
            info!("Created output directory: {}", root.display());
            return Ok(0);
        }
        Err(e) => return Err(setup_err(e)),
    };

    let mut cleared = 0;
    while let Some(entry) = entries.next_entry().await.map_err(setup_err)? {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(setup_err)?;
        let name = entry.file_name().to_string_lossy().into_owned();

        if file_type.is_dir() {
            tokio::fs::remove_dir_all(&path).await.map_err(setup_err)?;
            cleared += 1;
        } else if layout.is_owned_file(&name) {
            tokio::fs::remove_file(&path).await.map_err(setup_err)?;
            cleared += 1;
        }
    }

    info!("Cleared {cleared} existing audio files/directories");
    Ok(cleared)
}

/// Scratch directory removed when dropped.
///
/// Dropping happens on normal completion, on error returns, and when the
/// owning future is cancelled (e.g. by Ctrl+C), so chunk files never outlive
/// the run.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    /// Create the scratch directory (and parents).
    pub async fn create(path: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| NarrateError::OutputSetup {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now, logging instead of failing.
    pub async fn cleanup(mut self) {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => info!("Cleaned up temporary files"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not clean up temporary files: {e}"),
        }
        self.removed = true;
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        // Blocking on purpose: drop cannot await, and the scratch area holds
        // at most one run's chunk files.
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("removed scratch directory {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Could not clean up temporary files in {}: {e}",
                self.path.display()
            ),
        }
    }
}

/// Write `bytes` to `path` through a temporary sibling and rename.
///
/// On failure the temporary file is removed and `path` is untouched.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(format!(".{PARTIAL_SUFFIX}"));
    let partial = PathBuf::from(partial);

    let result = match tokio::fs::write(&partial, bytes).await {
        Ok(()) => tokio::fs::rename(&partial, path).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        if let Err(rm) = tokio::fs::remove_file(&partial).await
            && rm.kind() != io::ErrorKind::NotFound
        {
            warn!("could not remove {}: {rm}", partial.display());
        }
        return Err(e.into());
    }
    Ok(())
}
