use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context as _;

use crate::foundation::error::{MediaError, MediaResult};

static NEXT_TEMP: AtomicU64 = AtomicU64::new(0);

/// Fresh path in `dir` for a temporary file with extension `ext`.
pub fn temp_path(dir: &Path, ext: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    dir.join(format!(
        "mediaforge_{}_{}_{}.{ext}",
        std::process::id(),
        NEXT_TEMP.fetch_add(1, Ordering::Relaxed),
        nanos
    ))
}

/// Temporary file removed on drop unless kept.
#[derive(Debug)]
pub struct TempFile {
    path: Option<PathBuf>,
}

impl TempFile {
    /// Create an empty file at a fresh path in `dir`.
    pub fn create(dir: &Path, ext: &str) -> MediaResult<(Self, File)> {
        let path = temp_path(dir, ext);
        let file = File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("create temp file '{}'", path.display()))?;
        Ok((Self { path: Some(path) }, file))
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Stop tracking the file so it outlives this guard.
    pub fn keep(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Output gathered from a stream, in memory when it fit under the cap.
#[derive(Debug)]
pub enum Collected {
    /// Whole payload.
    Memory(Vec<u8>),
    /// Payload exceeded the cap and was written to a temporary file.
    Spilled {
        /// Owning guard for the spill file.
        file: TempFile,
        /// Bytes written.
        size: u64,
    },
}

impl Collected {
    /// Payload size in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Self::Memory(b) => b.len() as u64,
            Self::Spilled { size, .. } => *size,
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the payload had to spill to disk.
    pub fn is_spilled(&self) -> bool {
        matches!(self, Self::Spilled { .. })
    }

    /// Load the payload into memory.
    pub fn into_bytes(self) -> MediaResult<Vec<u8>> {
        match self {
            Self::Memory(b) => Ok(b),
            Self::Spilled { file, .. } => {
                let bytes = std::fs::read(file.path())
                    .with_context(|| format!("read spill file '{}'", file.path().display()))?;
                Ok(bytes)
            }
        }
    }

    /// Move the payload to `dest`, returning its size.
    pub fn persist(self, dest: &Path) -> MediaResult<u64> {
        ensure_parent_dir(dest)?;
        match self {
            Self::Memory(b) => {
                std::fs::write(dest, &b)
                    .with_context(|| format!("write '{}'", dest.display()))?;
                Ok(b.len() as u64)
            }
            Self::Spilled { file, size } => {
                if std::fs::rename(file.path(), dest).is_err() {
                    // Different filesystem.
                    std::fs::copy(file.path(), dest).with_context(|| {
                        format!("copy '{}' to '{}'", file.path().display(), dest.display())
                    })?;
                    return Ok(size);
                }
                let _ = file.keep();
                Ok(size)
            }
        }
    }
}

/// Read `reader` to the end, keeping at most `cap` bytes in memory.
///
/// Past the cap, what was buffered plus the rest of the stream goes to a temporary file in
/// `temp_dir`. Read errors (including a producer closing its pipe with an error) are returned
/// and any partial spill file is removed.
#[tracing::instrument(skip(reader), fields(spilled = tracing::field::Empty))]
pub fn collect_bounded<R: Read>(
    mut reader: R,
    cap: u64,
    temp_dir: &Path,
    ext: &str,
) -> MediaResult<Collected> {
    let mut head = Vec::new();
    (&mut reader)
        .take(cap.saturating_add(1))
        .read_to_end(&mut head)
        .map_err(|e| MediaError::bridge(format!("reading output: {e}")))?;
    if head.len() as u64 <= cap {
        tracing::Span::current().record("spilled", false);
        return Ok(Collected::Memory(head));
    }

    let (guard, file) = TempFile::create(temp_dir, ext)?;
    let mut out = io::BufWriter::new(file);
    out.write_all(&head)
        .with_context(|| format!("write spill file '{}'", guard.path().display()))?;
    let rest = io::copy(&mut reader, &mut out)
        .map_err(|e| MediaError::bridge(format!("reading output: {e}")))?;
    out.flush()
        .with_context(|| format!("flush spill file '{}'", guard.path().display()))?;
    tracing::Span::current().record("spilled", true);
    Ok(Collected::Spilled {
        file: guard,
        size: head.len() as u64 + rest,
    })
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/bridge/output.rs"]
mod tests;
