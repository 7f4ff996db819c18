use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::bridge::output::ensure_parent_dir;
use crate::config::Config;
use crate::foundation::error::{MediaError, MediaResult};

/// How a finished output reaches the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Small enough to attach directly.
    Attach(PathBuf),
    /// Moved into the publish directory and reachable at this URL.
    Link(String),
}

/// Decides between attaching a file and publishing it under a public URL.
#[derive(Clone, Debug)]
pub struct Publisher {
    attach_limit: u64,
    output_dir: Option<PathBuf>,
    output_url: Option<url::Url>,
}

impl Publisher {
    /// Publisher without a publish directory: oversized files are rejected.
    pub fn attach_only(attach_limit: u64) -> Self {
        Self {
            attach_limit,
            output_dir: None,
            output_url: None,
        }
    }

    /// Publisher that moves oversized files into `dir`, served under `base_url`.
    pub fn with_directory(
        attach_limit: u64,
        dir: impl Into<PathBuf>,
        base_url: &str,
    ) -> MediaResult<Self> {
        let mut base = url::Url::parse(base_url)
            .map_err(|e| MediaError::validation(format!("invalid output url '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            attach_limit,
            output_dir: Some(dir.into()),
            output_url: Some(base),
        })
    }

    /// Build from configuration.
    pub fn from_config(cfg: &Config) -> MediaResult<Self> {
        match (&cfg.output_dir, &cfg.output_url) {
            (Some(dir), Some(url)) => Self::with_directory(cfg.attach_limit_bytes, dir, url),
            _ => Ok(Self::attach_only(cfg.attach_limit_bytes)),
        }
    }

    /// Deliver the file at `path`.
    ///
    /// Files at or below the attach limit stay where they are. Larger files are renamed into
    /// the publish directory (keeping their file name) and returned as a link.
    #[tracing::instrument(skip(self))]
    pub fn deliver(&self, path: &Path) -> MediaResult<Delivery> {
        let size = std::fs::metadata(path)
            .with_context(|| format!("stat '{}'", path.display()))?
            .len();
        if size <= self.attach_limit {
            return Ok(Delivery::Attach(path.to_path_buf()));
        }
        let (Some(dir), Some(base)) = (&self.output_dir, &self.output_url) else {
            return Err(MediaError::bridge(
                "file too large and no upload directory configured",
            ));
        };
        let name = path
            .file_name()
            .ok_or_else(|| MediaError::bridge(format!("'{}' has no file name", path.display())))?;
        let dest = dir.join(name);
        ensure_parent_dir(&dest)?;
        if std::fs::rename(path, &dest).is_err() {
            std::fs::copy(path, &dest)
                .with_context(|| format!("copy '{}' to '{}'", path.display(), dest.display()))?;
            std::fs::remove_file(path)
                .with_context(|| format!("remove '{}'", path.display()))?;
        }
        let link = base
            .join(&name.to_string_lossy())
            .map_err(|e| MediaError::bridge(format!("building output url: {e}")))?;
        tracing::info!(size, %link, "published oversized output");
        Ok(Delivery::Link(link.to_string()))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bridge/publish.rs"]
mod tests;
