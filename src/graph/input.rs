use std::ffi::OsString;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;

/// Where the bytes of an [`Input`] come from.
#[derive(Debug)]
pub enum InputSource {
    /// A named local file, passed to the tool as a path.
    Path(PathBuf),
    /// An open handle owned by the caller. The graph keeps a duplicate of the descriptor.
    Handle(File),
    /// An in-memory image, streamed to the tool as PNG through a pipe at run time.
    Image(Arc<RgbaImage>),
}

/// One input of a job plus the per-input options that precede its `-i`.
#[derive(Debug)]
pub struct Input {
    pub(crate) source: InputSource,
    pub(crate) options: Vec<OsString>,
}

impl Input {
    /// Input read from a path.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::from_source(InputSource::Path(path.into()))
    }

    /// Input read from an open file handle.
    ///
    /// Pass `file.try_clone()?` to keep using the handle afterwards.
    pub fn handle(file: File) -> Self {
        Self::from_source(InputSource::Handle(file))
    }

    /// Input produced in-process, e.g. a rendered overlay.
    pub fn image(image: impl Into<Arc<RgbaImage>>) -> Self {
        Self::from_source(InputSource::Image(image.into()))
    }

    fn from_source(source: InputSource) -> Self {
        Self {
            source,
            options: Vec::new(),
        }
    }

    /// Add an input option with a value, e.g. `-ss 12`.
    pub fn option(mut self, flag: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.options.push(flag.into());
        self.options.push(value.into());
        self
    }

    /// Add a bare input flag.
    pub fn flag(mut self, flag: impl Into<OsString>) -> Self {
        self.options.push(flag.into());
        self
    }

    /// Underlying source.
    pub fn source(&self) -> &InputSource {
        &self.source
    }

    /// Options that will be emitted before `-i`.
    pub fn options(&self) -> &[OsString] {
        &self.options
    }
}
