/// Convenience result type used across mediaforge.
pub type MediaResult<T> = Result<T, MediaError>;

/// Top-level error taxonomy used by pipeline APIs.
#[derive(thiserror::Error, Debug)]
pub enum MediaError {
    /// A directive in an edit argument string could not be parsed.
    #[error("parsing directive \"{directive}\": {message}")]
    Parse {
        /// Directive name as written by the user.
        directive: String,
        /// What was wrong with it.
        message: String,
    },

    /// Invalid user-provided values or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed processing graph (kind mismatch, cycle, foreign handle).
    #[error("graph error: {0}")]
    Graph(String),

    /// The external tool ran and exited unsuccessfully.
    #[error("ffmpeg exited with status {code}: {stderr}")]
    Process {
        /// Exit code, or a signal description when the process was killed.
        code: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// Failure while streaming bytes into or out of the external process.
    #[error("bridge error: {0}")]
    Bridge(String),

    /// Decode, composition or encode failure in the GIF frame pipeline.
    #[error("gif error: {0}")]
    Gif(String),

    /// Spawn/wait/transport failures around the external process.
    #[error("execution error: {0}")]
    Exec(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MediaError {
    /// Build a [`MediaError::Parse`] value.
    pub fn parse(directive: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            directive: directive.into(),
            message: message.into(),
        }
    }

    /// Build a [`MediaError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`MediaError::Graph`] value.
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    /// Build a [`MediaError::Process`] value.
    pub fn process(code: impl Into<String>, stderr: impl AsRef<str>) -> Self {
        Self::Process {
            code: code.into(),
            stderr: stderr.as_ref().trim().to_string(),
        }
    }

    /// Build a [`MediaError::Bridge`] value.
    pub fn bridge(msg: impl Into<String>) -> Self {
        Self::Bridge(msg.into())
    }

    /// Build a [`MediaError::Gif`] value.
    pub fn gif(msg: impl Into<String>) -> Self {
        Self::Gif(msg.into())
    }

    /// Build a [`MediaError::Exec`] value.
    pub fn exec(msg: impl Into<String>) -> Self {
        Self::Exec(msg.into())
    }

    /// Convert into an `io::Error`, keeping the message, so it can travel through readers.
    pub fn to_io(&self) -> std::io::Error {
        std::io::Error::other(self.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
