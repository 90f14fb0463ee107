use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Persist,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Decode => "decode",
            Stage::Persist => "persist",
            Stage::Assemble => "assemble",
        };
        f.write_str(name)
    }
}

/// Errors produced while converting one run.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The video container could not be opened or streamed.
    #[error("cannot read source {}: {reason}", path.display())]
    SourceUnreadable { path: PathBuf, reason: String },

    /// A text or image artifact could not be written.
    #[error("cannot write {}: {reason}", path.display())]
    RenderFailure { path: PathBuf, reason: String },

    /// The external encoder exited with an error or timed out.
    #[error("video encoder failed: {reason}")]
    EncoderFailure { reason: String },
}

impl ConvertError {
    pub fn source_unreadable(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        ConvertError::SourceUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn render_failure(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        ConvertError::RenderFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            ConvertError::SourceUnreadable { .. } => Stage::Decode,
            ConvertError::RenderFailure { .. } => Stage::Persist,
            ConvertError::EncoderFailure { .. } => Stage::Assemble,
        }
    }

    /// Only decode and persist failures terminate a run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ConvertError::EncoderFailure { .. })
    }

    /// Message suitable for end users. With `quiet` set, filesystem paths are left out.
    pub fn user_message(&self, quiet: bool) -> String {
        if !quiet {
            return format!("{} failed: {}", self.stage(), self);
        }
        let cause = match self {
            ConvertError::SourceUnreadable { path, reason } => {
                format!("cannot read source: {}", redact(reason, path))
            }
            ConvertError::RenderFailure { reason, .. } => {
                format!("cannot write artifact: {}", reason)
            }
            ConvertError::EncoderFailure { .. } => "video encoder failed".to_string(),
        };
        format!("{} failed: {}", self.stage(), cause)
    }
}

/// Replaces every occurrence of `path` in `text` with `<input>`.
pub(crate) fn redact(text: &str, path: &Path) -> String {
    let shown = path.display().to_string();
    if shown.is_empty() {
        return text.to_string();
    }
    text.replace(&shown, "<input>")
}

/// Rejected conversion options.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("video name must not be empty or contain path separators: '{0}'")]
    InvalidVideoName(String),
}
