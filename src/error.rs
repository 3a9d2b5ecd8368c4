use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Remote operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Connect,
    Schema,
    Insert,
    Query,
    Delete,
    Count,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Schema => "schema",
            Self::Insert => "insert",
            Self::Query => "query",
            Self::Delete => "delete",
            Self::Count => "count",
        })
    }
}

/// Pipeline stage an error surfaced from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Insert,
    Query,
    Save,
    Delete,
    Count,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "failed to load image",
            Self::Insert => "failed to add image",
            Self::Query => "failed to search images",
            Self::Save => "failed to save image",
            Self::Delete => "failed to delete image",
            Self::Count => "failed to get image count",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported file type: {filename}")]
    UnsupportedType { filename: String },
    #[error("file size {size} exceeds maximum allowed size of {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("i/o error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid base64 image: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("remote {op} failed: {message}")]
    Remote { op: RemoteOp, message: String },
    #[error("search client is not initialized")]
    NotInitialized,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("{stage}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn remote(op: RemoteOp, message: impl fmt::Display) -> Self {
        Self::Remote { op, message: message.to_string() }
    }

    /// Wrap with the stage the error surfaced from
    pub fn at(self, stage: Stage) -> Self {
        Self::Stage { stage, source: Box::new(self) }
    }

    /// Innermost error, skipping stage wrappers
    pub fn root(&self) -> &Error {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// The error followed by each of its sources, joined by `: `
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(e) = source {
            message.push_str(": ");
            message.push_str(&e.to_string());
            source = e.source();
        }
        message
    }

    /// Outermost stage, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Attach a stage to the error side of a result
pub(crate) trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.at(stage))
    }
}
