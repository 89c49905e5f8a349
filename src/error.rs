//! Error taxonomy shared by every build step and reader.
//!
//! Configuration problems, format/consistency violations and caller mistakes
//! are distinct variants so a batch driver can report *which* kind of failure
//! stopped a step.  Drift between labels and pitchmarks is not an error; it is
//! logged and corrected.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or unreadable input directory/file, or a bad config value.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The bytes or text on disk do not follow the expected layout.
    #[error("format error in {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    /// Two independently produced counts disagree (unit file, SCost file).
    #[error("{what}: expected {expected} records, found {actual}")]
    CountMismatch {
        what: String,
        expected: u64,
        actual: u64,
    },

    /// A time request falls outside the timeline.
    #[error("time {requested} is out of range (timeline covers [0, {total}))")]
    OutOfRange { requested: u64, total: u64 },

    /// Caller programming error; not recoverable by retrying.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn format(path: &Path, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn count_mismatch(what: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::CountMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }
}

/// Attach a lazily built context string to an `io::Result`.
pub(crate) trait IoContext<T> {
    fn io_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
        self.map_err(|e| Error::io(f(), e))
    }
}
