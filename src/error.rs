use std::io;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The engine reported a non-zero error code right after `init`.
    #[error("engine initialization failed: {0}")]
    Init(#[source] io::Error),

    /// A call into the engine failed; code and message are the session's last error.
    #[error("lvm error {code}: {message}")]
    Lvm { code: i32, message: String },

    #[error("invalid argument: {0}")]
    Usage(String),

    /// The handle (or the session behind it) was already closed.
    #[error("{0} is closed")]
    Closed(&'static str),
}

impl Error {
    pub(crate) fn from_last(last: LastError) -> Self {
        Error::Lvm {
            code: last.code,
            message: last.message,
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Lvm { code, .. } => Some(*code),
            Error::Init(e) => e.raw_os_error(),
            _ => None,
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed(_))
    }
}

/// Error state recorded by the engine for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastError {
    pub code: i32,
    pub message: String,
}
