use crate::SessionState;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Error, Debug)]
pub enum StreamError {
    /// Bad arm request. The caller corrects the request and retries.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation issued in the wrong state. Nothing was touched.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The device produced data faster than it was read. Fatal to the session.
    #[error("data overflow (last persisted chunk: {last_sequence:?})")]
    Overflow { last_sequence: Option<u64> },

    #[error("device error: {0}")]
    Device(String),

    #[error("file I/O error on {path:?}: {message}")]
    FileIo { path: PathBuf, message: String },

    #[error("settings line {line}: {reason}")]
    ConfigParse { line: usize, reason: String },

    /// The poll loop did not acknowledge a stop request in time.
    #[error("acquisition loop did not stop within {waited:?}")]
    LoopUnresponsive { waited: Duration },
}

impl StreamError {
    /// Errors that end the running session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Overflow { .. }
                | Self::Device(_)
                | Self::FileIo { .. }
                | Self::LoopUnresponsive { .. }
        )
    }

    pub fn file_io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::FileIo {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(value: std::io::Error) -> Self {
        Self::FileIo {
            path: PathBuf::new(),
            message: value.to_string(),
        }
    }
}

impl From<hdf5::Error> for StreamError {
    fn from(value: hdf5::Error) -> Self {
        Self::FileIo {
            path: PathBuf::new(),
            message: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(StreamError::Overflow { last_sequence: Some(3) }.is_fatal());
        assert!(StreamError::Device("gone".into()).is_fatal());
        assert!(StreamError::file_io("a.csv", "disk full").is_fatal());
        assert!(!StreamError::InvalidParameter("x".into()).is_fatal());
        assert!(!StreamError::InvalidState {
            operation: "stop",
            state: SessionState::Idle
        }
        .is_fatal());
        assert!(!StreamError::ConfigParse {
            line: 4,
            reason: "bad".into()
        }
        .is_fatal());
    }

    #[test]
    fn invalid_state_message_names_state() {
        let err = StreamError::InvalidState {
            operation: "stop",
            state: SessionState::Idle,
        };
        assert_eq!(err.to_string(), "cannot stop while idle");
    }
}
