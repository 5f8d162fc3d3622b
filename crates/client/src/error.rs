//! Upload error types.

use std::path::PathBuf;

use tuskit_protocol::{Phase, ProtocolError};
use tuskit_transfer::TransferError;

use crate::transport::TransportError;

/// Errors produced while uploading.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Bad input, detected before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A success status arrived without what the protocol requires.
    #[error("protocol violation during {phase}: {detail}")]
    ProtocolViolation { phase: Phase, detail: String },

    /// The server disagreed with the client's offset twice in a row.
    #[error("offset conflict: client believed {believed}, server reported {server:?}")]
    OffsetConflict { believed: u64, server: Option<u64> },

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("server rejected {phase} with status {status}: {body}")]
    ServerRejected {
        phase: Phase,
        status: u16,
        body: String,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An individual file failed; `last_offset` is the last acknowledged byte.
    #[error("upload of {} failed at offset {last_offset}: {source}", path.display())]
    File {
        path: PathBuf,
        last_offset: u64,
        source: Box<UploadError>,
    },

    /// A bulk group failed; none of its files count as uploaded.
    #[error("bulk group {index} ({files} files, {bytes} bytes) failed: {source}")]
    BulkGroup {
        index: usize,
        files: usize,
        bytes: u64,
        source: Box<UploadError>,
    },
}

impl UploadError {
    pub(crate) fn violation(phase: Phase, detail: impl Into<String>) -> Self {
        UploadError::ProtocolViolation {
            phase,
            detail: detail.into(),
        }
    }

    /// The underlying error, with file and group context stripped.
    pub fn root_cause(&self) -> &UploadError {
        match self {
            UploadError::File { source, .. } | UploadError::BulkGroup { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self.root_cause(), UploadError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_unwraps_context() {
        let err = UploadError::File {
            path: "video.mp4".into(),
            last_offset: 42,
            source: Box::new(UploadError::Transport(TransportError::Timeout)),
        };
        assert!(err.is_transport());
        assert!(matches!(
            err.root_cause(),
            UploadError::Transport(TransportError::Timeout)
        ));
        let message = err.to_string();
        assert!(message.contains("video.mp4"));
        assert!(message.contains("offset 42"));
    }

    #[test]
    fn bulk_group_message_names_group() {
        let err = UploadError::BulkGroup {
            index: 2,
            files: 3,
            bytes: 900,
            source: Box::new(UploadError::ServerRejected {
                phase: Phase::Bulk,
                status: 500,
                body: "boom".into(),
            }),
        };
        let message = err.to_string();
        assert!(message.contains("bulk group 2"));
        assert!(message.contains("status 500"));
        assert!(!err.is_transport());
    }
}
