//! Wire vocabulary for the resumable upload protocol.
//!
//! The protocol is tus 1.0 with three extensions layered on the collection
//! endpoint: an `Upload-Start` marker that opens a session, an
//! `Upload-Multiple` marker for multipart batches of small files, and an
//! `Upload-Finish` marker that commits the session and hands back a token
//! for the server-side job.
//!
//! This crate has no transport; it only names headers, statuses and the
//! small value types both sides agree on.

pub mod headers;
pub mod metadata;
pub mod types;

pub use headers::Phase;
pub use metadata::UploadMetadata;
pub use types::{OffsetQuery, SessionFinishToken, SortingMethod};

/// Errors produced while encoding or decoding protocol values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid metadata key: {0:?}")]
    InvalidMetadataKey(String),

    #[error("malformed metadata pair: {0:?}")]
    MalformedMetadata(String),

    #[error("metadata value for {key} is not valid base64")]
    InvalidBase64 { key: String },

    #[error("metadata value for {key} is not valid UTF-8")]
    InvalidUtf8 { key: String },

    #[error("invalid {header} header: {value:?}")]
    InvalidHeader { header: &'static str, value: String },
}
