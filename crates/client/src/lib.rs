//! Resumable upload driver.
//!
//! Sends a list of files to a collection endpoint so that an interrupted
//! transfer picks up from the last byte the server acknowledged.
//!
//! # Pipeline
//!
//! 1. **Classify**: small files are packed into bulk groups, large ones
//!    are streamed individually ([`tuskit_transfer::classify`]).
//! 2. **Start**: one `Upload-Start` request opens the session.
//! 3. **Bulk**: each group goes out as one multipart request
//!    ([`BulkBatchSender`]).
//! 4. **Stream**: each large file is created, then written in chunks with
//!    offset re-queries after any failure ([`ResumableStream`]).
//! 5. **Finish**: one `Upload-Finish` request commits the session and
//!    returns the server's job token.
//!
//! The HTTP layer is abstracted behind [`UploadTransport`]; [`ReqwestTransport`]
//! is the production implementation.

pub mod bulk;
pub mod config;
pub mod error;
pub mod http;
pub mod request;
pub mod session;
pub mod stream;
pub mod transport;
pub mod types;

#[cfg(test)]
mod fake_server;

pub use bulk::BulkBatchSender;
pub use config::{RetryConfig, UploadConfig};
pub use error::UploadError;
pub use http::ReqwestTransport;
pub use request::Endpoint;
pub use session::UploadSession;
pub use stream::{ChunkAck, ResumableStream, StreamOutcome};
pub use transport::{
    FormPart, HttpRequest, HttpResponse, RequestBody, TransportError, TransportFuture,
    UploadTransport,
};
pub use types::{SharedFields, UploadDescriptor};

pub use tuskit_protocol::{OffsetQuery, SessionFinishToken, SortingMethod, UploadMetadata};
pub use tuskit_transfer::{FileRef, NullProgress, ProgressCounter, ProgressSink, ProgressSnapshot};
