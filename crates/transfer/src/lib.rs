//! Transport-free pieces of the resumable uploader.
//!
//! - [`classify`] splits a file list into bulk groups and individual files.
//! - [`ResumableTransfer`] is the explicit per-file state value.
//! - [`ChunkReader`] reads a file at arbitrary offsets in bounded chunks.
//! - [`ProgressSink`] receives acknowledged byte counts.

mod chunked;
mod classify;
mod progress;
mod state;

pub use chunked::{Chunk, ChunkReader};
pub use classify::{BulkGroup, Classification, FileGroup, FileRef, classify};
pub use progress::{
    NullProgress, ProgressCallback, ProgressCounter, ProgressSink, ProgressSnapshot,
    SpeedCalculator,
};
pub use state::{ResumableTransfer, TransferPhase};

/// Default chunk size for resumable writes: 10 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Default per-request ceiling for bulk batches: 100 MiB.
pub const DEFAULT_BULK_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot {action} a transfer in phase {phase:?}")]
    InvalidTransition {
        phase: TransferPhase,
        action: &'static str,
    },

    #[error("server offset {reported} is behind acknowledged offset {acknowledged}")]
    OffsetRegressed { acknowledged: u64, reported: u64 },

    #[error("server offset {reported} is beyond the upload length {total}")]
    OffsetBeyondLength { reported: u64, total: u64 },

    #[error("transfer incomplete: {offset} of {total} bytes acknowledged")]
    Incomplete { offset: u64, total: u64 },

    #[error("file shrank while uploading: expected {expected} bytes at offset {offset}")]
    UnexpectedEof { offset: u64, expected: u64 },
}
