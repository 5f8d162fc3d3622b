//! Resumable streaming of one file.
//!
//! The server is the only authority on how many bytes it holds. After any
//! failure the stream asks it again instead of guessing, and the local
//! [`ResumableTransfer`] only ever moves to offsets the server reported.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tuskit_protocol::headers::{
    self, OFFSET_OCTET_STREAM, STATUS_CONFLICT, STATUS_METHOD_NOT_ALLOWED, UPLOAD_FILENAME,
    UPLOAD_LENGTH, UPLOAD_METADATA, UPLOAD_OFFSET,
};
use tuskit_protocol::{OffsetQuery, Phase, SessionFinishToken, UploadMetadata};
use tuskit_transfer::{
    ChunkReader, FileRef, ProgressSink, ResumableTransfer, TransferError, TransferPhase,
};

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::request::{self, Endpoint, expect_status, offset_header, required_header};
use crate::transport::{Method, RequestBody, UploadTransport};
use crate::types::SharedFields;

/// Result of a successfully streamed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub upload_url: String,
    /// Name the server stored the file under, if it reported one.
    pub real_filename: Option<String>,
    pub bytes: u64,
}

/// Server answer to one chunk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkAck {
    /// The new server offset.
    Acknowledged(u64),
    /// The server holds a different offset than the one the write claimed.
    Conflict { server_offset: Option<u64> },
}

/// Drives the create / query / write exchanges for individual files.
pub struct ResumableStream<'a> {
    transport: &'a dyn UploadTransport,
    endpoint: &'a Endpoint,
    config: &'a UploadConfig,
    cancel: CancellationToken,
}

impl<'a> ResumableStream<'a> {
    pub fn new(
        transport: &'a dyn UploadTransport,
        endpoint: &'a Endpoint,
        config: &'a UploadConfig,
    ) -> Self {
        Self {
            transport,
            endpoint,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Creates the server-side upload and moves `transfer` to `Started`.
    ///
    /// Returns the server's real filename when it reported one.
    pub async fn begin(
        &self,
        transfer: &mut ResumableTransfer,
        metadata: &UploadMetadata,
    ) -> Result<Option<String>, UploadError> {
        if metadata.filename().is_none() {
            return Err(UploadError::Configuration(
                "upload metadata requires a filename".into(),
            ));
        }
        if transfer.phase() != TransferPhase::NotStarted {
            return Err(TransferError::InvalidTransition {
                phase: transfer.phase(),
                action: "begin",
            }
            .into());
        }

        let request = self
            .endpoint
            .collection(Method::POST)
            .header(UPLOAD_LENGTH, transfer.total_length().to_string())
            .header(UPLOAD_METADATA, metadata.encode());
        let response = self.endpoint.send(self.transport, request).await?;
        let response = expect_status(Phase::Create, response)?;
        let location = required_header(Phase::Create, &response, headers::LOCATION)?;
        let upload_url = self.endpoint.resolve(location)?;
        let real_filename = response.header(UPLOAD_FILENAME).map(str::to_owned);

        debug!(
            url = %upload_url,
            bytes = transfer.total_length(),
            real_filename = real_filename.as_deref(),
            "upload created"
        );
        transfer.start(upload_url)?;
        Ok(real_filename)
    }

    /// Asks the server how many bytes of `url` it holds.
    pub async fn resume_offset(&self, url: &str) -> Result<OffsetQuery, UploadError> {
        let request = self.endpoint.request(Method::HEAD, url);
        let response = self.endpoint.send(self.transport, request).await?;
        if response.status == STATUS_METHOD_NOT_ALLOWED {
            warn!(url, "server does not support offset queries");
            return Ok(OffsetQuery::Unsupported);
        }
        let response = expect_status(Phase::QueryOffset, response)?;
        let offset = offset_header(Phase::QueryOffset, &response)?;
        debug!(url, offset, "offset queried");
        Ok(OffsetQuery::Offset(offset))
    }

    /// Writes `data` at offset `at`.
    pub async fn write_chunk(
        &self,
        url: &str,
        data: Vec<u8>,
        at: u64,
    ) -> Result<ChunkAck, UploadError> {
        let bytes = data.len() as u64;
        let request = self
            .endpoint
            .request(Method::PATCH, url)
            .header(UPLOAD_OFFSET, at.to_string())
            .header("Content-Type", OFFSET_OCTET_STREAM)
            .body(RequestBody::Bytes(data));
        let response = self.endpoint.send(self.transport, request).await?;

        if response.status == STATUS_CONFLICT {
            let server_offset = response
                .header(UPLOAD_OFFSET)
                .and_then(|v| headers::parse_offset(UPLOAD_OFFSET, v).ok());
            warn!(url, offset = at, ?server_offset, "offset conflict");
            return Ok(ChunkAck::Conflict { server_offset });
        }

        let response = expect_status(Phase::WriteChunk, response)?;
        let acknowledged = offset_header(Phase::WriteChunk, &response)?;
        if acknowledged != at + bytes {
            return Err(UploadError::violation(
                Phase::WriteChunk,
                format!(
                    "wrote {bytes} bytes at {at} but server acknowledged offset {acknowledged}"
                ),
            ));
        }
        debug!(url, offset = acknowledged, bytes, "chunk acknowledged");
        Ok(ChunkAck::Acknowledged(acknowledged))
    }

    /// Sends the rest of `path` to the upload `transfer` points at.
    ///
    /// Any error aborts `transfer`, keeping its last acknowledged offset.
    pub async fn transfer(
        &self,
        path: &Path,
        transfer: &mut ResumableTransfer,
        progress: &dyn ProgressSink,
    ) -> Result<(), UploadError> {
        let result = self.write_all(path, transfer, progress).await;
        if result.is_err() {
            transfer.abort();
        }
        result
    }

    async fn write_all(
        &self,
        path: &Path,
        transfer: &mut ResumableTransfer,
        progress: &dyn ProgressSink,
    ) -> Result<(), UploadError> {
        transfer.begin_writes()?;
        let url = transfer
            .upload_url()
            .map(str::to_owned)
            .ok_or_else(|| UploadError::Configuration("transfer has no upload URL".into()))?;

        let mut reader = ChunkReader::open(path, self.config.chunk_size).await?;
        if reader.file_size() != transfer.total_length() {
            return Err(UploadError::Configuration(format!(
                "{} is {} bytes but the upload was created for {}",
                path.display(),
                reader.file_size(),
                transfer.total_length()
            )));
        }

        let mut needs_query = true;
        let mut conflicts = 0u32;
        let mut failures = 0u32;
        let mut conflict_offset: Option<u64> = None;

        loop {
            self.check_cancelled()?;

            if needs_query {
                match self.resume_offset(&url).await {
                    Ok(OffsetQuery::Offset(server)) => {
                        acknowledge(transfer, server, Phase::QueryOffset, progress)?;
                    }
                    // Legacy server: the last acknowledged offset is all we know,
                    // unless a conflict just told us more.
                    Ok(OffsetQuery::Unsupported) => {
                        if let Some(server) = conflict_offset.filter(|&s| s >= transfer.offset()) {
                            acknowledge(transfer, server, Phase::WriteChunk, progress)?;
                        }
                    }
                    Err(e) if e.is_transport() => {
                        self.retry_after_transport(&mut failures, e).await?;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
                needs_query = false;
                conflict_offset = None;
            }

            if transfer.is_complete() {
                break;
            }

            let at = transfer.offset();
            let chunk = reader
                .chunk_at(at)
                .await?
                .ok_or(TransferError::UnexpectedEof {
                    offset: at,
                    expected: transfer.remaining(),
                })?;

            match self.write_chunk(&url, chunk.data, at).await {
                Ok(ChunkAck::Acknowledged(server)) => {
                    acknowledge(transfer, server, Phase::WriteChunk, progress)?;
                    conflicts = 0;
                    failures = 0;
                }
                Ok(ChunkAck::Conflict { server_offset }) => {
                    conflicts += 1;
                    if conflicts > 1 {
                        return Err(UploadError::OffsetConflict {
                            believed: at,
                            server: server_offset,
                        });
                    }
                    conflict_offset = server_offset;
                    needs_query = true;
                }
                Err(e) if e.is_transport() => {
                    self.retry_after_transport(&mut failures, e).await?;
                    needs_query = true;
                }
                Err(e) => return Err(e),
            }
        }

        debug!(url = %url, bytes = transfer.total_length(), "all chunks acknowledged");
        Ok(())
    }

    /// Creates the upload for `file`, streams it and completes the transfer.
    ///
    /// Failures name the file and the last acknowledged offset.
    pub async fn upload(
        &self,
        file: &FileRef,
        metadata: &UploadMetadata,
        progress: &dyn ProgressSink,
    ) -> Result<StreamOutcome, UploadError> {
        let mut transfer = ResumableTransfer::new(file.size);
        self.upload_with(file, metadata, &mut transfer, progress)
            .await
            .map_err(|source| UploadError::File {
                path: file.path.clone(),
                last_offset: transfer.offset(),
                source: Box::new(source),
            })
    }

    async fn upload_with(
        &self,
        file: &FileRef,
        metadata: &UploadMetadata,
        transfer: &mut ResumableTransfer,
        progress: &dyn ProgressSink,
    ) -> Result<StreamOutcome, UploadError> {
        let real_filename = self.begin(transfer, metadata).await?;
        self.transfer(&file.path, transfer, progress).await?;
        transfer.finish()?;
        info!(
            path = %file.path.display(),
            bytes = file.size,
            "file uploaded"
        );
        Ok(StreamOutcome {
            upload_url: transfer.upload_url().unwrap_or_default().to_string(),
            real_filename,
            bytes: transfer.total_length(),
        })
    }

    /// Commits the session the streamed files belong to.
    pub async fn finish(
        &self,
        query: &[(String, String)],
        fields: &SharedFields,
    ) -> Result<SessionFinishToken, UploadError> {
        self.check_cancelled()?;
        request::send_finish(self.transport, self.endpoint, query, fields).await
    }

    async fn retry_after_transport(
        &self,
        failures: &mut u32,
        error: UploadError,
    ) -> Result<(), UploadError> {
        *failures += 1;
        let max_attempts = self.config.retry.max_attempts;
        if *failures > max_attempts {
            warn!(attempts = *failures, error = %error, "giving up after transport failures");
            return Err(error);
        }
        let delay = self.config.retry.delay_for_attempt(*failures);
        warn!(
            attempt = *failures,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "transport failure, re-querying offset"
        );
        tokio::select! {
            _ = self.cancel.cancelled() => Err(UploadError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Moves `transfer` to `server_offset` and reports the newly acknowledged bytes.
fn acknowledge(
    transfer: &mut ResumableTransfer,
    server_offset: u64,
    phase: Phase,
    progress: &dyn ProgressSink,
) -> Result<(), UploadError> {
    let delta = transfer.acknowledge(server_offset).map_err(|e| match e {
        TransferError::OffsetRegressed { .. } | TransferError::OffsetBeyondLength { .. } => {
            UploadError::violation(phase, e.to_string())
        }
        other => other.into(),
    })?;
    if delta > 0 {
        progress.advance(delta);
    }
    Ok(())
}
