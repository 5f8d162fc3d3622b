//! Upload session façade.
//!
//! One [`UploadSession::upload`] call opens a server session, sends every
//! file through the bulk or resumable path and commits the session with a
//! single finish call. Any fatal error aborts the whole session: nothing is
//! committed and no finish call is made.

use futures_util::{StreamExt, TryStreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tuskit_protocol::{SessionFinishToken, SortingMethod, UploadMetadata};
use tuskit_transfer::{FileRef, ProgressSink, classify};

use crate::bulk::BulkBatchSender;
use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::request::{self, Endpoint};
use crate::stream::{ResumableStream, StreamOutcome};
use crate::transport::UploadTransport;
use crate::types::{SharedFields, UploadDescriptor};

/// Finish body field carrying the sorting method.
const SORTING_METHOD_FIELD: &str = "sorting_method";
/// Finish body field carrying file names in client order.
const UPLOAD_FILE_ORDER_FIELD: &str = "upload_file_order";

/// Public entry point of the uploader.
pub struct UploadSession<'a> {
    transport: &'a dyn UploadTransport,
    config: UploadConfig,
    cancel: CancellationToken,
}

impl<'a> UploadSession<'a> {
    pub fn new(transport: &'a dyn UploadTransport, config: UploadConfig) -> Self {
        Self {
            transport,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the session between requests.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Uploads every file of `descriptor` and commits the session.
    ///
    /// `fields` go with every bulk batch and with the finish call.
    pub async fn upload(
        &self,
        descriptor: &UploadDescriptor,
        fields: &SharedFields,
        progress: &dyn ProgressSink,
    ) -> Result<SessionFinishToken, UploadError> {
        let endpoint = self.prepare(descriptor)?;
        let result = self.run(&endpoint, descriptor, fields, progress).await;
        log_outcome(&endpoint, &result);
        result
    }

    /// Uploads a single file (annotation or backup import) through the
    /// resumable path, whatever its size.
    ///
    /// The finish call names the file the way the server stored it.
    pub async fn upload_file(
        &self,
        descriptor: &UploadDescriptor,
        fields: &SharedFields,
        progress: &dyn ProgressSink,
    ) -> Result<SessionFinishToken, UploadError> {
        let endpoint = self.prepare(descriptor)?;
        let [file] = descriptor.files() else {
            return Err(UploadError::Configuration(format!(
                "single-file upload needs exactly one file, got {}",
                descriptor.files().len()
            )));
        };
        let result = self
            .run_single(&endpoint, descriptor, file, fields, progress)
            .await;
        log_outcome(&endpoint, &result);
        result
    }

    fn prepare(&self, descriptor: &UploadDescriptor) -> Result<Endpoint, UploadError> {
        self.config.validate()?;
        descriptor.validate()?;
        Endpoint::parse(descriptor.endpoint(), &self.config.shared_headers)
    }

    async fn run(
        &self,
        endpoint: &Endpoint,
        descriptor: &UploadDescriptor,
        fields: &SharedFields,
        progress: &dyn ProgressSink,
    ) -> Result<SessionFinishToken, UploadError> {
        let classification = classify(descriptor.files(), self.config.bulk_threshold);
        info!(
            endpoint = endpoint.url(),
            files = descriptor.files().len(),
            bulk_groups = classification.bulk_groups.len(),
            individual = classification.individual_files.len(),
            bytes = descriptor.total_bytes(),
            "starting upload session"
        );

        self.check_cancelled()?;
        progress.start(descriptor.total_bytes(), descriptor.filename());
        request::send_start(self.transport, endpoint, &descriptor.start_query()).await?;

        let bulk = BulkBatchSender::new(self.transport, endpoint);
        for (index, group) in classification.bulk_groups.iter().enumerate() {
            self.check_cancelled()?;
            bulk.send_bulk(group, fields)
                .await
                .map_err(|source| UploadError::BulkGroup {
                    index,
                    files: group.files.len(),
                    bytes: group.total_bytes,
                    source: Box::new(source),
                })?;
            progress.advance(group.total_bytes);
        }

        let stream = self.stream(endpoint);
        self.stream_files(&stream, &classification.individual_files, progress)
            .await?;

        let token = stream
            .finish(
                &descriptor.finish_query(descriptor.filename()),
                &finish_fields(descriptor, fields),
            )
            .await?;
        progress.finish();
        Ok(token)
    }

    async fn run_single(
        &self,
        endpoint: &Endpoint,
        descriptor: &UploadDescriptor,
        file: &FileRef,
        fields: &SharedFields,
        progress: &dyn ProgressSink,
    ) -> Result<SessionFinishToken, UploadError> {
        info!(
            endpoint = endpoint.url(),
            path = %file.path.display(),
            bytes = file.size,
            "starting single-file upload"
        );

        self.check_cancelled()?;
        progress.start(file.size, descriptor.filename());
        request::send_start(self.transport, endpoint, &descriptor.start_query()).await?;

        let stream = self.stream(endpoint);
        let metadata = UploadMetadata::with_filename(descriptor.filename());
        let outcome = stream.upload(file, &metadata, progress).await?;

        let filename = outcome
            .real_filename
            .as_deref()
            .unwrap_or(descriptor.filename());
        let token = stream
            .finish(
                &descriptor.finish_query(filename),
                &finish_fields(descriptor, fields),
            )
            .await?;
        progress.finish();
        Ok(token)
    }

    fn stream<'s>(&'s self, endpoint: &'s Endpoint) -> ResumableStream<'s> {
        ResumableStream::new(self.transport, endpoint, &self.config).with_cancel(self.cancel.clone())
    }

    /// Streams each individual file under its own name, at most
    /// `max_parallel_streams` at a time.
    async fn stream_files(
        &self,
        stream: &ResumableStream<'_>,
        files: &[FileRef],
        progress: &dyn ProgressSink,
    ) -> Result<Vec<StreamOutcome>, UploadError> {
        if self.config.max_parallel_streams <= 1 {
            let mut outcomes = Vec::with_capacity(files.len());
            for file in files {
                let metadata = UploadMetadata::with_filename(file.file_name());
                outcomes.push(stream.upload(file, &metadata, progress).await?);
            }
            return Ok(outcomes);
        }

        futures_util::stream::iter(files.iter().map(move |file| async move {
            let metadata = UploadMetadata::with_filename(file.file_name());
            stream.upload(file, &metadata, progress).await
        }))
        .buffer_unordered(self.config.max_parallel_streams)
        .try_collect()
        .await
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Shared fields plus the ordering hints of `descriptor`.
fn finish_fields(descriptor: &UploadDescriptor, fields: &SharedFields) -> SharedFields {
    let mut body = fields.clone();
    if let Some(sorting) = descriptor.sorting_method() {
        body.insert(SORTING_METHOD_FIELD.into(), Value::from(sorting.as_str()));
        if sorting == SortingMethod::Predefined {
            body.insert(
                UPLOAD_FILE_ORDER_FIELD.into(),
                Value::from(descriptor.upload_file_order()),
            );
        }
    }
    body
}

fn log_outcome(endpoint: &Endpoint, result: &Result<SessionFinishToken, UploadError>) {
    match result {
        Ok(token) => info!(
            endpoint = endpoint.url(),
            request_id = token.request_id(),
            "upload session finished"
        ),
        Err(e) if matches!(e.root_cause(), UploadError::Cancelled) => {
            info!(endpoint = endpoint.url(), "upload session cancelled")
        }
        Err(e) => error!(endpoint = endpoint.url(), error = %e, "upload session aborted"),
    }
}
