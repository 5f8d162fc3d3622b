//! Multipart batches of small files.

use tracing::debug;
use tuskit_protocol::Phase;
use tuskit_protocol::headers::{UPLOAD_MULTIPLE, client_file_field};
use tuskit_transfer::BulkGroup;

use crate::error::UploadError;
use crate::request::{Endpoint, expect_status, field_text};
use crate::transport::{FormPart, Method, RequestBody, UploadTransport};
use crate::types::SharedFields;

/// Sends a [`BulkGroup`] as one all-or-nothing multipart request.
///
/// A failed group reports no progress. Groups are `Clone`, so resending one
/// is up to the caller.
pub struct BulkBatchSender<'a> {
    transport: &'a dyn UploadTransport,
    endpoint: &'a Endpoint,
}

impl<'a> BulkBatchSender<'a> {
    pub fn new(transport: &'a dyn UploadTransport, endpoint: &'a Endpoint) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    pub async fn send_bulk(
        &self,
        group: &BulkGroup,
        fields: &SharedFields,
    ) -> Result<(), UploadError> {
        let mut parts = Vec::with_capacity(group.files.len() + fields.len());
        for (i, file) in group.files.iter().enumerate() {
            let data = tokio::fs::read(&file.path).await?;
            parts.push(FormPart::File {
                name: client_file_field(i),
                file_name: file.file_name(),
                data,
            });
        }
        parts.extend(fields.iter().map(|(name, value)| FormPart::Text {
            name: name.clone(),
            value: field_text(value),
        }));

        let request = self
            .endpoint
            .collection(Method::POST)
            .header(UPLOAD_MULTIPLE, "")
            .body(RequestBody::Multipart(parts));
        let response = self.endpoint.send(self.transport, request).await?;
        expect_status(Phase::Bulk, response)?;

        debug!(
            files = group.files.len(),
            bytes = group.total_bytes,
            "bulk group uploaded"
        );
        Ok(())
    }
}
