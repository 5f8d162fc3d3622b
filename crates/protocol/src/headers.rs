//! Header names, marker headers and expected statuses.

use crate::ProtocolError;

/// Protocol version header sent on every request.
pub const TUS_RESUMABLE: &str = "Tus-Resumable";
/// The only protocol version this client speaks.
pub const TUS_VERSION: &str = "1.0.0";

/// Declared total length of a file, sent on creation.
pub const UPLOAD_LENGTH: &str = "Upload-Length";
/// Comma separated `key base64(value)` pairs, sent on creation.
pub const UPLOAD_METADATA: &str = "Upload-Metadata";
/// Believed offset on writes, durable offset on responses.
pub const UPLOAD_OFFSET: &str = "Upload-Offset";
/// Server-chosen name for a created file.
pub const UPLOAD_FILENAME: &str = "Upload-Filename";
/// Upload URL of a created file.
pub const LOCATION: &str = "Location";

/// Marker header opening a session.
pub const UPLOAD_START: &str = "Upload-Start";
/// Marker header for a multipart batch of small files.
pub const UPLOAD_MULTIPLE: &str = "Upload-Multiple";
/// Marker header committing a session.
pub const UPLOAD_FINISH: &str = "Upload-Finish";

/// Content type required on chunk writes.
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

/// Multipart field name for the `index`-th file of a batch.
pub fn client_file_field(index: usize) -> String {
    format!("client_files[{index}]")
}

/// Status a legacy server returns for an offset query it does not implement.
pub const STATUS_METHOD_NOT_ALLOWED: u16 = 405;
/// Status returned when the believed offset disagrees with the server.
pub const STATUS_CONFLICT: u16 = 409;

/// One logical exchange of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Create,
    QueryOffset,
    WriteChunk,
    Bulk,
    Finish,
}

impl Phase {
    /// Returns `true` if `status` is the success status for this phase.
    ///
    /// Chunk writes accept any 2xx: tus servers answer 204, some proxies 200.
    pub fn accepts(self, status: u16) -> bool {
        match self {
            Phase::Start => status == 202,
            Phase::Create => status == 201,
            Phase::QueryOffset => status == 200,
            Phase::WriteChunk => (200..300).contains(&status),
            Phase::Bulk => status == 200,
            Phase::Finish => status == 202,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Create => "create",
            Phase::QueryOffset => "query offset",
            Phase::WriteChunk => "write chunk",
            Phase::Bulk => "bulk batch",
            Phase::Finish => "finish",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses an `Upload-Offset` or `Upload-Length` header value.
pub fn parse_offset(header: &'static str, value: &str) -> Result<u64, ProtocolError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ProtocolError::InvalidHeader {
            header,
            value: value.to_string(),
        })
}
