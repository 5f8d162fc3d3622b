use serde::{Deserialize, Serialize};

/// Outcome of asking the server for the durable offset of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetQuery {
    /// The server holds this many bytes.
    Offset(u64),
    /// The server does not implement the query (legacy, answers 405).
    /// Only the last acknowledged offset is known, 0 before the first write.
    Unsupported,
}

/// How the server should order the files of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortingMethod {
    #[default]
    Lexicographical,
    Natural,
    /// Keep the client's order; the finish call carries `upload_file_order`.
    Predefined,
    Random,
}

impl SortingMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SortingMethod::Lexicographical => "lexicographical",
            SortingMethod::Natural => "natural",
            SortingMethod::Predefined => "predefined",
            SortingMethod::Random => "random",
        }
    }
}

/// Body of the finish response.
///
/// Opaque to the uploader; callers hand it to whatever polls the
/// server-side job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionFinishToken(pub serde_json::Value);

impl SessionFinishToken {
    /// Wraps a finish response body. An empty body gives a `null` token;
    /// a body that is not JSON is kept as a string.
    pub fn from_body(body: &[u8]) -> Self {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Self(serde_json::Value::Null);
        }
        serde_json::from_slice(body).map(Self).unwrap_or_else(|_| {
            Self(serde_json::Value::String(
                String::from_utf8_lossy(body).into_owned(),
            ))
        })
    }

    /// The asynchronous request id, when the server returned one.
    pub fn request_id(&self) -> Option<&str> {
        self.0.get("rq_id").and_then(serde_json::Value::as_str)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}
