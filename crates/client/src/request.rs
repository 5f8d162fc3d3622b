//! Request construction shared by every phase.
//!
//! [`Endpoint`] owns the collection URL and the shared headers; every request
//! of a session is built through it so authorization and the protocol
//! version header are never forgotten.

use std::collections::BTreeMap;

use reqwest::Url;
use tracing::{debug, trace};
use tuskit_protocol::headers::{
    self, TUS_RESUMABLE, TUS_VERSION, UPLOAD_FINISH, UPLOAD_OFFSET, UPLOAD_START,
};
use tuskit_protocol::{Phase, SessionFinishToken};

use crate::error::UploadError;
use crate::transport::{HttpRequest, HttpResponse, Method, RequestBody, UploadTransport};
use crate::types::SharedFields;

/// Collection endpoint of one upload plus the headers every request carries.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: Url,
    shared_headers: Vec<(String, String)>,
}

impl Endpoint {
    pub fn parse(
        url: &str,
        shared_headers: &BTreeMap<String, String>,
    ) -> Result<Self, UploadError> {
        let url = Url::parse(url)
            .map_err(|e| UploadError::Configuration(format!("invalid endpoint {url:?}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(UploadError::Configuration(format!(
                "unsupported endpoint scheme: {}",
                url.scheme()
            )));
        }
        Ok(Self {
            url,
            shared_headers: shared_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Resolves a `Location` header against the endpoint.
    pub fn resolve(&self, location: &str) -> Result<String, UploadError> {
        self.url
            .join(location)
            .map(String::from)
            .map_err(|e| UploadError::violation(Phase::Create, format!("bad Location {location:?}: {e}")))
    }

    /// A request to `url` carrying the shared headers.
    pub fn request(&self, method: Method, url: &str) -> HttpRequest {
        let request = self
            .shared_headers
            .iter()
            .fold(HttpRequest::new(method, url), |req, (k, v)| {
                req.header(k.clone(), v.clone())
            });
        request.header(TUS_RESUMABLE, TUS_VERSION)
    }

    /// A request to the collection endpoint itself.
    pub fn collection(&self, method: Method) -> HttpRequest {
        self.request(method, self.url.as_str())
    }

    /// Sends `request`, turning transport failures into [`UploadError::Transport`].
    pub async fn send(
        &self,
        transport: &dyn UploadTransport,
        request: HttpRequest,
    ) -> Result<HttpResponse, UploadError> {
        let method = request.method.clone();
        let url = request.url.clone();
        trace!(%method, %url, "sending request");
        match transport.send(request).await {
            Ok(response) => {
                trace!(%method, %url, status = response.status, "response received");
                Ok(response)
            }
            Err(e) => {
                debug!(%method, %url, error = %e, "request failed in transport");
                Err(e.into())
            }
        }
    }
}

/// Passes `response` through if its status is the success status of `phase`.
pub fn expect_status(phase: Phase, response: HttpResponse) -> Result<HttpResponse, UploadError> {
    if phase.accepts(response.status) {
        Ok(response)
    } else {
        Err(UploadError::ServerRejected {
            phase,
            status: response.status,
            body: response.body_excerpt(),
        })
    }
}

/// A header the protocol requires on a successful response.
pub fn required_header<'r>(
    phase: Phase,
    response: &'r HttpResponse,
    name: &str,
) -> Result<&'r str, UploadError> {
    response
        .header(name)
        .ok_or_else(|| UploadError::violation(phase, format!("missing {name} header")))
}

/// The `Upload-Offset` of a successful response.
pub fn offset_header(phase: Phase, response: &HttpResponse) -> Result<u64, UploadError> {
    let value = required_header(phase, response, UPLOAD_OFFSET)?;
    headers::parse_offset(UPLOAD_OFFSET, value)
        .map_err(|e| UploadError::violation(phase, e.to_string()))
}

/// Renders a field value for a multipart text part.
pub fn field_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Opens a session on the collection endpoint.
pub async fn send_start(
    transport: &dyn UploadTransport,
    endpoint: &Endpoint,
    query: &[(String, String)],
) -> Result<(), UploadError> {
    let request = endpoint
        .collection(Method::POST)
        .header(UPLOAD_START, "")
        .query_pairs(query);
    let response = endpoint.send(transport, request).await?;
    expect_status(Phase::Start, response)?;
    debug!(endpoint = endpoint.url(), "upload session started");
    Ok(())
}

/// Commits a session and returns the server's job token.
pub async fn send_finish(
    transport: &dyn UploadTransport,
    endpoint: &Endpoint,
    query: &[(String, String)],
    fields: &SharedFields,
) -> Result<SessionFinishToken, UploadError> {
    let body = if fields.is_empty() {
        RequestBody::Empty
    } else {
        RequestBody::Json(serde_json::Value::Object(fields.clone()))
    };
    let request = endpoint
        .collection(Method::POST)
        .header(UPLOAD_FINISH, "")
        .query_pairs(query)
        .body(body);
    let response = endpoint.send(transport, request).await?;
    let response = expect_status(Phase::Finish, response)?;
    let token = SessionFinishToken::from_body(&response.body);
    debug!(
        endpoint = endpoint.url(),
        request_id = token.request_id(),
        "upload session finished"
    );
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Token secret".to_string());
        headers.insert("X-Organization".to_string(), "lab".to_string());
        Endpoint::parse("http://cvat.test/api/tasks/3/data/", &headers).unwrap()
    }

    #[test]
    fn requests_carry_shared_headers() {
        let request = endpoint().collection(Method::POST);
        assert_eq!(request.url, "http://cvat.test/api/tasks/3/data/");
        assert_eq!(request.header_value("authorization"), Some("Token secret"));
        assert_eq!(request.header_value("X-Organization"), Some("lab"));
        assert_eq!(request.header_value(TUS_RESUMABLE), Some(TUS_VERSION));
    }

    #[test]
    fn resolves_relative_and_absolute_locations() {
        let ep = endpoint();
        assert_eq!(
            ep.resolve("/api/tasks/3/data/abc").unwrap(),
            "http://cvat.test/api/tasks/3/data/abc"
        );
        assert_eq!(ep.resolve("abc").unwrap(), "http://cvat.test/api/tasks/3/data/abc");
        assert_eq!(
            ep.resolve("https://files.test/u/1").unwrap(),
            "https://files.test/u/1"
        );
    }

    #[test]
    fn rejects_bad_endpoints() {
        let headers = BTreeMap::new();
        assert!(matches!(
            Endpoint::parse("not a url", &headers),
            Err(UploadError::Configuration(_))
        ));
        assert!(matches!(
            Endpoint::parse("ftp://host/x", &headers),
            Err(UploadError::Configuration(_))
        ));
    }

    #[test]
    fn status_and_header_checks() {
        let ok = HttpResponse::new(200).with_header("Upload-Offset", "12");
        let ok = expect_status(Phase::QueryOffset, ok).unwrap();
        assert_eq!(offset_header(Phase::QueryOffset, &ok).unwrap(), 12);

        let missing = HttpResponse::new(200);
        assert!(matches!(
            offset_header(Phase::QueryOffset, &missing),
            Err(UploadError::ProtocolViolation { .. })
        ));

        let garbage = HttpResponse::new(200).with_header("Upload-Offset", "twelve");
        assert!(matches!(
            offset_header(Phase::QueryOffset, &garbage),
            Err(UploadError::ProtocolViolation { .. })
        ));

        let rejected = HttpResponse::new(403).with_body("forbidden");
        match expect_status(Phase::Create, rejected) {
            Err(UploadError::ServerRejected { status, body, .. }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn field_text_unquotes_strings() {
        assert_eq!(field_text(&serde_json::json!("70")), "70");
        assert_eq!(field_text(&serde_json::json!(70)), "70");
        assert_eq!(field_text(&serde_json::json!(true)), "true");
    }
}
