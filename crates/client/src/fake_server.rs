//! In-memory tus server for driver tests.
//!
//! Implements enough of the protocol to exercise every path of the driver and
//! lets tests inject failures per request.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use tuskit_protocol::UploadMetadata;
use tuskit_protocol::headers::{
    LOCATION, UPLOAD_FILENAME, UPLOAD_FINISH, UPLOAD_LENGTH, UPLOAD_METADATA, UPLOAD_MULTIPLE,
    UPLOAD_OFFSET, UPLOAD_START,
};

use crate::transport::{
    FormPart, HttpRequest, HttpResponse, Method, RequestBody, TransportError, TransportFuture,
    UploadTransport,
};

pub(crate) const ENDPOINT: &str = "http://uploads.test/api/tasks/7/data/";

/// Failure injected into one request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Fault {
    /// Store the chunk, then lose the acknowledgement.
    DropAck,
    /// Store only the first `n` bytes of the chunk, then fail.
    StorePrefix(usize),
    /// Fail before anything reaches the server.
    Refuse,
    /// Answer with this status and store nothing.
    Status(u16),
    /// Answer 409 with the true offset, whatever the client believed.
    Conflict,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeUpload {
    pub(crate) length: u64,
    pub(crate) data: Vec<u8>,
    pub(crate) metadata: UploadMetadata,
}

#[derive(Debug, Clone)]
pub(crate) struct FinishCall {
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) headers: Vec<(String, String)>,
}

#[derive(Default)]
struct State {
    uploads: BTreeMap<String, FakeUpload>,
    next_id: u32,
    starts: u32,
    finishes: Vec<FinishCall>,
    bulk_batches: Vec<Vec<FormPart>>,
    requests: Vec<RecordedRequest>,
    patch_count: usize,
    head_count: usize,
    patch_faults: HashMap<usize, Fault>,
    head_faults: HashMap<usize, Fault>,
    bulk_faults: VecDeque<Fault>,
    create_status: Option<u16>,
    finish_reply: Option<String>,
    finish_status: Option<u16>,
    legacy: bool,
    rename_uploads: bool,
    omit_location: bool,
    required_headers: Vec<(String, String)>,
}

/// Fake server; cheap to build per test.
#[derive(Default)]
pub(crate) struct FakeServer {
    state: Mutex<State>,
}

impl FakeServer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Offset queries answer 405, like servers predating the query.
    pub(crate) fn legacy() -> Self {
        let server = Self::new();
        server.state().legacy = true;
        server
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Fault for the `index`-th PATCH (0-based, across all files).
    pub(crate) fn fail_patch(&self, index: usize, fault: Fault) {
        self.state().patch_faults.insert(index, fault);
    }

    /// Fault for the `index`-th HEAD (0-based, across all files).
    pub(crate) fn fail_head(&self, index: usize, fault: Fault) {
        self.state().head_faults.insert(index, fault);
    }

    /// Fault for the next bulk request.
    pub(crate) fn fail_next_bulk(&self, fault: Fault) {
        self.state().bulk_faults.push_back(fault);
    }

    pub(crate) fn reject_create(&self, status: u16) {
        self.state().create_status = Some(status);
    }

    pub(crate) fn reject_finish(&self, status: u16) {
        self.state().finish_status = Some(status);
    }

    /// Answers finish with 202 and this body instead of the JSON token.
    pub(crate) fn finish_reply(&self, body: &str) {
        self.state().finish_reply = Some(body.to_string());
    }

    pub(crate) fn omit_location(&self) {
        self.state().omit_location = true;
    }

    /// Created uploads report `upload_<id>_<name>` as their real filename.
    pub(crate) fn rename_uploads(&self) {
        self.state().rename_uploads = true;
    }

    /// Requests without this header get 401.
    pub(crate) fn require_header(&self, name: &str, value: &str) {
        self.state()
            .required_headers
            .push((name.to_string(), value.to_string()));
    }

    pub(crate) fn uploads(&self) -> Vec<FakeUpload> {
        self.state().uploads.values().cloned().collect()
    }

    pub(crate) fn upload_data(&self) -> Vec<Vec<u8>> {
        self.state().uploads.values().map(|u| u.data.clone()).collect()
    }

    pub(crate) fn starts(&self) -> u32 {
        self.state().starts
    }

    pub(crate) fn finishes(&self) -> Vec<FinishCall> {
        self.state().finishes.clone()
    }

    pub(crate) fn bulk_batches(&self) -> Vec<Vec<FormPart>> {
        self.state().bulk_batches.clone()
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    /// Methods in order, e.g. `["POST", "HEAD", "PATCH"]`.
    pub(crate) fn methods(&self) -> Vec<String> {
        self.state()
            .requests
            .iter()
            .map(|r| r.method.to_string())
            .collect()
    }

    fn handle(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut state = self.state();
        state.requests.push(RecordedRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
        });

        let authorized = state
            .required_headers
            .iter()
            .all(|(k, v)| request.header_value(k) == Some(v.as_str()));
        if !authorized {
            return Ok(HttpResponse::new(401).with_body("missing credentials"));
        }

        if request.url == ENDPOINT {
            return Ok(match request.method {
                Method::POST => collection_post(&mut state, &request),
                _ => HttpResponse::new(405),
            });
        }

        match request.method {
            Method::HEAD => head(&mut state, &request),
            Method::PATCH => patch(&mut state, &request),
            _ => Ok(HttpResponse::new(405)),
        }
    }
}

impl UploadTransport for FakeServer {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
        let result = self.handle(request);
        Box::pin(async move { result })
    }
}

fn collection_post(state: &mut State, request: &HttpRequest) -> HttpResponse {
    if request.header_value(UPLOAD_START).is_some() {
        state.starts += 1;
        return HttpResponse::new(202);
    }

    if request.header_value(UPLOAD_MULTIPLE).is_some() {
        if let Some(fault) = state.bulk_faults.pop_front() {
            return match fault {
                Fault::Status(status) => HttpResponse::new(status),
                _ => HttpResponse::new(500),
            };
        }
        let RequestBody::Multipart(parts) = &request.body else {
            return HttpResponse::new(400);
        };
        state.bulk_batches.push(parts.clone());
        return HttpResponse::new(200);
    }

    if request.header_value(UPLOAD_FINISH).is_some() {
        if let Some(status) = state.finish_status {
            return HttpResponse::new(status).with_body("finish refused");
        }
        let body = match &request.body {
            RequestBody::Json(value) => Some(value.clone()),
            _ => None,
        };
        state.finishes.push(FinishCall {
            query: request.query.clone(),
            body,
        });
        if let Some(reply) = &state.finish_reply {
            return HttpResponse::new(202).with_body(reply.clone());
        }
        let rq_id = format!("rq-{}", state.finishes.len());
        return HttpResponse::new(202).with_body(format!(r#"{{"rq_id": "{rq_id}"}}"#));
    }

    if let Some(length) = request.header_value(UPLOAD_LENGTH) {
        if let Some(status) = state.create_status {
            return HttpResponse::new(status).with_body("create refused");
        }
        let Ok(length) = length.parse::<u64>() else {
            return HttpResponse::new(400);
        };
        let metadata = request
            .header_value(UPLOAD_METADATA)
            .map(UploadMetadata::decode)
            .transpose();
        let Ok(metadata) = metadata else {
            return HttpResponse::new(400);
        };
        let metadata = metadata.unwrap_or_default();

        state.next_id += 1;
        let id = state.next_id;
        let filename = metadata.filename().unwrap_or("file").to_string();
        let real_filename = if state.rename_uploads {
            format!("upload_{id}_{filename}")
        } else {
            filename
        };
        let path = format!("/api/tasks/7/data/{id:04}");
        let url = format!("http://uploads.test{path}");
        state.uploads.insert(
            url,
            FakeUpload {
                length,
                data: Vec::new(),
                metadata,
            },
        );

        let mut response = HttpResponse::new(201).with_header(UPLOAD_FILENAME, real_filename);
        if !state.omit_location {
            response = response.with_header(LOCATION, path);
        }
        return response;
    }

    HttpResponse::new(400)
}

fn head(state: &mut State, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
    let index = state.head_count;
    state.head_count += 1;
    if let Some(fault) = state.head_faults.remove(&index) {
        return match fault {
            Fault::Status(status) => Ok(HttpResponse::new(status)),
            _ => Err(TransportError::Timeout),
        };
    }
    if state.legacy {
        return Ok(HttpResponse::new(405));
    }
    let Some(upload) = state.uploads.get(&request.url) else {
        return Ok(HttpResponse::new(404));
    };
    Ok(HttpResponse::new(200)
        .with_header(UPLOAD_OFFSET, upload.data.len().to_string())
        .with_header(UPLOAD_LENGTH, upload.length.to_string()))
}

fn patch(state: &mut State, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
    let index = state.patch_count;
    state.patch_count += 1;
    let fault = state.patch_faults.remove(&index);

    let Some(upload) = state.uploads.get_mut(&request.url) else {
        return Ok(HttpResponse::new(404));
    };
    let current = upload.data.len() as u64;
    let conflict =
        || HttpResponse::new(409).with_header(UPLOAD_OFFSET, current.to_string());

    let believed = request
        .header_value(UPLOAD_OFFSET)
        .and_then(|v| v.parse::<u64>().ok());
    let RequestBody::Bytes(body) = &request.body else {
        return Ok(HttpResponse::new(400));
    };

    match fault {
        Some(Fault::Refuse) => return Err(TransportError::Connection("refused".into())),
        Some(Fault::Status(status)) => return Ok(HttpResponse::new(status)),
        Some(Fault::Conflict) => return Ok(conflict()),
        _ => {}
    }

    if believed != Some(current) {
        return Ok(conflict());
    }
    if current + body.len() as u64 > upload.length {
        return Ok(HttpResponse::new(413));
    }

    match fault {
        Some(Fault::DropAck) => {
            upload.data.extend_from_slice(body);
            Err(TransportError::Connection("connection reset".into()))
        }
        Some(Fault::StorePrefix(n)) => {
            upload.data.extend_from_slice(&body[..n.min(body.len())]);
            Err(TransportError::Timeout)
        }
        _ => {
            upload.data.extend_from_slice(body);
            Ok(HttpResponse::new(204).with_header(UPLOAD_OFFSET, upload.data.len().to_string()))
        }
    }
}
