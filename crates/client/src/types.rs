//! Inputs of an upload.

use std::path::Path;

use tuskit_protocol::SortingMethod;
use tuskit_transfer::FileRef;

use crate::error::UploadError;

/// Extra fields sent with bulk batches (as text parts) and with the finish
/// call (as a JSON body), e.g. `image_quality`.
pub type SharedFields = serde_json::Map<String, serde_json::Value>;

/// Everything that describes one logical upload call.
///
/// Built once with the `with_*` methods and then only read.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadDescriptor {
    endpoint: String,
    files: Vec<FileRef>,
    filename: String,
    format: Option<String>,
    sorting_method: Option<SortingMethod>,
    query: Vec<(String, String)>,
}

impl UploadDescriptor {
    /// `filename` is the display name the server records for the upload.
    pub fn new(endpoint: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            files: Vec::new(),
            filename: filename.into(),
            format: None,
            sorting_method: None,
            query: Vec::new(),
        }
    }

    /// Builds a descriptor from paths, reading each file's size.
    pub async fn from_paths<P: AsRef<Path>>(
        endpoint: impl Into<String>,
        filename: impl Into<String>,
        paths: &[P],
    ) -> Result<Self, UploadError> {
        let mut descriptor = Self::new(endpoint, filename);
        for path in paths {
            descriptor.files.push(FileRef::from_path(path).await?);
        }
        Ok(descriptor)
    }

    pub fn with_file(mut self, file: FileRef) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = FileRef>) -> Self {
        self.files.extend(files);
        self
    }

    /// Format name the server uses to interpret the payload.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_sorting(mut self, sorting: SortingMethod) -> Self {
        self.sorting_method = Some(sorting);
        self
    }

    /// Extra query parameter forwarded on the start and finish calls.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn sorting_method(&self) -> Option<SortingMethod> {
        self.sorting_method
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// File names in input order, sent when the order is predefined.
    pub fn upload_file_order(&self) -> Vec<String> {
        self.files.iter().map(FileRef::file_name).collect()
    }

    /// Query parameters for the start call.
    pub(crate) fn start_query(&self) -> Vec<(String, String)> {
        let mut query = self.query.clone();
        if let Some(format) = &self.format {
            query.push(("format".into(), format.clone()));
        }
        query
    }

    /// Query parameters for the finish call.
    pub(crate) fn finish_query(&self, filename: &str) -> Vec<(String, String)> {
        let mut query = self.start_query();
        query.push(("filename".into(), filename.to_string()));
        query
    }

    /// Checks the descriptor before any request goes out.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.filename.trim().is_empty() {
            return Err(UploadError::Configuration(
                "upload metadata requires a filename".into(),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(UploadError::Configuration("upload endpoint is empty".into()));
        }
        Ok(())
    }
}
