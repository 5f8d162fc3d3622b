//! Upload job files.
//!
//! A job is a TOML document naming the endpoint, the files and the upload
//! metadata, plus an optional `[upload]` table with the driver settings:
//!
//! ```toml
//! endpoint = "https://cvat.example/api/tasks/12/data/"
//! filename = "frames"
//! files = ["/data/f_0001.jpg", "/data/f_0002.jpg"]
//! sorting_method = "predefined"
//!
//! [fields]
//! image_quality = 70
//!
//! [upload.shared_headers]
//! Authorization = "Token abc"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tuskit_client::{SharedFields, SortingMethod, UploadConfig, UploadDescriptor, UploadError};

/// Environment variable naming the job file.
pub const JOB_ENV: &str = "TUSKIT_JOB";
const DEFAULT_JOB_FILE: &str = "tuskit-job.toml";

/// One upload, as described on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadJob {
    pub endpoint: String,

    /// Display name recorded by the server.
    pub filename: String,

    #[serde(default)]
    pub files: Vec<PathBuf>,

    #[serde(default)]
    pub format: Option<String>,

    #[serde(default)]
    pub sorting_method: Option<SortingMethod>,

    /// Extra query parameters for the start and finish calls.
    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// Fields sent with bulk batches and the finish call.
    #[serde(default)]
    pub fields: SharedFields,

    /// Annotation or backup import: one file, always streamed.
    #[serde(default)]
    pub single_file: bool,

    #[serde(default)]
    pub upload: UploadConfig,
}

impl UploadJob {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let job: UploadJob = toml::from_str(content)?;
        job.upload.validate()?;
        Ok(job)
    }

    /// Builds the descriptor, reading each file's size.
    pub async fn descriptor(&self) -> Result<UploadDescriptor, UploadError> {
        let mut descriptor =
            UploadDescriptor::from_paths(&self.endpoint, &self.filename, &self.files).await?;
        if let Some(format) = &self.format {
            descriptor = descriptor.with_format(format);
        }
        if let Some(sorting) = self.sorting_method {
            descriptor = descriptor.with_sorting(sorting);
        }
        for (name, value) in &self.query {
            descriptor = descriptor.with_query(name, value);
        }
        Ok(descriptor)
    }
}

/// Job file path: `$TUSKIT_JOB`, or `tuskit-job.toml` in the working directory.
pub fn job_path() -> PathBuf {
    std::env::var_os(JOB_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_JOB_FILE))
}
