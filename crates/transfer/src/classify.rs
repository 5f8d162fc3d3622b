//! Splits a file list into bulk groups and individual files.
//!
//! Packing is greedy and keeps input order: files accumulate into the
//! current group until the next one would push it over the threshold, at
//! which point a new group opens. Files larger than the threshold never
//! enter a group.

use std::path::{Path, PathBuf};

/// A file to upload and its size in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub path: PathBuf,
    pub size: u64,
}

impl FileRef {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    /// Reads the size from file metadata.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self::new(path, metadata.len()))
    }

    /// Final path component, used as the display and multipart name.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

/// Small files sent together in one multipart request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkGroup {
    pub files: Vec<FileRef>,
    pub total_bytes: u64,
}

impl BulkGroup {
    fn push(&mut self, file: FileRef) {
        self.total_bytes += file.size;
        self.files.push(file);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// One unit of routing produced by [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileGroup {
    Bulk(BulkGroup),
    Individual { file: FileRef, byte_length: u64 },
}

impl FileGroup {
    pub fn byte_len(&self) -> u64 {
        match self {
            FileGroup::Bulk(group) => group.total_bytes,
            FileGroup::Individual { byte_length, .. } => *byte_length,
        }
    }
}

/// Result of [`classify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub bulk_groups: Vec<BulkGroup>,
    pub individual_files: Vec<FileRef>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.bulk_groups.is_empty() && self.individual_files.is_empty()
    }

    /// All groups, bulk groups first, each in input order.
    pub fn groups(&self) -> impl Iterator<Item = FileGroup> + '_ {
        let bulk = self.bulk_groups.iter().cloned().map(FileGroup::Bulk);
        let individual = self
            .individual_files
            .iter()
            .cloned()
            .map(|file| FileGroup::Individual {
                byte_length: file.size,
                file,
            });
        bulk.chain(individual)
    }

    pub fn total_bytes(&self) -> u64 {
        let bulk: u64 = self.bulk_groups.iter().map(|g| g.total_bytes).sum();
        let individual: u64 = self.individual_files.iter().map(|f| f.size).sum();
        bulk + individual
    }
}

/// Partitions `files` against a per-request byte ceiling.
pub fn classify(files: &[FileRef], threshold: u64) -> Classification {
    let mut result = Classification::default();
    let mut current = BulkGroup::default();

    for file in files {
        if file.size > threshold {
            result.individual_files.push(file.clone());
            continue;
        }

        if current.total_bytes + file.size > threshold && !current.is_empty() {
            result.bulk_groups.push(std::mem::take(&mut current));
        }
        current.push(file.clone());
    }

    if !current.is_empty() {
        result.bulk_groups.push(current);
    }

    result
}
