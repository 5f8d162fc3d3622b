//! `Upload-Metadata` header codec.
//!
//! The header is a comma separated list of `key value` pairs where the value
//! is standard base64. Keys are ASCII and may not contain spaces or commas.
//! A key may also appear without a value.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::ProtocolError;

/// Metadata key carrying the display filename.
pub const FILENAME: &str = "filename";
/// Metadata key carrying the MIME type hint.
pub const FILETYPE: &str = "filetype";

/// Ordered metadata attached to a created upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadMetadata {
    pairs: Vec<(String, String)>,
}

impl UploadMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata holding only the display filename.
    pub fn with_filename(filename: impl Into<String>) -> Self {
        let mut meta = Self::new();
        meta.pairs.push((FILENAME.to_string(), filename.into()));
        meta
    }

    /// Sets `key`, replacing any previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        let key = key.into();
        validate_key(&key)?;
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn filename(&self) -> Option<&str> {
        self.get(FILENAME)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Renders the header value.
    pub fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k} {}", STANDARD.encode(v.as_bytes()))
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parses a header value.
    pub fn decode(header: &str) -> Result<Self, ProtocolError> {
        let mut meta = Self::new();
        for raw in header.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let mut parts = raw.split(' ');
            let key = parts.next().unwrap_or_default();
            let encoded = parts.next();
            if parts.next().is_some() {
                return Err(ProtocolError::MalformedMetadata(raw.to_string()));
            }
            validate_key(key)?;

            let value = match encoded {
                Some(encoded) => {
                    let bytes = STANDARD
                        .decode(encoded)
                        .map_err(|_| ProtocolError::InvalidBase64 {
                            key: key.to_string(),
                        })?;
                    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8 {
                        key: key.to_string(),
                    })?
                }
                None => String::new(),
            };
            meta.insert(key, value)?;
        }
        Ok(meta)
    }
}

fn validate_key(key: &str) -> Result<(), ProtocolError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii() && !c.is_ascii_whitespace() && c != ',' && !c.is_control());
    if valid {
        Ok(())
    } else {
        Err(ProtocolError::InvalidMetadataKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_base64_encoded() {
        let meta = UploadMetadata::with_filename("image.png");
        assert_eq!(meta.encode(), "filename aW1hZ2UucG5n");
    }

    #[test]
    fn multiple_pairs_keep_insertion_order() {
        let mut meta = UploadMetadata::with_filename("a.zip");
        meta.insert(FILETYPE, "application/zip").unwrap();
        let header = meta.encode();
        assert!(header.starts_with("filename "));
        assert!(header.contains(",filetype "));

        let parsed = UploadMetadata::decode(&header).unwrap();
        assert_eq!(parsed, meta);
        assert_eq!(parsed.filename(), Some("a.zip"));
    }

    #[test]
    fn insert_replaces_existing_key() {
        let mut meta = UploadMetadata::with_filename("old.txt");
        meta.insert(FILENAME, "new.txt").unwrap();
        assert_eq!(meta.iter().count(), 1);
        assert_eq!(meta.filename(), Some("new.txt"));
    }

    #[test]
    fn non_ascii_filename_survives() {
        let meta = UploadMetadata::with_filename("фото 1.jpg");
        let parsed = UploadMetadata::decode(&meta.encode()).unwrap();
        assert_eq!(parsed.filename(), Some("фото 1.jpg"));
    }

    #[test]
    fn key_without_value() {
        let parsed = UploadMetadata::decode("is_confidential,filename YS50eHQ=").unwrap();
        assert_eq!(parsed.get("is_confidential"), Some(""));
        assert_eq!(parsed.filename(), Some("a.txt"));
        assert_eq!(parsed.encode(), "is_confidential,filename YS50eHQ=");
    }

    #[test]
    fn rejects_bad_keys() {
        let mut meta = UploadMetadata::new();
        assert!(matches!(
            meta.insert("file name", "x"),
            Err(ProtocolError::InvalidMetadataKey(_))
        ));
        assert!(meta.insert("a,b", "x").is_err());
        assert!(meta.insert("", "x").is_err());
        assert!(meta.is_empty());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            UploadMetadata::decode("filename ***"),
            Err(ProtocolError::InvalidBase64 { .. })
        ));
        assert!(matches!(
            UploadMetadata::decode("filename a b"),
            Err(ProtocolError::MalformedMetadata(_))
        ));
    }
}
