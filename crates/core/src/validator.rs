//! Input validation: decides whether a selected file may enter a session.
//!
//! Only the declared content type is inspected. A file that claims to be a
//! video but is not will fail later, inside the engine, as an execution error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A file selected by the user, with its declared content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Where the bytes can be read from.
    pub path: PathBuf,
    /// Original file name, as shown to the user.
    pub name: String,
    /// Declared MIME type (e.g. `video/quicktime`).
    pub content_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

impl InputFile {
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        content_type: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            content_type: content_type.into(),
            size_bytes,
        }
    }

    /// Describes an on-disk file. The name is taken from the path.
    pub async fn from_path(
        path: impl AsRef<Path>,
        content_type: impl Into<String>,
    ) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self::new(path, name, content_type, metadata.len()))
    }
}

/// An input that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidFile(InputFile);

impl ValidFile {
    pub fn file(&self) -> &InputFile {
        &self.0
    }

    pub fn into_inner(self) -> InputFile {
        self.0
    }
}

/// Why a file was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("not-a-video: declared content type {content_type:?} is not a video type")]
    NotAVideo { content_type: String },
}

impl ValidationError {
    /// Stable machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotAVideo { .. } => "not-a-video",
        }
    }
}

/// Whether a declared content type names a video media type.
///
/// Case-insensitive; parameters such as `; codecs=...` are ignored.
pub fn is_video_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence.split_once('/') {
        Some((top, sub)) => top.eq_ignore_ascii_case("video") && !sub.is_empty(),
        None => false,
    }
}

/// Accepts a file iff its declared type is a video type.
pub fn validate(file: InputFile) -> Result<ValidFile, ValidationError> {
    if is_video_type(&file.content_type) {
        Ok(ValidFile(file))
    } else {
        Err(ValidationError::NotAVideo {
            content_type: file.content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file(name: &str, content_type: &str) -> InputFile {
        InputFile::new(format!("/uploads/{}", name), name, content_type, 1024)
    }

    #[test]
    fn test_video_types_are_accepted() {
        for ct in [
            "video/quicktime",
            "video/mp4",
            "VIDEO/X-MSVIDEO",
            "video/webm; codecs=\"vp9\"",
        ] {
            let valid = validate(file("clip", ct)).unwrap();
            assert_eq!(valid.file().content_type, ct);
        }
    }

    #[test]
    fn test_non_video_types_are_rejected() {
        for ct in ["text/plain", "audio/mpeg", "image/png", "", "video", "video/", "videos/mp4"] {
            let err = validate(file("notes.txt", ct)).unwrap_err();
            assert_eq!(err.reason(), "not-a-video");
        }
    }

    #[test]
    fn test_extension_is_not_sniffed() {
        // A .mp4 name does not help a non-video declared type
        assert!(validate(file("movie.mp4", "application/octet-stream")).is_err());
        // And a misleading name does not hurt a video type
        assert!(validate(file("notes.txt", "video/mp4")).is_ok());
    }

    #[tokio::test]
    async fn test_from_path_reads_size() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0u8; 300]).unwrap();

        let input = InputFile::from_path(temp.path(), "video/mp4").await.unwrap();
        assert_eq!(input.size_bytes, 300);
        assert_eq!(input.path, temp.path());
        assert!(!input.name.is_empty());
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let result = InputFile::from_path("/nonexistent/clip.mov", "video/quicktime").await;
        assert!(result.is_err());
    }
}
