//! Source image submitted for compilation

use crate::error::ArtifactError;
use crate::hash::ContentHash;
use bytes::Bytes;
use std::path::Path;

/// Media type used when a file extension is not recognised
pub const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// A source image to feed into the external compiler
///
/// Constructing a request never fails; [`CompilationRequest::validate`] is
/// what enforces the image-only invariant, so the controller can reject bad
/// input before touching any external surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationRequest {
    name: String,
    media_type: String,
    bytes: Bytes,
}

impl CompilationRequest {
    /// Create a request from raw parts
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a request from disk, inferring the media type from the extension
    ///
    /// # Errors
    /// Returns [`ArtifactError::Io`] if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let media_type = media_type_for_path(path);
        Ok(Self::new(name, media_type, bytes))
    }

    /// File name as presented to the external tool
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared media type
    #[inline]
    #[must_use]
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Image payload
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Content hash of the payload
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        ContentHash::compute(&self.bytes)
    }

    /// Check the request is a well-formed image file
    ///
    /// # Errors
    /// Returns [`ArtifactError::InvalidRequest`] when the name or payload is
    /// empty, or the media type is absent or not of the form `image/<subtype>`.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.name.trim().is_empty() {
            return Err(ArtifactError::InvalidRequest("file name is empty".into()));
        }
        if self.bytes.is_empty() {
            return Err(ArtifactError::InvalidRequest(format!(
                "{} has no content",
                self.name
            )));
        }
        if !is_image_media_type(&self.media_type) {
            return Err(ArtifactError::InvalidRequest(format!(
                "{} has media type {:?}, expected image/*",
                self.name, self.media_type
            )));
        }
        Ok(())
    }
}

/// `true` for `image/<subtype>` with a non-empty subtype
#[must_use]
pub fn is_image_media_type(media_type: &str) -> bool {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    match essence.split_once('/') {
        Some((kind, subtype)) => {
            kind.eq_ignore_ascii_case("image") && !subtype.is_empty() && !subtype.contains('/')
        }
        None => false,
    }
}

fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => UNKNOWN_MEDIA_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn accepts_image_types() {
        assert!(is_image_media_type("image/jpeg"));
        assert!(is_image_media_type("IMAGE/png; charset=binary"));
        assert!(!is_image_media_type("image/"));
        assert!(!is_image_media_type("text/plain"));
        assert!(!is_image_media_type(""));
        assert!(!is_image_media_type("imagejpeg"));
    }

    #[test]
    fn validate_rejects_bad_requests() {
        let ok = CompilationRequest::new("cat.jpg", "image/jpeg", vec![0xFF, 0xD8]);
        assert!(ok.validate().is_ok());

        let cases = [
            CompilationRequest::new("", "image/jpeg", vec![1]),
            CompilationRequest::new("cat.jpg", "image/jpeg", Vec::new()),
            CompilationRequest::new("notes.txt", "text/plain", vec![1]),
            CompilationRequest::new("cat.jpg", "", vec![1]),
        ];
        for request in cases {
            assert!(matches!(
                request.validate(),
                Err(ArtifactError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn from_path_infers_media_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poster.JPG");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[0xFF, 0xD8, 0xFF])
            .unwrap();

        let request = CompilationRequest::from_path(&path).unwrap();
        assert_eq!(request.name(), "poster.JPG");
        assert_eq!(request.media_type(), "image/jpeg");
        assert_eq!(request.bytes().len(), 3);

        let other = dir.path().join("poster.bin");
        std::fs::write(&other, [1u8]).unwrap();
        let request = CompilationRequest::from_path(&other).unwrap();
        assert_eq!(request.media_type(), UNKNOWN_MEDIA_TYPE);
        assert!(request.validate().is_err());
    }
}
