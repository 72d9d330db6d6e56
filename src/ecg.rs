//! ECG image uploads
//!
//! An uploaded ECG is kept inline as a base64 data URL
//! (`data:image/png;base64,...`). There is no decoding of the image itself; the
//! only gate is the file's declared MIME type, which must be `image/png`.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// The only MIME type accepted for ECG uploads
pub const ECG_MIME_TYPE: &str = "image/png";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Only PNG images are allowed for ECG uploads (got {0}).")]
    UnsupportedType(String),

    #[error("ECG image is too large: {size} bytes (limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("Failed to read ECG file: {0}")]
    Io(#[from] std::io::Error),
}

/// Embedded ECG image payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcgImage {
    pub mime_type: String,
    /// Standard base64 of the original file bytes
    pub data_base64: String,
}

impl EcgImage {
    pub fn from_png_bytes(bytes: &[u8]) -> Self {
        Self {
            mime_type: ECG_MIME_TYPE.to_string(),
            data_base64: STANDARD.encode(bytes),
        }
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_base64)
    }

    /// Size of the embedded file in bytes
    pub fn decoded_len(&self) -> usize {
        STANDARD
            .decode(&self.data_base64)
            .map(|bytes| bytes.len())
            .unwrap_or(0)
    }
}

/// MIME type a file declares through its name
pub fn declared_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

pub fn check_declared_type(mime_type: &str) -> Result<(), UploadError> {
    if mime_type.eq_ignore_ascii_case(ECG_MIME_TYPE) {
        Ok(())
    } else {
        Err(UploadError::UnsupportedType(mime_type.to_string()))
    }
}

/// Read an ECG file and embed it. The type check happens before any bytes are read.
pub async fn load_ecg_upload(path: &Path, max_bytes: u64) -> Result<EcgImage, UploadError> {
    let mime_type = declared_mime_type(path);
    check_declared_type(&mime_type)?;

    let size = tokio::fs::metadata(path).await?.len();
    if size > max_bytes {
        return Err(UploadError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let bytes = tokio::fs::read(path).await?;
    debug!("Read ECG file {:?}: {} bytes", path, bytes.len());

    let image = EcgImage::from_png_bytes(&bytes);
    info!("ECG image embedded: {} bytes base64", image.data_base64.len());
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_declared_type() {
        assert_eq!(declared_mime_type(Path::new("scan.png")), "image/png");
        assert_eq!(declared_mime_type(Path::new("scan.PNG")), "image/png");
        assert_eq!(declared_mime_type(Path::new("scan.jpg")), "image/jpeg");
        assert_eq!(
            declared_mime_type(Path::new("scan")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_only_png_accepted() {
        assert!(check_declared_type("image/png").is_ok());
        assert!(matches!(
            check_declared_type("image/jpeg"),
            Err(UploadError::UnsupportedType(t)) if t == "image/jpeg"
        ));
        assert!(check_declared_type("image/gif").is_err());
    }

    #[test]
    fn test_data_url() {
        let image = EcgImage::from_png_bytes(&PNG_MAGIC);
        let url = image.to_data_url();
        assert_eq!(url, "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(image.decoded_len(), 8);
    }

    #[tokio::test]
    async fn test_load_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecg.png");
        std::fs::write(&path, PNG_MAGIC).unwrap();

        let image = load_ecg_upload(&path, 1024).await.unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.decoded_len(), PNG_MAGIC.len());
    }

    #[tokio::test]
    async fn test_load_rejects_jpeg_before_reading() {
        // The file does not exist; the type check must fail first
        let result = load_ecg_upload(Path::new("/nonexistent/ecg.jpg"), 1024).await;
        assert!(matches!(result, Err(UploadError::UnsupportedType(_))));
    }

    #[tokio::test]
    async fn test_load_rejects_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        let result = load_ecg_upload(&path, 16).await;
        assert!(matches!(
            result,
            Err(UploadError::TooLarge { size: 64, limit: 16 })
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = load_ecg_upload(Path::new("/nonexistent/ecg.png"), 1024).await;
        assert!(matches!(result, Err(UploadError::Io(_))));
    }
}
