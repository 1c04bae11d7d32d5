// src/services/upload.rs
use crate::errors::StylistError;
use actix_multipart::Multipart;
use base64::{Engine as _, engine::general_purpose};
use bytes::BytesMut;
use futures_util::TryStreamExt;
use log::{debug, info};

pub const IMAGE_FIELD: &str = "image";

/// A validated upload, ready to embed in a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
    pub size: usize,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Validates uploads before anything is sent to the provider. Buffers in memory only.
pub struct UploadGateway {
    max_bytes: usize,
}

impl UploadGateway {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn validate_content_type(&self, content_type: Option<&str>) -> Result<String, StylistError> {
        let mime = content_type
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match mime.split_once('/') {
            Some(("image", subtype)) if !subtype.is_empty() => Ok(mime),
            _ => Err(StylistError::Validation(
                "Only image files are allowed!".to_string(),
            )),
        }
    }

    pub fn check_size(&self, size: usize) -> Result<(), StylistError> {
        if size > self.max_bytes {
            return Err(StylistError::UploadTooLarge {
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    pub fn encode(&self, bytes: &[u8], mime_type: String) -> Result<EncodedImage, StylistError> {
        if bytes.is_empty() {
            return Err(StylistError::Validation("Uploaded image is empty".to_string()));
        }
        self.check_size(bytes.len())?;

        Ok(EncodedImage {
            mime_type,
            data: general_purpose::STANDARD.encode(bytes),
            size: bytes.len(),
        })
    }

    /// Reads the single `image` file field from a multipart body.
    ///
    /// The MIME type is checked before the body is read and the size while
    /// streaming, so rejected uploads are never fully buffered.
    pub async fn read_image(&self, mut payload: Multipart) -> Result<EncodedImage, StylistError> {
        let mut image: Option<EncodedImage> = None;

        while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
            let content_disposition = field.content_disposition();
            let name = content_disposition.get_name().unwrap_or_default().to_string();
            let is_file = content_disposition.get_filename().is_some();

            if name != IMAGE_FIELD {
                if is_file {
                    return Err(StylistError::Validation(format!(
                        "Unexpected file field '{}'",
                        name
                    )));
                }
                debug!("Ignoring non-file form field '{}'", name);
                while field.try_next().await.map_err(multipart_error)?.is_some() {}
                continue;
            }

            if image.is_some() {
                return Err(StylistError::Validation(
                    "Only one image may be uploaded per request".to_string(),
                ));
            }

            let mime_type = self.validate_content_type(field.content_type().map(|m| m.essence_str()))?;

            let mut buffer = BytesMut::new();
            while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
                self.check_size(buffer.len() + chunk.len())?;
                buffer.extend_from_slice(&chunk);
            }

            let encoded = self.encode(&buffer, mime_type)?;
            info!(
                "Accepted {} upload of {} bytes",
                encoded.mime_type, encoded.size
            );
            image = Some(encoded);
        }

        image.ok_or_else(|| StylistError::Validation("No image file provided".to_string()))
    }
}

fn multipart_error(e: actix_multipart::MultipartError) -> StylistError {
    StylistError::Validation(format!("Invalid multipart upload: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_image_types_only() {
        let gateway = UploadGateway::new(1024);
        assert_eq!(
            gateway.validate_content_type(Some("image/PNG")).unwrap(),
            "image/png"
        );
        assert!(gateway.validate_content_type(Some("image/webp")).is_ok());
        assert!(gateway.validate_content_type(Some("text/plain")).is_err());
        assert!(gateway.validate_content_type(Some("image/")).is_err());
        assert!(gateway.validate_content_type(None).is_err());
    }

    #[test]
    fn enforces_the_size_limit() {
        let gateway = UploadGateway::new(4);
        assert!(gateway.check_size(4).is_ok());
        assert!(matches!(
            gateway.check_size(5),
            Err(StylistError::UploadTooLarge { limit: 4 })
        ));
    }

    #[test]
    fn encodes_to_base64_and_data_url() {
        let gateway = UploadGateway::new(1024);
        let encoded = gateway.encode(b"hello", "image/png".to_string()).unwrap();
        assert_eq!(encoded.data, "aGVsbG8=");
        assert_eq!(encoded.size, 5);
        assert_eq!(encoded.data_url(), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn rejects_empty_files() {
        let gateway = UploadGateway::new(1024);
        assert!(matches!(
            gateway.encode(b"", "image/png".to_string()),
            Err(StylistError::Validation(_))
        ));
    }
}
