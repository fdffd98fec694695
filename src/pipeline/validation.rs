//! Upload validation: name, extension, size and magic-byte type.
//!
//! The declared extension must agree with what the bytes actually are.
//! Extensions can lie, magic bytes don't.

use serde::Serialize;

use crate::models::FileKind;

/// Accepted extensions (lowercase, no dot) and the MIME type each implies.
const ALLOWED: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("tiff", "image/tiff"),
    ("tif", "image/tiff"),
    ("bmp", "image/bmp"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("No filename provided")]
    MissingFilename,
    #[error("File extension '{extension}' not allowed. Supported: {allowed}")]
    ExtensionNotAllowed { extension: String, allowed: String },
    #[error("File size ({:.1}MB) exceeds maximum allowed size ({}MB)", mb(.size), whole_mb(.max))]
    TooLarge { size: u64, max: u64 },
    #[error("File is empty")]
    Empty,
    #[error("Invalid file type: {detected}")]
    UnsupportedType { detected: String },
    #[error("File extension '.{extension}' does not match detected type '{detected}'")]
    ExtensionMismatch { extension: String, detected: String },
}

fn mb(bytes: &u64) -> f64 {
    *bytes as f64 / 1_048_576.0
}

fn whole_mb(bytes: &u64) -> u64 {
    *bytes / 1_048_576
}

/// What validation learned about an accepted upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFile {
    pub kind: FileKind,
    /// Lowercase, without the dot.
    pub extension: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatGroup {
    pub extensions: Vec<String>,
    pub mime_types: Vec<String>,
    pub max_size_mb: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportedFormats {
    pub pdf: FormatGroup,
    pub images: FormatGroup,
}

#[derive(Debug, Clone)]
pub struct FileValidator {
    max_size_bytes: u64,
}

impl FileValidator {
    pub fn new(max_size_bytes: u64) -> Self {
        Self { max_size_bytes }
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn validate(
        &self,
        filename: Option<&str>,
        bytes: &[u8],
    ) -> Result<ValidatedFile, ValidationError> {
        let filename = filename
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or(ValidationError::MissingFilename)?;

        let extension = extension_of(filename);
        let expected_mime = ALLOWED
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map(|(_, mime)| *mime)
            .ok_or_else(|| ValidationError::ExtensionNotAllowed {
                extension: if extension.is_empty() {
                    String::new()
                } else {
                    format!(".{extension}")
                },
                allowed: allowed_extensions().join(", "),
            })?;

        let size = bytes.len() as u64;
        if size > self.max_size_bytes {
            return Err(ValidationError::TooLarge {
                size,
                max: self.max_size_bytes,
            });
        }
        if size == 0 {
            return Err(ValidationError::Empty);
        }

        let detected = infer::get(bytes)
            .map(|t| t.mime_type())
            .unwrap_or("application/octet-stream");
        if !ALLOWED.iter().any(|(_, mime)| *mime == detected) {
            return Err(ValidationError::UnsupportedType {
                detected: detected.to_string(),
            });
        }
        if detected != expected_mime {
            return Err(ValidationError::ExtensionMismatch {
                extension,
                detected: detected.to_string(),
            });
        }

        let kind = if detected == "application/pdf" {
            FileKind::Pdf
        } else {
            FileKind::Image
        };
        tracing::debug!(filename, mime = detected, size, "Upload validated");

        Ok(ValidatedFile {
            kind,
            extension,
            mime_type: detected.to_string(),
            size_bytes: size,
        })
    }

    pub fn supported_formats(&self) -> SupportedFormats {
        let max_size_mb = self.max_size_bytes / (1024 * 1024);
        let group = |pdf: bool| {
            let entries: Vec<_> = ALLOWED
                .iter()
                .filter(|(_, mime)| (*mime == "application/pdf") == pdf)
                .collect();
            let mut mime_types: Vec<String> = entries.iter().map(|(_, m)| m.to_string()).collect();
            mime_types.dedup();
            FormatGroup {
                extensions: entries.iter().map(|(e, _)| format!(".{e}")).collect(),
                mime_types,
                max_size_mb,
            }
        };
        SupportedFormats {
            pdf: group(true),
            images: group(false),
        }
    }
}

/// Dotted list, e.g. `.pdf, .png, ...`.
pub fn allowed_extensions() -> Vec<String> {
    ALLOWED.iter().map(|(e, _)| format!(".{e}")).collect()
}

fn extension_of(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}
