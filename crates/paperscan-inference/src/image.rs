//! Source image validation.
//!
//! The orchestrator only needs to know that the bytes are an image it can
//! hand to the providers, so decoding stops at format detection.

use paperscan_core::{Error, Result};

/// A recognised image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub mime_type: String,
    pub extension: String,
    pub byte_len: usize,
}

/// Detect the image format from its magic bytes.
///
/// Empty input, unknown formats and non-image formats fail with
/// `Error::AnalysisDecode`.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage> {
    if bytes.is_empty() {
        return Err(Error::AnalysisDecode("image is empty".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| Error::AnalysisDecode("unrecognized image format".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(Error::AnalysisDecode(format!(
            "expected an image, got {}",
            kind.mime_type()
        )));
    }

    Ok(DecodedImage {
        mime_type: kind.mime_type().to_string(),
        extension: kind.extension().to_string(),
        byte_len: bytes.len(),
    })
}
