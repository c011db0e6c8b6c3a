//! Inbound message decoding
//!
//! Turns a chat request's `message` and optional `image` into the parts that
//! get persisted and the content blocks that get sent to the provider.

use crate::history::{Part, Turn};
use crate::llm::{ContentBlock, LlmMessage, MessageRole};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, PAD, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use image::ImageFormat;
use thiserror::Error;

/// Standard alphabet, padding optional. Browsers always pad but hand-built
/// payloads often don't.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Image formats accepted for upload
const SUPPORTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid image data: not valid base64 ({0})")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("invalid image data: unsupported or unrecognized image format")]
    UnsupportedFormat,
    #[error("invalid image data: {0}")]
    CorruptImage(#[source] image::ImageError),
}

/// An uploaded image that decoded successfully. Never persisted.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
}

impl DecodedImage {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// A normalized user message
#[derive(Debug, Clone)]
pub struct UserMessage {
    /// Text first, then the image placeholder if an image was attached
    pub parts: Vec<Part>,
    pub image: Option<DecodedImage>,
}

impl UserMessage {
    /// The turn appended to history once the provider answers
    pub fn to_turn(&self) -> Turn {
        Turn::user(self.parts.clone())
    }

    /// The message as the provider sees it: the text plus the real image
    pub fn to_llm_message(&self) -> LlmMessage {
        let mut content = vec![ContentBlock::text(self.text())];
        if let Some(image) = &self.image {
            content.push(ContentBlock::image(image.media_type, image.to_base64()));
        }
        LlmMessage {
            role: MessageRole::User,
            content,
        }
    }

    fn text(&self) -> &str {
        self.parts.first().map_or("", |p| p.text.as_str())
    }
}

/// Build a [`UserMessage`] from request fields.
///
/// `image` may be bare base64 or a data URI (`data:image/png;base64,...`);
/// everything up to the first comma is dropped. An empty string means no image.
pub fn decode_message(text: &str, image: Option<&str>) -> Result<UserMessage, CodecError> {
    let mut parts = vec![Part::text(text)];

    let image = match image.filter(|s| !s.is_empty()) {
        Some(payload) => {
            let decoded = decode_image(payload)?;
            parts.push(Part::image_placeholder());
            Some(decoded)
        }
        None => None,
    };

    Ok(UserMessage { parts, image })
}

/// Decode and validate an image payload
pub fn decode_image(payload: &str) -> Result<DecodedImage, CodecError> {
    let data = strip_data_uri_prefix(payload);
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = LENIENT_BASE64.decode(cleaned.as_bytes())?;

    let format = image::guess_format(&bytes).map_err(|_| CodecError::UnsupportedFormat)?;
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(CodecError::UnsupportedFormat);
    }
    image::load_from_memory_with_format(&bytes, format).map_err(CodecError::CorruptImage)?;

    Ok(DecodedImage {
        bytes,
        media_type: format.to_mime_type(),
    })
}

fn strip_data_uri_prefix(payload: &str) -> &str {
    payload.split_once(',').map_or(payload, |(_, data)| data).trim()
}
