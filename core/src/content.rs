//! Content-type dispatch for response bodies.
//!
//! Image bodies are decoded and then re-encoded in the same format rather
//! than copied, so a response only passes if it is a structurally valid
//! image of the format its `Content-Type` claims.

use std::fmt;
use std::io::{Cursor, Write};

use image::codecs::gif::GifEncoder;
use image::{DynamicImage, Frame, ImageFormat};

use crate::error::Error;

/// What a response body is, judged from its declared content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Png,
    Jpeg,
    Gif,
    /// Anything else, including a missing header. Decoded as JSON.
    Unknown,
}

impl ContentKind {
    /// Classify a `Content-Type` value by its media type essence.
    /// Parameters such as `charset` are ignored.
    pub fn from_content_type(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return ContentKind::Unknown;
        };
        let essence = value.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/png" => ContentKind::Png,
            "image/jpeg" | "image/jpg" => ContentKind::Jpeg,
            "image/gif" => ContentKind::Gif,
            "application/json" => ContentKind::Json,
            other if other.ends_with("+json") => ContentKind::Json,
            _ => ContentKind::Unknown,
        }
    }

    pub fn is_image(self) -> bool {
        self.image_format().is_some()
    }

    fn image_format(self) -> Option<ImageFormat> {
        match self {
            ContentKind::Png => Some(ImageFormat::Png),
            ContentKind::Jpeg => Some(ImageFormat::Jpeg),
            ContentKind::Gif => Some(ImageFormat::Gif),
            ContentKind::Json | ContentKind::Unknown => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentKind::Json => "json",
            ContentKind::Png => "png",
            ContentKind::Jpeg => "jpeg",
            ContentKind::Gif => "gif",
            ContentKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Decode `body` as `kind`, re-encode it in the same format and write the
/// result to `out`.
pub fn reencode_image(kind: ContentKind, body: &[u8], out: &mut dyn Write) -> Result<(), Error> {
    let format = kind.image_format().ok_or_else(|| Error::Decode {
        kind,
        message: "not an image content type".to_string(),
    })?;
    let decode_err = |e: image::ImageError| Error::Decode {
        kind,
        message: e.to_string(),
    };

    let img = image::load_from_memory_with_format(body, format).map_err(decode_err)?;

    let mut encoded = Vec::new();
    match kind {
        ContentKind::Gif => {
            let mut encoder = GifEncoder::new(&mut encoded);
            encoder
                .encode_frame(Frame::new(img.to_rgba8()))
                .map_err(decode_err)?;
        }
        // JPEG has no alpha channel.
        ContentKind::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8())
            .write_to(&mut Cursor::new(&mut encoded), format)
            .map_err(decode_err)?,
        _ => img
            .write_to(&mut Cursor::new(&mut encoded), format)
            .map_err(decode_err)?,
    }

    out.write_all(&encoded).map_err(|e| Error::Decode {
        kind,
        message: format!("writing re-encoded image: {e}"),
    })
}
