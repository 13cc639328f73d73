// THEORY:
// The codec is the engine's only contact with file formats. Everything upstream of
// it deals in encoded bytes; everything downstream deals in `PixelBuffer`s.
//
// Key architectural principles:
// 1.  **Normalize on the way in**: whatever the source carries (palette indices, an
//     alpha channel, a single gray channel, 16-bit samples) is flattened to 8-bit RGB
//     before any stage sees it. Clustering and masking assume exactly 3 channels.
// 2.  **Closed format set**: only PNG, JPEG and WEBP are accepted or produced. A
//     format we do not list is an error, not a best effort.
// 3.  **PNG is the reference**: it is lossless, so `decode(encode(b, png)) == b` for
//     every buffer. JPEG honours a quality knob; WEBP is written losslessly.

use std::io::Cursor;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::error::{RecolorError, Result};

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Formats the engine can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = RecolorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            other => Err(RecolorError::Encode {
                message: format!("unsupported output format '{other}'"),
                source: None,
            }),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Webp => "webp",
        })
    }
}

/// Decodes PNG, JPEG or WEBP bytes into an RGB buffer.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer> {
    if bytes.is_empty() {
        return Err(RecolorError::Decode {
            message: "input is empty".to_string(),
            source: None,
        });
    }

    let format = image::guess_format(bytes)
        .map_err(|e| RecolorError::decode("unrecognized image signature", e))?;
    if !matches!(
        format,
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP
    ) {
        return Err(RecolorError::Decode {
            message: format!("{format:?} is not a supported input format"),
            source: None,
        });
    }

    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| RecolorError::decode(format!("corrupt or truncated {format:?} data"), e))?;

    let rgb = decoded.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(RecolorError::Decode {
            message: "image has zero area".to_string(),
            source: None,
        });
    }

    tracing::debug!(
        width = rgb.width(),
        height = rgb.height(),
        ?format,
        "decoded source image"
    );
    Ok(PixelBuffer::from(rgb))
}

/// Encodes a buffer, naming the format as a string (`png`, `jpeg`/`jpg`, `webp`).
///
/// `quality` (0–100) only affects JPEG.
pub fn encode(buffer: &PixelBuffer, format: &str, quality: Option<u8>) -> Result<Vec<u8>> {
    encode_as(buffer, format.parse()?, quality)
}

pub fn encode_as(buffer: &PixelBuffer, format: OutputFormat, quality: Option<u8>) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    let (width, height) = (buffer.width(), buffer.height());
    let pixels = buffer.as_bytes();

    let written = match format {
        OutputFormat::Png => {
            PngEncoder::new(&mut out).write_image(pixels, width, height, ExtendedColorType::Rgb8)
        }
        OutputFormat::Jpeg => {
            let quality = quality.unwrap_or(DEFAULT_JPEG_QUALITY).clamp(1, 100);
            JpegEncoder::new_with_quality(&mut out, quality).write_image(
                pixels,
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        OutputFormat::Webp => WebPEncoder::new_lossless(&mut out).write_image(
            pixels,
            width,
            height,
            ExtendedColorType::Rgb8,
        ),
    };

    written.map_err(|e| RecolorError::encode(format!("could not write {format}"), e))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::color::RgbColor;

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, |x, y| {
            RgbColor::new((x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8)
        })
    }

    #[test]
    fn png_round_trip_is_exact() {
        let buffer = gradient(37, 19);
        let bytes = encode(&buffer, "png", None).unwrap();
        assert_eq!(decode(&bytes).unwrap(), buffer);
    }

    #[test]
    fn webp_round_trip_is_lossless() {
        let buffer = gradient(16, 16);
        let bytes = encode(&buffer, "webp", Some(10)).unwrap();
        assert_eq!(decode(&bytes).unwrap(), buffer);
    }

    #[test]
    fn jpeg_round_trip_is_close() {
        let buffer = PixelBuffer::filled(16, 16, RgbColor::new(200, 40, 90));
        let bytes = encode(&buffer, "JPG", Some(95)).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (16, 16));
        let center = back.pixel(8, 8).unwrap();
        assert!((center.r as i16 - 200).abs() <= 6);
        assert!((center.g as i16 - 40).abs() <= 6);
        assert!((center.b as i16 - 90).abs() <= 6);
    }

    #[test]
    fn unknown_output_format_is_an_encode_error() {
        let buffer = gradient(2, 2);
        let err = encode(&buffer, "tiff", None).unwrap_err();
        assert!(matches!(err, RecolorError::Encode { .. }));
        assert!(!err.is_client_error());
    }

    #[test]
    fn garbage_and_truncated_bytes_fail_to_decode() {
        assert!(matches!(decode(&[]), Err(RecolorError::Decode { .. })));
        assert!(matches!(
            decode(b"definitely not an image"),
            Err(RecolorError::Decode { .. })
        ));

        let bytes = encode(&gradient(32, 32), "png", None).unwrap();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(decode(truncated), Err(RecolorError::Decode { .. })));
    }

    #[test]
    fn alpha_and_grayscale_sources_become_rgb() {
        let mut rgba = image::RgbaImage::new(3, 1);
        rgba.put_pixel(0, 0, image::Rgba([10, 20, 30, 0]));
        let mut bytes = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(rgba)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        let decoded = decode(bytes.get_ref()).unwrap();
        assert_eq!(decoded.as_bytes().len(), 9);
        assert_eq!(decoded.pixel(0, 0), Some(RgbColor::new(10, 20, 30)));

        let gray = image::GrayImage::from_pixel(2, 2, image::Luma([77]));
        let mut bytes = Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(gray)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        let decoded = decode(bytes.get_ref()).unwrap();
        assert_eq!(decoded.pixel(1, 1), Some(RgbColor::new(77, 77, 77)));
    }

    #[test]
    fn output_format_parsing_and_names() {
        assert_eq!("PNG".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("jpeg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("webp".parse::<OutputFormat>().unwrap(), OutputFormat::Webp);
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Webp.mime_type(), "image/webp");
    }
}
