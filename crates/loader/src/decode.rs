//! Decode seam.
//!
//! Turns resolved bytes into a [`DecodedImage`]. The default backend decodes
//! through the `image` crate; tests substitute deterministic backends.

use crate::error::LoadError;
use lightbox_cache::{DecodedImage, ImageKey};

/// Produces a raster from raw image bytes.
pub trait DecodeBackend: Send + Sync {
    fn decode(&self, key: &ImageKey, bytes: &[u8]) -> Result<DecodedImage, LoadError>;
}

/// Default backend decoding any format the `image` crate understands.
///
/// Format detection failures surface as [`LoadError::UnsupportedFormat`];
/// everything else that goes wrong mid-decode (truncation, bad chunks,
/// malformed headers of a recognized format) is [`LoadError::CorruptedImage`].
#[derive(Debug, Default)]
pub struct RasterDecoder;

impl DecodeBackend for RasterDecoder {
    fn decode(&self, key: &ImageKey, bytes: &[u8]) -> Result<DecodedImage, LoadError> {
        let dynamic = image::load_from_memory(bytes).map_err(|err| match err {
            image::ImageError::Unsupported(_) => {
                LoadError::UnsupportedFormat(key.path().to_path_buf())
            }
            _ => LoadError::CorruptedImage(key.path().to_path_buf()),
        })?;

        Ok(DecodedImage::from_rgba(dynamic.into_rgba8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbaImage::new(width, height)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decodes_png_with_cost() {
        let key = ImageKey::for_path("/photos/ok.png");
        let image = RasterDecoder.decode(&key, &png_bytes(20, 10)).unwrap();

        assert_eq!(image.width(), 20);
        assert_eq!(image.height(), 10);
        assert_eq!(image.cost_bytes(), 20 * 10 * 4);
    }

    #[test]
    fn test_garbage_is_unsupported_format() {
        let key = ImageKey::for_path("/photos/notes.txt");
        let err = RasterDecoder.decode(&key, b"this is not an image").unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_truncated_png_is_corrupted() {
        let key = ImageKey::for_path("/photos/cut.png");
        let bytes = png_bytes(20, 10);
        let err = RasterDecoder.decode(&key, &bytes[..24]).unwrap_err();
        assert!(matches!(err, LoadError::CorruptedImage(_)));
    }
}
