use std::io::Cursor;

use image::ImageReader;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Reads width and height from the image header without decoding pixels;
/// `None` if the format is unknown or the header is unreadable.
pub fn decode_dimensions(content: &[u8]) -> Option<ImageDimensions> {
    let reader = match ImageReader::new(Cursor::new(content)).with_guessed_format() {
        Ok(reader) => reader,
        Err(err) => {
            debug!(error = %err, "cannot guess image format");
            return None;
        }
    };
    match reader.into_dimensions() {
        Ok((width, height)) => Some(ImageDimensions { width, height }),
        Err(err) => {
            debug!(error = %err, "invalid image format");
            None
        }
    }
}

/// Dimensions of `content` if it decodes and meets both minimums.
pub fn check_dimensions(content: &[u8], min_width: u32, min_height: u32) -> Option<ImageDimensions> {
    let dims = decode_dimensions(content)?;
    if dims.width < min_width || dims.height < min_height {
        debug!(
            width = dims.width,
            height = dims.height,
            min_width,
            min_height,
            "image too small"
        );
        return None;
    }
    Some(dims)
}

pub fn validate_image(content: &[u8], min_width: u32, min_height: u32) -> bool {
    check_dimensions(content, min_width, min_height).is_some()
}

#[cfg(test)]
mod tests {
    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 80, 160]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn accepts_large_enough_image() {
        assert!(validate_image(&png(400, 300), 400, 300));
    }

    #[test]
    fn rejects_each_undersized_dimension() {
        assert!(!validate_image(&png(399, 300), 400, 300));
        assert!(!validate_image(&png(400, 299), 400, 300));
    }

    #[test]
    fn dimensions_come_from_the_header() {
        let mut content = png(640, 480);
        // Drop the trailing IEND chunk.
        content.truncate(content.len() - 12);
        assert_eq!(
            decode_dimensions(&content),
            Some(ImageDimensions {
                width: 640,
                height: 480
            })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(!validate_image(b"<html>not an image</html>", 1, 1));
        assert!(decode_dimensions(&[]).is_none());
    }
}
