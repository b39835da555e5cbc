use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Frame format enumeration supporting different video formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG format - compressed JPEG frames
    Mjpeg,
    /// RGB24 format - uncompressed RGB data
    Rgb24,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Mjpeg => 0, // Variable size, compressed
            FrameFormat::Rgb24 => 3,
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// A still image sampled from the capture session
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Unique frame identifier
    pub id: u64,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(
        id: u64,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Get the expected frame size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => true, // Compressed formats have variable size
        }
    }

    /// Encode the frame as an image file a decoder engine can read.
    ///
    /// Returns the bytes and the file extension to use.
    pub fn to_image_file(&self) -> Result<(Arc<Vec<u8>>, &'static str), DecodeError> {
        match self.format {
            FrameFormat::Mjpeg => Ok((Arc::clone(&self.data), "jpg")),
            FrameFormat::Rgb24 => self.encode_png(),
        }
    }

    #[cfg(feature = "frame_convert")]
    fn encode_png(&self) -> Result<(Arc<Vec<u8>>, &'static str), DecodeError> {
        use image::{ImageBuffer, ImageOutputFormat, Rgb};
        use std::io::Cursor;

        if !self.validate_size() {
            return Err(DecodeError::Engine {
                details: format!(
                    "RGB frame {} has {} bytes, expected {:?}",
                    self.id,
                    self.data.len(),
                    self.expected_size()
                ),
            });
        }

        let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(self.width, self.height, self.data.to_vec()).ok_or_else(|| {
                DecodeError::Engine {
                    details: "RGB frame buffer does not match its dimensions".to_string(),
                }
            })?;

        let mut png = Cursor::new(Vec::new());
        buffer
            .write_to(&mut png, ImageOutputFormat::Png)
            .map_err(|e| DecodeError::Engine {
                details: format!("PNG encoding failed: {}", e),
            })?;

        Ok((Arc::new(png.into_inner()), "png"))
    }

    #[cfg(not(feature = "frame_convert"))]
    fn encode_png(&self) -> Result<(Arc<Vec<u8>>, &'static str), DecodeError> {
        Err(DecodeError::UnsupportedFrame {
            format: "Rgb24 (frame_convert feature disabled)".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_format_properties() {
        assert_eq!(FrameFormat::Mjpeg.bytes_per_pixel(), 0);
        assert_eq!(FrameFormat::Rgb24.bytes_per_pixel(), 3);

        assert!(FrameFormat::Mjpeg.is_compressed());
        assert!(!FrameFormat::Rgb24.is_compressed());
    }

    #[test]
    fn test_frame_size_validation() {
        let valid = FrameData::new(1, vec![0u8; 4 * 2 * 3], 4, 2, FrameFormat::Rgb24);
        assert!(valid.validate_size());

        let invalid = FrameData::new(2, vec![0u8; 5], 4, 2, FrameFormat::Rgb24);
        assert!(!invalid.validate_size());

        let mjpeg = FrameData::new(3, vec![0u8; 5000], 640, 480, FrameFormat::Mjpeg);
        assert!(mjpeg.validate_size());
    }

    #[test]
    fn test_mjpeg_passes_through() {
        let frame = FrameData::new(1, vec![0xFF, 0xD8, 0xFF, 0xD9], 2, 2, FrameFormat::Mjpeg);
        let (bytes, ext) = frame.to_image_file().unwrap();
        assert_eq!(ext, "jpg");
        assert_eq!(bytes.len(), 4);
    }

    #[cfg(not(feature = "frame_convert"))]
    #[test]
    fn test_rgb_needs_frame_convert() {
        let frame = FrameData::new(1, vec![128u8; 4 * 4 * 3], 4, 4, FrameFormat::Rgb24);
        assert!(matches!(
            frame.to_image_file(),
            Err(DecodeError::UnsupportedFrame { .. })
        ));
    }

    #[cfg(feature = "frame_convert")]
    #[test]
    fn test_rgb_encodes_to_png() {
        let frame = FrameData::new(1, vec![128u8; 4 * 4 * 3], 4, 4, FrameFormat::Rgb24);
        let (bytes, ext) = frame.to_image_file().unwrap();
        assert_eq!(ext, "png");
        assert_eq!(&bytes[1..4], b"PNG");
    }
}
