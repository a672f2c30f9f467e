//! Camera frames, frame sizes and encoded sample thumbnails.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use std::time::SystemTime;

use image::{imageops, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

/// Errors produced when wrapping raw pixel buffers into a [`Frame`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid RGBA buffer length (expected {expected} bytes, got {got})")]
    InvalidBuffer { expected: usize, got: usize },

    #[error("invalid frame dimensions (width={width}, height={height})")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Errors produced while encoding or decoding a [`Thumbnail`].
#[derive(thiserror::Error, Debug)]
pub enum ThumbnailError {
    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("thumbnail has zero area")]
    Empty,
}

/// Pixel dimensions of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Largest size with the same aspect ratio whose longer side is at most `max_side`.
    ///
    /// Sizes that already fit are returned unchanged.
    pub fn fit_within(&self, max_side: u32) -> FrameSize {
        let longest = self.width.max(self.height);
        if longest <= max_side || longest == 0 {
            return *self;
        }
        let scale = f64::from(max_side) / f64::from(longest);
        let w = (f64::from(self.width) * scale).round().max(1.0) as u32;
        let h = (f64::from(self.height) * scale).round().max(1.0) as u32;
        FrameSize::new(w, h)
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One decoded RGBA image pulled from the capture device.
///
/// Frames are transient: a frame lives for the duration of one detection
/// tick and only survives as an encoded [`Thumbnail`] when it becomes a sample.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbaImage,
    captured_at: SystemTime,
}

impl Frame {
    /// Wrap a decoded image, stamping it with the current time.
    pub fn new(image: RgbaImage) -> Self {
        Self::with_timestamp(image, SystemTime::now())
    }

    pub fn with_timestamp(image: RgbaImage, captured_at: SystemTime) -> Self {
        Self { image, captured_at }
    }

    /// Build a frame from a raw row-major RGBA buffer.
    pub fn from_rgba_slice(width: u32, height: u32, pixels: &[u8]) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidDimensions { width, height });
        }
        let w = usize::try_from(width).ok();
        let h = usize::try_from(height).ok();
        let Some(expected) = w
            .zip(h)
            .and_then(|(w, h)| w.checked_mul(h))
            .and_then(|n| n.checked_mul(4))
        else {
            return Err(FrameError::InvalidDimensions { width, height });
        };
        if pixels.len() != expected {
            return Err(FrameError::InvalidBuffer {
                expected,
                got: pixels.len(),
            });
        }
        RgbaImage::from_raw(width, height, pixels.to_vec())
            .map(Self::new)
            .ok_or(FrameError::InvalidDimensions { width, height })
    }

    #[inline]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[inline]
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.image.width(), self.image.height())
    }

    #[inline]
    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// Encode this frame as a PNG thumbnail, downscaling to `max_side` if given.
    pub fn thumbnail(&self, max_side: Option<u32>) -> Result<Thumbnail, ThumbnailError> {
        let size = self.size();
        let target = max_side.map_or(size, |side| size.fit_within(side));
        if target == size {
            Thumbnail::encode(&self.image)
        } else {
            let scaled = imageops::thumbnail(&self.image, target.width, target.height);
            Thumbnail::encode(&scaled)
        }
    }
}

/// PNG-encoded image kept alongside an accepted sample.
///
/// The encoded bytes are shared, so cloning a thumbnail (and therefore a
/// sample snapshot) never copies pixel data.
#[derive(Clone, PartialEq, Eq)]
pub struct Thumbnail {
    png: Arc<[u8]>,
    size: FrameSize,
}

impl Thumbnail {
    /// Encode an RGBA image as PNG.
    pub fn encode(image: &RgbaImage) -> Result<Self, ThumbnailError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ThumbnailError::Empty);
        }
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(Self {
            png: Arc::from(bytes),
            size: FrameSize::new(image.width(), image.height()),
        })
    }

    /// Wrap already-encoded PNG bytes, validating that they decode.
    pub fn from_png(bytes: Vec<u8>) -> Result<Self, ThumbnailError> {
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.to_rgba8();
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(ThumbnailError::Empty);
        }
        Ok(Self {
            png: Arc::from(bytes),
            size: FrameSize::new(decoded.width(), decoded.height()),
        })
    }

    #[inline]
    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    #[inline]
    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn decode(&self) -> Result<RgbaImage, ThumbnailError> {
        Ok(image::load_from_memory_with_format(&self.png, ImageFormat::Png)?.to_rgba8())
    }
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("size", &self.size)
            .field("png_len", &self.png.len())
            .finish()
    }
}
