use crate::error::Error;
use std::{fmt, str::FromStr};

/// Packed 8-bit, four channel layouts a capture device may deliver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra8,
    Rgba8,
    Argb8,
}

impl PixelFormat {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Byte offsets of the red, green and blue channels within one pixel.
    #[inline]
    pub fn rgb_offsets(self) -> [usize; 3] {
        match self {
            Self::Bgra8 => [2, 1, 0],
            Self::Rgba8 => [0, 1, 2],
            Self::Argb8 => [1, 2, 3],
        }
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::Bgra8
    }
}

/// Clockwise rotation applied to frames so they match the display orientation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Rotation {
    None,
    Clockwise90,
    Rotate180,
    Clockwise270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Clockwise90 => 90,
            Self::Rotate180 => 180,
            Self::Clockwise270 => 270,
        }
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::None
    }
}

impl FromStr for Rotation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Self::None),
            "90" => Ok(Self::Clockwise90),
            "180" => Ok(Self::Rotate180),
            "270" => Ok(Self::Clockwise270),
            other => Err(Error::ParseRotation(other.to_owned())),
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

/// Mirroring and rotation for a capture stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Orientation {
    /// Flip horizontally. Front cameras need this so the user's left is on the left.
    pub mirror: bool,
    pub rotation: Rotation,
}

impl Orientation {
    pub fn is_identity(self) -> bool {
        !self.mirror && self.rotation == Rotation::None
    }

    /// Mirror first, then rotate.
    pub fn apply(self, frame: Frame) -> Frame {
        if self.is_identity() {
            return frame;
        }
        let frame = if self.mirror { frame.mirrored() } else { frame };
        match self.rotation {
            Rotation::None => frame,
            rotation => frame.rotated(rotation),
        }
    }
}

/// A single camera capture.
///
/// The same buffer serves as the display image and as the preprocessing
/// input. `sequence` increases with arrival order.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    sequence: u64,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .finish()
    }
}

impl Frame {
    /// Wrap a tightly packed buffer.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self, Error> {
        let stride = width as usize * PixelFormat::BYTES_PER_PIXEL;
        Self::with_stride(width, height, stride, format, data)
    }

    /// Wrap a buffer whose rows are `stride` bytes apart.
    pub fn with_stride(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyFrame(width, height));
        }
        let row = width as usize * PixelFormat::BYTES_PER_PIXEL;
        if stride < row {
            return Err(Error::FrameStride { stride, row });
        }
        let expected = stride * (height as usize - 1) + row;
        if data.len() < expected {
            return Err(Error::FrameBufferTooSmall {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            sequence: 0,
            width,
            height,
            stride,
            format,
            data,
        })
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes of the pixel at column `x`, row `y`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = y as usize * self.stride + x as usize * PixelFormat::BYTES_PER_PIXEL;
        &self.data[start..start + PixelFormat::BYTES_PER_PIXEL]
    }

    /// The pixel at column `x`, row `y` as red, green, blue.
    #[inline]
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let pixel = self.pixel(x, y);
        let [r, g, b] = self.format.rgb_offsets();
        [pixel[r], pixel[g], pixel[b]]
    }

    /// Flip horizontally. The result is tightly packed.
    pub fn mirrored(&self) -> Self {
        self.remap(self.width, self.height, |x, y| (self.width - 1 - x, y))
    }

    /// Rotate clockwise. The result is tightly packed.
    pub fn rotated(&self, rotation: Rotation) -> Self {
        let (w, h) = (self.width, self.height);
        match rotation {
            Rotation::None => self.remap(w, h, |x, y| (x, y)),
            // destination (x, y) in an h x w image
            Rotation::Clockwise90 => self.remap(h, w, |x, y| (y, h - 1 - x)),
            Rotation::Rotate180 => self.remap(w, h, |x, y| (w - 1 - x, h - 1 - y)),
            Rotation::Clockwise270 => self.remap(h, w, |x, y| (w - 1 - y, x)),
        }
    }

    /// Build a `width` x `height` frame whose pixel (x, y) is copied from `source(x, y)`.
    fn remap<F>(&self, width: u32, height: u32, source: F) -> Self
    where
        F: Fn(u32, u32) -> (u32, u32),
    {
        let stride = width as usize * PixelFormat::BYTES_PER_PIXEL;
        let mut data = Vec::with_capacity(stride * height as usize);
        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = source(x, y);
                data.extend_from_slice(self.pixel(sx, sy));
            }
        }
        Self {
            sequence: self.sequence,
            width,
            height,
            stride,
            format: self.format,
            data,
        }
    }
}

#[cfg(test)]
pub(crate) fn solid_frame(width: u32, height: u32, bgra: [u8; 4]) -> Frame {
    let data = bgra
        .iter()
        .copied()
        .cycle()
        .take(width as usize * height as usize * PixelFormat::BYTES_PER_PIXEL)
        .collect();
    Frame::new(width, height, PixelFormat::Bgra8, data).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 3x2 BGRA frame whose blue channel holds the pixel index.
    fn indexed_frame() -> Frame {
        let data = (0..6u8).flat_map(|i| vec![i, 0, 0, 255]).collect();
        Frame::new(3, 2, PixelFormat::Bgra8, data).unwrap()
    }

    fn blues(frame: &Frame) -> Vec<u8> {
        (0..frame.height())
            .flat_map(|y| (0..frame.width()).map(move |x| (x, y)))
            .map(|(x, y)| frame.rgb(x, y)[2])
            .collect()
    }

    #[test]
    fn rejects_short_buffers() {
        let err = Frame::new(4, 4, PixelFormat::Bgra8, vec![0; 60]).unwrap_err();
        assert!(matches!(
            err,
            Error::FrameBufferTooSmall {
                expected: 64,
                actual: 60
            }
        ));
        assert!(matches!(
            Frame::new(0, 4, PixelFormat::Bgra8, vec![]),
            Err(Error::EmptyFrame(0, 4))
        ));
    }

    #[test]
    fn padded_rows_are_honored() {
        // 2x2 frame with 4 bytes of row padding
        let mut data = vec![0u8; 12 + 8];
        data[12..16].copy_from_slice(&[9, 8, 7, 255]);
        let frame = Frame::with_stride(2, 2, 12, PixelFormat::Bgra8, data).unwrap();
        assert_eq!(frame.rgb(0, 1), [7, 8, 9]);
    }

    #[test]
    fn channel_order_follows_format() {
        let frame = Frame::new(1, 1, PixelFormat::Argb8, vec![255, 10, 20, 30]).unwrap();
        assert_eq!(frame.rgb(0, 0), [10, 20, 30]);
        let frame = Frame::new(1, 1, PixelFormat::Rgba8, vec![10, 20, 30, 255]).unwrap();
        assert_eq!(frame.rgb(0, 0), [10, 20, 30]);
    }

    #[test]
    fn mirror_flips_columns() {
        let mirrored = indexed_frame().mirrored();
        assert_eq!(blues(&mirrored), vec![2, 1, 0, 5, 4, 3]);
    }

    #[test]
    fn rotations() {
        let frame = indexed_frame();
        // 0 1 2      3 0
        // 3 4 5  ->  4 1
        //            5 2
        let cw = frame.rotated(Rotation::Clockwise90);
        assert_eq!((cw.width(), cw.height()), (2, 3));
        assert_eq!(blues(&cw), vec![3, 0, 4, 1, 5, 2]);

        let half = frame.rotated(Rotation::Rotate180);
        assert_eq!(blues(&half), vec![5, 4, 3, 2, 1, 0]);

        let ccw = frame.rotated(Rotation::Clockwise270);
        assert_eq!((ccw.width(), ccw.height()), (2, 3));
        assert_eq!(blues(&ccw), vec![2, 5, 1, 4, 0, 3]);
    }

    #[test]
    fn orientation_keeps_sequence() {
        let orientation = Orientation {
            mirror: true,
            rotation: Rotation::Clockwise90,
        };
        let frame = orientation.apply(indexed_frame().with_sequence(7));
        assert_eq!(frame.sequence(), 7);
        assert_eq!((frame.width(), frame.height()), (2, 3));
    }

    #[test]
    fn parses_rotation() {
        assert_eq!("90".parse::<Rotation>().unwrap(), Rotation::Clockwise90);
        assert!("45".parse::<Rotation>().is_err());
    }
}
