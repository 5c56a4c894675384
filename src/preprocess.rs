use crate::{error::Error, frame::Frame, pose::Point};
use ndarray::Array4;
use num_traits::cast::ToPrimitive;
use std::{fmt, str::FromStr};

/// Numeric contract of the model input.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InputRange {
    /// f32 samples scaled to [0, 1].
    UnitFloat,
    /// Raw u8 samples.
    Byte,
}

/// Input tensor shape and range the engine expects: `[1, size, size, 3]`, RGB.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub size: usize,
    pub range: InputRange,
}

impl InputSpec {
    pub fn shape(&self) -> [usize; 4] {
        [1, self.size, self.size, 3]
    }
}

/// How a frame is fitted into the square model input.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScaleMode {
    /// The larger side maps to the input size, the rest is zero padding.
    Fit,
    /// The shorter side maps to the input size, the overflow is center-cropped.
    Fill,
}

impl Default for ScaleMode {
    fn default() -> Self {
        Self::Fit
    }
}

impl FromStr for ScaleMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fit" | "letterbox" => Ok(Self::Fit),
            "fill" | "crop" => Ok(Self::Fill),
            _ => Err(Error::ParseScaleMode(s.to_owned())),
        }
    }
}

impl fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fit => "fit",
            Self::Fill => "fill",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputTensor {
    Float32(Array4<f32>),
    UInt8(Array4<u8>),
}

impl InputTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float32(array) => array.shape(),
            Self::UInt8(array) => array.shape(),
        }
    }

    pub fn range(&self) -> InputRange {
        match self {
            Self::Float32(_) => InputRange::UnitFloat,
            Self::UInt8(_) => InputRange::Byte,
        }
    }

    /// Whether this tensor satisfies `spec`.
    pub fn matches(&self, spec: &InputSpec) -> bool {
        self.range() == spec.range && self.shape() == spec.shape()
    }
}

/// Placement of a frame inside the square model input, in input pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    frame_width: f32,
    frame_height: f32,
    size: f32,
}

impl Letterbox {
    pub fn new(frame_width: u32, frame_height: u32, size: usize, mode: ScaleMode) -> Result<Self, Error> {
        if frame_width == 0 || frame_height == 0 {
            return Err(Error::EmptyFrame(frame_width, frame_height));
        }
        let frame_width = frame_width.to_f32().ok_or(Error::ConvertToF32)?;
        let frame_height = frame_height.to_f32().ok_or(Error::ConvertToF32)?;
        let size = size.to_f32().ok_or(Error::ConvertToF32)?;
        let side = match mode {
            ScaleMode::Fit => frame_width.max(frame_height),
            ScaleMode::Fill => frame_width.min(frame_height),
        };
        let scale = size / side;
        Ok(Self {
            scale,
            offset_x: (size - frame_width * scale) / 2.0,
            offset_y: (size - frame_height * scale) / 2.0,
            frame_width,
            frame_height,
            size,
        })
    }

    /// Map a point normalized to the model input back to normalized frame space.
    pub fn to_frame(&self, point: Point) -> Point {
        Point::new(
            (point.x * self.size - self.offset_x) / (self.frame_width * self.scale),
            (point.y * self.size - self.offset_y) / (self.frame_height * self.scale),
        )
    }

    /// Map a normalized frame point to normalized model-input space.
    pub fn to_input(&self, point: Point) -> Point {
        Point::new(
            (point.x * self.frame_width * self.scale + self.offset_x) / self.size,
            (point.y * self.frame_height * self.scale + self.offset_y) / self.size,
        )
    }
}

/// Bilinear taps along one axis for every output pixel.
#[derive(Debug, Copy, Clone)]
struct Tap {
    lo: u32,
    hi: u32,
    weight: f32,
    inside: bool,
}

fn taps(output: usize, offset: f32, scale: f32, source: u32) -> Vec<Tap> {
    let last = source - 1;
    let extent = source as f32;
    (0..output)
        .map(|o| {
            // source coordinate of the output pixel center
            let u = (o as f32 + 0.5 - offset) / scale;
            let inside = u >= 0.0 && u < extent;
            let s = (u - 0.5).max(0.0);
            let lo = (s.floor() as u32).min(last);
            let hi = (lo + 1).min(last);
            Tap {
                lo,
                hi,
                weight: (s - lo as f32).min(1.0),
                inside,
            }
        })
        .collect()
}

/// Turns camera frames into model input tensors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Preprocessor {
    spec: InputSpec,
    mode: ScaleMode,
}

impl Preprocessor {
    pub fn new(spec: InputSpec, mode: ScaleMode) -> Result<Self, Error> {
        if spec.size == 0 {
            return Err(Error::ZeroInputSize);
        }
        Ok(Self { spec, mode })
    }

    pub fn letterbox(&self, frame: &Frame) -> Result<Letterbox, Error> {
        Letterbox::new(frame.width(), frame.height(), self.spec.size, self.mode)
    }

    /// Resize, crop or pad, and reorder `frame` into an RGB tensor.
    ///
    /// The frame size is read on every call; consecutive frames may differ.
    pub fn prepare(&self, frame: &Frame) -> Result<(InputTensor, Letterbox), Error> {
        let letterbox = self.letterbox(frame)?;
        let size = self.spec.size;
        let xs = taps(size, letterbox.offset_x, letterbox.scale, frame.width());
        let ys = taps(size, letterbox.offset_y, letterbox.scale, frame.height());

        let mut samples = Vec::with_capacity(size * size * 3);
        for y in ys.iter() {
            for x in xs.iter() {
                if !(x.inside && y.inside) {
                    samples.extend_from_slice(&[0.0; 3]);
                    continue;
                }
                let top_left = frame.rgb(x.lo, y.lo);
                let top_right = frame.rgb(x.hi, y.lo);
                let bottom_left = frame.rgb(x.lo, y.hi);
                let bottom_right = frame.rgb(x.hi, y.hi);
                for c in 0..3 {
                    let top = lerp(top_left[c], top_right[c], x.weight);
                    let bottom = lerp(bottom_left[c], bottom_right[c], x.weight);
                    samples.push(top + (bottom - top) * y.weight);
                }
            }
        }

        let shape = self.spec.shape();
        let tensor = match self.spec.range {
            InputRange::UnitFloat => InputTensor::Float32(
                Array4::from_shape_vec(shape, samples.into_iter().map(|v| v / 255.0).collect())
                    .map_err(Error::ConstructInputTensor)?,
            ),
            InputRange::Byte => InputTensor::UInt8(
                Array4::from_shape_vec(
                    shape,
                    samples
                        .into_iter()
                        .map(|v| v.round().clamp(0.0, 255.0) as u8)
                        .collect(),
                )
                .map_err(Error::ConstructInputTensor)?,
            ),
        };
        Ok((tensor, letterbox))
    }
}

#[inline]
fn lerp(a: u8, b: u8, t: f32) -> f32 {
    let a = f32::from(a);
    a + (f32::from(b) - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{solid_frame, PixelFormat};
    use assert_approx_eq::assert_approx_eq;

    fn unit(size: usize) -> Preprocessor {
        Preprocessor::new(
            InputSpec {
                size,
                range: InputRange::UnitFloat,
            },
            ScaleMode::Fit,
        )
        .unwrap()
    }

    /// 4x2 BGRA frame whose blue channel is 0, 100, 200, 250 by column.
    fn striped() -> Frame {
        let columns = [0u8, 100, 200, 250];
        let data = (0..2)
            .flat_map(|_| columns.iter().flat_map(|&b| vec![b, 0, 0, 255]))
            .collect();
        Frame::new(4, 2, PixelFormat::Bgra8, data).unwrap()
    }

    #[test]
    fn reorders_channels_and_normalizes() {
        let frame = solid_frame(8, 8, [51, 102, 204, 255]);
        let (tensor, _) = unit(4).prepare(&frame).unwrap();
        let array = match tensor {
            InputTensor::Float32(array) => array,
            other => panic!("unexpected tensor {:?}", other.range()),
        };
        assert_eq!(array.shape(), &[1, 4, 4, 3]);
        for pixel in array.exact_chunks((1, 1, 1, 3)) {
            assert_approx_eq!(pixel[[0, 0, 0, 0]], 0.8);
            assert_approx_eq!(pixel[[0, 0, 0, 1]], 0.4);
            assert_approx_eq!(pixel[[0, 0, 0, 2]], 0.2);
        }
    }

    #[test]
    fn fit_pads_the_short_side() {
        let frame = solid_frame(4, 2, [255, 255, 255, 255]);
        let (tensor, letterbox) = unit(4).prepare(&frame).unwrap();
        assert_approx_eq!(letterbox.scale, 1.0);
        assert_approx_eq!(letterbox.offset_y, 1.0);
        let array = match tensor {
            InputTensor::Float32(array) => array,
            _ => unreachable!(),
        };
        for x in 0..4 {
            assert_eq!(array[[0, 0, x, 0]], 0.0);
            assert_approx_eq!(array[[0, 1, x, 0]], 1.0);
            assert_approx_eq!(array[[0, 2, x, 0]], 1.0);
            assert_eq!(array[[0, 3, x, 0]], 0.0);
        }
    }

    #[test]
    fn fill_crops_the_long_side() {
        let preprocessor = Preprocessor::new(
            InputSpec {
                size: 2,
                range: InputRange::Byte,
            },
            ScaleMode::Fill,
        )
        .unwrap();
        let (tensor, letterbox) = preprocessor.prepare(&striped()).unwrap();
        assert_approx_eq!(letterbox.offset_x, -1.0);
        let array = match tensor {
            InputTensor::UInt8(array) => array,
            _ => unreachable!(),
        };
        // blue is the third channel of the RGB tensor
        assert_eq!(array[[0, 0, 0, 2]], 100);
        assert_eq!(array[[0, 0, 1, 2]], 200);
        assert_eq!(array[[0, 1, 0, 2]], 100);
    }

    #[test]
    fn source_size_may_change_between_frames() {
        let preprocessor = unit(8);
        for &(w, h) in [(16, 9), (9, 16), (3, 3)].iter() {
            let (tensor, _) = preprocessor
                .prepare(&solid_frame(w, h, [0, 0, 0, 255]))
                .unwrap();
            assert_eq!(tensor.shape(), &[1, 8, 8, 3]);
        }
    }

    #[test]
    fn letterbox_maps_back_to_frame_space() {
        let letterbox = Letterbox::new(640, 480, 192, ScaleMode::Fit).unwrap();
        let center = letterbox.to_frame(Point::new(0.5, 0.5));
        assert_approx_eq!(center.x, 0.5);
        assert_approx_eq!(center.y, 0.5);

        // the top padding band lies above the frame
        assert!(letterbox.to_frame(Point::new(0.5, 0.0)).y < 0.0);

        let point = Point::new(0.25, 0.8);
        let back = letterbox.to_frame(letterbox.to_input(point));
        assert_approx_eq!(back.x, point.x);
        assert_approx_eq!(back.y, point.y);
    }

    #[test]
    fn rejects_zero_input_size() {
        let spec = InputSpec {
            size: 0,
            range: InputRange::Byte,
        };
        assert!(matches!(
            Preprocessor::new(spec, ScaleMode::Fit),
            Err(Error::ZeroInputSize)
        ));
    }
}
