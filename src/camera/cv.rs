use crate::{
    camera::{CameraConfig, Capture},
    error::Error,
    frame::Frame,
};
use num_traits::cast::ToPrimitive;
use opencv::{
    core::Mat,
    imgproc::{cvt_color, COLOR_BGR2BGRA},
    prelude::{MatTrait, MatTraitManual, VideoCaptureTrait},
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_BUFFERSIZE, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH,
    },
};
use std::convert::TryFrom;
use tracing::info;

/// Capture backed by an OpenCV `VideoCapture`.
pub struct OpenCvCapture {
    capture: Option<VideoCapture>,
    device: i32,
    bgr: Mat,
    bgra: Mat,
}

// SAFETY: the capture and its Mats are only touched from the thread that owns
// the session.
unsafe impl Send for OpenCvCapture {}

impl OpenCvCapture {
    pub fn new() -> Self {
        Self {
            capture: None,
            device: 0,
            bgr: Mat::default(),
            bgra: Mat::default(),
        }
    }
}

impl Default for OpenCvCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert an input Mat to a slice of bytes, row padding included.
fn mat_to_slice(input: &Mat) -> Result<&[u8], Error> {
    let step = input.step1(0).map_err(Error::GetMatData)?
        * input.elem_size1().map_err(Error::GetMatData)?;
    let rows = usize::try_from(input.rows()).map_err(Error::ConvertMatDim)?;
    let num_elements = step * rows;

    let raw_data = input.data().map_err(Error::GetMatData)? as _;
    // SAFETY: the Mat owns `step * rows` contiguous bytes and outlives the slice
    Ok(unsafe { std::slice::from_raw_parts(raw_data, num_elements) })
}

impl Capture for OpenCvCapture {
    fn open(&mut self, config: &CameraConfig) -> Result<(), Error> {
        let mut capture = VideoCapture::new(config.device, CAP_ANY)
            .map_err(|e| Error::OpenCapture(config.device, e))?;
        if !capture.is_opened().map_err(Error::ConfigureCapture)? {
            return Err(Error::CaptureNotOpened(config.device));
        }

        if let Some(width) = config.width.map(f64::from) {
            capture
                .set(CAP_PROP_FRAME_WIDTH, width)
                .map_err(Error::ConfigureCapture)?;
        }
        if let Some(height) = config.height.map(f64::from) {
            capture
                .set(CAP_PROP_FRAME_HEIGHT, height)
                .map_err(Error::ConfigureCapture)?;
        }
        // keep only the newest frame in the driver queue
        capture
            .set(CAP_PROP_BUFFERSIZE, 1.0)
            .map_err(Error::ConfigureCapture)?;

        let width = capture
            .get(CAP_PROP_FRAME_WIDTH)
            .map_err(Error::ConfigureCapture)?;
        let height = capture
            .get(CAP_PROP_FRAME_HEIGHT)
            .map_err(Error::ConfigureCapture)?;
        info!(
            message = "got dimensions from video capture",
            width = width.to_i64().unwrap_or_default(),
            height = height.to_i64().unwrap_or_default()
        );

        self.device = config.device;
        self.capture = Some(capture);
        Ok(())
    }

    fn grab(&mut self) -> Result<Frame, Error> {
        let capture = self.capture.as_mut().ok_or(Error::SessionNotRunning)?;
        if !capture.read(&mut self.bgr).map_err(Error::ReadFrame)? {
            return Err(Error::EmptyRead);
        }
        if self.bgr.empty().map_err(Error::ReadFrame)? {
            return Err(Error::EmptyRead);
        }

        cvt_color(&self.bgr, &mut self.bgra, COLOR_BGR2BGRA, 0).map_err(Error::ConvertColor)?;

        let width = u32::try_from(self.bgra.cols()).map_err(Error::ConvertMatDim)?;
        let height = u32::try_from(self.bgra.rows()).map_err(Error::ConvertMatDim)?;
        let stride = self.bgra.step1(0).map_err(Error::GetMatData)?
            * self.bgra.elem_size1().map_err(Error::GetMatData)?;
        let data = mat_to_slice(&self.bgra)?.to_vec();

        Frame::with_stride(width, height, stride, CameraConfig::FORMAT, data)
    }

    fn close(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(error) = capture.release() {
                tracing::warn!(message = "failed to release capture", device = self.device, %error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capture_is_closed() {
        let mut capture = OpenCvCapture::default();
        assert!(capture.capture.is_none());
        assert!(matches!(capture.grab(), Err(Error::SessionNotRunning)));
        capture.close();
    }
}
