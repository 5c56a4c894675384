#[cfg(feature = "tflite")]
use crate::tflite_sys;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("frame dimensions must be non-zero, got {0}x{1}")]
    EmptyFrame(u32, u32),

    #[error("frame row stride {stride} is smaller than a packed row of {row} bytes")]
    FrameStride { stride: usize, row: usize },

    #[error("frame buffer holds {actual} bytes, expected at least {expected}")]
    FrameBufferTooSmall { expected: usize, actual: usize },

    #[error("failed to convert value to f32")]
    ConvertToF32,

    #[error("model input size must be non-zero")]
    ZeroInputSize,

    #[error("failed to construct input tensor")]
    ConstructInputTensor(#[source] ndarray::ShapeError),

    #[error("expected model output with {expected} keypoint rows, got shape {shape:?}")]
    UnexpectedOutputShape { expected: usize, shape: Vec<usize> },

    #[error("failed to view model output as a keypoint matrix")]
    ReshapeOutput(#[source] ndarray::ShapeError),

    #[error("thread count must be between 1 and {max}, got {got}")]
    InvalidThreadCount { got: u8, max: u8 },

    #[error("unknown model variant: {0:?} (expected lightning or thunder)")]
    ParseModelVariant(String),

    #[error("unknown backend: {0:?} (expected cpu or edgetpu)")]
    ParseBackend(String),

    #[error("unsupported rotation: {0:?} (expected 0, 90, 180 or 270)")]
    ParseRotation(String),

    #[error("unknown scale mode: {0:?} (expected fit or fill)")]
    ParseScaleMode(String),

    #[error("model file not found: {0:?}")]
    ModelNotFound(std::path::PathBuf),

    #[error("backend {0:?} is not available in this build")]
    BackendUnavailable(crate::engine::Backend),

    #[error("model expects {expected:?} input, got {actual:?}")]
    InputMismatch {
        expected: crate::preprocess::InputSpec,
        actual: Vec<usize>,
    },

    #[error("input tensor is not contiguous in memory")]
    NonContiguousInput,

    #[error("camera session is not running")]
    SessionNotRunning,

    #[error("failed to spawn pipeline worker thread")]
    SpawnWorker(#[source] std::io::Error),

    #[cfg(feature = "camera")]
    #[error("failed to open video capture device {0}")]
    OpenCapture(i32, #[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("video capture device {0} is not available")]
    CaptureNotOpened(i32),

    #[cfg(feature = "camera")]
    #[error("failed to configure video capture")]
    ConfigureCapture(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("failed reading frame")]
    ReadFrame(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("reading frame returned no data")]
    EmptyRead,

    #[cfg(feature = "camera")]
    #[error("failed to convert frame color layout")]
    ConvertColor(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("failed to get Mat data")]
    GetMatData(#[source] opencv::Error),

    #[cfg(feature = "camera")]
    #[error("failed to convert Mat dimension i32 to u32")]
    ConvertMatDim(#[source] std::num::TryFromIntError),

    #[cfg(feature = "gui")]
    #[error("failed to wrap frame in a Mat")]
    WrapFrame(#[source] opencv::Error),

    #[cfg(feature = "gui")]
    #[error("failed to draw line")]
    DrawLine(#[source] opencv::Error),

    #[cfg(feature = "gui")]
    #[error("failed to draw circle")]
    DrawCircle(#[source] opencv::Error),

    #[cfg(feature = "gui")]
    #[error("failed to draw text")]
    PutText(#[source] opencv::Error),

    #[cfg(feature = "gui")]
    #[error("failed to show image")]
    ImShow(#[source] opencv::Error),

    #[cfg(feature = "tflite")]
    #[error("failed to convert Path to CString")]
    PathToCString(#[source] std::ffi::NulError),

    #[cfg(feature = "tflite")]
    #[error("failed to convert usize to i32")]
    GetFfiIndex(#[source] std::num::TryFromIntError),

    #[cfg(feature = "tflite")]
    #[error("failed to construct model from file: C API returned null pointer")]
    GetModelFromFile,

    #[cfg(feature = "tflite")]
    #[error("failed to create TfLiteInterpreterOptions structure")]
    CreateOptions,

    #[cfg(feature = "tflite")]
    #[error("failed to create interpreter, got null pointer")]
    CreateInterpreter,

    #[cfg(feature = "tflite")]
    #[error("got null pointer when constructing delegate")]
    ConstructDelegate,

    #[cfg(feature = "tflite")]
    #[error("failed to get input tensor: got null pointer instead")]
    GetInputTensor,

    #[cfg(feature = "tflite")]
    #[error("failed to get output tensor: got null pointer instead")]
    GetOutputTensor,

    #[cfg(feature = "tflite")]
    #[error("dimension index {0} is out of bounds for tensor with {1} dimensions")]
    GetDim(usize, usize),

    #[cfg(feature = "tflite")]
    #[error("failed to convert tensor dimension i32 to usize")]
    ConvertDimI32ToUSize(#[source] std::num::TryFromIntError),

    #[cfg(feature = "tflite")]
    #[error("tensor type {0:?} is not valid for this operation")]
    TensorType(tflite_sys::TfLiteType),

    #[cfg(feature = "tflite")]
    #[error("buffer of {actual} bytes does not match tensor of {expected} bytes")]
    TensorByteSize { expected: usize, actual: usize },

    #[cfg(feature = "tflite")]
    #[error("tflite error: {0}")]
    TfLite(&'static str),

    #[cfg(feature = "tflite")]
    #[error("tflite delegate error: {0}")]
    Delegate(&'static str),

    #[cfg(feature = "tflite")]
    #[error("tflite application error: {0}")]
    Application(&'static str),

    #[cfg(feature = "edgetpu")]
    #[error("failed to list edgetpu devices: got null pointer instead")]
    ListDevices,

    #[cfg(feature = "edgetpu")]
    #[error("no edgetpu device found")]
    GetEdgeTpuDevice,
}

impl Error {
    /// Whether the failure only affects the current frame.
    ///
    /// Transient errors are logged and the pipeline moves on to the next
    /// frame; anything else takes the engine or the session out of service.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::EmptyFrame(..)
            | Self::FrameStride { .. }
            | Self::FrameBufferTooSmall { .. }
            | Self::ConvertToF32
            | Self::ConstructInputTensor(_)
            | Self::UnexpectedOutputShape { .. }
            | Self::ReshapeOutput(_)
            | Self::InputMismatch { .. }
            | Self::NonContiguousInput => true,
            #[cfg(feature = "camera")]
            Self::ReadFrame(_)
            | Self::EmptyRead
            | Self::ConvertColor(_)
            | Self::GetMatData(_)
            | Self::ConvertMatDim(_) => true,
            #[cfg(feature = "tflite")]
            Self::TensorByteSize { .. } | Self::TfLite(_) => true,
            _ => false,
        }
    }
}

/// Check whether a pointer to const T is null.
#[cfg(feature = "tflite")]
pub(crate) fn check_null<T>(ptr: *const T) -> Option<*const T> {
    if ptr.is_null() {
        None
    } else {
        Some(ptr)
    }
}

/// Check whether a pointer to mut T is null.
#[cfg(feature = "tflite")]
pub(crate) fn check_null_mut<T>(ptr: *mut T) -> Option<*mut T> {
    if ptr.is_null() {
        None
    } else {
        Some(ptr)
    }
}

#[cfg(feature = "tflite")]
pub(crate) fn tflite_status_to_result(
    status: tflite_sys::TfLiteStatus,
    msg: &'static str,
) -> Result<(), Error> {
    match status {
        tflite_sys::TfLiteStatus::kTfLiteOk => Ok(()),
        tflite_sys::TfLiteStatus::kTfLiteDelegateError => Err(Error::Delegate(msg)),
        tflite_sys::TfLiteStatus::kTfLiteApplicationError => Err(Error::Application(msg)),
        _ => Err(Error::TfLite(msg)),
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn frame_errors_are_transient() {
        assert!(Error::FrameBufferTooSmall {
            expected: 16,
            actual: 4
        }
        .is_transient());
        assert!(Error::UnexpectedOutputShape {
            expected: 17,
            shape: vec![1, 6, 56]
        }
        .is_transient());
    }

    #[test]
    fn configuration_errors_are_not_transient() {
        assert!(!Error::ModelNotFound("missing.tflite".into()).is_transient());
        assert!(!Error::InvalidThreadCount { got: 0, max: 8 }.is_transient());
    }
}
