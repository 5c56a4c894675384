use crate::{
    decode::Decoder,
    engine::{EngineConfig, InferenceEngine},
    error::Error,
    preprocess::{InputRange, InputSpec, InputTensor},
    tflite::Interpreter,
    tflite_sys,
};
use ndarray::{ArrayD, IxDyn};
use tracing::{info, instrument};

/// MoveNet single-pose running on the TensorFlow Lite C API.
pub struct TfliteEngine {
    interpreter: Interpreter,
    spec: InputSpec,
    output_shape: Vec<usize>,
}

// SAFETY: the interpreter is only ever used by one thread at a time; the
// pipeline serializes every call behind a mutex.
unsafe impl Send for TfliteEngine {}

impl TfliteEngine {
    /// Load the model selected by `config` and allocate its tensors.
    ///
    /// Fails if the model is missing or its tensors don't match the single-pose
    /// keypoint contract.
    #[instrument(name = "TfliteEngine::new", skip(config), fields(model = %config.model_path().display()))]
    pub fn new(config: &EngineConfig) -> Result<Self, Error> {
        config.validate()?;
        let path = config.existing_model_path()?;
        let mut interpreter = Interpreter::new(&path, config.threads, config.backend)?;
        interpreter.allocate_tensors()?;

        let (spec, input_shape) = {
            let input = interpreter.input_tensor(0)?;
            let range = match input.r#type() {
                tflite_sys::TfLiteType::kTfLiteFloat32 => InputRange::UnitFloat,
                tflite_sys::TfLiteType::kTfLiteUInt8 => InputRange::Byte,
                other => return Err(Error::TensorType(other)),
            };
            let shape = input.shape()?;
            let spec = InputSpec {
                size: shape.get(1).copied().unwrap_or(0),
                range,
            };
            if shape[..] != spec.shape()[..] || spec.size == 0 {
                return Err(Error::InputMismatch {
                    expected: InputSpec {
                        size: config.variant.input_size(),
                        range,
                    },
                    actual: shape,
                });
            }
            (spec, shape)
        };

        let output_shape = interpreter.output_tensor(0)?.shape()?;
        Decoder.validate_output_shape(&output_shape)?;

        info!(
            message = "loaded model",
            variant = %config.variant,
            backend = %config.backend,
            threads = config.threads,
            input = ?input_shape,
            output = ?output_shape
        );

        Ok(Self {
            interpreter,
            spec,
            output_shape,
        })
    }
}

impl InferenceEngine for TfliteEngine {
    fn input_spec(&self) -> InputSpec {
        self.spec
    }

    fn infer(&mut self, input: &InputTensor) -> Result<ArrayD<f32>, Error> {
        {
            let mut tensor = self.interpreter.input_tensor(0)?;
            match input {
                InputTensor::Float32(array) => tensor
                    .copy_from_slice(array.as_slice().ok_or(Error::NonContiguousInput)?)?,
                InputTensor::UInt8(array) => tensor
                    .copy_from_slice(array.as_slice().ok_or(Error::NonContiguousInput)?)?,
            }
        }
        self.interpreter.invoke()?;

        let values = self.interpreter.output_tensor(0)?.to_f32_vec()?;
        ArrayD::from_shape_vec(IxDyn(&self.output_shape), values).map_err(Error::ReshapeOutput)
    }
}
