use crate::{
    engine::Backend,
    error::{check_null, check_null_mut, tflite_status_to_result, Error},
    tflite::{Delegate, Model, Options, Tensor, TensorMut},
    tflite_sys,
};
#[cfg(feature = "edgetpu")]
use crate::tflite::Devices;
use std::{convert::TryFrom, path::Path};
use tracing::debug;

pub(crate) struct Interpreter {
    interpreter: *mut tflite_sys::TfLiteInterpreter,
    // These fields are never accessed. They keep everything the interpreter
    // was built from alive for as long as it is.
    _options: Options,
    _model: Model,
    _delegates: Vec<Delegate>,
}

/// Delegates for `backend`, already registered with `options`.
fn delegates(backend: Backend, options: &mut Options) -> Result<Vec<Delegate>, Error> {
    match backend {
        Backend::Cpu => Ok(Vec::new()),
        #[cfg(feature = "edgetpu")]
        Backend::EdgeTpu => {
            let devices = Devices::new()?;
            let delegate = Delegate::try_from(&devices.first()?)?;
            options.add_delegate(&delegate);
            Ok(vec![delegate])
        }
        #[cfg(not(feature = "edgetpu"))]
        Backend::EdgeTpu => {
            let _ = options;
            Err(Error::BackendUnavailable(backend))
        }
    }
}

impl Interpreter {
    pub(crate) fn new(path: &Path, threads: u8, backend: Backend) -> Result<Self, Error> {
        let mut options = Options::new()?;
        options.set_num_threads(threads);
        let delegates = delegates(backend, &mut options)?;
        debug!(message = "interpreter options", threads, %backend, delegates = delegates.len());

        let model = Model::from_file(path)?;
        let interpreter = check_null_mut(
            // SAFETY: model and options are both valid pointers
            unsafe { tflite_sys::TfLiteInterpreterCreate(model.as_ptr(), options.as_ptr()) },
        )
        .ok_or(Error::CreateInterpreter)?;

        Ok(Self {
            interpreter,
            _options: options,
            _model: model,
            _delegates: delegates,
        })
    }

    pub(crate) fn allocate_tensors(&mut self) -> Result<(), Error> {
        tflite_status_to_result(
            // SAFETY: self.interpreter is valid
            unsafe { tflite_sys::TfLiteInterpreterAllocateTensors(self.interpreter) },
            "failed to allocate tensors",
        )
    }

    pub(crate) fn invoke(&mut self) -> Result<(), Error> {
        tflite_status_to_result(
            // SAFETY: self.interpreter is valid
            unsafe { tflite_sys::TfLiteInterpreterInvoke(self.interpreter) },
            "model invocation failed",
        )
    }

    pub(crate) fn input_tensor(&mut self, index: usize) -> Result<TensorMut<'_>, Error> {
        let index = i32::try_from(index).map_err(Error::GetFfiIndex)?;
        // SAFETY: self.interpreter is valid; the result is checked for null
        TensorMut::new(unsafe {
            tflite_sys::TfLiteInterpreterGetInputTensor(self.interpreter, index)
        })
    }

    pub(crate) fn output_tensor(&self, index: usize) -> Result<Tensor<'_>, Error> {
        let index = i32::try_from(index).map_err(Error::GetFfiIndex)?;
        Tensor::new(
            check_null(
                // SAFETY: self.interpreter is valid
                unsafe { tflite_sys::TfLiteInterpreterGetOutputTensor(self.interpreter, index) },
            )
            .ok_or(Error::GetOutputTensor)?,
        )
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        // SAFETY: self.interpreter is valid and deleted before the model,
        // options and delegates it was built from
        unsafe {
            tflite_sys::TfLiteInterpreterDelete(self.interpreter);
        }
    }
}
