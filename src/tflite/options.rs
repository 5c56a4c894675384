use crate::{
    error::{check_null_mut, Error},
    tflite::Delegate,
    tflite_sys,
};
use std::os::raw::c_int;

/// Owned `TfLiteInterpreterOptions`.
pub(super) struct Options {
    options: *mut tflite_sys::TfLiteInterpreterOptions,
}

impl Options {
    pub(super) fn new() -> Result<Self, Error> {
        Ok(Self {
            options: check_null_mut(
                // SAFETY: API is guaranteed to return a valid pointer or null
                unsafe { tflite_sys::TfLiteInterpreterOptionsCreate() },
            )
            .ok_or(Error::CreateOptions)?,
        })
    }

    pub(super) fn set_num_threads(&mut self, threads: u8) {
        // SAFETY: self.options is a valid pointer
        unsafe {
            tflite_sys::TfLiteInterpreterOptionsSetNumThreads(self.options, c_int::from(threads));
        }
    }

    /// `delegate` must outlive any interpreter created from these options.
    pub(super) fn add_delegate(&mut self, delegate: &Delegate) {
        // SAFETY: self.options and delegate are both valid pointers
        unsafe {
            tflite_sys::TfLiteInterpreterOptionsAddDelegate(self.options, delegate.as_mut_ptr());
        }
    }

    pub(super) fn as_ptr(&self) -> *const tflite_sys::TfLiteInterpreterOptions {
        self.options
    }
}

impl Drop for Options {
    fn drop(&mut self) {
        // SAFETY: self.options is valid and only deleted here
        unsafe {
            tflite_sys::TfLiteInterpreterOptionsDelete(self.options);
        }
    }
}
