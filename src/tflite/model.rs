use crate::{
    error::{check_null_mut, Error},
    tflite_sys,
};
use std::{ffi::CString, os::unix::ffi::OsStrExt, path::Path};

/// An owned `TfLiteModel` loaded from a flatbuffer file.
pub(super) struct Model {
    /// SAFETY: `model` is owned and not mutated by any other APIs here
    /// or in TFLite.
    model: *mut tflite_sys::TfLiteModel,
}

fn path_to_c_string(path: &Path) -> Result<CString, Error> {
    CString::new(path.as_os_str().as_bytes()).map_err(Error::PathToCString)
}

impl Model {
    pub(super) fn from_file(path: &Path) -> Result<Self, Error> {
        let path = path_to_c_string(path)?;
        // SAFETY: path.as_ptr() is a valid nul-terminated string for the call
        let model = check_null_mut(unsafe { tflite_sys::TfLiteModelCreateFromFile(path.as_ptr()) })
            .ok_or(Error::GetModelFromFile)?;
        Ok(Self { model })
    }

    // SAFETY: the returned pointer must not be deallocated
    pub(super) fn as_ptr(&self) -> *const tflite_sys::TfLiteModel {
        self.model
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        // SAFETY: self.model is valid and only deleted here
        unsafe {
            tflite_sys::TfLiteModelDelete(self.model);
        }
    }
}
