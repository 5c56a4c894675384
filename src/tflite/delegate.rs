use crate::{
    error::{check_null, Error},
    tflite_sys,
};
#[cfg(feature = "edgetpu")]
use crate::{error::check_null_mut, tflite::devices::Device};
#[cfg(feature = "edgetpu")]
use std::convert::TryFrom;

/// A TensorFlow Lite delegate and the function that frees it.
pub(super) struct Delegate {
    delegate: *const tflite_sys::TfLiteDelegate,
    deleter: Box<dyn FnMut(*mut tflite_sys::TfLiteDelegate)>,
}

#[cfg(feature = "edgetpu")]
impl<'a> TryFrom<&Device<'a>> for Delegate {
    type Error = Error;

    fn try_from(device: &Device<'a>) -> Result<Self, Self::Error> {
        Self::new(
            check_null_mut(
                // SAFETY: device type and path come from edgetpu_list_devices, no
                // options are passed, and the return value is checked for null
                unsafe {
                    tflite_sys::edgetpu_create_delegate(
                        device.r#type(),
                        device.path_ptr(),
                        std::ptr::null(),
                        0,
                    )
                },
            )
            .ok_or(Error::ConstructDelegate)?,
            |delegate| unsafe { tflite_sys::edgetpu_free_delegate(delegate) },
        )
    }
}

impl Delegate {
    pub(super) fn new<D>(
        delegate: *const tflite_sys::TfLiteDelegate,
        deleter: D,
    ) -> Result<Self, Error>
    where
        D: FnMut(*mut tflite_sys::TfLiteDelegate) + 'static,
    {
        Ok(Self {
            delegate: check_null(delegate).ok_or(Error::ConstructDelegate)?,
            deleter: Box::new(deleter),
        })
    }

    pub(super) fn as_mut_ptr(&self) -> *mut tflite_sys::TfLiteDelegate {
        self.delegate as _
    }
}

impl Drop for Delegate {
    fn drop(&mut self) {
        (self.deleter)(self.delegate as _)
    }
}
