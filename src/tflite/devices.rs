use crate::{error::Error, tflite_sys};
use std::{marker::PhantomData, os::raw::c_char};

/// Edge TPU devices visible to libedgetpu.
pub(super) struct Devices {
    devices: *mut tflite_sys::edgetpu_device,
    len: usize,
}

pub(super) struct Device<'a> {
    device: *const tflite_sys::edgetpu_device,
    _p: PhantomData<&'a Devices>,
}

impl<'a> Device<'a> {
    pub(super) fn r#type(&self) -> tflite_sys::edgetpu_device_type {
        // SAFETY: self.device points into the live device list
        unsafe { (*self.device).type_ }
    }

    pub(super) fn path_ptr(&self) -> *const c_char {
        // SAFETY: self.device points into the live device list
        unsafe { (*self.device).path }
    }
}

impl Devices {
    pub(super) fn new() -> Result<Self, Error> {
        let mut len: usize = 0;
        // SAFETY: len is a valid out pointer
        let devices = unsafe { tflite_sys::edgetpu_list_devices(&mut len) };
        if devices.is_null() {
            return Err(Error::ListDevices);
        }
        Ok(Self { devices, len })
    }

    pub(super) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(super) fn first(&self) -> Result<Device<'_>, Error> {
        if self.is_empty() {
            return Err(Error::GetEdgeTpuDevice);
        }
        Ok(Device {
            device: self.devices,
            _p: PhantomData,
        })
    }
}

impl Drop for Devices {
    fn drop(&mut self) {
        // SAFETY: self.devices came from edgetpu_list_devices and is freed once
        unsafe {
            tflite_sys::edgetpu_free_devices(self.devices);
        }
    }
}
