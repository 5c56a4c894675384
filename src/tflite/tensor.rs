use crate::{
    error::{check_null, tflite_status_to_result, Error},
    tflite_sys,
};
use num_traits::ToPrimitive;
use std::{convert::TryFrom, marker::PhantomData, mem::size_of};

/// Rust types with a TensorFlow Lite tensor type.
pub(crate) trait TensorElement: Copy {
    const TYPE: tflite_sys::TfLiteType;
}

impl TensorElement for f32 {
    const TYPE: tflite_sys::TfLiteType = tflite_sys::TfLiteType::kTfLiteFloat32;
}

impl TensorElement for u8 {
    const TYPE: tflite_sys::TfLiteType = tflite_sys::TfLiteType::kTfLiteUInt8;
}

fn num_dims(tensor: *const tflite_sys::TfLiteTensor) -> Result<usize, Error> {
    // SAFETY: tensor is non-null and owned by a live interpreter
    usize::try_from(unsafe { tflite_sys::TfLiteTensorNumDims(tensor) })
        .map_err(Error::ConvertDimI32ToUSize)
}

fn dim(tensor: *const tflite_sys::TfLiteTensor, index: usize) -> Result<usize, Error> {
    let dims = num_dims(tensor)?;
    if index >= dims {
        return Err(Error::GetDim(index, dims));
    }
    let index = i32::try_from(index).map_err(Error::GetFfiIndex)?;
    // SAFETY: tensor is valid and index is in bounds
    usize::try_from(unsafe { tflite_sys::TfLiteTensorDim(tensor, index) })
        .map_err(Error::ConvertDimI32ToUSize)
}

fn shape(tensor: *const tflite_sys::TfLiteTensor) -> Result<Vec<usize>, Error> {
    (0..num_dims(tensor)?).map(|d| dim(tensor, d)).collect()
}

fn tensor_type(tensor: *const tflite_sys::TfLiteTensor) -> tflite_sys::TfLiteType {
    // SAFETY: tensor is valid
    unsafe { tflite_sys::TfLiteTensorType(tensor) }
}

fn byte_size(tensor: *const tflite_sys::TfLiteTensor) -> usize {
    // SAFETY: tensor is valid
    unsafe { tflite_sys::TfLiteTensorByteSize(tensor) }
}

/// Read-only view of an interpreter output tensor.
pub(crate) struct Tensor<'interp> {
    tensor: *const tflite_sys::TfLiteTensor,
    // data are owned by the interpreter that allocated the tensor
    _p: PhantomData<&'interp ()>,
}

impl<'interp> Tensor<'interp> {
    pub(super) fn new(tensor: *const tflite_sys::TfLiteTensor) -> Result<Self, Error> {
        Ok(Self {
            tensor: check_null(tensor).ok_or(Error::GetOutputTensor)?,
            _p: PhantomData,
        })
    }

    pub(crate) fn r#type(&self) -> tflite_sys::TfLiteType {
        tensor_type(self.tensor)
    }

    pub(crate) fn shape(&self) -> Result<Vec<usize>, Error> {
        shape(self.tensor)
    }

    fn copy_to_vec<T>(&self) -> Result<Vec<T>, Error>
    where
        T: TensorElement + Default,
    {
        let typ = self.r#type();
        if typ != T::TYPE {
            return Err(Error::TensorType(typ));
        }
        let bytes = byte_size(self.tensor);
        let mut values = vec![T::default(); bytes / size_of::<T>()];
        tflite_status_to_result(
            // SAFETY: values holds exactly `bytes` bytes of T
            unsafe {
                tflite_sys::TfLiteTensorCopyToBuffer(self.tensor, values.as_mut_ptr() as _, bytes)
            },
            "failed to copy output tensor",
        )?;
        Ok(values)
    }

    /// Tensor values as f32. Quantized uint8 outputs are dequantized with the
    /// tensor's scale and zero point.
    pub(crate) fn to_f32_vec(&self) -> Result<Vec<f32>, Error> {
        match self.r#type() {
            tflite_sys::TfLiteType::kTfLiteFloat32 => self.copy_to_vec::<f32>(),
            tflite_sys::TfLiteType::kTfLiteUInt8 => {
                // SAFETY: tensor is valid
                let tflite_sys::TfLiteQuantizationParams { scale, zero_point } =
                    unsafe { tflite_sys::TfLiteTensorQuantizationParams(self.tensor) };
                let zero_point = zero_point.to_f32().ok_or(Error::ConvertToF32)?;
                Ok(self
                    .copy_to_vec::<u8>()?
                    .into_iter()
                    .map(|value| (f32::from(value) - zero_point) * scale)
                    .collect())
            }
            other => Err(Error::TensorType(other)),
        }
    }
}

/// Writable view of an interpreter input tensor.
pub(crate) struct TensorMut<'interp> {
    tensor: *mut tflite_sys::TfLiteTensor,
    _p: PhantomData<&'interp mut ()>,
}

impl<'interp> TensorMut<'interp> {
    pub(super) fn new(tensor: *mut tflite_sys::TfLiteTensor) -> Result<Self, Error> {
        if tensor.is_null() {
            return Err(Error::GetInputTensor);
        }
        Ok(Self {
            tensor,
            _p: PhantomData,
        })
    }

    pub(crate) fn r#type(&self) -> tflite_sys::TfLiteType {
        tensor_type(self.tensor)
    }

    pub(crate) fn shape(&self) -> Result<Vec<usize>, Error> {
        shape(self.tensor)
    }

    /// Copy `values` into the tensor. Type and byte size must match exactly.
    pub(crate) fn copy_from_slice<T>(&mut self, values: &[T]) -> Result<(), Error>
    where
        T: TensorElement,
    {
        let typ = self.r#type();
        if typ != T::TYPE {
            return Err(Error::TensorType(typ));
        }
        let expected = byte_size(self.tensor);
        let actual = values.len() * size_of::<T>();
        if expected != actual {
            return Err(Error::TensorByteSize { expected, actual });
        }
        tflite_status_to_result(
            // SAFETY: values is valid for `actual` bytes, which equals the tensor size
            unsafe {
                tflite_sys::TfLiteTensorCopyFromBuffer(self.tensor, values.as_ptr() as _, actual)
            },
            "failed to copy input tensor",
        )
    }
}
