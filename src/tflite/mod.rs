mod model;
use model::Model;

mod tensor;
use tensor::{Tensor, TensorMut};

mod delegate;
use delegate::Delegate;

#[cfg(feature = "edgetpu")]
mod devices;
#[cfg(feature = "edgetpu")]
use devices::Devices;

mod interpreter;
use interpreter::Interpreter;

mod options;
use options::Options;

mod engine;
pub use engine::TfliteEngine;
