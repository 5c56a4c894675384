//! Single-person pose estimation for live camera feeds.
//!
//! Frames flow from a [`camera::Session`] into a [`pipeline::Coordinator`],
//! which keeps one inference in flight, decodes MoveNet keypoints and
//! publishes [`pipeline::InferenceResult`]s. [`overlay`] turns a result into
//! dots and lines aligned to an aspect-fit video viewport.

pub mod camera;
pub mod decode;
pub mod engine;
pub mod error;
pub mod frame;
pub mod overlay;
pub mod pipeline;
pub mod pose;
pub mod preprocess;

#[cfg(feature = "tflite")]
pub mod tflite;
#[cfg(feature = "tflite")]
mod tflite_sys;

pub use error::Error;
