//! Embed descriptive metadata into TensorFlow Lite models.
//!
//! The [`tflite`] module implements the TFLite metadata container format
//! directly; [`attach`] wires it to the fixed paths and record used by the
//! `add-metadata` binary.

pub mod attach;
pub mod error;
pub mod tflite;

pub use error::MetadataError;
