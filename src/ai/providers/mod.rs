//! Inference provider drivers.
//!
//! - [`CloudDriver`]: OpenAI-compatible remote APIs
//! - [`LocalDriver`]: Ollama-style on-device model server

pub mod cloud;
pub mod local;

pub use cloud::CloudDriver;
pub use local::LocalDriver;
