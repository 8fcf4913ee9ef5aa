//! Background removal backends
//!
//! - Tract backend (pure Rust ONNX inference)
//! - Mock backend (deterministic, used by tests and local development)

pub mod mock;

#[cfg(feature = "tract")]
pub mod tract;

pub use self::mock::{MockOutput, MockSession, MockSessionFactory};

#[cfg(feature = "tract")]
pub use self::tract::{TractSession, TractSessionFactory};
