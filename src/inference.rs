//! Background removal backend boundary

use crate::error::Result;
use std::sync::Arc;

/// A loaded background removal model bound to one identifier
///
/// Sessions are expensive to construct and are shared across requests, so
/// implementations must be usable from several threads at once. `remove`
/// is synchronous and is always called from the blocking pool.
pub trait ModelSession: Send + Sync + std::fmt::Debug {
    /// Identifier the session was constructed for
    fn model_id(&self) -> &str;

    /// Remove the background from encoded image bytes
    ///
    /// Returns encoded image bytes carrying an alpha channel.
    ///
    /// # Errors
    /// - `RemovalBackend` when inference fails or produces no output
    /// - `Decode` when the input cannot be read
    fn remove(&self, image_bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Factory for model sessions, injected into the session cache
pub trait SessionFactory: Send + Sync + std::fmt::Debug {
    /// Construct a session for `model_id`
    ///
    /// # Errors
    /// - `ModelLoad` when the model cannot be found or initialised
    fn create_session(&self, model_id: &str) -> Result<Arc<dyn ModelSession>>;
}
