//! Process-lifetime cache of model sessions
//!
//! Sessions are keyed by model identifier and constructed lazily on first
//! use. Each key owns its own [`OnceCell`], so concurrent first requests for
//! the same model construct it once while requests for other models proceed
//! without waiting. A failed construction leaves the cell empty and a later
//! call retries.

use crate::error::{BgRemovalError, Result};
use crate::inference::{ModelSession, SessionFactory};
use crate::models::validate_model_id;
use instant::Instant;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

type SessionCell = Arc<OnceCell<Arc<dyn ModelSession>>>;

/// Default upper bound on a single session construction
pub const DEFAULT_SESSION_LOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Session cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionCacheStats {
    /// Number of constructed sessions currently cached
    pub total_sessions: usize,
    /// Lookups served from an already constructed session
    pub cache_hits: u64,
    /// Construction attempts, successful or not
    pub cache_misses: u64,
}

impl SessionCacheStats {
    /// Fraction of lookups served without construction
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Model session cache shared by all requests
#[derive(Debug)]
pub struct SessionCache {
    factory: Arc<dyn SessionFactory>,
    cells: Mutex<HashMap<String, SessionCell>>,
    load_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SessionCache {
    #[must_use]
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self::with_timeout(factory, DEFAULT_SESSION_LOAD_TIMEOUT)
    }

    #[must_use]
    pub fn with_timeout(factory: Arc<dyn SessionFactory>, load_timeout: Duration) -> Self {
        Self {
            factory,
            cells: Mutex::new(HashMap::new()),
            load_timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the session for `model_id`, constructing it on first use
    ///
    /// # Errors
    /// - `ModelLoad` when the identifier is invalid, construction fails,
    ///   panics, or exceeds the load timeout
    #[instrument(skip(self), fields(model_id = %model_id))]
    pub async fn get_session(&self, model_id: &str) -> Result<Arc<dyn ModelSession>> {
        validate_model_id(model_id)?;

        let cell = self.cell_for(model_id);
        if let Some(session) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Session cache hit");
            return Ok(Arc::clone(session));
        }

        let session = cell.get_or_try_init(|| self.construct(model_id)).await?;
        Ok(Arc::clone(session))
    }

    /// Identifiers with a constructed session, sorted
    #[must_use]
    pub fn cached_models(&self) -> Vec<String> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        let mut models: Vec<String> = cells
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        models.sort();
        models
    }

    /// Number of constructed sessions
    #[must_use]
    pub fn len(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.values().filter(|cell| cell.initialized()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> SessionCacheStats {
        SessionCacheStats {
            total_sessions: self.len(),
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn cell_for(&self, model_id: &str) -> SessionCell {
        // Held only long enough to fetch or insert the per-key cell
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(model_id.to_string()).or_default())
    }

    async fn construct(&self, model_id: &str) -> Result<Arc<dyn ModelSession>> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        info!(model_id, "Loading model");
        let start = Instant::now();

        let factory = Arc::clone(&self.factory);
        let id = model_id.to_string();
        let handle = tokio::task::spawn_blocking(move || factory.create_session(&id));

        let result = match tokio::time::timeout(self.load_timeout, handle).await {
            Ok(Ok(Ok(session))) => Ok(session),
            Ok(Ok(Err(e @ BgRemovalError::ModelLoad { .. }))) => Err(e),
            Ok(Ok(Err(e))) => Err(BgRemovalError::model_load(model_id, e.to_string())),
            Ok(Err(join_error)) => Err(BgRemovalError::model_load(
                model_id,
                format!("session construction aborted: {join_error}"),
            )),
            Err(_) => Err(BgRemovalError::model_load(
                model_id,
                format!("timed out after {}s", self.load_timeout.as_secs_f64()),
            )),
        };

        match &result {
            Ok(_) => info!(
                model_id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Model loaded"
            ),
            Err(e) => warn!(model_id, error = %e, "Model load failed"),
        }
        result
    }
}
