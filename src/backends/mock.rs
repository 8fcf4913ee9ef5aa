//! Deterministic in-process backend for tests and local development
//!
//! The mock session treats every pixel whose RGB equals the top-left pixel
//! as background and makes it fully transparent; all other pixels keep their
//! colour and input alpha. Construction counts are tracked per model so
//! callers can verify session caching.

use crate::error::{BgRemovalError, Result};
use crate::inference::{ModelSession, SessionFactory};
use image::{ImageFormat, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// What a mock session returns from `remove`
#[derive(Debug, Clone, Default)]
pub enum MockOutput {
    /// Key out the top-left colour and return a PNG
    #[default]
    KeyedBackground,
    /// Return these bytes verbatim
    Fixed(Vec<u8>),
}

/// Mock session factory with construction accounting
#[derive(Debug, Default)]
pub struct MockSessionFactory {
    constructions: Mutex<HashMap<String, usize>>,
    call_history: Arc<Mutex<Vec<String>>>,
    failing_loads: AtomicUsize,
    load_delay: Option<Duration>,
    should_fail_removal: bool,
    output: MockOutput,
}

impl MockSessionFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` constructions with `ModelLoad`
    #[must_use]
    pub fn with_failing_loads(self, count: usize) -> Self {
        self.failing_loads.store(count, Ordering::SeqCst);
        self
    }

    /// Sleep for `delay` inside every construction
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Make every session fail removal with `RemovalBackend`
    #[must_use]
    pub fn with_failing_removal(mut self) -> Self {
        self.should_fail_removal = true;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: MockOutput) -> Self {
        self.output = output;
        self
    }

    /// Successful constructions for `model_id`
    pub fn construction_count(&self, model_id: &str) -> usize {
        let constructions = self.constructions.lock().unwrap_or_else(PoisonError::into_inner);
        constructions.get(model_id).copied().unwrap_or(0)
    }

    /// Successful constructions across all models
    pub fn total_constructions(&self) -> usize {
        let constructions = self.constructions.lock().unwrap_or_else(PoisonError::into_inner);
        constructions.values().sum()
    }

    /// Model identifiers passed to `remove`, in call order
    pub fn removal_history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take_failure(&self) -> bool {
        self.failing_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl SessionFactory for MockSessionFactory {
    fn create_session(&self, model_id: &str) -> Result<Arc<dyn ModelSession>> {
        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }

        if self.take_failure() {
            return Err(BgRemovalError::model_load(
                model_id,
                "mock backend configured to fail",
            ));
        }

        {
            let mut constructions = self.constructions.lock().unwrap_or_else(PoisonError::into_inner);
            *constructions.entry(model_id.to_string()).or_insert(0) += 1;
        }

        Ok(Arc::new(MockSession {
            model_id: model_id.to_string(),
            call_history: Arc::clone(&self.call_history),
            should_fail_removal: self.should_fail_removal,
            output: self.output.clone(),
        }))
    }
}

/// Session produced by [`MockSessionFactory`]
#[derive(Debug)]
pub struct MockSession {
    model_id: String,
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_removal: bool,
    output: MockOutput,
}

impl MockSession {
    fn record_call(&self) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(self.model_id.clone());
        }
    }
}

impl ModelSession for MockSession {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn remove(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        self.record_call();

        if self.should_fail_removal {
            return Err(BgRemovalError::removal_backend("mock removal failed"));
        }

        match &self.output {
            MockOutput::Fixed(bytes) => Ok(bytes.clone()),
            MockOutput::KeyedBackground => {
                let image = image::load_from_memory(image_bytes)
                    .map_err(|e| BgRemovalError::decode(e.to_string()))?;
                let keyed = key_out_background(image.to_rgba8());

                let mut buffer = Vec::new();
                keyed
                    .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                    .map_err(|e| BgRemovalError::removal_backend(format!("PNG encoding failed: {e}")))?;
                Ok(buffer)
            },
        }
    }
}

/// Make pixels matching the top-left colour fully transparent
#[must_use]
pub fn key_out_background(mut image: RgbaImage) -> RgbaImage {
    let Some(&corner) = image.get_pixel_checked(0, 0) else {
        return image;
    };

    for pixel in image.pixels_mut() {
        if pixel.0[..3] == corner.0[..3] {
            pixel.0[3] = 0;
        }
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn encode_png(image: &RgbaImage) -> Vec<u8> {
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_key_out_background() {
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        image.put_pixel(1, 1, Rgba([10, 20, 30, 128]));

        let keyed = key_out_background(image);
        assert_eq!(keyed.get_pixel(0, 0).0[3], 0);
        assert_eq!(keyed.get_pixel(3, 3).0[3], 0);
        assert_eq!(*keyed.get_pixel(1, 1), Rgba([10, 20, 30, 128]));
    }

    #[test]
    fn test_session_removal() {
        let factory = MockSessionFactory::new();
        let session = factory.create_session("u2net").unwrap();

        let mut image = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255]));
        image.put_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let output = session.remove(&encode_png(&image)).unwrap();

        let decoded = image::load_from_memory(&output).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (8, 8));
        assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
        assert_eq!(decoded.get_pixel(4, 4).0[3], 255);
        assert_eq!(factory.removal_history(), vec!["u2net".to_string()]);
    }

    #[test]
    fn test_failure_modes() {
        let factory = MockSessionFactory::new().with_failing_loads(2);
        assert!(factory.create_session("u2net").is_err());
        assert!(factory.create_session("u2net").is_err());
        assert!(factory.create_session("u2net").is_ok());
        assert_eq!(factory.construction_count("u2net"), 1);

        let factory = MockSessionFactory::new().with_failing_removal();
        let session = factory.create_session("u2net").unwrap();
        assert!(matches!(
            session.remove(b"anything"),
            Err(BgRemovalError::RemovalBackend(_))
        ));
    }

    #[test]
    fn test_fixed_output() {
        let factory = MockSessionFactory::new().with_output(MockOutput::Fixed(b"garbage".to_vec()));
        let session = factory.create_session("u2net").unwrap();
        assert_eq!(session.remove(b"ignored").unwrap(), b"garbage".to_vec());
    }
}
