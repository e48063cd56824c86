//! # Application State Management
//!
//! Shared state handed to every HTTP request handler.
//!
//! ## What lives here:
//! - **config**: the loaded configuration (read-only after startup)
//! - **limiter**: the slot pool that caps concurrent transcriptions
//! - **saver** / **transcriber**: the temp file store and the conversion worker,
//!   behind traits so tests can swap them out
//! - **metrics**: request counters updated by middleware and handlers
//!
//! ## Thread Safety:
//! Cloning `AppState` is cheap; every clone points at the same limiter, services
//! and metrics. The metrics use `Arc<RwLock<T>>` because every request writes them.

use crate::config::AppConfig;
use crate::limiter::SlotLimiter;
use crate::storage::FileSaver;
use crate::transcription::Transcriber;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub limiter: SlotLimiter,
    pub saver: Arc<dyn FileSaver>,
    pub transcriber: Arc<dyn Transcriber>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub start_time: Instant,
}

/// Counters collected across all requests since startup.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed
    pub request_count: u64,

    /// Requests answered with a 4xx or 5xx status
    pub error_count: u64,

    /// Transcribe requests turned away because no slot freed up in time
    pub busy_rejections: u64,

    /// Transcriptions the tool itself rejected (answered with 200 + error field)
    pub transcription_failures: u64,

    /// Key: "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Per-endpoint request statistics.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        limiter: SlotLimiter,
        saver: Arc<dyn FileSaver>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            limiter,
            saver,
            transcriber,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    // A panic while holding the lock leaves plain counters behind, which are
    // still fine to read and update.
    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn increment_request_count(&self) {
        self.metrics_write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics_write().error_count += 1;
    }

    pub fn increment_busy_rejections(&self) {
        self.metrics_write().busy_rejections += 1;
    }

    pub fn increment_transcription_failures(&self) {
        self.metrics_write().transcription_failures += 1;
    }

    /// Record one finished request for `endpoint` (e.g. "POST /transcribe").
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Copy of the current counters, so no lock is held while responding.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of failed requests, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metric_rates() {
        let metric = EndpointMetric {
            request_count: 4,
            total_duration_ms: 100,
            error_count: 1,
        };
        assert_eq!(metric.average_duration_ms(), 25.0);
        assert_eq!(metric.error_rate(), 0.25);
        assert_eq!(EndpointMetric::default().error_rate(), 0.0);
    }
}
