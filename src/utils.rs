/// Utility functions and helpers for SMS operations
///
/// This module contains input validation, operation timing and send metrics.

use std::time::{Duration, Instant};
use log::{debug, info, warn};
use crate::error::{SmsError, SmsResult};

/// Performance metrics for send operations
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_duration: Duration,
    pub min_duration: Option<Duration>,
    pub max_duration: Option<Duration>,
    pub avg_duration: Duration,
}

impl PerformanceMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful operation
    pub fn record_success(&mut self, duration: Duration) {
        self.successful_requests += 1;
        self.record(duration);
    }

    /// Record a failed operation
    pub fn record_failure(&mut self, duration: Duration) {
        self.failed_requests += 1;
        self.record(duration);
    }

    fn record(&mut self, duration: Duration) {
        self.total_requests += 1;
        self.total_duration += duration;

        self.min_duration = Some(
            self.min_duration.map_or(duration, |min| min.min(duration))
        );
        self.max_duration = Some(
            self.max_duration.map_or(duration, |max| max.max(duration))
        );

        self.avg_duration = self.total_duration / self.total_requests as u32;
    }

    /// Get success rate as percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        (self.successful_requests as f64 / self.total_requests as f64) * 100.0
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Timer for measuring operation duration
pub struct OperationTimer {
    start: Instant,
    operation_name: String,
}

impl OperationTimer {
    /// Start a new timer
    pub fn start(operation_name: &str) -> Self {
        debug!("Starting operation: {}", operation_name);
        Self {
            start: Instant::now(),
            operation_name: operation_name.to_string(),
        }
    }

    /// Stop the timer and return duration
    pub fn stop(self) -> Duration {
        let duration = self.start.elapsed();
        debug!("Operation '{}' completed in {:?}", self.operation_name, duration);
        duration
    }

    /// Stop timer and log result
    pub fn stop_and_log(self, success: bool) -> Duration {
        let duration = self.start.elapsed();
        if success {
            info!("Operation '{}' succeeded in {:?}", self.operation_name, duration);
        } else {
            warn!("Operation '{}' failed after {:?}", self.operation_name, duration);
        }
        duration
    }
}

/// Data validation utilities
pub mod validation {
    use super::*;

    /// Longest destination address accepted
    pub const MAX_DESTINATION_LENGTH: usize = 20;

    /// Validate a destination address: optional leading `+`, then digits only
    pub fn validate_destination(destination: &str) -> SmsResult<()> {
        if destination.is_empty() {
            return Err(SmsError::validation("Phone number cannot be empty"));
        }
        if destination.len() > MAX_DESTINATION_LENGTH {
            return Err(SmsError::validation(format!(
                "Phone number too long ({} characters, max {})",
                destination.len(),
                MAX_DESTINATION_LENGTH
            )));
        }

        let digits = destination.strip_prefix('+').unwrap_or(destination);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SmsError::validation(format!("Invalid phone number: {}", destination)));
        }
        Ok(())
    }
}
