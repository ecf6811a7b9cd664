//! # Application State Management
//!
//! Shared state handed to every HTTP handler and every media socket:
//! configuration, the pipeline services each call is built from, optional
//! telephony REST client, and process-wide call metrics.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc<RwLock<T>> Pattern
//! - **Arc**: many handlers and call sessions hold the same metrics
//! - **RwLock**: many readers (health checks) or one writer (a counter update)
//! - Locks are held only for a field update or a snapshot copy, never across an
//!   `.await`
//!
//! ## Isolation between calls:
//! Sessions never share mutable per-call data. The only thing they touch in
//! common is `SharedMetrics`, which is append-only counting.

use crate::config::AppConfig;
use crate::pipeline::PipelineServices;
use crate::telephony::twilio::TwilioClient;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// Process-wide counters describing call traffic.
///
/// ## Rust Concepts:
/// - **#[derive(Default)]**: all counters start at zero
/// - **#[derive(Serialize)]**: the metrics endpoint returns this struct as JSON
#[derive(Debug, Default, Clone, Serialize)]
pub struct AppMetrics {
    pub calls_started: u64,
    pub active_calls: u64,
    pub calls_rejected: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub transcripts_final: u64,
    pub transcripts_interim: u64,
    pub transcripts_superseded: u64,
    pub turns_completed: u64,
    pub turns_aborted: u64,
    pub turns_discarded: u64,
    pub generation_fallbacks: u64,
    pub recognition_failures: u64,
    pub recognition_teardowns: u64,
    pub format_violations: u64,
    pub outbound_bytes: u64,
}

/// Cloneable handle to the metrics, passed into every call session.
#[derive(Debug, Clone, Default)]
pub struct SharedMetrics {
    inner: Arc<RwLock<AppMetrics>>,
}

impl SharedMetrics {
    /// Apply an update under the write lock.
    ///
    /// ## Usage:
    /// ```ignore
    /// metrics.record(|m| m.turns_completed += 1);
    /// ```
    pub fn record<F>(&self, update: F)
    where
        F: FnOnce(&mut AppMetrics),
    {
        let mut metrics = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut metrics);
    }

    /// Copy of the current counters.
    pub fn snapshot(&self) -> AppMetrics {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reserve a call slot, refusing once `limit` calls are active.
    ///
    /// The check and the increment happen under one write lock so two
    /// simultaneous upgrades cannot both squeeze into the last slot.
    pub fn try_begin_call(&self, limit: usize) -> bool {
        let mut metrics = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if metrics.active_calls >= limit as u64 {
            metrics.calls_rejected += 1;
            return false;
        }
        metrics.active_calls += 1;
        metrics.calls_started += 1;
        true
    }

    /// Release a call slot reserved by `try_begin_call`.
    pub fn end_call(&self) {
        self.record(|m| m.active_calls = m.active_calls.saturating_sub(1));
    }
}

/// The state shared across all handlers.
///
/// ## Rust Concepts:
/// - **#[derive(Clone)]**: every field is an `Arc` or cheap handle, so cloning
///   the state for each actix worker is just reference counting
#[derive(Clone)]
pub struct AppState {
    /// Configuration as loaded at startup (read-only afterwards)
    pub config: Arc<AppConfig>,

    /// Everything a call session is built from
    pub services: PipelineServices,

    /// `None` when telephony credentials are not configured
    pub twilio: Option<TwilioClient>,

    /// Call metrics, shared with the sessions
    pub metrics: SharedMetrics,

    /// When the server started
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        services: PipelineServices,
        twilio: Option<TwilioClient>,
    ) -> Self {
        let metrics = services.metrics.clone();
        Self {
            config: Arc::new(config),
            services,
            twilio,
            metrics,
            start_time: Instant::now(),
        }
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.snapshot()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
