//! Client metrics
//!
//! OpenTelemetry instruments recorded by sessions and watchers. They go to
//! whatever meter provider is installed globally, so nothing is exported
//! unless observability has been initialised.
//!
//! # Metrics Collected
//!
//! - **session.state**: current session state (gauge)
//! - **requests.total**: requests by facade, method and outcome (counter)
//! - **request.duration**: request latency in seconds (histogram)
//! - **errors.total**: classified errors by kind (counter)
//! - **frames.unmatched**: inbound frames that matched no pending request (counter)
//! - **watcher.batches**: delta batches delivered to consumers (counter)
//! - **watcher.records**: delta records delivered to consumers (counter)
//! - **retry.attempts**: watcher retries after transient failures (counter)

use crate::session_state::SessionState;
use modelwire_core::{ErrorKind, MethodDescriptor};
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

pub struct ClientMetrics {
    pub session_state: Gauge<u64>,
    pub requests_total: Counter<u64>,
    pub request_duration: Histogram<f64>,
    pub errors_total: Counter<u64>,
    pub unmatched_frames: Counter<u64>,
    pub watcher_batches: Counter<u64>,
    pub watcher_records: Counter<u64>,
    pub retry_attempts: Counter<u64>,
}

impl ClientMetrics {
    pub fn new(service_name: impl Into<String>) -> Self {
        // The global meter API wants a 'static scope name
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            session_state: meter
                .u64_gauge("modelwire.session.state")
                .with_description(
                    "Session state (0=closed, 1=unauthenticated, 2=authenticating, 3=authenticated)",
                )
                .build(),
            requests_total: meter
                .u64_counter("modelwire.requests.total")
                .with_description("Total number of requests sent")
                .build(),
            request_duration: meter
                .f64_histogram("modelwire.request.duration")
                .with_description("Request duration in seconds")
                .with_unit("s")
                .build(),
            errors_total: meter
                .u64_counter("modelwire.errors.total")
                .with_description("Classified errors returned to callers")
                .build(),
            unmatched_frames: meter
                .u64_counter("modelwire.frames.unmatched")
                .with_description("Inbound frames discarded without a pending request")
                .build(),
            watcher_batches: meter
                .u64_counter("modelwire.watcher.batches")
                .with_description("Delta batches delivered to watcher consumers")
                .build(),
            watcher_records: meter
                .u64_counter("modelwire.watcher.records")
                .with_description("Delta records delivered to watcher consumers")
                .build(),
            retry_attempts: meter
                .u64_counter("modelwire.retry.attempts")
                .with_description("Watcher retries after transient failures")
                .build(),
        }
    }

    pub fn update_session_state(&self, state: SessionState) {
        self.session_state.record(state.gauge_value(), &[]);
    }

    pub fn record_request(&self, descriptor: &MethodDescriptor, outcome: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("facade", descriptor.facade),
            KeyValue::new("method", descriptor.method),
            KeyValue::new("outcome", outcome.to_string()),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    pub fn record_error(&self, kind: ErrorKind) {
        self.errors_total
            .add(1, &[KeyValue::new("kind", kind.as_str())]);
    }

    pub fn record_unmatched_frame(&self, reason: &'static str) {
        self.unmatched_frames
            .add(1, &[KeyValue::new("reason", reason)]);
    }

    pub fn record_batch(&self, records: usize) {
        self.watcher_batches.add(1, &[]);
        self.watcher_records.add(records as u64, &[]);
    }

    pub fn record_retry(&self) {
        self.retry_attempts.add(1, &[]);
    }
}
