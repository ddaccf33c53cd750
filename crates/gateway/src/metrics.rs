use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::time::Duration;

/// Prediction metrics, recorded through the global meter provider.
///
/// Without an OTLP endpoint the global provider is a no-op.
#[derive(Clone)]
pub struct PredictMetrics {
    duration: Histogram<f64>,
    requests: Counter<u64>,
    plates: Counter<u64>,
}

impl PredictMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0, 10.0,
        ];

        Self {
            duration: meter
                .f64_histogram("predict_duration_seconds")
                .with_description("Time to answer a prediction request (decode + detect + OCR)")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            requests: meter
                .u64_counter("predict_requests_total")
                .with_description("Prediction requests by outcome")
                .build(),
            plates: meter
                .u64_counter("plates_detected_total")
                .with_description("Total plates returned")
                .build(),
        }
    }

    pub fn record_success(&self, elapsed: Duration, plates: usize) {
        self.duration
            .record(elapsed.as_secs_f64(), &[KeyValue::new("outcome", "success")]);
        self.requests.add(1, &[KeyValue::new("outcome", "success")]);
        self.plates.add(plates as u64, &[]);
    }

    pub fn record_failure(&self, elapsed: Duration, outcome: &'static str) {
        self.duration
            .record(elapsed.as_secs_f64(), &[KeyValue::new("outcome", outcome)]);
        self.requests.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}
