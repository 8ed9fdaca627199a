//! Serving metrics, registered in the prometheus default registry and exposed by the health server.

use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge, HistogramVec, IntCounter, IntCounterVec, IntGauge};

pub struct ServingMetrics {
    pub predictions_total: IntCounterVec,
    pub validation_rejections_total: IntCounterVec,
    pub predict_latency_ms: HistogramVec,
    pub model_version: IntGauge,
    pub swaps_total: IntCounter,
    pub refresh_total: IntCounterVec,
}

pub static SERVING_METRICS: Lazy<ServingMetrics> = Lazy::new(|| ServingMetrics {
    predictions_total: register_int_counter_vec!("hitserve_predictions_total", "Predictions served by protocol and label", &["protocol", "label"])
        .expect("register hitserve_predictions_total"),
    validation_rejections_total: register_int_counter_vec!("hitserve_validation_rejections_total", "Requests rejected at input validation", &["protocol"])
        .expect("register hitserve_validation_rejections_total"),
    predict_latency_ms: register_histogram_vec!("hitserve_predict_latency_ms", "Validate + score latency (ms)", &["protocol"], vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
        .expect("register hitserve_predict_latency_ms"),
    model_version: register_int_gauge!("hitserve_model_version", "Version of the model currently served")
        .expect("register hitserve_model_version"),
    swaps_total: register_int_counter!("hitserve_swaps_total", "Successful model swaps")
        .expect("register hitserve_swaps_total"),
    refresh_total: register_int_counter_vec!("hitserve_refresh_total", "Refresh attempts by outcome", &["outcome"])
        .expect("register hitserve_refresh_total"),
});
