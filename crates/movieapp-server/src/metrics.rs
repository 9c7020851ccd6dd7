// Metrics module for observability
// Counters are emitted through the `metrics` facade; no exporter is installed here

use metrics::{counter, describe_counter};

use movieapp_common::Code;

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    // gRPC metrics
    describe_counter!(
        "grpc_requests_total",
        "Total number of gRPC requests received"
    );
    describe_counter!(
        "grpc_errors_total",
        "Total number of gRPC requests that returned an error"
    );

    // Cache metrics
    describe_counter!("cache_hits_total", "Total number of cache hits");
    describe_counter!("cache_misses_total", "Total number of cache misses");
    describe_counter!(
        "cache_write_errors_total",
        "Total number of failed cache population writes"
    );

    // Resilience metrics
    describe_counter!(
        "gateway_retries_total",
        "Total number of retried downstream calls"
    );
    describe_counter!(
        "admission_rejected_total",
        "Total number of requests rejected by admission control"
    );
}

pub fn record_request(service: &'static str, endpoint: &'static str) {
    counter!("grpc_requests_total", "service" => service, "endpoint" => endpoint).increment(1);
}

pub fn record_error(service: &'static str, endpoint: &'static str, code: Code) {
    counter!(
        "grpc_errors_total",
        "service" => service,
        "endpoint" => endpoint,
        "code" => code.as_str()
    )
    .increment(1);
}
