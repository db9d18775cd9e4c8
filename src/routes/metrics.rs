use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Prometheus metrics scrape endpoint.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for the counters this service emits.
pub fn describe_metrics() {
    metrics::describe_counter!("visits_created_total", "Visits created through intake");
    metrics::describe_counter!(
        "documents_uploaded_total",
        "Intake documents stored in object storage, by document type"
    );
    metrics::describe_counter!(
        "document_upload_failures_total",
        "Intake document uploads that failed and rolled back their visit"
    );
    metrics::describe_counter!("users_created_total", "Users registered via addUser");
    metrics::describe_counter!("users_verified_total", "Users that completed verification");
}
