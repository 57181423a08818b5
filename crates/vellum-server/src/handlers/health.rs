//! Health and metrics endpoints.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use vellum_cache::HealthCheck;
use vellum_storage::Role;

use crate::error::ServerError;
use crate::handlers::blocking;
use crate::state::AppState;

/// Handle GET /healthcheck.
pub(crate) async fn healthcheck(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServerError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let checks: BTreeMap<String, HealthCheck> =
        blocking(move || orchestrator.health_check()).await?;
    let status = if checks.values().all(|check| check.success) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(checks)))
}

/// Handle GET /metrics.
pub(crate) async fn metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServerError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let metrics = blocking(move || orchestrator.metrics()).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render_prometheus(&metrics),
    ))
}

/// Process counters: (metric key, exposition name, type, help).
const PROCESS_METRICS: [(&str, &str, &str, &str); 4] = [
    (
        "TotalProcessorTimeSeconds",
        "process_cpu_seconds_total",
        "counter",
        "Total user and system CPU time spent in seconds.",
    ),
    (
        "ResidentMemoryBytes",
        "process_resident_memory_bytes",
        "gauge",
        "Resident memory size in bytes.",
    ),
    (
        "ProcessStartTimeSeconds",
        "process_start_time_seconds",
        "gauge",
        "Start time of the process since unix epoch in seconds.",
    ),
    (
        "VirtualMemoryBytes",
        "process_virtual_memory_bytes",
        "gauge",
        "Virtual memory size in bytes.",
    ),
];

/// Render orchestrator metrics in the Prometheus text format.
fn render_prometheus(metrics: &BTreeMap<String, f64>) -> String {
    let mut out = String::new();

    let mut per_role = |name: &str, suffix: &str, help: &str| {
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} gauge");
        for role in Role::ALL {
            if let Some(value) = metrics.get(&format!("{}{suffix}", role.label())) {
                let _ = writeln!(out, "{name}{{role=\"{role}\"}} {value}");
            }
        }
    };
    per_role("vellum_storage_files", "Files", "Files stored per role.");
    per_role("vellum_storage_size_bytes", "Bytes", "Bytes stored per role.");

    if let Some(value) = metrics.get("CompiledApis") {
        let _ = writeln!(out, "# HELP vellum_compiled_apis Compiled proxy rules in memory.");
        let _ = writeln!(out, "# TYPE vellum_compiled_apis gauge");
        let _ = writeln!(out, "vellum_compiled_apis {value}");
    }

    for (key, name, kind, help) in PROCESS_METRICS {
        if let Some(value) = metrics.get(key) {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} {kind}");
            let _ = writeln!(out, "{name} {value}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_render_prometheus() {
        let metrics = BTreeMap::from([
            ("PublicFiles".to_owned(), 3.0),
            ("PublicBytes".to_owned(), 1024.0),
            ("CompiledApis".to_owned(), 1.0),
            ("ResidentMemoryBytes".to_owned(), 4096.0),
        ]);

        let text = render_prometheus(&metrics);

        assert!(text.contains("vellum_storage_files{role=\"public\"} 3\n"));
        assert!(text.contains("vellum_storage_size_bytes{role=\"public\"} 1024\n"));
        assert!(text.contains("vellum_compiled_apis 1\n"));
        assert!(text.contains("# TYPE process_resident_memory_bytes gauge\n"));
        assert!(text.contains("process_resident_memory_bytes 4096\n"));
        assert!(!text.contains("process_cpu_seconds_total"));
    }

    #[test]
    fn test_render_prometheus_empty() {
        let text = render_prometheus(&BTreeMap::new());

        assert_eq!(
            text,
            "# HELP vellum_storage_files Files stored per role.\n\
             # TYPE vellum_storage_files gauge\n\
             # HELP vellum_storage_size_bytes Bytes stored per role.\n\
             # TYPE vellum_storage_size_bytes gauge\n"
        );
    }
}
