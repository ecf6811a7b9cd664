use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();
    let missing = config.missing_credentials();

    HttpResponse::Ok().json(json!({
        "status": if missing.is_empty() { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "calls": {
            "active": metrics.active_calls,
            "started": metrics.calls_started,
            "rejected": metrics.calls_rejected,
            "max_concurrent": config.bridge.max_concurrent_calls
        },
        "turns": {
            "completed": metrics.turns_completed,
            "aborted": metrics.turns_aborted,
            "discarded": metrics.turns_discarded
        },
        "missing_credentials": missing,
        "memory": get_memory_info(),
        "system": get_system_status(config.bridge.max_concurrent_calls, &metrics)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "counters": metrics,
        "rates": {
            "frame_drop_rate": ratio(metrics.frames_dropped, metrics.frames_received),
            "fallback_rate": ratio(
                metrics.generation_fallbacks,
                metrics.turns_completed + metrics.turns_aborted + metrics.turns_discarded
            ),
            "calls_per_hour": if uptime_seconds > 0 {
                metrics.calls_started as f64 * 3600.0 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "memory": get_memory_info()
    }))
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64
    } else {
        0.0
    }
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        let pid = process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        vm_rss = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                    }
                } else if line.starts_with("VmSize:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        vm_size = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                    }
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "pid": process::id()
    })
}

fn get_system_status(max_calls: usize, metrics: &AppMetrics) -> serde_json::Value {
    let call_usage = ratio(metrics.active_calls, max_calls as u64);

    let status = if call_usage > 0.9 {
        "high_load"
    } else if call_usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "call_usage_percent": (call_usage * 100.0).round(),
        "load_warnings": if call_usage > 0.8 {
            vec!["High call usage - consider increasing bridge.max_concurrent_calls"]
        } else {
            vec![]
        }
    })
}
