//! Health reporting for the listener
//!
//! A read-only snapshot of liveness, session counts and process memory.

use axum::{
    http::Method,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};

use crate::{errors::AppError, AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    pub uptime_seconds: f64,
    pub sessions: SessionCountsResponse,
    pub memory: MemorySnapshot,
}

#[derive(Debug, Serialize)]
pub struct SessionCountsResponse {
    pub sse: usize,
    pub streamable: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct MemorySnapshot {
    pub rss_bytes: Option<u64>,
    pub virtual_bytes: Option<u64>,
    pub system_total_bytes: u64,
}

pub async fn health(state: &AppState, method: &Method) -> Result<Response, AppError> {
    if method != Method::GET {
        return Err(AppError::method_not_allowed(Some("GET")));
    }

    let counts = state.sessions.counts().await;

    Ok(Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"),
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
        sessions: SessionCountsResponse {
            sse: counts.sse,
            streamable: counts.streamable,
            total: counts.total(),
        },
        memory: memory_snapshot(),
    })
    .into_response())
}

pub fn memory_snapshot() -> MemorySnapshot {
    let mut system = System::new();
    system.refresh_memory();
    let system_total_bytes = system.total_memory();

    let process = sysinfo::get_current_pid().ok().and_then(|pid| {
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
        system
            .process(pid)
            .map(|process| (process.memory(), process.virtual_memory()))
    });

    MemorySnapshot {
        rss_bytes: process.map(|(rss, _)| rss),
        virtual_bytes: process.map(|(_, virtual_bytes)| virtual_bytes),
        system_total_bytes,
    }
}
