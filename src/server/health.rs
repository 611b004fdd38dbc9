// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Readiness endpoint for the operator pod

use crate::error::{OperatorError, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serves `/healthz`; reports 503 until `ready()` has been called
#[derive(Debug, Default)]
pub struct HealthServer {
    ready: Arc<AtomicBool>,
}

impl HealthServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the process ready. Idempotent.
    pub fn ready(&self) {
        if !self.ready.swap(true, Ordering::SeqCst) {
            info!("Healthz server marked ready");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Blocking: bind the port and serve until cancelled
    pub async fn run(&self, cancel: CancellationToken, port: u16) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| OperatorError::Bind {
                server: "healthz",
                source,
            })?;
        info!(
            "Healthz server listening on {}",
            listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| port.to_string())
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(|source| OperatorError::Serve {
                server: "healthz",
                source,
            })
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .with_state(self.ready.clone())
    }
}

async fn healthz(State(ready): State<Arc<AtomicBool>>) -> (StatusCode, &'static str) {
    if ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
