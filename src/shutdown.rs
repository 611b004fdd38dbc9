// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Process signals that cancel the root token.
//!
//! Kubernetes stops pods with SIGTERM; without a handler the process dies
//! before the servers drain or the lease is released.

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel `cancel` on the first SIGINT or SIGTERM.
/// Handlers are installed before this returns, so no signal delivered afterwards is missed.
pub fn cancel_on_signal(cancel: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down"),
                _ = cancel.cancelled() => return,
            }
            cancel.cancel();
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        info!("Received Ctrl-C, shutting down");
                    }
                }
                _ = cancel.cancelled() => return,
            }
            cancel.cancel();
        }))
    }
}
