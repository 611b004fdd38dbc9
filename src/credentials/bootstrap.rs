// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Blocking acquisition of the control-plane identity.
//!
//! The chain is read once up front. If that fails, a single watch is placed on the
//! credential directory and every filesystem event triggers exactly one new read,
//! until the chain loads, the deadline passes, or the caller cancels. The watch is
//! dropped on every return path.

use crate::credentials::chain::{load_from_disk, CertChain, TlsCredentials};
use crate::credentials::watch::{DirWatcher, NotifyWatcher};
use crate::error::{OperatorError, Result};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

pub struct CertBootstrapper<W: DirWatcher = NotifyWatcher> {
    watcher: W,
}

impl CertBootstrapper<NotifyWatcher> {
    pub fn new() -> Self {
        Self {
            watcher: NotifyWatcher,
        }
    }
}

impl Default for CertBootstrapper<NotifyWatcher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: DirWatcher> CertBootstrapper<W> {
    pub fn with_watcher(watcher: W) -> Self {
        Self { watcher }
    }

    #[instrument(skip(self, credentials, cancel), fields(path = %credentials.path().display()))]
    pub async fn load_chain(
        &self,
        credentials: &TlsCredentials,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<CertChain> {
        info!("Getting TLS certificates");
        let expires_at = Instant::now() + deadline;

        match load_from_disk(credentials).await {
            Ok(chain) => {
                info!("TLS certificates loaded successfully");
                return Ok(chain);
            }
            Err(e) => info!("TLS certificate not found; waiting for disk changes. err={}", e),
        }

        info!(
            "Starting watch for certs on filesystem: {}",
            credentials.path().display()
        );
        let mut subscription = self.watcher.watch(credentials.path())?;

        // Files written between the first read and the watch going live raise no event
        if let Ok(chain) = load_from_disk(credentials).await {
            info!("TLS certificates loaded successfully");
            return Ok(chain);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Certificate wait cancelled");
                    return Err(OperatorError::Cancelled);
                }
                _ = sleep_until(expires_at) => {
                    error!("Timeout while waiting to load TLS certificates");
                    return Err(OperatorError::CredentialsTimeout(deadline));
                }
                event = subscription.next_event() => match event {
                    Some(Ok(())) => debug!("Watcher found activity on filesystem"),
                    Some(Err(e)) => {
                        error!("Error watching filesystem: {}", e);
                        return Err(OperatorError::CredentialWatch(e));
                    }
                    None => {
                        return Err(OperatorError::CredentialWatch(
                            "watch stopped unexpectedly".to_string(),
                        ));
                    }
                },
            }

            match load_from_disk(credentials).await {
                Ok(chain) => {
                    info!("TLS certificates loaded successfully");
                    return Ok(chain);
                }
                Err(e) => debug!("TLS certificates not loadable yet: {}", e),
            }
        }
    }
}
