// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Directory watch used while waiting for credentials to appear

use crate::error::{OperatorError, Result};
use notify::{RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::debug;

/// A live watch. Dropping it tears the underlying watch down.
pub struct WatchSubscription {
    events: mpsc::UnboundedReceiver<std::result::Result<(), String>>,
    _guard: Box<dyn Send>,
}

impl WatchSubscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<std::result::Result<(), String>>,
        guard: impl Send + 'static,
    ) -> Self {
        Self {
            events,
            _guard: Box::new(guard),
        }
    }

    /// Next filesystem signal; None once the watch has shut down
    pub async fn next_event(&mut self) -> Option<std::result::Result<(), String>> {
        self.events.recv().await
    }
}

/// Signals on any filesystem event within one directory
pub trait DirWatcher: Send + Sync {
    fn watch(&self, dir: &Path) -> Result<WatchSubscription>;
}

/// inotify/kqueue backed watcher from the `notify` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyWatcher;

impl DirWatcher for NotifyWatcher {
    fn watch(&self, dir: &Path) -> Result<WatchSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(
            move |res: notify::Result<notify::Event>| {
                let signal = match res {
                    Ok(event) => {
                        debug!("Filesystem event: {:?}", event.kind);
                        Ok(())
                    }
                    Err(e) => Err(e.to_string()),
                };
                // Receiver gone means the bootstrap call already returned
                let _ = tx.send(signal);
            },
        )
        .map_err(|e| OperatorError::CredentialWatch(e.to_string()))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| OperatorError::CredentialWatch(format!("{}: {}", dir.display(), e)))?;

        Ok(WatchSubscription::new(rx, watcher))
    }
}
