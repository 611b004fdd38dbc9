// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Forwards component changes from the cache to the API server.

use crate::kubernetes::cache::{CacheHandle, ChangeEvent};
use crate::server::ApiServer;
use crate::types::Component;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Single consumer of the component cache's change stream.
/// Delivery order is the cache's delivery order; nothing is re-ordered or coalesced.
pub struct ChangeNotifier {
    events: mpsc::Receiver<ChangeEvent<Component>>,
    cache: CacheHandle<Component>,
    api_server: Arc<dyn ApiServer>,
}

impl ChangeNotifier {
    pub fn new(
        events: mpsc::Receiver<ChangeEvent<Component>>,
        cache: CacheHandle<Component>,
        api_server: Arc<dyn ApiServer>,
    ) -> Self {
        Self {
            events,
            cache,
            api_server,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        // The supervisor enforces the sync deadline; here we only wait for the gate
        if !self.cache.wait_for_sync(&cancel, None).await {
            debug!("Component cache never synced, notifier exiting");
            return;
        }
        info!("Component cache synced, forwarding component changes");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.forward(event),
                    None => break,
                },
            }
        }

        debug!("Change notifier stopped");
    }

    fn forward(&self, event: ChangeEvent<Component>) {
        let component = event.into_object();
        match component.key() {
            Some(key) => {
                debug!("Observed component to be synced, {}", key);
                self.api_server.on_component_updated(component);
            }
            None => warn!(
                "Dropping component change without namespace/name: {:?}",
                component.metadata
            ),
        }
    }
}
