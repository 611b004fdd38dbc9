// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Startup sequence and lifetime of the operator's background tasks.
//!
//! Steps up to the certificate load run strictly in order and each one gates the
//! next. Background tasks report fatal failures over a channel; the first one
//! observed tears everything down and becomes the result of `run`.

use crate::config::Config;
use crate::credentials::CertBootstrapper;
use crate::error::{OperatorError, Result};
use crate::kubernetes::{load_configuration, CacheGate, LeaderElector};
use crate::server::{ApiServer, HealthServer};
use crate::sync::ChangeNotifier;
use crate::types::Component;
use crate::watchdog::Watchdog;
use kube::runtime::watcher;
use kube::{Api, Client};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct Operator {
    client: Client,
    config: Config,
    api_server: Arc<dyn ApiServer>,
    health: Arc<HealthServer>,
    bootstrapper: CertBootstrapper,
}

impl Operator {
    pub fn new(client: Client, config: Config, api_server: Arc<dyn ApiServer>) -> Self {
        Self {
            client,
            config,
            api_server,
            health: Arc::new(HealthServer::new()),
            bootstrapper: CertBootstrapper::new(),
        }
    }

    pub fn health(&self) -> Arc<HealthServer> {
        self.health.clone()
    }

    /// Run until `cancel` fires or something fatal happens
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let root = cancel.child_token();
        let mut tasks = JoinSet::new();
        let (fatal_tx, mut fatal_rx) = mpsc::channel(4);

        let result = tokio::select! {
            result = self.start(&root, &mut tasks, fatal_tx) => result,
            Some(e) = fatal_rx.recv() => Err(e),
        };

        match &result {
            Ok(()) => info!("Shutting down"),
            Err(e) if e.is_fatal() => error!("Fatal error, shutting down: {}", e),
            Err(e) => info!("Shutting down: {}", e),
        }

        root.cancel();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Background task did not exit cleanly: {}", e);
            }
        }
        debug!("All background tasks stopped");

        result
    }

    async fn start(
        &self,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<()>,
        fatal: mpsc::Sender<OperatorError>,
    ) -> Result<()> {
        let components: Api<Component> = match &self.config.watch_namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let mut gate = CacheGate::new(components, watcher::Config::default());
        let events = gate.subscribe()?;
        let cache = gate.handle();
        spawn_guarded(tasks, &fatal, gate.run(cancel.clone()));
        tasks.spawn(ChangeNotifier::new(events, cache.clone(), self.api_server.clone()).run(cancel.clone()));

        info!("Waiting for component cache to sync");
        if !cache
            .wait_for_sync(cancel, Some(self.config.cache_sync_timeout))
            .await
        {
            if cancel.is_cancelled() {
                return Err(OperatorError::Cancelled);
            }
            return Err(OperatorError::CacheSync(self.config.cache_sync_timeout));
        }
        info!("Component cache synced");

        let configuration = load_configuration(
            self.client.clone(),
            &self.config.namespace,
            &self.config.config_name,
            &self.config.cert_chain_path,
        )
        .await?;

        let chain = self
            .bootstrapper
            .load_chain(&configuration.credentials, self.config.cert_load_timeout, cancel)
            .await?;
        info!(
            "Serving certificate valid from {} until {}",
            chain.not_before, chain.not_after
        );

        let health = self.health.clone();
        let port = self.config.healthz_port;
        let health_cancel = cancel.clone();
        spawn_guarded(tasks, &fatal, async move { health.run(health_cancel, port).await });

        self.start_watchdog(cancel, tasks);

        let health = self.health.clone();
        self.api_server
            .run(cancel.clone(), Arc::new(chain), Box::new(move || health.ready()))
            .await
    }

    fn start_watchdog(&self, cancel: &CancellationToken, tasks: &mut JoinSet<()>) {
        if !self.config.watchdog_enabled {
            info!("Watchdog disabled");
            if self.config.leader_election {
                debug!("Leader election only gates the watchdog, not starting it");
            }
            return;
        }
        if !self.config.leader_election {
            warn!("Leader election is disabled but the watchdog requires it; enabling it for the watchdog");
        }

        let elector = LeaderElector::new(
            self.client.clone(),
            &self.config.namespace,
            &self.config.pod_name,
        );
        let status = elector.status();
        tasks.spawn(elector.run(cancel.clone()));

        let watchdog = Watchdog::new(self.client.clone(), &self.config, Arc::new(status));
        tasks.spawn(watchdog.run(cancel.clone()));
    }
}

/// Spawn a background task whose fatal errors end the process
fn spawn_guarded<F>(tasks: &mut JoinSet<()>, fatal: &mpsc::Sender<OperatorError>, task: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let fatal = fatal.clone();
    tasks.spawn(async move {
        match task.await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                let _ = fatal.send(e).await;
            }
            Err(e) => warn!("Background task failed: {}", e),
        }
    });
}
