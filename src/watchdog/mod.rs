// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Periodic restart of pods that came up without their sidecar.
//!
//! A pod admitted while the injector was unavailable runs without the sidecar
//! until something recreates it. The watchdog deletes such pods so their
//! controller brings them back through admission, bounded by a per-minute
//! restart budget and gated on leadership.

pub mod budget;
pub mod policy;

pub use budget::RestartBudget;
pub use policy::{AnnotationPolicy, SidecarPolicy, WatchdogTarget};

use crate::config::Config;
use crate::constants::watchdog::{BUDGET_WINDOW, LIST_PAGE_SIZE};
use crate::error::{OperatorError, Result};
use crate::kubernetes::Leadership;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Outcome of a single tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub not_leader: bool,
    pub inspected: usize,
    pub restarted: usize,
    pub failed: usize,
    /// Targets that needed a restart after the budget ran out
    pub skipped: usize,
}

pub struct Watchdog {
    client: Client,
    namespace: Option<String>,
    interval: Duration,
    budget: RestartBudget,
    policy: Box<dyn SidecarPolicy>,
    leadership: Arc<dyn Leadership>,
}

impl Watchdog {
    pub fn new(client: Client, config: &Config, leadership: Arc<dyn Leadership>) -> Self {
        let interval = if config.watchdog_interval.is_zero() {
            warn!("Watchdog interval is zero, using 1s");
            Duration::from_secs(1)
        } else {
            config.watchdog_interval
        };

        Self {
            client,
            namespace: config.watch_namespace.clone(),
            interval,
            budget: RestartBudget::new(config.watchdog_max_restarts_per_min, BUDGET_WINDOW),
            policy: Box::new(AnnotationPolicy::from_config(config)),
            leadership,
        }
    }

    pub fn with_policy(mut self, policy: impl SidecarPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Starting watchdog every {:?}, at most {} restarts per minute",
            self.interval,
            self.budget.max()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) if report.restarted + report.failed + report.skipped > 0 => info!(
                            "Watchdog tick: {} pods inspected, {} restarted, {} failed, {} skipped",
                            report.inspected, report.restarted, report.failed, report.skipped
                        ),
                        Ok(_) => {}
                        Err(e) => warn!("Watchdog tick failed: {}", e),
                    }
                }
            }
        }

        debug!("Watchdog stopped");
    }

    /// One evaluation pass over all pods. Leadership is checked once, up front.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickReport> {
        let mut report = TickReport::default();
        if !self.leadership.is_leader() {
            debug!("Not the leader, skipping watchdog tick");
            report.not_leader = true;
            return Ok(report);
        }

        let pods: Api<Pod> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let mut params = ListParams::default().limit(LIST_PAGE_SIZE);
        let mut exhausted = false;
        loop {
            let page = pods.list(&params).await?;

            for pod in &page.items {
                report.inspected += 1;
                let target = self.policy.describe(pod);
                if !target.needs_restart() {
                    continue;
                }
                if exhausted || !self.budget.try_spend() {
                    exhausted = true;
                    report.skipped += 1;
                    continue;
                }
                match self.restart(&target).await {
                    Ok(()) => report.restarted += 1,
                    Err(e) => {
                        warn!("{}", e);
                        report.failed += 1;
                    }
                }
            }

            match page.metadata.continue_ {
                Some(token) if !token.is_empty() => params = params.continue_token(&token),
                _ => break,
            }
        }

        if report.skipped > 0 {
            warn!(
                "Restart budget exhausted, {} pods left for a later tick",
                report.skipped
            );
        }
        Ok(report)
    }

    async fn restart(&self, target: &WatchdogTarget) -> Result<()> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        match api.delete(&target.name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(
                    "Restarted pod {} (owned by {}) to get sidecar injected",
                    target.key(),
                    target.owner_kind.as_deref().unwrap_or("unknown")
                );
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!("Pod {} already gone", target.key());
                Ok(())
            }
            Err(e) => Err(OperatorError::Restart(target.key(), e.to_string())),
        }
    }
}
