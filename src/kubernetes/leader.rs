// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Lease based leader election.
//!
//! The holder renews a `coordination.k8s.io/v1` Lease in the operator's
//! namespace. Writes carry the resourceVersion that was read, so a concurrent
//! writer loses with 409 Conflict instead of both replicas believing they lead.

use crate::constants::leader::{
    LEASE_DURATION, LEASE_NAME, RENEW_DEADLINE, RENEW_INTERVAL, RETRY_INTERVAL,
};
use crate::error::Result;
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Answers whether this replica currently holds leadership
pub trait Leadership: Send + Sync {
    fn is_leader(&self) -> bool;
}

/// Shared leadership state written by the elector. Leadership lapses on its own
/// once the last successful round is a full lease duration old, even if the
/// elector is stuck in a request.
#[derive(Debug, Clone, Default)]
pub struct LeaderStatus(Arc<Mutex<Option<Instant>>>);

impl LeaderStatus {
    fn lock(&self) -> MutexGuard<'_, Option<Instant>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record leadership valid until `expiry`. Returns whether we already led.
    fn hold_until(&self, expiry: Instant) -> bool {
        let mut held = self.lock();
        let was_leader = held.is_some_and(|e| Instant::now() < e);
        *held = Some(expiry);
        was_leader
    }

    /// Drop leadership. Returns whether we led until now.
    fn clear(&self) -> bool {
        self.lock()
            .take()
            .is_some_and(|e| Instant::now() < e)
    }
}

impl Leadership for LeaderStatus {
    fn is_leader(&self) -> bool {
        self.lock().is_some_and(|e| Instant::now() < e)
    }
}

pub struct LeaderElector {
    client: Client,
    namespace: String,
    identity: String,
    lease_duration: Duration,
    renew_interval: Duration,
    retry_interval: Duration,
    status: LeaderStatus,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str, identity: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            identity: identity.to_string(),
            lease_duration: LEASE_DURATION,
            renew_interval: RENEW_INTERVAL,
            retry_interval: RETRY_INTERVAL,
            status: LeaderStatus::default(),
        }
    }

    pub fn status(&self) -> LeaderStatus {
        self.status.clone()
    }

    /// Acquire and keep renewing the lease until cancelled, then release it
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Starting leader election for {} as {}",
            LEASE_NAME, self.identity
        );

        loop {
            let started = Instant::now();
            let round = tokio::select! {
                _ = cancel.cancelled() => break,
                round = tokio::time::timeout(RENEW_DEADLINE, self.try_acquire_or_renew()) => round,
            };
            let leader = match round {
                Ok(Ok(acquired)) => acquired,
                Ok(Err(e)) => {
                    warn!("Failed to acquire or renew lease {}: {}", LEASE_NAME, e);
                    false
                }
                Err(_) => {
                    warn!(
                        "Lease {} round did not finish within {:?}",
                        LEASE_NAME, RENEW_DEADLINE
                    );
                    false
                }
            };

            let was_leader = if leader {
                // The peer-visible renewTime was taken at the start of the round
                self.status.hold_until(started + self.lease_duration)
            } else {
                self.status.clear()
            };
            match (was_leader, leader) {
                (false, true) => info!("Leadership acquired by {}", self.identity),
                (true, false) => warn!("Leadership lost by {}", self.identity),
                _ => {}
            }

            let wait = if leader {
                self.renew_interval
            } else {
                self.retry_interval
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if self.status.clear() {
            if let Err(e) = self.release_lease().await {
                warn!("Failed to release lease {}: {}", LEASE_NAME, e);
            }
        }
        debug!("Leader election stopped");
    }

    /// One compare-and-swap round against the lease. Returns whether we hold it.
    #[instrument(skip(self), fields(identity = %self.identity))]
    async fn try_acquire_or_renew(&self) -> Result<bool> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let now = Utc::now();

        let existing = match api.get(LEASE_NAME).await {
            Ok(lease) => lease,
            Err(kube::Error::Api(e)) if e.code == 404 => return self.create_lease(&api, now).await,
            Err(e) => return Err(e.into()),
        };

        let spec = existing.spec.clone().unwrap_or_default();
        if spec.holder_identity.as_deref() == Some(self.identity.as_str()) {
            let mut renewed = existing;
            renewed.spec = Some(LeaseSpec {
                renew_time: Some(MicroTime(now)),
                lease_duration_seconds: Some(self.lease_duration.as_secs() as i32),
                ..spec
            });
            return self.replace_lease(&api, &renewed).await;
        }

        if !is_expired(&spec, now) {
            debug!(
                "Lease {} held by {:?}",
                LEASE_NAME,
                spec.holder_identity.as_deref()
            );
            return Ok(false);
        }

        let transitions = spec.lease_transitions.unwrap_or(0) + 1;
        let mut taken = existing;
        taken.spec = Some(self.lease_spec(now, transitions));
        let acquired = self.replace_lease(&api, &taken).await?;
        if acquired {
            info!(
                "Took over expired lease {} from {:?}",
                LEASE_NAME,
                spec.holder_identity.as_deref()
            );
        }
        Ok(acquired)
    }

    async fn create_lease(&self, api: &Api<Lease>, now: DateTime<Utc>) -> Result<bool> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(LEASE_NAME.to_string()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: Some(self.lease_spec(now, 0)),
        };

        match api.create(&PostParams::default(), &lease).await {
            Ok(_) => {
                info!("Created lease {}", LEASE_NAME);
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_lease(&self, api: &Api<Lease>, lease: &Lease) -> Result<bool> {
        match api.replace(LEASE_NAME, &PostParams::default(), lease).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!("Lease {} changed underneath us", LEASE_NAME);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Clear the holder so a standby can take over without waiting for expiry
    async fn release_lease(&self) -> Result<()> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let patch = json!({
            "spec": {
                "holderIdentity": null,
                "renewTime": null
            }
        });
        api.patch(LEASE_NAME, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!("Released lease {}", LEASE_NAME);
        Ok(())
    }

    fn lease_spec(&self, now: DateTime<Utc>, transitions: i32) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.lease_duration.as_secs() as i32),
            acquire_time: Some(MicroTime(now)),
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(transitions),
            ..Default::default()
        }
    }
}

/// A lease without holder, renew time or duration is up for grabs
pub fn is_expired(spec: &LeaseSpec, now: DateTime<Utc>) -> bool {
    if spec.holder_identity.as_deref().map_or(true, str::is_empty) {
        return true;
    }
    match (spec.renew_time.as_ref(), spec.lease_duration_seconds) {
        (Some(renewed), Some(secs)) => now > renewed.0 + chrono::Duration::seconds(secs as i64),
        _ => true,
    }
}
