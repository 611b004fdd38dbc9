// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{sidecar, OPERATOR_NAME};

/// Operator options loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the Configuration resource read at startup
    pub config_name: String,
    /// Directory holding ca.pem, cert.pem and key.pem
    pub cert_chain_path: PathBuf,
    pub leader_election: bool,
    pub watchdog_enabled: bool,
    pub watchdog_interval: Duration,
    pub watchdog_max_restarts_per_min: u32,
    /// Restrict pod and component watches to this namespace; all namespaces when unset
    pub watch_namespace: Option<String>,
    pub service_reconciler_enabled: bool,
    pub argo_rollout_service_reconciler_enabled: bool,
    /// Namespace the operator itself runs in (Configuration and Lease live here)
    pub namespace: String,
    /// Identity used as lease holder
    pub pod_name: String,
    pub healthz_port: u16,
    pub api_port: u16,
    pub cache_sync_timeout: Duration,
    pub cert_load_timeout: Duration,
    pub sidecar_enabled_annotation: String,
    pub sidecar_container_name: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup; unset keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        Ok(Config {
            config_name: vars.or("CONFIG_NAME", "sidecar-system"),
            cert_chain_path: PathBuf::from(vars.or(
                "CERT_CHAIN_PATH",
                "/var/run/secrets/sidecar.dev/tls",
            )),
            leader_election: vars.parse("LEADER_ELECTION", false)?,
            watchdog_enabled: vars.parse("WATCHDOG_ENABLED", false)?,
            watchdog_interval: Duration::from_secs(vars.parse("WATCHDOG_INTERVAL_SECS", 30)?),
            watchdog_max_restarts_per_min: vars.parse("WATCHDOG_MAX_RESTARTS_PER_MIN", 5)?,
            watch_namespace: vars.get("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            // No service reconciler ships with this operator; both stay off unless asked for
            service_reconciler_enabled: vars.parse("SERVICE_RECONCILER_ENABLED", false)?,
            argo_rollout_service_reconciler_enabled: vars.parse(
                "ARGO_ROLLOUT_SERVICE_RECONCILER_ENABLED",
                false,
            )?,
            namespace: vars.or("POD_NAMESPACE", "default"),
            pod_name: vars
                .get("POD_NAME")
                .or_else(|| vars.get("HOSTNAME"))
                .unwrap_or_else(|| OPERATOR_NAME.to_string()),
            healthz_port: vars.parse("HEALTHZ_PORT", 8080)?,
            api_port: vars.parse("API_PORT", 6500)?,
            cache_sync_timeout: Duration::from_secs(vars.parse("CACHE_SYNC_TIMEOUT_SECS", 30)?),
            cert_load_timeout: Duration::from_secs(vars.parse("CERT_LOAD_TIMEOUT_SECS", 60)?),
            sidecar_enabled_annotation: vars.or(
                "SIDECAR_ENABLED_ANNOTATION",
                sidecar::ENABLED_ANNOTATION,
            ),
            sidecar_container_name: vars.or("SIDECAR_CONTAINER_NAME", sidecar::CONTAINER_NAME),
        })
    }

    /// Reconciler flags that were switched on but have no implementation here
    pub fn unsupported_reconcilers(&self) -> Vec<&'static str> {
        let mut requested = Vec::new();
        if self.service_reconciler_enabled {
            requested.push("SERVICE_RECONCILER_ENABLED");
        }
        if self.argo_rollout_service_reconciler_enabled {
            requested.push("ARGO_ROLLOUT_SERVICE_RECONCILER_ENABLED");
        }
        requested
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(raw) => parse_value(key, &raw),
            None => Ok(default),
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{} has an invalid value: {:?}", key, raw))
}
