// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Pod annotation and container defaults for the watchdog's sidecar policy
pub mod sidecar {
    /// When set to "true" on a pod, the sidecar injector is expected to add the sidecar
    pub const ENABLED_ANNOTATION: &str = "sidecar.dev/enabled";
    /// Name of the container injected at admission time
    pub const CONTAINER_NAME: &str = "sidecar";
}

/// The operator name used as lease holder prefix and field manager
pub const OPERATOR_NAME: &str = "sidecar-operator";

/// Leader election lease settings
pub mod leader {
    use std::time::Duration;

    pub const LEASE_NAME: &str = "operator.sidecar.dev";
    pub const LEASE_DURATION: Duration = Duration::from_secs(15);
    pub const RENEW_INTERVAL: Duration = Duration::from_secs(5);
    pub const RETRY_INTERVAL: Duration = Duration::from_secs(2);
    /// Upper bound for one acquire or renew round; must stay below LEASE_DURATION
    pub const RENEW_DEADLINE: Duration = Duration::from_secs(10);
}

/// Credential file names under the cert chain base path
pub mod credentials {
    pub const ROOT_CERT_FILENAME: &str = "ca.pem";
    pub const CERT_FILENAME: &str = "cert.pem";
    pub const KEY_FILENAME: &str = "key.pem";
}

/// Watchdog tuning
pub mod watchdog {
    use std::time::Duration;

    /// Width of the restart budget window
    pub const BUDGET_WINDOW: Duration = Duration::from_secs(60);
    /// Page size used when listing pods
    pub const LIST_PAGE_SIZE: u32 = 100;
}

/// Capacity of the cache → notifier channel
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;
