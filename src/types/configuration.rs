// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Control-plane configuration read once at startup
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(group = "sidecar.dev", version = "v1alpha1", kind = "Configuration")]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtls: Option<MtlsSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MtlsSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "workloadCertTTL", skip_serializing_if = "Option::is_none")]
    pub workload_cert_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_clock_skew: Option<String>,
}

impl Configuration {
    /// mTLS is on unless the resource explicitly disables it
    pub fn mtls_enabled(&self) -> bool {
        self.spec.mtls.as_ref().map_or(true, |m| m.enabled)
    }
}
