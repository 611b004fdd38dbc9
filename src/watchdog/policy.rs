// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Decides which pods are missing their sidecar

use crate::config::Config;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

/// Per-tick view of one pod as the watchdog sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogTarget {
    pub namespace: String,
    pub name: String,
    pub owner_kind: Option<String>,
    pub has_expected_sidecar: bool,
    pub sidecar_injection_eligible: bool,
    pub terminating: bool,
}

impl WatchdogTarget {
    /// Ownerless pods are never restarted: nothing would recreate them
    pub fn needs_restart(&self) -> bool {
        self.sidecar_injection_eligible
            && !self.has_expected_sidecar
            && !self.terminating
            && self.owner_kind.is_some()
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

pub trait SidecarPolicy: Send + Sync {
    fn describe(&self, pod: &Pod) -> WatchdogTarget;
}

/// Eligible when the injection annotation is "true"; sidecar present when a
/// container with the expected name exists
#[derive(Debug, Clone)]
pub struct AnnotationPolicy {
    annotation: String,
    container: String,
}

impl AnnotationPolicy {
    pub fn new(annotation: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            annotation: annotation.into(),
            container: container.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.sidecar_enabled_annotation.clone(),
            config.sidecar_container_name.clone(),
        )
    }
}

impl SidecarPolicy for AnnotationPolicy {
    fn describe(&self, pod: &Pod) -> WatchdogTarget {
        let owners = pod.owner_references();
        let owner_kind = owners
            .iter()
            .find(|o| o.controller == Some(true))
            .or_else(|| owners.first())
            .map(|o| o.kind.clone());

        let has_expected_sidecar = pod
            .spec
            .as_ref()
            .is_some_and(|spec| spec.containers.iter().any(|c| c.name == self.container));

        let sidecar_injection_eligible = pod
            .annotations()
            .get(&self.annotation)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        WatchdogTarget {
            namespace: pod.namespace().unwrap_or_default(),
            name: pod.name_any(),
            owner_kind,
            has_expected_sidecar,
            sidecar_injection_eligible,
            terminating: pod.metadata.deletion_timestamp.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::sidecar::{CONTAINER_NAME, ENABLED_ANNOTATION};
    use crate::test_utils::pod_json;

    fn policy() -> AnnotationPolicy {
        AnnotationPolicy::new(ENABLED_ANNOTATION, CONTAINER_NAME)
    }

    fn pod(annotations: &[(&str, &str)], containers: &[&str], owner: Option<&str>) -> Pod {
        serde_json::from_value(pod_json("apps", "web-0", annotations, containers, owner)).unwrap()
    }

    #[test]
    fn test_eligible_pod_without_sidecar_needs_restart() {
        let target = policy().describe(&pod(
            &[(ENABLED_ANNOTATION, "true")],
            &["app"],
            Some("ReplicaSet"),
        ));

        assert_eq!(target.key(), "apps/web-0");
        assert_eq!(target.owner_kind.as_deref(), Some("ReplicaSet"));
        assert!(target.sidecar_injection_eligible);
        assert!(!target.has_expected_sidecar);
        assert!(target.needs_restart());
    }

    #[test]
    fn test_pod_with_sidecar_is_left_alone() {
        let target = policy().describe(&pod(
            &[(ENABLED_ANNOTATION, "true")],
            &["app", CONTAINER_NAME],
            Some("ReplicaSet"),
        ));

        assert!(target.has_expected_sidecar);
        assert!(!target.needs_restart());
    }

    #[test]
    fn test_pod_without_annotation_is_not_eligible() {
        let target = policy().describe(&pod(&[], &["app"], Some("ReplicaSet")));
        assert!(!target.needs_restart());

        let disabled = policy().describe(&pod(
            &[(ENABLED_ANNOTATION, "false")],
            &["app"],
            Some("ReplicaSet"),
        ));
        assert!(!disabled.needs_restart());
    }

    #[test]
    fn test_ownerless_pod_is_never_restarted() {
        let target = policy().describe(&pod(&[(ENABLED_ANNOTATION, "true")], &["app"], None));

        assert!(target.owner_kind.is_none());
        assert!(!target.needs_restart());
    }

    #[test]
    fn test_terminating_pod_is_skipped() {
        let mut value = pod_json(
            "apps",
            "web-0",
            &[(ENABLED_ANNOTATION, "true")],
            &["app"],
            Some("StatefulSet"),
        );
        value["metadata"]["deletionTimestamp"] = serde_json::json!("2026-01-01T00:00:00Z");
        let target = policy().describe(&serde_json::from_value(value).unwrap());

        assert!(target.terminating);
        assert!(!target.needs_restart());
    }

    #[test]
    fn test_custom_container_name() {
        let policy = AnnotationPolicy::new(ENABLED_ANNOTATION, "proxy");
        let target = policy.describe(&pod(
            &[(ENABLED_ANNOTATION, "true")],
            &["app", "proxy"],
            Some("ReplicaSet"),
        ));

        assert!(target.has_expected_sidecar);
    }
}
