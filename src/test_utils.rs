// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking Kubernetes API responses and minting credentials.

use crate::config::Config;
use crate::constants::credentials::{CERT_FILENAME, KEY_FILENAME, ROOT_CERT_FILENAME};
use crate::credentials::CertChain;
use crate::error::Result as OperatorResult;
use crate::server::{ApiServer, ReadyCallback};
use crate::types::Component;
use async_trait::async_trait;
use http::{Request, Response};
use kube::client::Body;
use kube::Client;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::Service;

/// A mock HTTP service that returns predefined responses based on request paths.
/// Every request is recorded so tests can assert on the calls made.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    stalled: Arc<Mutex<HashSet<(String, String)>>>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            stalled: Arc::new(Mutex::new(HashSet::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a response for requests with this method matching the path
    pub fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    /// Requests with this method and exact path never get a response
    pub fn stall(self, method: &str, path: &str) -> Self {
        self.stalled
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()));
        self
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    /// Paths of all requests made with the given method, in order
    pub fn requests(&self, method: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Prefix match for paths like /api/v1/namespaces/foo/pods/bar
        responses
            .iter()
            .filter(|((m, p), _)| m == method && path.starts_with(p.as_str()))
            .max_by_key(|((_, p), _)| p.len())
            .map(|(_, resp)| resp.clone())
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        self.requests
            .lock()
            .unwrap()
            .push((method.clone(), path.clone()));
        let response = self.find_response(&method, &path);
        let stalled = self
            .stalled
            .lock()
            .unwrap()
            .contains(&(method.clone(), path.clone()));

        Box::pin(async move {
            if stalled {
                std::future::pending::<()>().await;
            }
            let (status, body) =
                response.unwrap_or_else(|| (404, not_found_json("resource", &path)));
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

/// Wrap items into a list response
pub fn list_json(kind: &str, api_version: &str, items: Vec<serde_json::Value>, continue_token: Option<&str>) -> String {
    let mut metadata = serde_json::json!({"resourceVersion": "1"});
    if let Some(token) = continue_token {
        metadata["continue"] = serde_json::Value::String(token.to_string());
    }
    serde_json::json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": metadata,
        "items": items
    })
    .to_string()
}

/// A pod manifest for watchdog tests
pub fn pod_json(
    namespace: &str,
    name: &str,
    annotations: &[(&str, &str)],
    containers: &[&str],
    owner_kind: Option<&str>,
) -> serde_json::Value {
    let annotations: serde_json::Map<String, serde_json::Value> = annotations
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    let containers: Vec<serde_json::Value> = containers
        .iter()
        .map(|c| serde_json::json!({"name": c, "image": format!("{}:latest", c)}))
        .collect();
    let owners: Vec<serde_json::Value> = owner_kind
        .map(|kind| {
            vec![serde_json::json!({
                "apiVersion": "apps/v1",
                "kind": kind,
                "name": format!("{}-owner", name),
                "uid": format!("{}-owner-uid", name),
                "controller": true
            })]
        })
        .unwrap_or_default();

    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "annotations": annotations,
            "ownerReferences": owners
        },
        "spec": {"containers": containers}
    })
}

/// Deterministic test configuration
pub fn test_config(cert_chain_path: PathBuf) -> Config {
    Config {
        config_name: "sidecar-system".to_string(),
        cert_chain_path,
        leader_election: false,
        watchdog_enabled: false,
        watchdog_interval: Duration::from_secs(10),
        watchdog_max_restarts_per_min: 2,
        watch_namespace: None,
        service_reconciler_enabled: false,
        argo_rollout_service_reconciler_enabled: false,
        namespace: "sidecar-system".to_string(),
        pod_name: "sidecar-operator-0".to_string(),
        healthz_port: 0,
        api_port: 0,
        cache_sync_timeout: Duration::from_secs(30),
        cert_load_timeout: Duration::from_secs(5),
        sidecar_enabled_annotation: crate::constants::sidecar::ENABLED_ANNOTATION.to_string(),
        sidecar_container_name: crate::constants::sidecar::CONTAINER_NAME.to_string(),
    }
}

/// Root certificate, leaf certificate and private key PEMs.
/// The leaf is self-signed and doubles as its own root.
pub fn test_chain_pems() -> (String, String, String) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = certified.cert.pem();
    (cert.clone(), cert, certified.key_pair.serialize_pem())
}

/// Write a complete chain into a credential directory
pub fn write_test_chain(dir: &Path) {
    let (ca, cert, key) = test_chain_pems();
    std::fs::write(dir.join(ROOT_CERT_FILENAME), ca).unwrap();
    std::fs::write(dir.join(CERT_FILENAME), cert).unwrap();
    std::fs::write(dir.join(KEY_FILENAME), key).unwrap();
}

/// API server stand-in that records notifications and blocks in `run` until cancelled
#[derive(Default)]
pub struct RecordingApiServer {
    updates: Mutex<Vec<Component>>,
    run_calls: AtomicUsize,
    chain: Mutex<Option<Arc<CertChain>>>,
}

impl RecordingApiServer {
    pub fn updates(&self) -> Vec<Component> {
        self.updates.lock().unwrap().clone()
    }

    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn chain(&self) -> Option<Arc<CertChain>> {
        self.chain.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApiServer for RecordingApiServer {
    fn on_component_updated(&self, component: Component) {
        self.updates.lock().unwrap().push(component);
    }

    async fn run(
        &self,
        cancel: CancellationToken,
        chain: Arc<CertChain>,
        on_ready: ReadyCallback,
    ) -> OperatorResult<()> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        *self.chain.lock().unwrap() = Some(chain);
        on_ready();
        cancel.cancelled().await;
        Ok(())
    }
}
