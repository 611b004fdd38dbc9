// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Component API served to sidecars over mutual TLS

use crate::credentials::CertChain;
use crate::error::{OperatorError, Result};
use crate::types::Component;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use futures::Stream;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Invoked once the API server has bound its listener
pub type ReadyCallback = Box<dyn FnOnce() + Send>;

/// The operator's consumer of component changes and owner of the serving identity
#[async_trait]
pub trait ApiServer: Send + Sync {
    /// Fire-and-forget notification; must not block
    fn on_component_updated(&self, component: Component);

    /// Blocking: serve until `cancel` fires or a fatal error occurs
    async fn run(
        &self,
        cancel: CancellationToken,
        chain: Arc<CertChain>,
        on_ready: ReadyCallback,
    ) -> Result<()>;
}

#[derive(Debug)]
struct Registry {
    components: RwLock<BTreeMap<String, Component>>,
    updates: broadcast::Sender<Component>,
}

/// Keeps the latest version of every component and streams updates to subscribers
#[derive(Debug, Clone)]
pub struct ComponentApiServer {
    port: u16,
    registry: Arc<Registry>,
}

impl ComponentApiServer {
    pub fn new(port: u16) -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            port,
            registry: Arc::new(Registry {
                components: RwLock::new(BTreeMap::new()),
                updates,
            }),
        }
    }

    /// Stream of component updates observed after subscribing
    pub fn subscribe(&self) -> broadcast::Receiver<Component> {
        self.registry.updates.subscribe()
    }

    pub fn components(&self) -> Vec<Component> {
        self.registry
            .components
            .read()
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/v1/components", get(list_components))
            .route("/v1/components/stream", get(stream_components))
            .route("/v1/components/{namespace}/{name}", get(get_component))
            .with_state(self.registry.clone())
    }
}

#[async_trait]
impl ApiServer for ComponentApiServer {
    fn on_component_updated(&self, component: Component) {
        let Some(key) = component.key() else {
            return;
        };
        if let Ok(mut components) = self.registry.components.write() {
            components.insert(key.clone(), component.clone());
        }
        // No receivers is fine: nobody is streaming yet
        let subscribers = self.registry.updates.send(component).unwrap_or(0);
        debug!("Component {} updated, notified {} subscribers", key, subscribers);
    }

    async fn run(
        &self,
        cancel: CancellationToken,
        chain: Arc<CertChain>,
        on_ready: ReadyCallback,
    ) -> Result<()> {
        let tls = RustlsConfig::from_config(Arc::new(tls_config(&chain)?));
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .and_then(|l| l.set_nonblocking(true).map(|()| l))
            .map_err(|source| OperatorError::Bind {
                server: "api",
                source,
            })?;
        let handle = axum_server::Handle::new();

        let shutdown = {
            let handle = handle.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                handle.graceful_shutdown(Some(Duration::from_secs(5)));
            })
        };
        let readiness = {
            let handle = handle.clone();
            tokio::spawn(async move {
                if let Some(addr) = handle.listening().await {
                    info!("API server listening on {}", addr);
                    on_ready();
                }
            })
        };

        let result = axum_server::from_tcp_rustls(listener, tls)
            .handle(handle)
            .serve(self.router().into_make_service())
            .await;

        shutdown.abort();
        readiness.abort();
        result.map_err(|source| OperatorError::Serve {
            server: "api",
            source,
        })
    }
}

async fn list_components(State(registry): State<Arc<Registry>>) -> Json<Vec<Component>> {
    let components = registry
        .components
        .read()
        .map(|c| c.values().cloned().collect())
        .unwrap_or_default();
    Json(components)
}

/// Server-sent events, one `component` event per update observed after connecting
async fn stream_components(
    State(registry): State<Arc<Registry>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let updates = registry.updates.subscribe();
    let events = futures::stream::unfold(updates, |mut updates| async move {
        loop {
            match updates.recv().await {
                Ok(component) => match Event::default().event("component").json_data(&component) {
                    Ok(event) => return Some((Ok(event), updates)),
                    Err(e) => warn!("Unable to encode component update: {}", e),
                },
                Err(RecvError::Lagged(missed)) => {
                    warn!("Component stream subscriber lagged, {} updates dropped", missed)
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn get_component(
    State(registry): State<Arc<Registry>>,
    Path((namespace, name)): Path<(String, String)>,
) -> std::result::Result<Json<Component>, StatusCode> {
    let key = format!("{}/{}", namespace, name);
    registry
        .components
        .read()
        .ok()
        .and_then(|c| c.get(&key).cloned())
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Server identity from the leaf certificate; clients must present a certificate
/// issued by the root
fn tls_config(chain: &CertChain) -> Result<ServerConfig> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_slice_iter(&chain.root_cert) {
        roots.add(cert.map_err(tls_error)?).map_err(tls_error)?;
    }
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(tls_error)?;

    let certs = CertificateDer::pem_slice_iter(&chain.cert)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(tls_error)?;
    let key = PrivateKeyDer::from_pem_slice(&chain.key).map_err(tls_error)?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(tls_error)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(config)
}

fn tls_error(e: impl std::fmt::Display) -> OperatorError {
    OperatorError::ApiServer(format!("invalid TLS material: {}", e))
}
