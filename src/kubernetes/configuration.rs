// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Startup read of the control-plane Configuration resource

use crate::credentials::TlsCredentials;
use crate::error::{OperatorError, Result};
use crate::types::Configuration;
use kube::{Api, Client};
use std::path::Path;
use tracing::{info, instrument};

/// Resolved configuration with the credential paths attached
#[derive(Debug, Clone)]
pub struct OperatorConfiguration {
    pub name: String,
    pub mtls_enabled: bool,
    pub credentials: TlsCredentials,
}

/// Fetch the named Configuration. Any failure, including absence, is a configuration error.
#[instrument(skip(client, cert_chain_path))]
pub async fn load_configuration(
    client: Client,
    namespace: &str,
    name: &str,
    cert_chain_path: &Path,
) -> Result<OperatorConfiguration> {
    let api: Api<Configuration> = Api::namespaced(client, namespace);
    let config = api.get(name).await.map_err(|e| OperatorError::Configuration {
        name: format!("{}/{}", namespace, name),
        reason: match e {
            kube::Error::Api(ref resp) if resp.code == 404 => "not found".to_string(),
            e => e.to_string(),
        },
    })?;

    let mtls_enabled = config.mtls_enabled();
    info!(
        "Loaded configuration {}/{} (mtls enabled: {})",
        namespace, name, mtls_enabled
    );

    Ok(OperatorConfiguration {
        name: name.to_string(),
        mtls_enabled,
        credentials: TlsCredentials::new(cert_chain_path),
    })
}
