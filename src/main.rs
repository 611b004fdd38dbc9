// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sidecar_operator::config::Config;
use sidecar_operator::error::ErrorClass;
use sidecar_operator::operator::Operator;
use sidecar_operator::server::ComponentApiServer;
use sidecar_operator::shutdown::cancel_on_signal;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting sidecar operator");

    let config = Config::from_env().context("invalid operator configuration")?;
    info!(
        "Configuration loaded: namespace={}, config={}, leader_election={}, watchdog={}",
        config.namespace, config.config_name, config.leader_election, config.watchdog_enabled
    );
    let unsupported = config.unsupported_reconcilers();
    if !unsupported.is_empty() {
        warn!(
            "Ignoring {}: service reconcilers are not provided by this operator",
            unsupported.join(", ")
        );
    }

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let api_server = Arc::new(ComponentApiServer::new(config.api_port));
    let operator = Operator::new(client, config, api_server);

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone()).context("failed to install signal handlers")?;

    match operator.run(cancel).await {
        Ok(()) => Ok(()),
        Err(e) if e.class() == ErrorClass::Cancelled => {
            info!("Stopped before startup completed");
            Ok(())
        }
        Err(e) => Err(e).context("operator failed"),
    }
}

