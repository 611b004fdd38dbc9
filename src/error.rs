// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;
use thiserror::Error;

/// How the supervisor must react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The process cannot continue safely and must exit.
    Fatal,
    /// Logged and absorbed; the owning loop moves on to its next iteration.
    Transient,
    /// The root context was cancelled while waiting.
    Cancelled,
}

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Cache sync did not complete within {0:?}")]
    CacheSync(Duration),

    #[error("Cache driver stopped: {0}")]
    CacheDriver(String),

    #[error("Cache subscription already taken")]
    AlreadySubscribed,

    #[error("Timeout while waiting to load TLS certificates after {0:?}")]
    CredentialsTimeout(Duration),

    #[error("Failed to load TLS certificates: {0}")]
    Credentials(String),

    #[error("Error watching credentials directory: {0}")]
    CredentialWatch(String),

    #[error("Unable to load configuration {name}: {reason}")]
    Configuration { name: String, reason: String },

    #[error("Failed to bind {server} server: {source}")]
    Bind {
        server: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{server} server failed: {source}")]
    Serve {
        server: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("API server failed: {0}")]
    ApiServer(String),

    #[error("Restart of pod {0} failed: {1}")]
    Restart(String, String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl OperatorError {
    /// Classify this error at the point the supervisor observes it.
    pub fn class(&self) -> ErrorClass {
        match self {
            OperatorError::KubeError(_) | OperatorError::Restart(..) => ErrorClass::Transient,
            OperatorError::Credentials(_) => ErrorClass::Transient,
            OperatorError::Cancelled => ErrorClass::Cancelled,
            OperatorError::CacheSync(_)
            | OperatorError::CacheDriver(_)
            | OperatorError::AlreadySubscribed
            | OperatorError::CredentialsTimeout(_)
            | OperatorError::CredentialWatch(_)
            | OperatorError::Configuration { .. }
            | OperatorError::Bind { .. }
            | OperatorError::Serve { .. }
            | OperatorError::ApiServer(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;
