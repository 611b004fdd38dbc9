// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Certificate chain loading from the credential directory

use crate::constants::credentials::{CERT_FILENAME, KEY_FILENAME, ROOT_CERT_FILENAME};
use crate::error::{OperatorError, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use x509_parser::pem::parse_x509_pem;

/// Well-known credential file locations under one base directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsCredentials {
    path: PathBuf,
}

impl TlsCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The directory that gets watched while waiting for certificates
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root_cert_path(&self) -> PathBuf {
        self.path.join(ROOT_CERT_FILENAME)
    }

    pub fn cert_path(&self) -> PathBuf {
        self.path.join(CERT_FILENAME)
    }

    pub fn key_path(&self) -> PathBuf {
        self.path.join(KEY_FILENAME)
    }
}

/// A fully loaded root + leaf + key triple. Never constructed partially.
#[derive(Clone)]
pub struct CertChain {
    pub root_cert: Vec<u8>,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertChain {
    /// Build a chain from PEM blobs, validating all three parts
    pub fn from_pem(root_cert: Vec<u8>, cert: Vec<u8>, key: Vec<u8>) -> Result<Self> {
        parse_validity(&root_cert, "root certificate")?;
        let (not_before, not_after) = parse_validity(&cert, "certificate")?;
        check_private_key(&key)?;

        Ok(Self {
            root_cert,
            cert,
            key,
            not_before,
            not_after,
        })
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at > self.not_after
    }
}

// Keep key material out of logs
impl fmt::Debug for CertChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertChain")
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Read all three credential files. Fails unless every file is present and parses.
pub async fn load_from_disk(credentials: &TlsCredentials) -> Result<CertChain> {
    let root_cert = read_file(&credentials.root_cert_path()).await?;
    let cert = read_file(&credentials.cert_path()).await?;
    let key = read_file(&credentials.key_path()).await?;

    CertChain::from_pem(root_cert, cert, key)
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| OperatorError::Credentials(format!("{}: {}", path.display(), e)))
}

fn parse_validity(pem_data: &[u8], what: &str) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let (_, pem) = parse_x509_pem(pem_data)
        .map_err(|e| OperatorError::Credentials(format!("invalid {} PEM: {:?}", what, e)))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| OperatorError::Credentials(format!("invalid {}: {:?}", what, e)))?;

    let validity = cert.validity();
    let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0);
    let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0);

    match (not_before, not_after) {
        (Some(nb), Some(na)) => Ok((nb, na)),
        _ => Err(OperatorError::Credentials(format!(
            "{} validity is out of range",
            what
        ))),
    }
}

fn check_private_key(pem_data: &[u8]) -> Result<()> {
    let (_, pem) = parse_x509_pem(pem_data)
        .map_err(|e| OperatorError::Credentials(format!("invalid private key PEM: {:?}", e)))?;

    if !pem.label.ends_with("PRIVATE KEY") {
        return Err(OperatorError::Credentials(format!(
            "expected a private key, found PEM block {:?}",
            pem.label
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_chain_pems, write_test_chain};

    #[test]
    fn test_credential_paths() {
        let creds = TlsCredentials::new("/certs");
        assert_eq!(creds.root_cert_path(), PathBuf::from("/certs/ca.pem"));
        assert_eq!(creds.cert_path(), PathBuf::from("/certs/cert.pem"));
        assert_eq!(creds.key_path(), PathBuf::from("/certs/key.pem"));
    }

    #[tokio::test]
    async fn test_load_from_disk_complete_chain() {
        let dir = tempfile::tempdir().unwrap();
        write_test_chain(dir.path());

        let chain = load_from_disk(&TlsCredentials::new(dir.path())).await.unwrap();

        assert!(!chain.root_cert.is_empty());
        assert!(chain.not_before < chain.not_after);
        assert!(!chain.is_expired_at(Utc::now()));
    }

    #[tokio::test]
    async fn test_load_from_disk_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let (ca, cert, _) = test_chain_pems();
        std::fs::write(dir.path().join(ROOT_CERT_FILENAME), ca).unwrap();
        std::fs::write(dir.path().join(CERT_FILENAME), cert).unwrap();

        let err = load_from_disk(&TlsCredentials::new(dir.path()))
            .await
            .unwrap_err();

        assert!(matches!(err, OperatorError::Credentials(_)));
        assert!(err.to_string().contains("key.pem"));
    }

    #[test]
    fn test_from_pem_rejects_truncated_certificate() {
        let (ca, cert, key) = test_chain_pems();
        let truncated = cert.as_bytes()[..cert.len() / 2].to_vec();

        let result = CertChain::from_pem(ca.into_bytes(), truncated, key.into_bytes());

        assert!(result.is_err());
    }

    #[test]
    fn test_from_pem_rejects_certificate_in_key_slot() {
        let (ca, cert, _) = test_chain_pems();

        let result = CertChain::from_pem(ca.into_bytes(), cert.clone().into_bytes(), cert.into_bytes());

        assert!(result.unwrap_err().to_string().contains("expected a private key"));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let (ca, cert, key) = test_chain_pems();
        let chain = CertChain::from_pem(ca.into_bytes(), cert.into_bytes(), key.into_bytes()).unwrap();

        let rendered = format!("{:?}", chain);

        assert!(rendered.contains("not_after"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }
}
