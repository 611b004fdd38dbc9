// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! TLS identity of the control plane: credential paths, chain loading and the
//! watch-and-retry bootstrap.

pub mod bootstrap;
pub mod chain;
pub mod watch;

pub use bootstrap::CertBootstrapper;
pub use chain::{load_from_disk, CertChain, TlsCredentials};
pub use watch::{DirWatcher, NotifyWatcher, WatchSubscription};
