// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes plumbing: the object cache, the Configuration read and leader election.

pub mod cache;
pub mod configuration;
pub mod leader;

pub use cache::{CacheGate, CacheHandle, ChangeEvent};
pub use configuration::{load_configuration, OperatorConfiguration};
pub use leader::{LeaderElector, LeaderStatus, Leadership};
