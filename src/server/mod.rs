// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Servers the operator hands control to: the component API and the health endpoint.

pub mod api;
pub mod health;

pub use api::{ApiServer, ComponentApiServer, ReadyCallback};
pub use health::HealthServer;
