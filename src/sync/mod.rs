// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Component change propagation from the cluster cache to the API server.

pub mod notifier;

pub use notifier::ChangeNotifier;
