// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod kubernetes;
pub mod operator;
pub mod server;
pub mod shutdown;
pub mod sync;
pub mod types;
pub mod watchdog;

#[cfg(test)]
pub mod test_utils;
