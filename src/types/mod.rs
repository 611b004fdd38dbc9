// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types observed by the operator.

pub mod component;
pub mod configuration;

pub use component::{Component, ComponentSpec};
pub use configuration::{Configuration, ConfigurationSpec};
