// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resource types not covered by k8s-openapi.

pub mod route;

pub use route::{Route, RouteSpec, TlsConfig};
