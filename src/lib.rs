// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod annotations;
pub mod certs;
pub mod config;
pub mod constants;
pub mod error;
pub mod kubernetes;
pub mod metrics;
pub mod reconcilers;
pub mod server;
pub mod sync;
pub mod types;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_utils;
