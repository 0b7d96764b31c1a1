// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::defaults;
use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;

/// Whether the route controllers are started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSupport {
    /// Start them only when the route API is served by the cluster
    Auto,
    Enabled,
    Disabled,
}

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// PEM bundle injected for `injectca-from-service_ca`
    pub system_ca_file: PathBuf,
    pub metrics_bind_address: String,
    pub routes: RouteSupport,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let system_ca_file = lookup("SYSTEM_CA_FILE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| defaults::SYSTEM_CA_FILE.to_string());
        let metrics_bind_address = lookup("METRICS_BIND_ADDRESS")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| defaults::METRICS_BIND_ADDRESS.to_string());
        let routes = match lookup("ENABLE_ROUTES").as_deref() {
            None | Some("") | Some("auto") => RouteSupport::Auto,
            Some("true") => RouteSupport::Enabled,
            Some("false") => RouteSupport::Disabled,
            Some(other) => bail!("ENABLE_ROUTES must be one of auto, true, false; got {}", other),
        };

        Ok(Config {
            system_ca_file: PathBuf::from(system_ca_file),
            metrics_bind_address,
            routes,
        })
    }
}
