// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! API availability checks

use crate::constants::route::{GROUP, KIND, VERSION};
use crate::error::Result;
use kube::{discovery::Discovery, Client};
use tracing::info;

/// Check whether the OpenShift route API is served by the cluster.
pub async fn route_api_available(client: &Client) -> Result<bool> {
    let discovery = Discovery::new(client.clone())
        .filter(&[GROUP])
        .run()
        .await?;

    for group in discovery.groups() {
        if group.name() == GROUP {
            for (ar, _) in group.recommended_resources() {
                if ar.kind == KIND && ar.version == VERSION {
                    info!("Route API ({}/{}) is available", GROUP, VERSION);
                    return Ok(true);
                }
            }
        }
    }

    info!("Route API ({}/{}) is not available", GROUP, VERSION);
    Ok(false)
}
