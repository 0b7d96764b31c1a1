// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::route::{TERMINATION_EDGE, TERMINATION_REENCRYPT};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// OpenShift route. Only the TLS block is modelled; every other field is
/// carried through untouched so a full replace does not drop it.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(group = "route.openshift.io", version = "v1", kind = "Route")]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    #[serde(default)]
    pub termination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,
    #[serde(
        rename = "destinationCACertificate",
        skip_serializing_if = "Option::is_none"
    )]
    pub destination_ca_certificate: Option<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl Route {
    /// Edge and reencrypt routes terminate TLS at the router and accept
    /// certificate material
    pub fn is_secure(&self) -> bool {
        self.spec.tls.as_ref().is_some_and(|tls| {
            tls.termination == TERMINATION_EDGE || tls.termination == TERMINATION_REENCRYPT
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn make_route(termination: Option<&str>) -> Route {
        Route {
            metadata: ObjectMeta {
                name: Some("frontend".to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            spec: RouteSpec {
                tls: termination.map(|t| TlsConfig {
                    termination: t.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_is_secure() {
        assert!(make_route(Some("edge")).is_secure());
        assert!(make_route(Some("reencrypt")).is_secure());
        assert!(!make_route(Some("passthrough")).is_secure());
        assert!(!make_route(None).is_secure());
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = serde_json::json!({
            "apiVersion": "route.openshift.io/v1",
            "kind": "Route",
            "metadata": { "name": "frontend", "namespace": "apps" },
            "spec": {
                "host": "www.example.com",
                "to": { "kind": "Service", "name": "frontend", "weight": 100 },
                "tls": {
                    "termination": "reencrypt",
                    "insecureEdgeTerminationPolicy": "Redirect",
                    "destinationCACertificate": "PEM"
                }
            }
        });
        let route: Route = serde_json::from_value(raw).unwrap();
        let tls = route.spec.tls.as_ref().unwrap();
        assert_eq!(tls.destination_ca_certificate.as_deref(), Some("PEM"));

        let back = serde_json::to_value(&route).unwrap();
        assert_eq!(back["spec"]["to"]["name"], "frontend");
        assert_eq!(back["spec"]["tls"]["insecureEdgeTerminationPolicy"], "Redirect");
        assert_eq!(back["spec"]["tls"]["destinationCACertificate"], "PEM");
    }
}
