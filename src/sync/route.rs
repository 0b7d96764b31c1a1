// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Route certificate population from secrets in the route's namespace.

use super::engine::{Source, Sources, SyncKind};
use crate::annotations::{self, Reference};
use crate::constants::annotations::{CERTS_FROM_SECRET, DESTINATION_CA_FROM_SECRET};
use crate::constants::fields::{CA_CERT, TLS_CERT, TLS_KEY};
use crate::error::Result;
use crate::types::Route;
use crate::watch::predicates::{EventFilter, SecureRoute, TlsSourceChanged};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::sync::Arc;

/// The TLS fields of a route this operator manages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTls {
    pub key: Option<String>,
    pub certificate: Option<String>,
    pub ca_certificate: Option<String>,
    pub destination_ca_certificate: Option<String>,
}

#[derive(Debug, Default)]
pub struct RouteCertificates;

struct RouteReferences {
    certs: Option<Reference>,
    destination_ca: Option<Reference>,
}

fn references(route: &Route) -> Result<RouteReferences> {
    let namespace = route.namespace().unwrap_or_default();
    let annotations = route.annotations();
    Ok(RouteReferences {
        certs: annotations::local_reference(annotations, CERTS_FROM_SECRET, &namespace)?,
        destination_ca: annotations::local_reference(
            annotations,
            DESTINATION_CA_FROM_SECRET,
            &namespace,
        )?,
    })
}

/// Take `key` from the secret when it holds a value, else keep `current`
fn field_or(sources: &Sources, source: &Source, key: &str, current: &Option<String>) -> Option<String> {
    sources
        .field(source, key)
        .map(|value| String::from_utf8_lossy(value).into_owned())
        .or_else(|| current.clone())
}

impl SyncKind for RouteCertificates {
    type Target = Route;
    type Value = RouteTls;

    const NAME: &'static str = "route-certificates";
    const LOCAL_SOURCES: bool = true;

    fn applies(&self, route: &Route) -> bool {
        route.is_secure()
    }

    fn sources(&self, route: &Route) -> Result<Vec<Source>> {
        let references = references(route)?;
        let mut sources: Vec<Source> = Vec::new();
        for reference in [references.certs, references.destination_ca].into_iter().flatten() {
            let source = Source::Secret(reference);
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        Ok(sources)
    }

    fn current(&self, route: &Route) -> RouteTls {
        route
            .spec
            .tls
            .as_ref()
            .map(|tls| RouteTls {
                key: tls.key.clone().filter(|v| !v.is_empty()),
                certificate: tls.certificate.clone().filter(|v| !v.is_empty()),
                ca_certificate: tls.ca_certificate.clone().filter(|v| !v.is_empty()),
                destination_ca_certificate: tls
                    .destination_ca_certificate
                    .clone()
                    .filter(|v| !v.is_empty()),
            })
            .unwrap_or_default()
    }

    fn desired(&self, route: &Route, sources: &Sources) -> Result<RouteTls> {
        let references = references(route)?;
        let current = self.current(route);

        let mut desired = RouteTls::default();
        if let Some(reference) = references.certs {
            let source = Source::Secret(reference);
            desired.key = field_or(sources, &source, TLS_KEY, &current.key);
            desired.certificate = field_or(sources, &source, TLS_CERT, &current.certificate);
            desired.ca_certificate = field_or(sources, &source, CA_CERT, &current.ca_certificate);
        }
        if let Some(reference) = references.destination_ca {
            let source = Source::Secret(reference);
            desired.destination_ca_certificate =
                field_or(sources, &source, CA_CERT, &current.destination_ca_certificate);
        }
        Ok(desired)
    }

    fn write(&self, route: &mut Route, value: RouteTls) {
        if let Some(tls) = route.spec.tls.as_mut() {
            tls.key = value.key;
            tls.certificate = value.certificate;
            tls.ca_certificate = value.ca_certificate;
            tls.destination_ca_certificate = value.destination_ca_certificate;
        }
    }

    fn target_filter(&self) -> Arc<dyn EventFilter<Route>> {
        Arc::new(SecureRoute::new(&[CERTS_FROM_SECRET, DESTINATION_CA_FROM_SECRET]))
    }

    fn source_filter(&self) -> Option<Arc<dyn EventFilter<Secret>>> {
        Some(Arc::new(TlsSourceChanged::new(&[TLS_CERT, TLS_KEY, CA_CERT])))
    }
}
