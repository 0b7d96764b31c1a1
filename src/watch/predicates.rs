// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Filters deciding whether a change event warrants a reconciliation.

use super::events::ObjectEvent;
use crate::annotations;
use crate::constants::fields;
use crate::types::Route;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Resource, ResourceExt};

pub trait EventFilter<K>: Send + Sync {
    fn on_create(&self, object: &K) -> bool;

    fn on_update(&self, old: &K, new: &K) -> bool;

    fn accepts(&self, event: &ObjectEvent<K>) -> bool {
        match event {
            ObjectEvent::Created(obj) => self.on_create(obj),
            ObjectEvent::Updated { old, new } => self.on_update(old, new),
            ObjectEvent::Deleted(_) => false,
        }
    }
}

/// Target objects carrying any of `keys`. Updates pass only when one of
/// the annotation values changed.
#[derive(Debug, Clone)]
pub struct AnnotatedTarget {
    keys: Vec<&'static str>,
}

impl AnnotatedTarget {
    pub fn new(keys: &[&'static str]) -> Self {
        Self {
            keys: keys.to_vec(),
        }
    }
}

impl<K: Resource> EventFilter<K> for AnnotatedTarget {
    fn on_create(&self, object: &K) -> bool {
        let annotations = object.annotations();
        self.keys.iter().any(|key| annotations.contains_key(*key))
    }

    fn on_update(&self, old: &K, new: &K) -> bool {
        self.keys
            .iter()
            .any(|key| old.annotations().get(*key) != new.annotations().get(*key))
    }
}

/// [`AnnotatedTarget`] restricted to edge and reencrypt routes
#[derive(Debug, Clone)]
pub struct SecureRoute {
    annotated: AnnotatedTarget,
}

impl SecureRoute {
    pub fn new(keys: &[&'static str]) -> Self {
        Self {
            annotated: AnnotatedTarget::new(keys),
        }
    }
}

impl EventFilter<Route> for SecureRoute {
    fn on_create(&self, route: &Route) -> bool {
        route.is_secure() && self.annotated.on_create(route)
    }

    fn on_update(&self, old: &Route, new: &Route) -> bool {
        new.is_secure() && self.annotated.on_update(old, new)
    }
}

/// [`AnnotatedTarget`] restricted to TLS secrets
#[derive(Debug, Clone)]
pub struct AnnotatedTlsTarget {
    annotated: AnnotatedTarget,
}

impl AnnotatedTlsTarget {
    pub fn new(keys: &[&'static str]) -> Self {
        Self {
            annotated: AnnotatedTarget::new(keys),
        }
    }
}

impl EventFilter<Secret> for AnnotatedTlsTarget {
    fn on_create(&self, secret: &Secret) -> bool {
        is_tls_secret(secret) && self.annotated.on_create(secret)
    }

    fn on_update(&self, old: &Secret, new: &Secret) -> bool {
        is_tls_secret(new) && self.annotated.on_update(old, new)
    }
}

pub fn is_tls_secret(secret: &Secret) -> bool {
    secret.type_.as_deref() == Some(fields::TLS_SECRET_TYPE)
}

fn field<'a>(secret: &'a Secret, key: &str) -> Option<&'a [u8]> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|value| value.0.as_slice())
}

fn fields_differ(old: &Secret, new: &Secret, keys: &[&str]) -> bool {
    keys.iter().any(|key| field(old, key) != field(new, key))
}

/// TLS secrets used as a source by other objects. Every TLS secret creation
/// passes; updates pass only when one of `fields` changed.
#[derive(Debug, Clone)]
pub struct TlsSourceChanged {
    fields: &'static [&'static str],
}

impl TlsSourceChanged {
    pub fn new(fields: &'static [&'static str]) -> Self {
        Self { fields }
    }
}

impl EventFilter<Secret> for TlsSourceChanged {
    fn on_create(&self, secret: &Secret) -> bool {
        is_tls_secret(secret)
    }

    fn on_update(&self, old: &Secret, new: &Secret) -> bool {
        is_tls_secret(new) && fields_differ(old, new, self.fields)
    }
}

/// TLS secrets that opted in to a derived artifact generated from their own
/// `fields`.
#[derive(Debug, Clone)]
pub struct AnnotatedTlsSecret {
    opt_in: &'static str,
    fields: &'static [&'static str],
}

impl AnnotatedTlsSecret {
    pub fn new(opt_in: &'static str, fields: &'static [&'static str]) -> Self {
        Self { opt_in, fields }
    }
}

impl EventFilter<Secret> for AnnotatedTlsSecret {
    fn on_create(&self, secret: &Secret) -> bool {
        is_tls_secret(secret) && annotations::is_enabled(secret.annotations(), self.opt_in)
    }

    fn on_update(&self, old: &Secret, new: &Secret) -> bool {
        if !is_tls_secret(new) {
            return false;
        }
        let was_enabled = annotations::is_enabled(old.annotations(), self.opt_in);
        let enabled = annotations::is_enabled(new.annotations(), self.opt_in);
        was_enabled != enabled || (enabled && fields_differ(old, new, self.fields))
    }
}

/// Config maps that opted in to truststore generation. Updates pass when the
/// opt-in flipped or the configured source key's value changed.
#[derive(Debug, Clone)]
pub struct TruststoreConfigMap {
    opt_in: &'static str,
}

impl TruststoreConfigMap {
    pub fn new(opt_in: &'static str) -> Self {
        Self { opt_in }
    }
}

fn source_value(cm: &ConfigMap) -> Option<&str> {
    let key = annotations::source_ca_key(cm.annotations());
    cm.data
        .as_ref()
        .and_then(|data| data.get(&key))
        .map(String::as_str)
}

impl EventFilter<ConfigMap> for TruststoreConfigMap {
    fn on_create(&self, cm: &ConfigMap) -> bool {
        annotations::is_enabled(cm.annotations(), self.opt_in)
    }

    fn on_update(&self, old: &ConfigMap, new: &ConfigMap) -> bool {
        let was_enabled = annotations::is_enabled(old.annotations(), self.opt_in);
        let enabled = annotations::is_enabled(new.annotations(), self.opt_in);
        was_enabled != enabled || (enabled && source_value(old) != source_value(new))
    }
}
