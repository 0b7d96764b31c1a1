// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CA bundle injection into config maps, TLS secrets, API services, webhook
//! configurations and conversion webhooks.

use super::engine::{secret_field, set_secret_field, Source, Sources, SyncKind};
use crate::annotations;
use crate::constants::annotations::{INJECT_CA_FROM_SECRET, INJECT_CA_FROM_SERVICE_CA};
use crate::constants::fields::CA_CERT;
use crate::error::Result;
use crate::kubernetes::Object;
use crate::watch::predicates::{
    is_tls_secret, AnnotatedTarget, AnnotatedTlsTarget, EventFilter, TlsSourceChanged,
};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::APIService;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A target with one or more CA bundle slots that all receive the same bytes
pub trait CaBundleTarget: Object {
    const CONTROLLER: &'static str;
    /// Whether `injectca-from-service_ca` is honoured
    const SYSTEM_CA: bool;

    /// Current content of every slot, in a stable order
    fn ca_bundles(&self) -> Vec<Option<Vec<u8>>>;

    /// Set every slot; `None` clears it
    fn set_ca_bundles(&mut self, bundle: Option<&[u8]>);

    /// Objects of this type that never receive a bundle
    fn eligible(&self) -> bool {
        true
    }

    fn target_filter() -> Arc<dyn EventFilter<Self>> {
        if Self::SYSTEM_CA {
            Arc::new(AnnotatedTarget::new(&[
                INJECT_CA_FROM_SECRET,
                INJECT_CA_FROM_SERVICE_CA,
            ]))
        } else {
            Arc::new(AnnotatedTarget::new(&[INJECT_CA_FROM_SECRET]))
        }
    }
}

/// CA injection for any [`CaBundleTarget`]
pub struct CaInjection<K> {
    _target: PhantomData<fn() -> K>,
}

impl<K> Default for CaInjection<K> {
    fn default() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<K: CaBundleTarget> SyncKind for CaInjection<K> {
    type Target = K;
    type Value = Vec<Option<Vec<u8>>>;

    const NAME: &'static str = K::CONTROLLER;

    fn applies(&self, target: &K) -> bool {
        target.eligible()
    }

    fn sources(&self, target: &K) -> Result<Vec<Source>> {
        let annotations = target.annotations();
        if let Some(reference) = annotations::qualified_reference(annotations, INJECT_CA_FROM_SECRET)? {
            return Ok(vec![Source::Secret(reference)]);
        }
        if K::SYSTEM_CA && annotations::is_enabled(annotations, INJECT_CA_FROM_SERVICE_CA) {
            return Ok(vec![Source::SystemCa]);
        }
        Ok(Vec::new())
    }

    fn current(&self, target: &K) -> Self::Value {
        target.ca_bundles()
    }

    fn desired(&self, target: &K, sources: &Sources) -> Result<Self::Value> {
        let bundle = self
            .sources(target)?
            .first()
            .and_then(|source| sources.field(source, CA_CERT))
            .map(<[u8]>::to_vec);
        Ok(target.ca_bundles().iter().map(|_| bundle.clone()).collect())
    }

    fn write(&self, target: &mut K, value: Self::Value) {
        let bundle = value.into_iter().flatten().next();
        target.set_ca_bundles(bundle.as_deref());
    }

    fn target_filter(&self) -> Arc<dyn EventFilter<K>> {
        K::target_filter()
    }

    fn source_filter(&self) -> Option<Arc<dyn EventFilter<Secret>>> {
        Some(Arc::new(TlsSourceChanged::new(&[CA_CERT])))
    }

    fn uses_system_ca(&self) -> bool {
        K::SYSTEM_CA
    }
}

fn non_empty(bundle: Option<&[u8]>) -> Option<ByteString> {
    bundle
        .filter(|b| !b.is_empty())
        .map(|b| ByteString(b.to_vec()))
}

fn byte_string(value: &Option<ByteString>) -> Option<Vec<u8>> {
    value.as_ref().map(|b| b.0.clone()).filter(|b| !b.is_empty())
}

impl CaBundleTarget for ConfigMap {
    const CONTROLLER: &'static str = "configmap-ca-injection";
    const SYSTEM_CA: bool = false;

    fn ca_bundles(&self) -> Vec<Option<Vec<u8>>> {
        let value = self
            .data
            .as_ref()
            .and_then(|data| data.get(CA_CERT))
            .filter(|v| !v.is_empty())
            .map(|v| v.as_bytes().to_vec());
        vec![value]
    }

    fn set_ca_bundles(&mut self, bundle: Option<&[u8]>) {
        match bundle.filter(|b| !b.is_empty()) {
            Some(bundle) => {
                self.data.get_or_insert_with(Default::default).insert(
                    CA_CERT.to_string(),
                    String::from_utf8_lossy(bundle).into_owned(),
                );
            }
            None => {
                if let Some(data) = self.data.as_mut() {
                    data.remove(CA_CERT);
                }
            }
        }
    }
}

/// Only TLS secrets take part
impl CaBundleTarget for Secret {
    const CONTROLLER: &'static str = "secret-ca-injection";
    const SYSTEM_CA: bool = false;

    fn ca_bundles(&self) -> Vec<Option<Vec<u8>>> {
        vec![secret_field(self, CA_CERT).map(<[u8]>::to_vec)]
    }

    fn set_ca_bundles(&mut self, bundle: Option<&[u8]>) {
        let bundle = bundle.filter(|b| !b.is_empty()).map(<[u8]>::to_vec);
        set_secret_field(self, CA_CERT, bundle);
    }

    fn eligible(&self) -> bool {
        is_tls_secret(self)
    }

    fn target_filter() -> Arc<dyn EventFilter<Self>> {
        Arc::new(AnnotatedTlsTarget::new(&[INJECT_CA_FROM_SECRET]))
    }
}

impl CaBundleTarget for APIService {
    const CONTROLLER: &'static str = "apiservice-ca-injection";
    const SYSTEM_CA: bool = true;

    fn ca_bundles(&self) -> Vec<Option<Vec<u8>>> {
        let value = self.spec.as_ref().and_then(|spec| byte_string(&spec.ca_bundle));
        vec![value]
    }

    fn set_ca_bundles(&mut self, bundle: Option<&[u8]>) {
        self.spec.get_or_insert_with(Default::default).ca_bundle = non_empty(bundle);
    }
}

impl CaBundleTarget for MutatingWebhookConfiguration {
    const CONTROLLER: &'static str = "mutatingwebhook-ca-injection";
    const SYSTEM_CA: bool = true;

    fn ca_bundles(&self) -> Vec<Option<Vec<u8>>> {
        self.webhooks
            .iter()
            .flatten()
            .map(|webhook| byte_string(&webhook.client_config.ca_bundle))
            .collect()
    }

    fn set_ca_bundles(&mut self, bundle: Option<&[u8]>) {
        for webhook in self.webhooks.iter_mut().flatten() {
            webhook.client_config.ca_bundle = non_empty(bundle);
        }
    }
}

impl CaBundleTarget for ValidatingWebhookConfiguration {
    const CONTROLLER: &'static str = "validatingwebhook-ca-injection";
    const SYSTEM_CA: bool = true;

    fn ca_bundles(&self) -> Vec<Option<Vec<u8>>> {
        self.webhooks
            .iter()
            .flatten()
            .map(|webhook| byte_string(&webhook.client_config.ca_bundle))
            .collect()
    }

    fn set_ca_bundles(&mut self, bundle: Option<&[u8]>) {
        for webhook in self.webhooks.iter_mut().flatten() {
            webhook.client_config.ca_bundle = non_empty(bundle);
        }
    }
}

/// Only CRDs with a conversion webhook have a slot
impl CaBundleTarget for CustomResourceDefinition {
    const CONTROLLER: &'static str = "crd-ca-injection";
    const SYSTEM_CA: bool = true;

    fn ca_bundles(&self) -> Vec<Option<Vec<u8>>> {
        self.spec
            .conversion
            .as_ref()
            .and_then(|conversion| conversion.webhook.as_ref())
            .map(|webhook| {
                vec![webhook
                    .client_config
                    .as_ref()
                    .and_then(|config| byte_string(&config.ca_bundle))]
            })
            .unwrap_or_default()
    }

    fn set_ca_bundles(&mut self, bundle: Option<&[u8]>) {
        if let Some(webhook) = self
            .spec
            .conversion
            .as_mut()
            .and_then(|conversion| conversion.webhook.as_mut())
        {
            webhook
                .client_config
                .get_or_insert_with(Default::default)
                .ca_bundle = non_empty(bundle);
        }
    }
}
