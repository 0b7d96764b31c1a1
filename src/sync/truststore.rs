// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Java truststore generation for config maps holding a CA bundle.

use super::engine::{Source, Sources, SyncKind};
use crate::annotations;
use crate::certs::jks;
use crate::constants::annotations::GENERATE_JAVA_TRUSTSTORE;
use crate::constants::fields::TRUSTSTORE;
use crate::error::Result;
use crate::watch::predicates::{EventFilter, TruststoreConfigMap};
use chrono::Utc;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ConfigMapTruststore;

impl SyncKind for ConfigMapTruststore {
    type Target = ConfigMap;
    type Value = Option<Vec<u8>>;

    const NAME: &'static str = "configmap-truststore";
    fn sources(&self, _cm: &ConfigMap) -> Result<Vec<Source>> {
        Ok(Vec::new())
    }

    fn current(&self, cm: &ConfigMap) -> Option<Vec<u8>> {
        cm.binary_data
            .as_ref()
            .and_then(|data| data.get(TRUSTSTORE))
            .map(|value| value.0.clone())
            .filter(|value| !value.is_empty())
    }

    fn desired(&self, cm: &ConfigMap, _sources: &Sources) -> Result<Option<Vec<u8>>> {
        if !annotations::is_enabled(cm.annotations(), GENERATE_JAVA_TRUSTSTORE) {
            return Ok(None);
        }
        let key = annotations::source_ca_key(cm.annotations());
        let Some(bundle) = cm
            .data
            .as_ref()
            .and_then(|data| data.get(&key))
            .filter(|value| !value.is_empty())
        else {
            return Ok(None);
        };

        let password = annotations::keystore_password(cm.annotations());
        let created = cm
            .creation_timestamp()
            .map(|t| t.0)
            .unwrap_or_else(Utc::now);
        Ok(Some(jks::truststore_from_pem(bundle.as_bytes(), created, &password)?))
    }

    fn write(&self, cm: &mut ConfigMap, value: Option<Vec<u8>>) {
        match value {
            Some(store) => {
                cm.binary_data
                    .get_or_insert_with(Default::default)
                    .insert(TRUSTSTORE.to_string(), ByteString(store));
            }
            None => {
                if let Some(data) = cm.binary_data.as_mut() {
                    data.remove(TRUSTSTORE);
                }
            }
        }
    }

    fn unchanged(&self, cm: &ConfigMap, current: &Option<Vec<u8>>, desired: &Option<Vec<u8>>) -> bool {
        match (current, desired) {
            (None, None) => true,
            (Some(current), Some(desired)) => {
                jks::equivalent(current, desired, &annotations::keystore_password(cm.annotations()))
            }
            _ => false,
        }
    }

    fn target_filter(&self) -> Arc<dyn EventFilter<ConfigMap>> {
        Arc::new(TruststoreConfigMap::new(GENERATE_JAVA_TRUSTSTORE))
    }
}
