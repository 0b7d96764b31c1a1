// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Java keystore and truststore generation for TLS secrets.

use super::engine::{secret_field, set_secret_field, Source, Sources, SyncKind};
use crate::annotations;
use crate::certs::jks;
use crate::constants::annotations::GENERATE_JAVA_KEYSTORES;
use crate::constants::fields::{CA_CERT, KEYSTORE, TLS_CERT, TLS_KEY, TRUSTSTORE};
use crate::error::Result;
use crate::watch::predicates::{is_tls_secret, AnnotatedTlsSecret, EventFilter};
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::debug;

/// Encoded `keystore.jks` and `truststore.jks`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeystoreFiles {
    pub keystore: Option<Vec<u8>>,
    pub truststore: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct JavaKeystores;

fn same_store(current: &Option<Vec<u8>>, desired: &Option<Vec<u8>>, password: &str) -> bool {
    match (current, desired) {
        (None, None) => true,
        (Some(current), Some(desired)) => jks::equivalent(current, desired, password),
        _ => false,
    }
}

impl SyncKind for JavaKeystores {
    type Target = Secret;
    type Value = KeystoreFiles;

    const NAME: &'static str = "secret-keystores";
    fn applies(&self, secret: &Secret) -> bool {
        is_tls_secret(secret)
    }

    fn sources(&self, _secret: &Secret) -> Result<Vec<Source>> {
        Ok(Vec::new())
    }

    fn current(&self, secret: &Secret) -> KeystoreFiles {
        KeystoreFiles {
            keystore: secret_field(secret, KEYSTORE).map(<[u8]>::to_vec),
            truststore: secret_field(secret, TRUSTSTORE).map(<[u8]>::to_vec),
        }
    }

    fn desired(&self, secret: &Secret, _sources: &Sources) -> Result<KeystoreFiles> {
        if !annotations::is_enabled(secret.annotations(), GENERATE_JAVA_KEYSTORES) {
            return Ok(KeystoreFiles::default());
        }
        let password = annotations::keystore_password(secret.annotations());
        let created = secret
            .creation_timestamp()
            .map(|t| t.0)
            .unwrap_or_else(Utc::now);

        let keystore = match (secret_field(secret, TLS_CERT), secret_field(secret, TLS_KEY)) {
            (Some(cert), Some(key)) => Some(jks::keystore_from_pem(cert, key, created, &password)?),
            _ => {
                debug!(
                    "Secret {}/{} lacks tls.crt or tls.key, no keystore generated",
                    secret.namespace().unwrap_or_default(),
                    secret.name_any()
                );
                None
            }
        };
        let truststore = secret_field(secret, CA_CERT)
            .map(|ca| jks::truststore_from_pem(ca, created, &password))
            .transpose()?;

        Ok(KeystoreFiles {
            keystore,
            truststore,
        })
    }

    fn write(&self, secret: &mut Secret, value: KeystoreFiles) {
        set_secret_field(secret, KEYSTORE, value.keystore);
        set_secret_field(secret, TRUSTSTORE, value.truststore);
    }

    fn unchanged(&self, secret: &Secret, current: &KeystoreFiles, desired: &KeystoreFiles) -> bool {
        let password = annotations::keystore_password(secret.annotations());
        same_store(&current.keystore, &desired.keystore, &password)
            && same_store(&current.truststore, &desired.truststore, &password)
    }

    fn target_filter(&self) -> Arc<dyn EventFilter<Secret>> {
        Arc::new(AnnotatedTlsSecret::new(
            GENERATE_JAVA_KEYSTORES,
            &[TLS_CERT, TLS_KEY, CA_CERT],
        ))
    }
}
