// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Human-readable certificate descriptions stored next to the PEM fields.

use super::engine::{secret_field, set_secret_field, Source, Sources, SyncKind};
use crate::annotations;
use crate::certs::info;
use crate::constants::annotations::GENERATE_CERT_INFO;
use crate::constants::fields::{CA_CERT, CA_INFO, CERT_INFO, TLS_CERT};
use crate::error::Result;
use crate::watch::predicates::{is_tls_secret, AnnotatedTlsSecret, EventFilter};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoFields {
    pub certificate: Option<Vec<u8>>,
    pub ca: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct CertificateInfo;

fn describe_field(secret: &Secret, key: &str) -> Option<Vec<u8>> {
    secret_field(secret, key)
        .map(info::describe)
        .filter(|text| !text.is_empty())
        .map(String::into_bytes)
}

impl SyncKind for CertificateInfo {
    type Target = Secret;
    type Value = InfoFields;

    const NAME: &'static str = "secret-cert-info";
    fn applies(&self, secret: &Secret) -> bool {
        is_tls_secret(secret)
    }

    fn sources(&self, _secret: &Secret) -> Result<Vec<Source>> {
        Ok(Vec::new())
    }

    fn current(&self, secret: &Secret) -> InfoFields {
        InfoFields {
            certificate: secret_field(secret, CERT_INFO).map(<[u8]>::to_vec),
            ca: secret_field(secret, CA_INFO).map(<[u8]>::to_vec),
        }
    }

    fn desired(&self, secret: &Secret, _sources: &Sources) -> Result<InfoFields> {
        if !annotations::is_enabled(secret.annotations(), GENERATE_CERT_INFO) {
            return Ok(InfoFields::default());
        }
        Ok(InfoFields {
            certificate: describe_field(secret, TLS_CERT),
            ca: describe_field(secret, CA_CERT),
        })
    }

    fn write(&self, secret: &mut Secret, value: InfoFields) {
        set_secret_field(secret, CERT_INFO, value.certificate);
        set_secret_field(secret, CA_INFO, value.ca);
    }

    fn target_filter(&self) -> Arc<dyn EventFilter<Secret>> {
        Arc::new(AnnotatedTlsSecret::new(GENERATE_CERT_INFO, &[TLS_CERT, CA_CERT]))
    }
}
