// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Periodic re-verification of certificate expiry for opted-in TLS secrets.

use super::engine::{secret_field, SyncOutcome};
use crate::annotations::{self, duration_or, signed_duration_or};
use crate::certs;
use crate::constants::annotations::{
    CERT_EXPIRY_CHECK_FREQUENCY, CERT_SOON_TO_EXPIRE_CHECK_FREQUENCY,
    CERT_SOON_TO_EXPIRE_THRESHOLD, GENERATE_CERT_EXPIRY_ALERT,
};
use crate::constants::defaults;
use crate::constants::fields::TLS_CERT;
use crate::error::Result;
use crate::kubernetes::{EventSink, ObjectStore};
use crate::metrics::Metrics;
use crate::watch::predicates::is_tls_secret;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const SOON_TO_EXPIRE_REASON: &str = "CertsSoonToExpire";

/// Threshold and polling intervals of one secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// May be negative: alert only once expired for that long
    pub threshold: chrono::Duration,
    pub soon_frequency: Duration,
    pub normal_frequency: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            threshold: chrono::Duration::seconds(defaults::SOON_TO_EXPIRE_THRESHOLD.as_secs() as i64),
            soon_frequency: defaults::SOON_TO_EXPIRE_CHECK_FREQUENCY,
            normal_frequency: defaults::EXPIRY_CHECK_FREQUENCY,
        }
    }
}

impl ExpiryPolicy {
    /// Each override falls back to its default on its own
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            threshold: signed_duration_or(annotations, CERT_SOON_TO_EXPIRE_THRESHOLD, defaults.threshold),
            soon_frequency: frequency_or(
                annotations,
                CERT_SOON_TO_EXPIRE_CHECK_FREQUENCY,
                defaults.soon_frequency,
            ),
            normal_frequency: frequency_or(
                annotations,
                CERT_EXPIRY_CHECK_FREQUENCY,
                defaults.normal_frequency,
            ),
        }
    }
}

/// A check frequency below [`defaults::MIN_CHECK_FREQUENCY`] would requeue
/// immediately, so it falls back to `default`
fn frequency_or(annotations: &BTreeMap<String, String>, key: &str, default: Duration) -> Duration {
    let frequency = duration_or(annotations, key, default);
    if frequency < defaults::MIN_CHECK_FREQUENCY {
        warn!(
            "Ignoring {}={:?} below {:?}, using default {:?}",
            key,
            frequency,
            defaults::MIN_CHECK_FREQUENCY,
            default
        );
        return default;
    }
    frequency
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryState {
    /// Not opted in, or nothing to check
    NoCheck,
    Normal { after: Duration },
    SoonToExpire { after: Duration, days: i64 },
}

/// Decide the expiry state of a secret at `now`
pub fn evaluate(secret: &Secret, now: DateTime<Utc>) -> ExpiryState {
    if !annotations::is_enabled(secret.annotations(), GENERATE_CERT_EXPIRY_ALERT) {
        return ExpiryState::NoCheck;
    }
    let Some(expiry) = secret_field(secret, TLS_CERT).and_then(certs::earliest_expiry) else {
        return ExpiryState::NoCheck;
    };

    let policy = ExpiryPolicy::from_annotations(secret.annotations());
    let soon = now
        .checked_add_signed(policy.threshold)
        .map_or(true, |limit| limit > expiry);
    if soon {
        ExpiryState::SoonToExpire {
            after: policy.soon_frequency,
            days: (expiry - now).num_hours() / 24,
        }
    } else {
        ExpiryState::Normal {
            after: policy.normal_frequency,
        }
    }
}

/// Export the validity window of a TLS secret's certificates. Secrets
/// without a readable certificate have their series dropped.
pub fn observe_certificates(metrics: &Metrics, secret: &Secret) {
    let namespace = secret.namespace().unwrap_or_default();
    let name = secret.name_any();
    let window = is_tls_secret(secret)
        .then(|| secret_field(secret, TLS_CERT))
        .flatten()
        .and_then(|pem| Some((certs::latest_issue(pem)?, certs::earliest_expiry(pem)?)));
    match window {
        Some((issued, expires)) => metrics.observe_certificate(&namespace, &name, issued, expires),
        None => metrics.forget_certificate(&namespace, &name),
    }
}

/// Evaluates TLS secrets, alerts on soon-to-expire certificates and tells
/// the caller when to look again
pub struct ExpiryScheduler<S: ObjectStore> {
    store: Arc<S>,
    events: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
}

impl<S: ObjectStore> ExpiryScheduler<S> {
    pub fn new(store: Arc<S>, events: Arc<dyn EventSink>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            events,
            metrics,
        }
    }

    #[instrument(skip(self, now))]
    pub async fn check(&self, namespace: &str, name: &str, now: DateTime<Utc>) -> Result<SyncOutcome> {
        let Some(secret) = self.store.get::<Secret>(Some(namespace), name).await? else {
            return Ok(SyncOutcome::Missing);
        };
        if !is_tls_secret(&secret) {
            return Ok(SyncOutcome::Skipped);
        }

        observe_certificates(&self.metrics, &secret);

        match evaluate(&secret, now) {
            ExpiryState::NoCheck => {
                debug!("No expiry check for {}/{}", namespace, name);
                Ok(SyncOutcome::Skipped)
            }
            ExpiryState::Normal { after } => Ok(SyncOutcome::RequeueAfter(after)),
            ExpiryState::SoonToExpire { after, days } => {
                warn!("Certificate in {}/{} expires in {} days", namespace, name, days);
                self.events
                    .warning(
                        &secret.object_ref(&()),
                        SOON_TO_EXPIRE_REASON,
                        format!("Certificate expiring in {} days", days),
                    )
                    .await;
                Ok(SyncOutcome::RequeueAfter(after))
            }
        }
    }
}
