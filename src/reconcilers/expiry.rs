// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Expiry reconciler - schedules certificate expiry checks on TLS secrets.

use crate::constants::annotations::GENERATE_CERT_EXPIRY_ALERT;
use crate::constants::fields::TLS_CERT;
use crate::error::{CertUtilsError, Result};
use crate::kubernetes::{EventSink, ObjectStore};
use crate::metrics::Metrics;
use crate::sync::expiry::{observe_certificates, ExpiryScheduler};
use crate::watch::predicates::{AnnotatedTlsSecret, EventFilter};
use crate::watch::{ObjectEvent, SecretEvent};
use chrono::Utc;
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::{controller::Action, reflector::Store, watcher, Controller};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, error};

pub const CONTROLLER: &str = "secret-expiry-alert";

pub struct ExpiryReconciler<S: ObjectStore> {
    secrets: BoxStream<'static, SecretEvent>,
    reader: Store<Secret>,
    scheduler: ExpiryScheduler<S>,
    metrics: Arc<Metrics>,
}

struct Context<S: ObjectStore> {
    scheduler: ExpiryScheduler<S>,
    metrics: Arc<Metrics>,
}

impl<S: ObjectStore> ExpiryReconciler<S> {
    /// `secrets` and `reader` come from the shared secret watch
    pub fn new(
        secrets: BoxStream<'static, SecretEvent>,
        reader: Store<Secret>,
        store: Arc<S>,
        events: Arc<dyn EventSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            secrets,
            reader,
            scheduler: ExpiryScheduler::new(store, events, metrics.clone()),
            metrics,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let filter = AnnotatedTlsSecret::new(GENERATE_CERT_EXPIRY_ALERT, &[TLS_CERT]);
        let metrics = self.metrics.clone();
        let secrets = self
            .secrets
            .inspect(move |event| track_certificates(&metrics, event))
            .filter(move |event| future::ready(filter.accepts(event)))
            .map(|event| Ok::<_, watcher::Error>(event.object().clone()));

        let context = Arc::new(Context {
            scheduler: self.scheduler,
            metrics: self.metrics,
        });

        Controller::for_stream(secrets, self.reader)
            .shutdown_on_signal()
            .run(reconcile::<S>, error_policy::<S>, context)
            .for_each(|res| async move {
                match res {
                    Ok((obj, action)) => debug!("{} checked {}: {:?}", CONTROLLER, obj, action),
                    Err(e) => debug!("{} check failed: {}", CONTROLLER, e),
                }
            })
            .await;

        Ok(())
    }
}

/// Keep the certificate gauges in line with the secrets that exist
fn track_certificates(metrics: &Metrics, event: &ObjectEvent<Secret>) {
    match event {
        ObjectEvent::Deleted(secret) => {
            metrics.forget_certificate(&secret.namespace().unwrap_or_default(), &secret.name_any())
        }
        _ => observe_certificates(metrics, event.object()),
    }
}

async fn reconcile<S: ObjectStore>(secret: Arc<Secret>, ctx: Arc<Context<S>>) -> Result<Action> {
    ctx.metrics.reconciled(CONTROLLER);
    let namespace = secret.namespace().unwrap_or_default();
    let outcome = ctx
        .scheduler
        .check(&namespace, &secret.name_any(), Utc::now())
        .await?;
    Ok(outcome.action())
}

fn error_policy<S: ObjectStore>(secret: Arc<Secret>, error: &CertUtilsError, ctx: Arc<Context<S>>) -> Action {
    error!(
        "{} failed to check {}/{}: {}",
        CONTROLLER,
        secret.namespace().unwrap_or_default(),
        secret.name_any(),
        error
    );
    ctx.metrics.failed(CONTROLLER);
    Action::requeue(error.requeue_after())
}
