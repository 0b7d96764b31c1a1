// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Target reconciler - runs one synchronizer kind off three triggers: target
//! changes, source secret changes and system CA file changes.

use crate::annotations::Reference;
use crate::error::{CertUtilsError, Result};
use crate::kubernetes::{EventSink, ObjectStore};
use crate::metrics::Metrics;
use crate::sync::{SyncKind, SyncOutcome, Synchronizer};
use crate::watch::events::classified;
use crate::watch::{DependencyResolver, ObjectEvent, SecretEvent};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use kube::runtime::{
    controller::Action,
    reflector::{self, ObjectRef, Store},
    watcher, Controller, WatchStreamExt,
};
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::watcher::Config as WatcherConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

/// Change events of targets delivered by a shared watch, with its cache
type SharedTargets<K> = (BoxStream<'static, Arc<ObjectEvent<K>>>, Store<K>);

pub struct TargetReconciler<T: SyncKind, S: ObjectStore> {
    client: Client,
    kind: Arc<T>,
    store: Arc<S>,
    system_ca_file: PathBuf,
    shared_targets: Option<SharedTargets<T::Target>>,
    source_events: Option<BoxStream<'static, SecretEvent>>,
    system_ca_changes: Option<BoxStream<'static, ()>>,
    events: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
}

struct Context<T: SyncKind, S: ObjectStore> {
    synchronizer: Synchronizer<T, S>,
    events: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
}

impl<T: SyncKind, S: ObjectStore> TargetReconciler<T, S> {
    pub fn new(
        client: Client,
        kind: T,
        store: Arc<S>,
        system_ca_file: PathBuf,
        events: Arc<dyn EventSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            kind: Arc::new(kind),
            store,
            system_ca_file,
            shared_targets: None,
            source_events: None,
            system_ca_changes: None,
            events,
            metrics,
        }
    }

    /// Take target changes from an existing watch instead of opening one
    pub fn with_shared_targets(
        mut self,
        events: BoxStream<'static, Arc<ObjectEvent<T::Target>>>,
        reader: Store<T::Target>,
    ) -> Self {
        self.shared_targets = Some((events, reader));
        self
    }

    /// Resolve secret changes to dependent targets. Ignored for kinds
    /// without source secrets.
    pub fn with_source_events(mut self, events: BoxStream<'static, SecretEvent>) -> Self {
        if self.kind.source_filter().is_some() {
            self.source_events = Some(events);
        }
        self
    }

    /// Re-evaluate system CA targets on every item of `changes`. Ignored for
    /// kinds that never read the system CA.
    pub fn with_system_ca_changes(mut self, changes: BoxStream<'static, ()>) -> Self {
        if self.kind.uses_system_ca() {
            self.system_ca_changes = Some(changes);
        }
        self
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let target_filter = self.kind.target_filter();
        let mut controller = match self.shared_targets {
            Some((events, reader)) => {
                let targets = events
                    .filter(move |event| future::ready(target_filter.accepts(event)))
                    .map(|event| Ok::<_, watcher::Error>(event.object().clone()));
                Controller::for_stream(targets, reader)
            }
            None => {
                let (reader, writer) = reflector::store::<T::Target>();
                let targets = classified(
                    watcher(Api::<T::Target>::all(self.client.clone()), WatcherConfig::default())
                        .default_backoff()
                        .reflect(writer),
                )
                .try_filter(move |event| future::ready(target_filter.accepts(event)))
                .map_ok(ObjectEvent::into_object);
                Controller::for_stream(targets, reader)
            }
        };

        let resolver = Arc::new(DependencyResolver::new(self.kind.clone(), self.store.clone()));

        if let (Some(source_filter), Some(events)) = (self.kind.source_filter(), self.source_events) {
            let resolver = resolver.clone();
            let requests = events
                .filter(move |event| future::ready(source_filter.accepts(event)))
                .then(move |event| {
                    let resolver = resolver.clone();
                    async move {
                        let secret = event.object();
                        let reference = Reference::new(secret.namespace().unwrap_or_default(), secret.name_any());
                        debug!("{} source {} changed", T::NAME, reference);
                        resolver.resolve_source(&reference).await
                    }
                })
                .flat_map(stream::iter);
            controller = controller.reconcile_on(requests);
        }

        if let Some(changes) = self.system_ca_changes {
            let resolver = resolver.clone();
            let requests = changes
                .then(move |()| {
                    let resolver = resolver.clone();
                    async move { resolver.resolve_system_ca().await }
                })
                .flat_map(stream::iter);
            controller = controller.reconcile_on(requests);
        }

        let context = Arc::new(Context {
            synchronizer: Synchronizer::new(self.kind, self.store, self.system_ca_file),
            events: self.events,
            metrics: self.metrics,
        });

        controller
            .shutdown_on_signal()
            .run(reconcile::<T, S>, error_policy::<T, S>, context)
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("{} reconciled {}", T::NAME, obj),
                    Err(e) => debug!("{} reconciliation failed: {}", T::NAME, e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile<T: SyncKind, S: ObjectStore>(
    target: Arc<T::Target>,
    ctx: Arc<Context<T, S>>,
) -> Result<Action> {
    ctx.metrics.reconciled(T::NAME);
    let namespace = target.namespace();
    match ctx.synchronizer.sync(namespace.as_deref(), &target.name_any()).await {
        Ok(outcome) => {
            if outcome == SyncOutcome::Updated {
                ctx.metrics.wrote(T::NAME);
            }
            Ok(outcome.action())
        }
        Err(e) => {
            if e.is_reportable() {
                ctx.events
                    .warning(&target.object_ref(&()), e.reason(), e.to_string())
                    .await;
            }
            Err(e)
        }
    }
}

fn error_policy<T: SyncKind, S: ObjectStore>(
    target: Arc<T::Target>,
    error: &CertUtilsError,
    ctx: Arc<Context<T, S>>,
) -> Action {
    error!(
        "{} failed to reconcile {}: {}",
        T::NAME,
        ObjectRef::from_obj(target.as_ref()),
        error
    );
    ctx.metrics.failed(T::NAME);
    Action::requeue(error.requeue_after())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::annotations::INJECT_CA_FROM_SECRET;
    use crate::constants::fields::CA_CERT;
    use crate::sync::ca_injection::CaInjection;
    use crate::test_utils::{make_config_map, MemoryStore, RecordingEventSink};
    use k8s_openapi::api::core::v1::ConfigMap;
    use std::time::Duration;

    fn context(
        store: &Arc<MemoryStore>,
        events: &Arc<RecordingEventSink>,
        metrics: &Arc<Metrics>,
    ) -> Arc<Context<CaInjection<ConfigMap>, MemoryStore>> {
        Arc::new(Context {
            synchronizer: Synchronizer::new(
                Arc::new(CaInjection::default()),
                store.clone(),
                PathBuf::from("/nonexistent"),
            ),
            events: events.clone(),
            metrics: metrics.clone(),
        })
    }

    #[tokio::test]
    async fn test_reconcile_counts_writes() {
        let store = Arc::new(MemoryStore::new());
        store.insert(crate::test_utils::make_tls_secret("ns", "ca", &[], &[(CA_CERT, b"ABC")]));
        let cm = make_config_map("ns", "cm1", &[(INJECT_CA_FROM_SECRET, "ns/ca")], &[]);
        store.insert(cm.clone());
        let events = Arc::new(RecordingEventSink::default());
        let metrics = Arc::new(Metrics::new().unwrap());

        let action = reconcile(Arc::new(cm), context(&store, &events, &metrics))
            .await
            .unwrap();

        assert_eq!(action, Action::await_change());
        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains(r#"certutils_target_writes_total{controller="configmap-ca-injection"} 1"#));
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn test_reportable_error_emits_warning_event() {
        let store = Arc::new(MemoryStore::new());
        let cm = make_config_map("ns", "cm1", &[(INJECT_CA_FROM_SECRET, "not-a-reference")], &[]);
        store.insert(cm.clone());
        let events = Arc::new(RecordingEventSink::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let ctx = context(&store, &events, &metrics);

        let target = Arc::new(cm);
        let err = reconcile(target.clone(), ctx.clone()).await.unwrap_err();
        assert!(matches!(err, CertUtilsError::InvalidAnnotation { .. }));

        let recorded = events.events();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].kind, "ConfigMap");
        assert_eq!(recorded[0].reason, "InvalidAnnotation");

        assert_eq!(
            error_policy(target, &err, ctx),
            Action::requeue(Duration::from_secs(60))
        );
        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains(r#"certutils_reconciliation_errors_total{controller="configmap-ca-injection"} 1"#));
    }

    #[tokio::test]
    async fn test_missing_source_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let cm = make_config_map("ns", "cm1", &[(INJECT_CA_FROM_SECRET, "ns/absent")], &[]);
        store.insert(cm.clone());
        let events = Arc::new(RecordingEventSink::default());
        let metrics = Arc::new(Metrics::new().unwrap());

        let err = reconcile(Arc::new(cm), context(&store, &events, &metrics))
            .await
            .unwrap_err();

        assert!(matches!(err, CertUtilsError::MissingSource(_)));
        assert_eq!(events.events()[0].reason, "SourceNotFound");
    }
}
