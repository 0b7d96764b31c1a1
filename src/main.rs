// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use futures::future::{try_join_all, BoxFuture};
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::APIService;
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cert_utils::config::{Config, RouteSupport};
use cert_utils::constants::OPERATOR_NAME;
use cert_utils::kubernetes::{route_api_available, EventSink, KubeEventSink, KubeStore};
use cert_utils::metrics::Metrics;
use cert_utils::reconcilers::{ExpiryReconciler, TargetReconciler};
use cert_utils::server::{start_server, ServerState};
use cert_utils::sync::ca_injection::CaInjection;
use cert_utils::sync::cert_info::CertificateInfo;
use cert_utils::sync::keystore::JavaKeystores;
use cert_utils::sync::route::RouteCertificates;
use cert_utils::sync::truststore::ConfigMapTruststore;
use cert_utils::sync::SyncKind;
use cert_utils::watch::{SecretWatch, SystemCaWatcher};

/// Shared handles every controller is built from
struct Operator {
    client: Client,
    config: Config,
    store: Arc<KubeStore>,
    events: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
    system_ca: Option<SystemCaWatcher>,
}

impl Operator {
    fn reconciler<T: SyncKind>(&self, kind: T, secrets: &mut SecretWatch) -> TargetReconciler<T, KubeStore> {
        // Every subscription must be consumed, or the shared watch stalls
        let reads_secrets = kind.source_filter().is_some();
        let mut reconciler = TargetReconciler::new(
            self.client.clone(),
            kind,
            self.store.clone(),
            self.config.system_ca_file.clone(),
            self.events.clone(),
            self.metrics.clone(),
        );
        if reads_secrets {
            reconciler = reconciler.with_source_events(secrets.subscribe());
        }
        if let Some(system_ca) = &self.system_ca {
            reconciler = reconciler.with_system_ca_changes(system_ca.subscribe().boxed());
        }
        reconciler
    }

    fn controller<T: SyncKind>(&self, kind: T, secrets: &mut SecretWatch) -> BoxFuture<'static, Result<()>> {
        info!("Starting {} controller", T::NAME);
        self.reconciler(kind, secrets).run().boxed()
    }

    /// A controller whose targets are secrets, fed from the shared watch
    fn secret_controller<T>(&self, kind: T, secrets: &mut SecretWatch) -> BoxFuture<'static, Result<()>>
    where
        T: SyncKind<Target = Secret>,
    {
        info!("Starting {} controller", T::NAME);
        let targets = secrets.subscribe();
        self.reconciler(kind, secrets)
            .with_shared_targets(targets, secrets.reader())
            .run()
            .boxed()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting cert-utils operator");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: system_ca_file={}, metrics_bind_address={}, routes={:?}",
        config.system_ca_file.display(),
        config.metrics_bind_address,
        config.routes
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let routes = match config.routes {
        RouteSupport::Enabled => true,
        RouteSupport::Disabled => false,
        RouteSupport::Auto => route_api_available(&client)
            .await
            .context("Failed to discover the route API")?,
    };
    info!("Route support enabled: {}", routes);

    // The system CA file is only mounted on OpenShift
    let system_ca = if routes {
        match SystemCaWatcher::start(&config.system_ca_file) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("System CA listener not started: {}", e);
                None
            }
        }
    } else {
        None
    };

    let metrics = Arc::new(Metrics::new()?);
    let state = Arc::new(ServerState::new(metrics.clone()));
    let operator = Operator {
        store: Arc::new(KubeStore::new(client.clone())),
        events: Arc::new(KubeEventSink::new(client.clone(), OPERATOR_NAME)),
        metrics: metrics.clone(),
        client,
        config,
        system_ca,
    };

    let mut secrets = SecretWatch::new();
    let mut tasks: Vec<BoxFuture<'static, Result<()>>> = vec![
        operator.controller(CaInjection::<ConfigMap>::default(), &mut secrets),
        operator.controller(CaInjection::<APIService>::default(), &mut secrets),
        operator.controller(CaInjection::<MutatingWebhookConfiguration>::default(), &mut secrets),
        operator.controller(CaInjection::<ValidatingWebhookConfiguration>::default(), &mut secrets),
        operator.controller(CaInjection::<CustomResourceDefinition>::default(), &mut secrets),
        operator.secret_controller(CaInjection::<Secret>::default(), &mut secrets),
        operator.secret_controller(JavaKeystores, &mut secrets),
        operator.controller(ConfigMapTruststore, &mut secrets),
        operator.secret_controller(CertificateInfo, &mut secrets),
    ];
    if routes {
        tasks.push(operator.controller(RouteCertificates, &mut secrets));
    }
    tasks.push(
        ExpiryReconciler::new(
            secrets.subscribe(),
            secrets.reader(),
            operator.store.clone(),
            operator.events.clone(),
            metrics,
        )
        .run()
        .boxed(),
    );
    let secret_watch = secrets.run(operator.client.clone());

    let server = start_server(&operator.config.metrics_bind_address, state.clone());

    state.set_ready();
    info!("All controllers started");

    tokio::select! {
        res = try_join_all(tasks) => {
            res?;
        }
        res = server => {
            res.context("HTTP server failed")?;
        }
        res = secret_watch => {
            res.context("Secret watch stopped")?;
        }
    }

    // Controllers only return on shutdown
    info!("Shutting down");
    Ok(())
}
