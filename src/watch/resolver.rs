// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Maps a changed source to the targets that reference it.

use crate::annotations::Reference;
use crate::kubernetes::ObjectStore;
use crate::sync::{Source, SyncKind};
use kube::runtime::reflector::ObjectRef;
use std::sync::Arc;
use tracing::{debug, error};

pub struct DependencyResolver<T: SyncKind, S: ObjectStore> {
    kind: Arc<T>,
    store: Arc<S>,
}

impl<T: SyncKind, S: ObjectStore> DependencyResolver<T, S> {
    pub fn new(kind: Arc<T>, store: Arc<S>) -> Self {
        Self { kind, store }
    }

    /// Targets whose annotations reference the secret `reference`.
    ///
    /// Kinds with [`SyncKind::LOCAL_SOURCES`] are only looked up in the
    /// secret's namespace; all others cluster-wide.
    pub async fn resolve_source(&self, reference: &Reference) -> Vec<ObjectRef<T::Target>> {
        let namespace = T::LOCAL_SOURCES.then_some(reference.namespace.as_str());
        self.resolve(namespace, &Source::Secret(reference.clone())).await
    }

    /// Targets opted in to the system CA bundle
    pub async fn resolve_system_ca(&self) -> Vec<ObjectRef<T::Target>> {
        self.resolve(None, &Source::SystemCa).await
    }

    async fn resolve(&self, namespace: Option<&str>, source: &Source) -> Vec<ObjectRef<T::Target>> {
        let candidates = match self.store.list::<T::Target>(namespace).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("{} failed to list targets for {:?}: {}", T::NAME, source, e);
                return Vec::new();
            }
        };

        let mut requests: Vec<ObjectRef<T::Target>> = Vec::new();
        for candidate in &candidates {
            if !self.kind.applies(candidate) {
                continue;
            }
            match self.kind.sources(candidate) {
                Ok(sources) if sources.contains(source) => {
                    let request = ObjectRef::from_obj(candidate);
                    if !requests.contains(&request) {
                        requests.push(request);
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("{} skipping target with unusable references: {}", T::NAME, e),
            }
        }
        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::annotations::{
        CERTS_FROM_SECRET, DESTINATION_CA_FROM_SECRET, INJECT_CA_FROM_SECRET,
        INJECT_CA_FROM_SERVICE_CA,
    };
    use crate::constants::fields::CA_CERT;
    use crate::sync::ca_injection::CaInjection;
    use crate::sync::route::RouteCertificates;
    use crate::sync::Synchronizer;
    use crate::test_utils::{make_config_map, make_meta, make_tls_secret, MemoryStore};
    use crate::types::{Route, RouteSpec, TlsConfig};
    use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
    use k8s_openapi::api::core::v1::{ConfigMap, Secret};
    use k8s_openapi::ByteString;
    use std::path::PathBuf;

    fn edge_route(name: &str, annotations: &[(&str, &str)]) -> Route {
        Route {
            metadata: make_meta(Some("ns"), name, annotations),
            spec: RouteSpec {
                host: Some("app.example.com".to_string()),
                tls: Some(TlsConfig {
                    termination: "edge".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_source_update_resynchronizes_each_dependent_once() {
        let store = Arc::new(MemoryStore::new());
        store.insert(make_tls_secret("ns", "ca-secret", &[], &[(CA_CERT, b"ABC")]));
        store.insert(make_config_map("ns", "cm1", &[(INJECT_CA_FROM_SECRET, "ns/ca-secret")], &[]));
        store.insert(make_config_map("ns", "other", &[(INJECT_CA_FROM_SECRET, "ns/elsewhere")], &[]));
        store.insert(make_config_map("ns", "plain", &[], &[]));
        let kind = Arc::new(CaInjection::<ConfigMap>::default());
        let sync = Synchronizer::new(kind.clone(), store.clone(), PathBuf::from("/nonexistent"));
        let resolver = DependencyResolver::new(kind, store.clone());

        sync.sync(Some("ns"), "cm1").await.unwrap();

        let mut secret: Secret = store.object(Some("ns"), "ca-secret").unwrap();
        secret
            .data
            .as_mut()
            .unwrap()
            .insert(CA_CERT.to_string(), ByteString(b"XYZ".to_vec()));
        store.insert(secret);

        let requests = resolver.resolve_source(&Reference::new("ns", "ca-secret")).await;
        assert_eq!(requests, vec![ObjectRef::new("cm1").within("ns")]);

        for request in &requests {
            sync.sync(request.namespace.as_deref(), &request.name).await.unwrap();
        }
        let cm: ConfigMap = store.object(Some("ns"), "cm1").unwrap();
        assert_eq!(cm.data.unwrap()[CA_CERT], "XYZ");
    }

    #[tokio::test]
    async fn test_config_map_in_another_namespace_converges() {
        let store = Arc::new(MemoryStore::new());
        store.insert(make_tls_secret("ns", "ca-secret", &[], &[(CA_CERT, b"ABC")]));
        store.insert(make_config_map("app", "cm1", &[(INJECT_CA_FROM_SECRET, "ns/ca-secret")], &[]));
        store.insert(make_config_map("app", "unrelated", &[(INJECT_CA_FROM_SECRET, "app/ca-secret")], &[]));
        let kind = Arc::new(CaInjection::<ConfigMap>::default());
        let sync = Synchronizer::new(kind.clone(), store.clone(), PathBuf::from("/nonexistent"));
        let resolver = DependencyResolver::new(kind, store.clone());

        sync.sync(Some("app"), "cm1").await.unwrap();

        let mut secret: Secret = store.object(Some("ns"), "ca-secret").unwrap();
        secret
            .data
            .as_mut()
            .unwrap()
            .insert(CA_CERT.to_string(), ByteString(b"XYZ".to_vec()));
        store.insert(secret);

        let requests = resolver.resolve_source(&Reference::new("ns", "ca-secret")).await;
        assert_eq!(requests, vec![ObjectRef::new("cm1").within("app")]);

        for request in &requests {
            sync.sync(request.namespace.as_deref(), &request.name).await.unwrap();
        }
        let cm: ConfigMap = store.object(Some("app"), "cm1").unwrap();
        assert_eq!(cm.data.unwrap()[CA_CERT], "XYZ");
    }

    #[tokio::test]
    async fn test_tls_secrets_referencing_a_source_are_found_cluster_wide() {
        let store = Arc::new(MemoryStore::new());
        store.insert(make_tls_secret("ns", "ca-secret", &[], &[(CA_CERT, b"ABC")]));
        store.insert(make_tls_secret("app", "app-tls", &[(INJECT_CA_FROM_SECRET, "ns/ca-secret")], &[]));
        store.insert(Secret {
            type_: Some("Opaque".to_string()),
            ..make_tls_secret("app", "opaque", &[(INJECT_CA_FROM_SECRET, "ns/ca-secret")], &[])
        });
        let resolver = DependencyResolver::new(Arc::new(CaInjection::<Secret>::default()), store);

        assert_eq!(
            resolver.resolve_source(&Reference::new("ns", "ca-secret")).await,
            vec![ObjectRef::new("app-tls").within("app")]
        );
    }

    #[tokio::test]
    async fn test_routes_resolve_in_source_namespace_only() {
        let store = Arc::new(MemoryStore::new());
        store.insert(edge_route("app", &[(CERTS_FROM_SECRET, "app-tls")]));
        let resolver = DependencyResolver::new(Arc::new(RouteCertificates), store);

        assert!(resolver
            .resolve_source(&Reference::new("other", "app-tls"))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_route_referencing_secret_twice_is_enqueued_once() {
        let store = Arc::new(MemoryStore::new());
        store.insert(edge_route(
            "app",
            &[(CERTS_FROM_SECRET, "app-tls"), (DESTINATION_CA_FROM_SECRET, "app-tls")],
        ));
        store.insert(edge_route("broken", &[(CERTS_FROM_SECRET, "a/b/c")]));
        let resolver = DependencyResolver::new(Arc::new(RouteCertificates), store);

        let requests = resolver.resolve_source(&Reference::new("ns", "app-tls")).await;
        assert_eq!(requests, vec![ObjectRef::new("app").within("ns")]);
    }

    #[tokio::test]
    async fn test_system_ca_resolves_opted_in_targets() {
        let store = Arc::new(MemoryStore::new());
        store.insert(ValidatingWebhookConfiguration {
            metadata: make_meta(None, "opted-in", &[(INJECT_CA_FROM_SERVICE_CA, "true")]),
            webhooks: None,
        });
        store.insert(ValidatingWebhookConfiguration {
            metadata: make_meta(None, "from-secret", &[(INJECT_CA_FROM_SECRET, "ns/ca")]),
            webhooks: None,
        });
        let resolver = DependencyResolver::new(
            Arc::new(CaInjection::<ValidatingWebhookConfiguration>::default()),
            store,
        );

        assert_eq!(
            resolver.resolve_system_ca().await,
            vec![ObjectRef::new("opted-in")]
        );
    }

    #[tokio::test]
    async fn test_list_failure_resolves_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.insert(make_config_map("ns", "cm1", &[(INJECT_CA_FROM_SECRET, "ns/ca-secret")], &[]));
        store.fail_lists();
        let resolver = DependencyResolver::new(Arc::new(CaInjection::<ConfigMap>::default()), store);

        assert!(resolver
            .resolve_source(&Reference::new("ns", "ca-secret"))
            .await
            .is_empty());
    }
}
