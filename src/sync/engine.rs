// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::annotations::Reference;
use crate::constants::fields;
use crate::error::{CertUtilsError, Result};
use crate::kubernetes::{Object, ObjectStore};
use crate::watch::predicates::EventFilter;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::runtime::controller::Action;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Where a target's material comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Secret(Reference),
    /// The system CA bundle file, exposed as a single `ca.crt` field
    SystemCa,
}

/// Byte fields of a loaded source, keyed by field name
pub type Material = BTreeMap<String, Vec<u8>>;

/// Material of every source a target referenced
#[derive(Debug, Default)]
pub struct Sources {
    loaded: HashMap<Source, Material>,
}

impl Sources {
    pub fn insert(&mut self, source: Source, material: Material) {
        self.loaded.insert(source, material);
    }

    /// A field of a loaded source. Empty values count as absent.
    pub fn field(&self, source: &Source, key: &str) -> Option<&[u8]> {
        self.loaded
            .get(source)
            .and_then(|material| material.get(key))
            .map(Vec::as_slice)
            .filter(|value| !value.is_empty())
    }
}

/// One kind of target object and the material it derives from its sources.
pub trait SyncKind: Send + Sync + 'static {
    type Target: Object;
    type Value: Debug + PartialEq + Send;

    /// Controller name used in logs, metrics and events
    const NAME: &'static str;

    /// Whether targets only reference secrets in their own namespace. When
    /// set, the resolver lists targets in the changed secret's namespace only.
    const LOCAL_SOURCES: bool = false;

    /// Targets this kind never touches, e.g. passthrough routes
    fn applies(&self, _target: &Self::Target) -> bool {
        true
    }

    /// The sources named by the target's annotations
    fn sources(&self, target: &Self::Target) -> Result<Vec<Source>>;

    fn current(&self, target: &Self::Target) -> Self::Value;

    fn desired(&self, target: &Self::Target, sources: &Sources) -> Result<Self::Value>;

    fn write(&self, target: &mut Self::Target, value: Self::Value);

    /// Whether writing `desired` over `current` would be a no-op
    fn unchanged(&self, _target: &Self::Target, current: &Self::Value, desired: &Self::Value) -> bool {
        current == desired
    }

    /// Decides which target watch events enqueue a reconciliation
    fn target_filter(&self) -> Arc<dyn EventFilter<Self::Target>>;

    /// Decides which secret watch events are resolved to dependent targets.
    /// `None` for kinds whose only source is the target itself.
    fn source_filter(&self) -> Option<Arc<dyn EventFilter<Secret>>> {
        None
    }

    /// Whether targets can reference the system CA file
    fn uses_system_ca(&self) -> bool {
        false
    }
}

/// A non-empty byte field of a secret
pub fn secret_field<'a>(secret: &'a Secret, key: &str) -> Option<&'a [u8]> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|value| value.0.as_slice())
        .filter(|value| !value.is_empty())
}

/// Set or remove a byte field of a secret
pub fn set_secret_field(secret: &mut Secret, key: &str, value: Option<Vec<u8>>) {
    match value {
        Some(value) => {
            secret
                .data
                .get_or_insert_with(Default::default)
                .insert(key.to_string(), ByteString(value));
        }
        None => {
            if let Some(data) = secret.data.as_mut() {
                data.remove(key);
            }
        }
    }
}

/// Result of a successful synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The target no longer exists
    Missing,
    /// The target is not managed by this kind
    Skipped,
    Unchanged,
    Updated,
    /// Check the target again after the given delay
    RequeueAfter(Duration),
}

impl SyncOutcome {
    pub fn action(&self) -> Action {
        match self {
            SyncOutcome::RequeueAfter(after) => Action::requeue(*after),
            _ => Action::await_change(),
        }
    }
}

/// Runs the fetch, derive, compare and write cycle for one [`SyncKind`]
pub struct Synchronizer<T: SyncKind, S: ObjectStore> {
    kind: Arc<T>,
    store: Arc<S>,
    system_ca_file: PathBuf,
}

impl<T: SyncKind, S: ObjectStore> Synchronizer<T, S> {
    pub fn new(kind: Arc<T>, store: Arc<S>, system_ca_file: PathBuf) -> Self {
        Self {
            kind,
            store,
            system_ca_file,
        }
    }

    pub fn kind(&self) -> &Arc<T> {
        &self.kind
    }

    #[instrument(skip(self), fields(controller = T::NAME))]
    pub async fn sync(&self, namespace: Option<&str>, name: &str) -> Result<SyncOutcome> {
        let Some(mut target) = self.store.get::<T::Target>(namespace, name).await? else {
            debug!("{} target {} no longer exists", T::NAME, name);
            return Ok(SyncOutcome::Missing);
        };
        if !self.kind.applies(&target) {
            return Ok(SyncOutcome::Skipped);
        }

        let sources = self.kind.sources(&target)?;
        let loaded = self.load(&sources).await?;
        let desired = self.kind.desired(&target, &loaded)?;
        let current = self.kind.current(&target);
        if self.kind.unchanged(&target, &current, &desired) {
            debug!("{} target {} is up to date", T::NAME, name);
            return Ok(SyncOutcome::Unchanged);
        }

        self.kind.write(&mut target, desired);
        self.store.update(&target).await?;
        info!(
            "{} updated {}/{}",
            T::NAME,
            namespace.unwrap_or_default(),
            name
        );
        Ok(SyncOutcome::Updated)
    }

    async fn load(&self, sources: &[Source]) -> Result<Sources> {
        let mut loaded = Sources::default();
        for source in sources {
            let material = match source {
                Source::Secret(reference) => {
                    let secret = self
                        .store
                        .get::<Secret>(Some(&reference.namespace), &reference.name)
                        .await?
                        .ok_or_else(|| CertUtilsError::MissingSource(reference.to_string()))?;
                    secret
                        .data
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(key, value)| (key, value.0))
                        .collect()
                }
                Source::SystemCa => {
                    let bundle = tokio::fs::read(&self.system_ca_file).await.map_err(|e| {
                        CertUtilsError::SystemCaError {
                            path: self.system_ca_file.display().to_string(),
                            source: e,
                        }
                    })?;
                    Material::from([(fields::CA_CERT.to_string(), bundle)])
                }
            };
            loaded.insert(source.clone(), material);
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::annotations::INJECT_CA_FROM_SECRET;
    use crate::sync::ca_injection::CaInjection;
    use crate::test_utils::{make_config_map, make_tls_secret, MemoryStore};
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::Resource;

    /// Lets another writer update every config map right after it is read
    struct ConcurrentWriter {
        inner: MemoryStore,
    }

    #[async_trait]
    impl ObjectStore for ConcurrentWriter {
        async fn get<K: Object>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>> {
            let object = self.inner.get::<K>(namespace, name).await?;
            if let Some(read) = object.as_ref().filter(|_| K::kind(&()) == "ConfigMap") {
                let mut newer = read.clone();
                newer.meta_mut().resource_version = Some("2".to_string());
                self.inner.insert(newer);
            }
            Ok(object)
        }

        async fn list<K: Object>(&self, namespace: Option<&str>) -> Result<Vec<K>> {
            self.inner.list(namespace).await
        }

        async fn update<K: Object>(&self, object: &K) -> Result<()> {
            self.inner.update(object).await
        }
    }

    #[tokio::test]
    async fn test_write_conflict_is_propagated() {
        let inner = MemoryStore::new();
        inner.insert(make_tls_secret("ns", "ca", &[], &[(fields::CA_CERT, b"ABC")]));
        inner.insert(make_config_map("ns", "cm1", &[(INJECT_CA_FROM_SECRET, "ns/ca")], &[]));
        let store = Arc::new(ConcurrentWriter { inner });
        let sync = Synchronizer::new(
            Arc::new(CaInjection::<ConfigMap>::default()),
            store.clone(),
            PathBuf::from("/nonexistent"),
        );

        let err = sync.sync(Some("ns"), "cm1").await.unwrap_err();

        assert!(matches!(
            err,
            CertUtilsError::KubeError(kube::Error::Api(ref response)) if response.code == 409
        ));
        assert!(!err.is_reportable());
        assert_eq!(err.requeue_after(), Duration::from_secs(10));
        assert_eq!(store.inner.writes(), 0);
        let cm: ConfigMap = store.inner.object(Some("ns"), "cm1").unwrap();
        assert!(cm.data.is_none());
    }

    #[test]
    fn test_sources_field_treats_empty_as_absent() {
        let source = Source::Secret(Reference::new("ns", "ca"));
        let mut sources = Sources::default();
        sources.insert(
            source.clone(),
            Material::from([
                ("ca.crt".to_string(), b"ABC".to_vec()),
                ("tls.key".to_string(), Vec::new()),
            ]),
        );
        assert_eq!(sources.field(&source, "ca.crt"), Some(b"ABC".as_slice()));
        assert_eq!(sources.field(&source, "tls.key"), None);
        assert_eq!(sources.field(&source, "tls.crt"), None);
        assert_eq!(sources.field(&Source::SystemCa, "ca.crt"), None);
    }

    #[test]
    fn test_outcome_actions() {
        assert_eq!(SyncOutcome::Updated.action(), Action::await_change());
        assert_eq!(
            SyncOutcome::RequeueAfter(Duration::from_secs(3600)).action(),
            Action::requeue(Duration::from_secs(3600))
        );
    }
}
