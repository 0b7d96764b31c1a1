// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mocked API server, an in-memory object store, a
//! recording event sink and certificate fixtures.

use crate::error::{CertUtilsError, Result};
use crate::kubernetes::{EventSink, Object, ObjectStore};
use async_trait::async_trait;
use http::{Request, Response};
use k8s_openapi::api::core::v1::{ConfigMap, ObjectReference, Secret};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::client::Body;
use kube::core::ErrorResponse;
use kube::{Client, Resource, ResourceExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

pub const CA_CRT: &str = include_str!("testdata/ca.crt");
pub const SECOND_CA_CRT: &str = include_str!("testdata/ca2.crt");
/// Leaf for app.example.com, valid 2025-01-01 to 2026-01-01, signed by [`CA_CRT`]
pub const TLS_CRT: &str = include_str!("testdata/tls.crt");
pub const TLS_KEY: &str = include_str!("testdata/tls.key");

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.respond("GET", path, status, body)
    }

    /// Add a response for PUT requests matching the exact path
    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.respond("PUT", path, status, body)
    }

    fn respond(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        self.responses
            .lock()
            .unwrap()
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let (status, body) = self
            .find_response(&method, &path)
            .unwrap_or_else(|| (404, not_found_json("resource", &path)));

        Box::pin(async move {
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

type StoreKey = (String, String, String);

fn store_key<K: Object>(namespace: Option<&str>, name: &str) -> StoreKey {
    (
        K::kind(&()).to_string(),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

fn api_error(code: u16, reason: &str, message: String) -> CertUtilsError {
    CertUtilsError::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

/// In-memory [`ObjectStore`] with optimistic concurrency on resourceVersion
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<StoreKey, serde_json::Value>>,
    writes: AtomicUsize,
    fail_lists: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a write
    pub fn insert<K: Object>(&self, mut object: K) -> &Self {
        if object.meta().resource_version.is_none() {
            object.meta_mut().resource_version = Some("1".to_string());
        }
        let key = store_key::<K>(object.namespace().as_deref(), &object.name_any());
        self.objects
            .lock()
            .unwrap()
            .insert(key, serde_json::to_value(&object).unwrap());
        self
    }

    pub fn object<K: Object>(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&store_key::<K>(namespace, name))
            .map(|value| serde_json::from_value(value.clone()).unwrap())
    }

    pub fn remove<K: Object>(&self, namespace: Option<&str>, name: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&store_key::<K>(namespace, name));
    }

    /// Number of successful updates
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_lists(&self) {
        self.fail_lists.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: Object>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>> {
        Ok(self.object(namespace, name))
    }

    async fn list<K: Object>(&self, namespace: Option<&str>) -> Result<Vec<K>> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(api_error(500, "InternalError", "list failed".to_string()));
        }
        let kind = K::kind(&()).to_string();
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && namespace.map_or(true, |n| n == ns))
            .map(|(_, value)| serde_json::from_value(value.clone()).unwrap())
            .collect())
    }

    async fn update<K: Object>(&self, object: &K) -> Result<()> {
        let key = store_key::<K>(object.namespace().as_deref(), &object.name_any());
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get(&key) else {
            return Err(api_error(404, "NotFound", format!("{} not found", object.name_any())));
        };
        let stored_version = stored["metadata"]["resourceVersion"].as_str().map(str::to_string);
        if stored_version != object.meta().resource_version {
            return Err(api_error(409, "Conflict", "the object has been modified".to_string()));
        }

        let next = stored_version
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_default()
            + 1;
        let mut object = object.clone();
        object.meta_mut().resource_version = Some(next.to_string());
        objects.insert(key, serde_json::to_value(&object).unwrap());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A warning event captured by [`RecordingEventSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub reason: String,
    pub note: String,
}

#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventSink {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn warning(&self, object: &ObjectReference, reason: &str, note: String) {
        self.events.lock().unwrap().push(RecordedEvent {
            kind: object.kind.clone().unwrap_or_default(),
            namespace: object.namespace.clone(),
            name: object.name.clone().unwrap_or_default(),
            reason: reason.to_string(),
            note,
        });
    }
}

pub fn make_meta(namespace: Option<&str>, name: &str, annotations: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        annotations: (!annotations.is_empty()).then(|| {
            annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        }),
        ..Default::default()
    }
}

/// A `kubernetes.io/tls` secret with the given data fields
pub fn make_tls_secret(
    namespace: &str,
    name: &str,
    annotations: &[(&str, &str)],
    data: &[(&str, &[u8])],
) -> Secret {
    Secret {
        metadata: make_meta(Some(namespace), name, annotations),
        type_: Some("kubernetes.io/tls".to_string()),
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

pub fn make_config_map(
    namespace: &str,
    name: &str,
    annotations: &[(&str, &str)],
    data: &[(&str, &str)],
) -> ConfigMap {
    ConfigMap {
        metadata: make_meta(Some(namespace), name, annotations),
        data: (!data.is_empty()).then(|| {
            data.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        }),
        ..Default::default()
    }
}
