// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Object store abstraction over the Kubernetes API.

use crate::error::Result;
use async_trait::async_trait;
use kube::{
    api::{ListParams, PostParams},
    core::{ClusterResourceScope, NamespaceResourceScope},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::{debug, instrument};

/// Builds an [`Api`] matching the scope a resource lives in
pub trait ApiScope {
    fn api<K>(client: Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>;
}

impl ApiScope for NamespaceResourceScope {
    fn api<K>(client: Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>,
    {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

impl ApiScope for ClusterResourceScope {
    fn api<K>(client: Client, _namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>,
    {
        Api::all(client)
    }
}

/// Any statically typed Kubernetes object the operator reads or writes
pub trait Object:
    Resource<DynamicType = (), Scope: ApiScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> Object for K where
    K: Resource<DynamicType = (), Scope: ApiScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Read and write access to cluster objects.
///
/// `namespace` is `None` for cluster-scoped kinds (and for listing across
/// all namespaces).
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch an object; a missing object is `Ok(None)`
    async fn get<K: Object>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>>;

    async fn list<K: Object>(&self, namespace: Option<&str>) -> Result<Vec<K>>;

    /// Replace an object. Fails with a conflict when the stored
    /// resourceVersion no longer matches.
    async fn update<K: Object>(&self, object: &K) -> Result<()>;
}

/// [`ObjectStore`] backed by the API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: Object>(&self, namespace: Option<&str>) -> Api<K> {
        <K::Scope as ApiScope>::api(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: Object>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn list<K: Object>(&self, namespace: Option<&str>) -> Result<Vec<K>> {
        Ok(self
            .api::<K>(namespace)
            .list(&ListParams::default())
            .await?
            .items)
    }

    #[instrument(skip(self, object), fields(kind = %K::kind(&()), name = %object.name_any()))]
    async fn update<K: Object>(&self, object: &K) -> Result<()> {
        let namespace = object.namespace();
        self.api::<K>(namespace.as_deref())
            .replace(&object.name_any(), &PostParams::default(), object)
            .await?;
        debug!("Replaced {} {}", K::kind(&()), object.name_any());
        Ok(())
    }
}
