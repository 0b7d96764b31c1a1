// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Classification of raw watch events into created/updated/deleted.

use futures::stream::{self, Stream, TryStreamExt};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::Resource;
use std::collections::{HashMap, HashSet};

/// A classified change to an object
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEvent<K> {
    Created(K),
    Updated { old: K, new: K },
    Deleted(K),
}

impl<K> ObjectEvent<K> {
    /// The current state of the object (the last known one for deletions)
    pub fn object(&self) -> &K {
        match self {
            ObjectEvent::Created(obj) | ObjectEvent::Deleted(obj) => obj,
            ObjectEvent::Updated { new, .. } => new,
        }
    }

    pub fn into_object(self) -> K {
        match self {
            ObjectEvent::Created(obj) | ObjectEvent::Deleted(obj) => obj,
            ObjectEvent::Updated { new, .. } => new,
        }
    }
}

/// Turns a watcher stream into [`ObjectEvent`]s by remembering the last seen
/// state of every object. After a relist, objects that were not listed again
/// are reported as deleted.
pub struct EventClassifier<K>
where
    K: Resource<DynamicType = ()>,
{
    known: HashMap<ObjectRef<K>, K>,
    relisted: Option<HashSet<ObjectRef<K>>>,
}

impl<K> Default for EventClassifier<K>
where
    K: Resource<DynamicType = ()>,
{
    fn default() -> Self {
        Self {
            known: HashMap::new(),
            relisted: None,
        }
    }
}

impl<K> EventClassifier<K>
where
    K: Resource<DynamicType = ()> + Clone,
{
    pub fn classify(&mut self, event: watcher::Event<K>) -> Vec<ObjectEvent<K>> {
        match event {
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(ObjectRef::from_obj(&obj));
                }
                vec![self.apply(obj)]
            }
            watcher::Event::InitDone => {
                let seen = self.relisted.take().unwrap_or_default();
                let gone: Vec<ObjectRef<K>> = self
                    .known
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                gone.iter()
                    .filter_map(|key| self.known.remove(key))
                    .map(ObjectEvent::Deleted)
                    .collect()
            }
            watcher::Event::Apply(obj) => vec![self.apply(obj)],
            watcher::Event::Delete(obj) => {
                self.known.remove(&ObjectRef::from_obj(&obj));
                vec![ObjectEvent::Deleted(obj)]
            }
        }
    }

    fn apply(&mut self, obj: K) -> ObjectEvent<K> {
        match self.known.insert(ObjectRef::from_obj(&obj), obj.clone()) {
            Some(old) => ObjectEvent::Updated { old, new: obj },
            None => ObjectEvent::Created(obj),
        }
    }
}

/// Classify a raw watcher stream. Watcher errors pass through unchanged.
pub fn classified<K, S>(events: S) -> impl Stream<Item = Result<ObjectEvent<K>, watcher::Error>> + Send + 'static
where
    K: Resource<DynamicType = ()> + Clone + Send + 'static,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send + 'static,
{
    let mut classifier = EventClassifier::default();
    events
        .map_ok(move |event| stream::iter(classifier.classify(event).into_iter().map(Ok::<_, watcher::Error>)))
        .try_flatten()
}
