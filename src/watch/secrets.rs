// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! A single cluster-wide secret watch shared by every controller that reacts
//! to secrets, either as targets or as sources.

use super::events::{classified, ObjectEvent};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::{self, store::Writer, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use kube_runtime::watcher::Config as WatcherConfig;
use std::pin::pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Events buffered per subscriber before the watch waits for it
const SUBSCRIBER_BUFFER: usize = 256;

pub type SecretEvent = Arc<ObjectEvent<Secret>>;

/// Fans one classified secret watch out to its subscribers. Every subscriber
/// sees every event; a slow one applies backpressure instead of losing events.
pub struct SecretWatch {
    reader: Store<Secret>,
    writer: Writer<Secret>,
    subscribers: Vec<mpsc::Sender<SecretEvent>>,
}

impl Default for SecretWatch {
    fn default() -> Self {
        let (reader, writer) = reflector::store();
        Self {
            reader,
            writer,
            subscribers: Vec::new(),
        }
    }
}

impl SecretWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache of all secrets, filled by [`SecretWatch::run`]
    pub fn reader(&self) -> Store<Secret> {
        self.reader.clone()
    }

    /// Every event from now on. Subscribe before calling [`SecretWatch::run`].
    pub fn subscribe(&mut self) -> BoxStream<'static, SecretEvent> {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.push(sender);
        stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        })
        .boxed()
    }

    pub async fn run(self, client: Client) -> anyhow::Result<()> {
        info!("Starting shared secret watch for {} subscribers", self.subscribers.len());
        let events = classified(
            watcher(Api::<Secret>::all(client), WatcherConfig::default())
                .default_backoff()
                .reflect(self.writer),
        );
        fan_out(self.subscribers, events).await;
        Ok(())
    }
}

async fn fan_out<S>(mut subscribers: Vec<mpsc::Sender<SecretEvent>>, events: S)
where
    S: Stream<Item = Result<ObjectEvent<Secret>, watcher::Error>>,
{
    let mut events = pin!(events);
    while let Some(res) = events.next().await {
        let event = match res {
            Ok(event) => Arc::new(event),
            Err(e) => {
                warn!("Secret watch error: {}", e);
                continue;
            }
        };
        let mut closed = false;
        for subscriber in &subscribers {
            if subscriber.send(event.clone()).await.is_err() {
                closed = true;
            }
        }
        if closed {
            subscribers.retain(|subscriber| !subscriber.is_closed());
            debug!("Secret watch has {} subscribers left", subscribers.len());
        }
    }
}
