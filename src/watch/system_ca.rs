// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Filesystem listener for the mounted system CA bundle.
//!
//! The parent directory is watched so that the atomic symlink swap used by
//! projected volumes is seen as well as in-place writes.

use crate::error::{CertUtilsError, Result};
use futures::stream::{self, Stream};
use notify::event::{Event, EventKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::Path;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Name of the symlink Kubernetes swaps when a projected volume changes
const PROJECTED_DATA_LINK: &str = "..data";

/// Whether a filesystem event may have changed file content
pub fn is_write(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    event.paths.iter().any(|path| {
        path.file_name()
            .is_some_and(|name| name == file_name.as_os_str() || name == PROJECTED_DATA_LINK)
    })
}

/// Bumps a change counter every time the system CA file is written.
/// The listener stops when this value is dropped.
pub struct SystemCaWatcher {
    _watcher: RecommendedWatcher,
    sender: watch::Sender<u64>,
}

impl SystemCaWatcher {
    pub fn start(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| CertUtilsError::WatchError(format!("{} names no file", path.display())))?;
        let directory = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let (sender, _) = watch::channel(0u64);
        let events = sender.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_write(&event.kind) && touches(&event, &file_name) => {
                debug!("System CA changed: {:?}", event.paths);
                events.send_modify(|seq| *seq += 1);
            }
            Ok(_) => {}
            Err(e) => warn!("System CA listener error: {}", e),
        })
        .map_err(|e| CertUtilsError::WatchError(e.to_string()))?;
        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(|e| CertUtilsError::WatchError(format!("{}: {}", directory.display(), e)))?;

        info!("Watching system CA file {}", path.display());
        Ok(Self {
            _watcher: watcher,
            sender,
        })
    }

    /// A stream yielding once per observed change
    pub fn subscribe(&self) -> impl Stream<Item = ()> + Send + 'static {
        changes(self.sender.subscribe())
    }
}

/// Adapt a change counter receiver into a stream. Changes made while the
/// consumer was busy collapse into one item.
pub fn changes(receiver: watch::Receiver<u64>) -> impl Stream<Item = ()> + Send + 'static {
    stream::unfold(receiver, |mut receiver| async move {
        receiver.changed().await.ok().map(|()| ((), receiver))
    })
}
