// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for object access, event publishing, and API discovery.

pub mod discovery;
pub mod events;
pub mod store;

pub use discovery::route_api_available;
pub use events::{EventSink, KubeEventSink};
pub use store::{ApiScope, KubeStore, Object, ObjectStore};
