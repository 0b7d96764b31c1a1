// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Change detection: event classification, filters, reverse dependency
//! lookup, the shared secret watch and the system CA file listener.

pub mod events;
pub mod predicates;
pub mod resolver;
pub mod secrets;
pub mod system_ca;

pub use events::{EventClassifier, ObjectEvent};
pub use predicates::EventFilter;
pub use resolver::DependencyResolver;
pub use secrets::{SecretEvent, SecretWatch};
pub use system_ca::SystemCaWatcher;
