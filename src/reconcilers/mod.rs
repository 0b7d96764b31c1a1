// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconcilers that react to watch events.

pub mod expiry;
pub mod target;

pub use expiry::ExpiryReconciler;
pub use target::TargetReconciler;
