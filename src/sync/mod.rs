// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-kind synchronization: fetch source material, derive the desired
//! value and write it back only when it differs.

pub mod ca_injection;
pub mod cert_info;
pub mod engine;
pub mod expiry;
pub mod keystore;
pub mod route;
pub mod truststore;

pub use engine::{
    secret_field, set_secret_field, Material, Source, Sources, SyncKind, SyncOutcome,
    Synchronizer,
};
