// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Annotation parsing: secret references, opt-in flags and Go-style durations.

use crate::constants::{annotations, defaults, fields};
use crate::error::{CertUtilsError, Result};
use anyhow::anyhow;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Identity of a secret named by an annotation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    pub namespace: String,
    pub name: String,
}

impl Reference {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse the qualified `<namespace>/<name>` form
    pub fn parse_qualified(value: &str) -> Option<Self> {
        let (namespace, name) = value.split_once('/')?;
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(namespace, name))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

pub fn value<'a>(annotations: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    annotations.get(key).map(String::as_str)
}

/// True only for the literal value "true"
pub fn is_enabled(annotations: &BTreeMap<String, String>, key: &str) -> bool {
    value(annotations, key) == Some("true")
}

/// Read a reference in the qualified `<namespace>/<name>` form.
///
/// Returns `Ok(None)` when the annotation is absent and an
/// [`CertUtilsError::InvalidAnnotation`] when it cannot be parsed.
pub fn qualified_reference(
    annotations: &BTreeMap<String, String>,
    key: &str,
) -> Result<Option<Reference>> {
    let Some(raw) = value(annotations, key) else {
        return Ok(None);
    };
    Reference::parse_qualified(raw)
        .map(Some)
        .ok_or_else(|| invalid(key, raw))
}

/// Read a reference to a secret in `namespace`: either a bare name or the
/// qualified form naming that same namespace.
pub fn local_reference(
    annotations: &BTreeMap<String, String>,
    key: &str,
    namespace: &str,
) -> Result<Option<Reference>> {
    let Some(raw) = value(annotations, key) else {
        return Ok(None);
    };
    if !raw.is_empty() && !raw.contains('/') {
        return Ok(Some(Reference::new(namespace, raw)));
    }
    match Reference::parse_qualified(raw) {
        Some(reference) if reference.namespace == namespace => Ok(Some(reference)),
        _ => Err(invalid(key, raw)),
    }
}

fn invalid(key: &str, value: &str) -> CertUtilsError {
    CertUtilsError::InvalidAnnotation {
        key: key.to_string(),
        value: value.to_string(),
    }
}

pub fn keystore_password(annotations: &BTreeMap<String, String>) -> String {
    match value(annotations, annotations::JAVA_KEYSTORE_PASSWORD) {
        Some(password) if !password.is_empty() => password.to_string(),
        _ => defaults::KEYSTORE_PASSWORD.to_string(),
    }
}

pub fn source_ca_key(annotations: &BTreeMap<String, String>) -> String {
    match value(annotations, annotations::SOURCE_CA_KEY) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => fields::CA_BUNDLE.to_string(),
    }
}

/// Read a duration annotation, falling back to `default` when it is absent
/// or unparseable. Parse failures are logged, never propagated.
pub fn duration_or(
    annotations: &BTreeMap<String, String>,
    key: &str,
    default: Duration,
) -> Duration {
    match value(annotations, key) {
        None => default,
        Some(raw) => parse_go_duration(raw).unwrap_or_else(|e| {
            warn!(
                "Unable to parse {}={:?}, using default {:?}: {}",
                key, raw, default, e
            );
            default
        }),
    }
}

/// Parse a Go duration string such as "2160h", "1h30m" or "1.5s".
///
/// Negative durations are rejected; see [`parse_signed_go_duration`].
pub fn parse_go_duration(raw: &str) -> anyhow::Result<Duration> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("duration cannot be empty"));
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    let component = Regex::new(r"(?P<number>\d+(?:\.\d*)?|\.\d+)(?P<unit>ns|us|µs|μs|ms|s|m|h)")
        .map_err(|e| anyhow!("failed to compile regex: {e}"))?;

    let mut consumed = 0;
    let mut total_nanos = 0f64;
    for captures in component.captures_iter(trimmed) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        if whole.start() != consumed {
            return Err(anyhow!("invalid duration {:?}", raw));
        }
        consumed = whole.end();

        let number: f64 = captures["number"]
            .parse()
            .map_err(|e| anyhow!("invalid number in duration {:?}: {e}", raw))?;
        let unit_nanos = match &captures["unit"] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            unit => return Err(anyhow!("unknown unit {unit} in duration {:?}", raw)),
        };
        total_nanos += number * unit_nanos;
    }

    if consumed == 0 || consumed != trimmed.len() {
        return Err(anyhow!("invalid duration {:?}", raw));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Parse a Go duration that may carry a leading sign, e.g. "-1h"
pub fn parse_signed_go_duration(raw: &str) -> anyhow::Result<chrono::Duration> {
    let trimmed = raw.trim();
    let (negative, magnitude) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let magnitude = chrono::Duration::from_std(parse_go_duration(magnitude)?)
        .map_err(|e| anyhow!("duration {:?} out of range: {e}", raw))?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// [`duration_or`] for annotations that accept negative durations
pub fn signed_duration_or(
    annotations: &BTreeMap<String, String>,
    key: &str,
    default: chrono::Duration,
) -> chrono::Duration {
    match value(annotations, key) {
        None => default,
        Some(raw) => parse_signed_go_duration(raw).unwrap_or_else(|e| {
            warn!(
                "Unable to parse {}={:?}, using default {:?}: {}",
                key, raw, default, e
            );
            default
        }),
    }
}
