// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics shared by all controllers.
//!
//! - `certutils_reconciliations_total{controller}`
//! - `certutils_reconciliation_errors_total{controller}`
//! - `certutils_target_writes_total{controller}`
//! - `certutils_certificate_issue_time{name,namespace}` - latest NotBefore, unix seconds
//! - `certutils_certificate_expiry_time{name,namespace}` - earliest NotAfter, unix seconds

use anyhow::Result;
use chrono::{DateTime, Utc};
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    reconciliation_errors: IntCounterVec,
    target_writes: IntCounterVec,
    certificate_issue_time: GaugeVec,
    certificate_expiry_time: GaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new("certutils_reconciliations_total", "Total number of reconciliations"),
            &["controller"],
        )?;
        let reconciliation_errors = IntCounterVec::new(
            Opts::new(
                "certutils_reconciliation_errors_total",
                "Total number of reconciliation errors",
            ),
            &["controller"],
        )?;
        let target_writes = IntCounterVec::new(
            Opts::new(
                "certutils_target_writes_total",
                "Total number of target objects updated",
            ),
            &["controller"],
        )?;
        let certificate_issue_time = GaugeVec::new(
            Opts::new(
                "certutils_certificate_issue_time",
                "Latest NotBefore of the certificates in a TLS secret, as unix time",
            ),
            &["name", "namespace"],
        )?;
        let certificate_expiry_time = GaugeVec::new(
            Opts::new(
                "certutils_certificate_expiry_time",
                "Earliest NotAfter of the certificates in a TLS secret, as unix time",
            ),
            &["name", "namespace"],
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(reconciliation_errors.clone()))?;
        registry.register(Box::new(target_writes.clone()))?;
        registry.register(Box::new(certificate_issue_time.clone()))?;
        registry.register(Box::new(certificate_expiry_time.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            reconciliation_errors,
            target_writes,
            certificate_issue_time,
            certificate_expiry_time,
        })
    }

    pub fn reconciled(&self, controller: &str) {
        self.reconciliations.with_label_values(&[controller]).inc();
    }

    pub fn failed(&self, controller: &str) {
        self.reconciliation_errors.with_label_values(&[controller]).inc();
    }

    pub fn wrote(&self, controller: &str) {
        self.target_writes.with_label_values(&[controller]).inc();
    }

    /// Record the validity window of a secret's certificates
    pub fn observe_certificate(
        &self,
        namespace: &str,
        name: &str,
        issued: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) {
        self.certificate_issue_time
            .with_label_values(&[name, namespace])
            .set(issued.timestamp() as f64);
        self.certificate_expiry_time
            .with_label_values(&[name, namespace])
            .set(expires.timestamp() as f64);
    }

    /// Drop the validity window series of a secret
    pub fn forget_certificate(&self, namespace: &str, name: &str) {
        // Absent series are not an error here
        let _ = self.certificate_issue_time.remove_label_values(&[name, namespace]);
        let _ = self.certificate_expiry_time.remove_label_values(&[name, namespace]);
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_counters_are_labelled_per_controller() {
        let metrics = Metrics::new().unwrap();
        metrics.reconciled("configmap-ca-injection");
        metrics.reconciled("configmap-ca-injection");
        metrics.failed("route-certificates");
        metrics.wrote("configmap-ca-injection");

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains(r#"certutils_reconciliations_total{controller="configmap-ca-injection"} 2"#));
        assert!(text.contains(r#"certutils_reconciliation_errors_total{controller="route-certificates"} 1"#));
        assert!(text.contains(r#"certutils_target_writes_total{controller="configmap-ca-injection"} 1"#));
    }

    #[test]
    fn test_observe_certificate() {
        let metrics = Metrics::new().unwrap();
        let issued = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let expires = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        metrics.observe_certificate("ns", "app-tls", issued, expires);

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains(r#"certutils_certificate_issue_time{name="app-tls",namespace="ns"} 1735689600"#));
        assert!(text.contains(r#"certutils_certificate_expiry_time{name="app-tls",namespace="ns"} 1767225600"#));
    }

    #[test]
    fn test_forget_certificate() {
        let metrics = Metrics::new().unwrap();
        let issued = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let expires = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        metrics.observe_certificate("ns", "app-tls", issued, expires);
        metrics.observe_certificate("ns", "other-tls", issued, expires);

        metrics.forget_certificate("ns", "app-tls");
        metrics.forget_certificate("ns", "never-seen");

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(!text.contains(r#"name="app-tls""#));
        assert!(text.contains(r#"certutils_certificate_expiry_time{name="other-tls",namespace="ns"} 1767225600"#));
    }
}
