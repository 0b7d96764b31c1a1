// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Wire-level constants: annotation keys, field keys and defaults.

use std::time::Duration;

/// Prefix shared by every annotation the operator reads
pub const ANNOTATION_BASE: &str = "cert-utils-operator.redhat-cop.io";

/// The operator name used for events and logs
pub const OPERATOR_NAME: &str = "cert-utils-operator";

/// Kubernetes annotation keys used by the operator
pub mod annotations {
    /// `<namespace>/<name>` of a TLS secret whose `ca.crt` is injected
    pub const INJECT_CA_FROM_SECRET: &str = "cert-utils-operator.redhat-cop.io/injectca-from-secret";
    /// When set to "true", injects the system CA bundle file
    pub const INJECT_CA_FROM_SERVICE_CA: &str =
        "cert-utils-operator.redhat-cop.io/injectca-from-service_ca";
    pub const GENERATE_JAVA_KEYSTORES: &str =
        "cert-utils-operator.redhat-cop.io/generate-java-keystores";
    pub const GENERATE_JAVA_TRUSTSTORE: &str =
        "cert-utils-operator.redhat-cop.io/generate-java-truststore";
    /// Config map key holding the PEM bundle for truststore generation
    pub const SOURCE_CA_KEY: &str = "cert-utils-operator.redhat-cop.io/source-ca-key";
    pub const JAVA_KEYSTORE_PASSWORD: &str =
        "cert-utils-operator.redhat-cop.io/java-keystore-password";
    pub const GENERATE_CERT_INFO: &str = "cert-utils-operator.redhat-cop.io/generate-cert-info";
    pub const GENERATE_CERT_EXPIRY_ALERT: &str =
        "cert-utils-operator.redhat-cop.io/generate-cert-expiry-alert";
    pub const CERT_EXPIRY_CHECK_FREQUENCY: &str =
        "cert-utils-operator.redhat-cop.io/cert-expiry-check-frequency";
    pub const CERT_SOON_TO_EXPIRE_CHECK_FREQUENCY: &str =
        "cert-utils-operator.redhat-cop.io/cert-soon-to-expire-check-frequency";
    pub const CERT_SOON_TO_EXPIRE_THRESHOLD: &str =
        "cert-utils-operator.redhat-cop.io/cert-soon-to-expire-threshold";
    /// Secret (same namespace) providing a route's key, certificate and CA
    pub const CERTS_FROM_SECRET: &str = "cert-utils-operator.redhat-cop.io/certs-from-secret";
    /// Secret (same namespace) providing a route's destination CA
    pub const DESTINATION_CA_FROM_SECRET: &str =
        "cert-utils-operator.redhat-cop.io/destinationCA-from-secret";
}

/// Keys of the byte fields read from and written to objects
pub mod fields {
    pub const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";
    pub const TLS_CERT: &str = "tls.crt";
    pub const TLS_KEY: &str = "tls.key";
    pub const CA_CERT: &str = "ca.crt";
    pub const CA_BUNDLE: &str = "ca-bundle.crt";
    pub const KEYSTORE: &str = "keystore.jks";
    pub const TRUSTSTORE: &str = "truststore.jks";
    pub const CERT_INFO: &str = "tls.crt.info";
    pub const CA_INFO: &str = "ca.crt.info";
}

/// Defaults applied when an optional annotation or setting is absent
pub mod defaults {
    use super::Duration;

    pub const KEYSTORE_PASSWORD: &str = "changeme";
    /// 90 days
    pub const SOON_TO_EXPIRE_THRESHOLD: Duration = Duration::from_secs(90 * 24 * 60 * 60);
    /// 1 hour
    pub const SOON_TO_EXPIRE_CHECK_FREQUENCY: Duration = Duration::from_secs(60 * 60);
    /// 7 days
    pub const EXPIRY_CHECK_FREQUENCY: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    /// Shorter check frequencies fall back to their default
    pub const MIN_CHECK_FREQUENCY: Duration = Duration::from_secs(1);
    pub const SYSTEM_CA_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/service-ca.crt";
    pub const METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";
}

/// OpenShift route API coordinates
pub mod route {
    pub const GROUP: &str = "route.openshift.io";
    pub const VERSION: &str = "v1";
    pub const KIND: &str = "Route";
    pub const TERMINATION_EDGE: &str = "edge";
    pub const TERMINATION_REENCRYPT: &str = "reencrypt";
}

/// Requeue delays used by the controllers' error policy
pub mod requeue {
    /// Store I/O and write conflicts
    pub const TRANSIENT_SECS: u64 = 10;
    /// Malformed annotations, missing sources and encoding failures
    pub const REPORTABLE_SECS: u64 = 60;
}
