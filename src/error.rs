// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::certs::jks::KeystoreError;
use crate::constants::requeue;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CertUtilsError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Invalid annotation {key}: {value:?}")]
    InvalidAnnotation { key: String, value: String },

    #[error("Source secret {0} not found")]
    MissingSource(String),

    #[error("Keystore encoding failed: {0}")]
    KeystoreError(#[from] KeystoreError),

    #[error("Failed to read system CA file {path}: {source}")]
    SystemCaError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Watch failed: {0}")]
    WatchError(String),
}

impl CertUtilsError {
    /// Errors caused by user input on the object, surfaced as warning events
    pub fn is_reportable(&self) -> bool {
        !matches!(
            self,
            CertUtilsError::KubeError(_) | CertUtilsError::WatchError(_)
        )
    }

    /// Short CamelCase reason used for events
    pub fn reason(&self) -> &'static str {
        match self {
            CertUtilsError::KubeError(_) => "ApiError",
            CertUtilsError::InvalidAnnotation { .. } => "InvalidAnnotation",
            CertUtilsError::MissingSource(_) => "SourceNotFound",
            CertUtilsError::KeystoreError(_) => "KeystoreEncodingFailed",
            CertUtilsError::SystemCaError { .. } => "SystemCaUnreadable",
            CertUtilsError::WatchError(_) => "WatchFailed",
        }
    }

    pub fn requeue_after(&self) -> Duration {
        if self.is_reportable() {
            Duration::from_secs(requeue::REPORTABLE_SECS)
        } else {
            Duration::from_secs(requeue::TRANSIENT_SECS)
        }
    }
}

pub type Result<T> = std::result::Result<T, CertUtilsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_annotation_is_reportable() {
        let err = CertUtilsError::InvalidAnnotation {
            key: "a".into(),
            value: "b".into(),
        };
        assert!(err.is_reportable());
        assert_eq!(err.requeue_after(), Duration::from_secs(60));
    }

    #[test]
    fn test_watch_error_is_transient() {
        let err = CertUtilsError::WatchError("stream closed".into());
        assert!(!err.is_reportable());
        assert_eq!(err.requeue_after(), Duration::from_secs(10));
    }
}
