// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! PEM and X.509 helpers shared by the keystore, info and expiry features.

pub mod info;
pub mod jks;

use chrono::{DateTime, Utc};
use tracing::warn;
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::Pem;
use x509_parser::time::ASN1Time;

/// Decode every PEM block in `data`, skipping blocks that fail to decode.
pub fn pem_blocks(data: &[u8]) -> Vec<Pem> {
    let mut blocks = Vec::new();
    for block in Pem::iter_from_buffer(data) {
        match block {
            Ok(pem) => blocks.push(pem),
            Err(e) => warn!("Skipping undecodable PEM block: {}", e),
        }
    }
    blocks
}

/// Parse a DER certificate, logging and discarding failures.
pub fn parse_certificate(der: &[u8]) -> Option<X509Certificate<'_>> {
    match x509_parser::parse_x509_certificate(der) {
        Ok((_, cert)) => Some(cert),
        Err(e) => {
            warn!("Skipping PEM block that is not an X.509 certificate: {}", e);
            None
        }
    }
}

/// Validity window of a single certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

pub(crate) fn to_utc(time: ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

/// Validity windows of all decodable certificates in a PEM bundle.
pub fn validities(data: &[u8]) -> Vec<Validity> {
    pem_blocks(data)
        .iter()
        .filter_map(|block| parse_certificate(&block.contents))
        .map(|cert| Validity {
            not_before: to_utc(cert.validity().not_before),
            not_after: to_utc(cert.validity().not_after),
        })
        .collect()
}

/// The earliest expiry among the certificates in a PEM bundle
pub fn earliest_expiry(data: &[u8]) -> Option<DateTime<Utc>> {
    validities(data).into_iter().map(|v| v.not_after).min()
}

/// The most recent issue time among the certificates in a PEM bundle
pub fn latest_issue(data: &[u8]) -> Option<DateTime<Utc>> {
    validities(data).into_iter().map(|v| v.not_before).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CA_CRT, SECOND_CA_CRT, TLS_CRT, TLS_KEY};
    use chrono::TimeZone;

    #[test]
    fn test_pem_blocks_in_bundle() {
        let bundle = [CA_CRT, SECOND_CA_CRT].concat();
        let blocks = pem_blocks(bundle.as_bytes());
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.label == "CERTIFICATE"));
    }

    #[test]
    fn test_pem_blocks_key() {
        let blocks = pem_blocks(TLS_KEY.as_bytes());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].label, "PRIVATE KEY");
    }

    #[test]
    fn test_pem_blocks_ignores_garbage() {
        assert!(pem_blocks(b"ABC").is_empty());
        assert!(pem_blocks(b"").is_empty());
    }

    #[test]
    fn test_validity_of_leaf() {
        let validity = validities(TLS_CRT.as_bytes());
        assert_eq!(validity.len(), 1);
        assert_eq!(
            validity[0].not_before,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            validity[0].not_after,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_earliest_expiry_and_latest_issue() {
        let bundle = [TLS_CRT, CA_CRT].concat();
        assert_eq!(
            earliest_expiry(bundle.as_bytes()),
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            latest_issue(bundle.as_bytes()),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_key_is_not_a_certificate() {
        assert!(validities(TLS_KEY.as_bytes()).is_empty());
        assert_eq!(earliest_expiry(TLS_KEY.as_bytes()), None);
    }
}
