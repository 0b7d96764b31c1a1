// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Human-readable certificate descriptions.

use super::{parse_certificate, pem_blocks, to_utc};
use std::fmt::Write;
use x509_parser::certificate::X509Certificate;
use x509_parser::der_parser::oid::Oid;
use x509_parser::extensions::{GeneralName, KeyUsage};
use x509_parser::objects::{oid2sn, oid_registry};

/// Describe every decodable certificate in a PEM bundle.
///
/// Blocks that are not certificates are skipped. An input without any
/// certificate yields an empty string.
pub fn describe(data: &[u8]) -> String {
    let mut out = String::new();
    for block in pem_blocks(data) {
        if let Some(cert) = parse_certificate(&block.contents) {
            // Writing to a String cannot fail
            let _ = write_certificate(&mut out, &cert);
        }
    }
    out
}

fn oid_name(oid: &Oid) -> String {
    oid2sn(oid, oid_registry())
        .map(str::to_string)
        .unwrap_or_else(|_| oid.to_id_string())
}

fn format_time(time: x509_parser::time::ASN1Time) -> String {
    to_utc(time).format("%b %e %H:%M:%S %Y UTC").to_string()
}

fn write_certificate(out: &mut String, cert: &X509Certificate) -> std::fmt::Result {
    writeln!(out, "Certificate:")?;
    writeln!(out, "    Data:")?;
    let version = cert.version().0;
    writeln!(out, "        Version: {} ({:#x})", version + 1, version)?;
    writeln!(out, "        Serial Number: {}", cert.raw_serial_as_string())?;
    writeln!(
        out,
        "        Signature Algorithm: {}",
        oid_name(&cert.signature_algorithm.algorithm)
    )?;
    writeln!(out, "        Issuer: {}", cert.issuer())?;
    writeln!(out, "        Validity")?;
    writeln!(out, "            Not Before: {}", format_time(cert.validity().not_before))?;
    writeln!(out, "            Not After : {}", format_time(cert.validity().not_after))?;
    writeln!(out, "        Subject: {}", cert.subject())?;
    writeln!(out, "        Subject Public Key Info:")?;
    writeln!(
        out,
        "            Public Key Algorithm: {}",
        oid_name(&cert.public_key().algorithm.algorithm)
    )?;

    let mut extensions = String::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        let names: Vec<String> = san.value.general_names.iter().map(general_name).collect();
        writeln!(extensions, "            X509v3 Subject Alternative Name:{}", critical(san.critical))?;
        writeln!(extensions, "                {}", names.join(", "))?;
    }
    if let Ok(Some(constraints)) = cert.basic_constraints() {
        writeln!(extensions, "            X509v3 Basic Constraints:{}", critical(constraints.critical))?;
        let ca = if constraints.value.ca { "TRUE" } else { "FALSE" };
        match constraints.value.path_len_constraint {
            Some(len) => writeln!(extensions, "                CA:{}, pathlen:{}", ca, len)?,
            None => writeln!(extensions, "                CA:{}", ca)?,
        }
    }
    if let Ok(Some(usage)) = cert.key_usage() {
        writeln!(extensions, "            X509v3 Key Usage:{}", critical(usage.critical))?;
        writeln!(extensions, "                {}", key_usages(usage.value).join(", "))?;
    }
    if !extensions.is_empty() {
        writeln!(out, "        X509v3 extensions:")?;
        out.push_str(&extensions);
    }
    writeln!(out)
}

fn critical(is_critical: bool) -> &'static str {
    if is_critical {
        " critical"
    } else {
        ""
    }
}

fn general_name(name: &GeneralName) -> String {
    match name {
        GeneralName::DNSName(dns) => format!("DNS:{}", dns),
        GeneralName::RFC822Name(email) => format!("email:{}", email),
        GeneralName::URI(uri) => format!("URI:{}", uri),
        GeneralName::IPAddress(bytes) => match bytes.len() {
            4 => format!("IP Address:{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3]),
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                format!("IP Address:{}", std::net::Ipv6Addr::from(octets))
            }
            _ => "IP Address:<invalid>".to_string(),
        },
        GeneralName::DirectoryName(dn) => format!("DirName:{}", dn),
        other => format!("othername:{:?}", other),
    }
}

fn key_usages(usage: &KeyUsage) -> Vec<&'static str> {
    let flags = [
        (usage.digital_signature(), "Digital Signature"),
        (usage.non_repudiation(), "Non Repudiation"),
        (usage.key_encipherment(), "Key Encipherment"),
        (usage.data_encipherment(), "Data Encipherment"),
        (usage.key_agreement(), "Key Agreement"),
        (usage.key_cert_sign(), "Certificate Sign"),
        (usage.crl_sign(), "CRL Sign"),
        (usage.encipher_only(), "Encipher Only"),
        (usage.decipher_only(), "Decipher Only"),
    ];
    flags
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
        .collect()
}
