// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Java KeyStore (JKS, version 2) encoding and decoding.
//!
//! Private keys are protected with the Sun JKS key protector (a SHA-1
//! keystream XORed over the PKCS#8 bytes) and the whole store is sealed
//! with a SHA-1 digest keyed by the store password.

use super::pem_blocks;
use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

const MAGIC: u32 = 0xFEED_FEED;
const VERSION: u32 = 2;
const PRIVATE_KEY_TAG: u32 = 1;
const TRUSTED_CERT_TAG: u32 = 2;
const CERT_TYPE: &str = "X.509";
const WHITENER: &[u8] = b"Mighty Aphrodite";
const SALT_LEN: usize = 20;
const DIGEST_LEN: usize = 20;
/// 1.3.6.1.4.1.42.2.17.1.1, the Sun key protector algorithm
const KEY_PROTECTOR_OID: &[u8] = &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x2a, 0x02, 0x11, 0x01, 0x01];

const DER_SEQUENCE: u8 = 0x30;
const DER_OID: u8 = 0x06;
const DER_NULL: u8 = 0x05;
const DER_OCTET_STRING: u8 = 0x04;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeystoreError {
    #[error("keystore data is truncated")]
    Truncated,

    #[error("invalid keystore magic {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported keystore version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown keystore entry tag {0}")]
    UnknownTag(u32),

    #[error("keystore integrity check failed")]
    IntegrityCheckFailed,

    #[error("cannot recover private key: {0}")]
    KeyRecovery(&'static str),

    #[error("value too large for keystore field: {0}")]
    FieldTooLarge(String),

    #[error("keystore string is not valid UTF-8")]
    InvalidString,

    #[error("no PEM block found in {0}")]
    MissingPem(&'static str),

    #[error("PEM block {0:?} is not a private key")]
    NotAPrivateKey(String),
}

pub type Result<T> = std::result::Result<T, KeystoreError>;

/// A keystore entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A private key (PKCS#8 bytes) and its certificate chain (DER)
    PrivateKey { key: Vec<u8>, chain: Vec<Vec<u8>> },
    /// A trusted certificate (DER)
    TrustedCertificate(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredEntry {
    created_millis: i64,
    entry: Entry,
}

/// In-memory Java keystore keyed by alias
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    entries: BTreeMap<String, StoredEntry>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, alias: impl Into<String>, created: DateTime<Utc>, entry: Entry) {
        self.entries.insert(
            alias.into(),
            StoredEntry {
                created_millis: created.timestamp_millis(),
                entry,
            },
        );
    }

    pub fn get(&self, alias: &str) -> Option<&Entry> {
        self.entries.get(alias).map(|stored| &stored.entry)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Same aliases holding the same entries. Creation times are ignored.
    pub fn same_content(&self, other: &KeyStore) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((a, ea), (b, eb))| a == b && ea.entry == eb.entry)
    }

    pub fn encode(&self, password: &str) -> Result<Vec<u8>> {
        let password = password_bytes(password);
        let mut out = Vec::new();
        put_u32(&mut out, MAGIC);
        put_u32(&mut out, VERSION);
        put_u32(&mut out, length_u32(self.entries.len(), "entry count")?);

        for (alias, stored) in &self.entries {
            match &stored.entry {
                Entry::PrivateKey { key, chain } => {
                    put_u32(&mut out, PRIVATE_KEY_TAG);
                    put_utf(&mut out, alias)?;
                    put_u64(&mut out, stored.created_millis as u64);
                    let salt: [u8; SALT_LEN] = rand::random();
                    put_bytes(&mut out, &protect_key(key, &password, &salt))?;
                    put_u32(&mut out, length_u32(chain.len(), "chain length")?);
                    for cert in chain {
                        put_utf(&mut out, CERT_TYPE)?;
                        put_bytes(&mut out, cert)?;
                    }
                }
                Entry::TrustedCertificate(cert) => {
                    put_u32(&mut out, TRUSTED_CERT_TAG);
                    put_utf(&mut out, alias)?;
                    put_u64(&mut out, stored.created_millis as u64);
                    put_utf(&mut out, CERT_TYPE)?;
                    put_bytes(&mut out, cert)?;
                }
            }
        }

        let digest = store_digest(&password, &out);
        out.extend_from_slice(&digest);
        Ok(out)
    }

    pub fn decode(data: &[u8], password: &str) -> Result<Self> {
        let password = password_bytes(password);
        if data.len() < DIGEST_LEN {
            return Err(KeystoreError::Truncated);
        }
        let (body, digest) = data.split_at(data.len() - DIGEST_LEN);
        if store_digest(&password, body).as_slice() != digest {
            return Err(KeystoreError::IntegrityCheckFailed);
        }

        let mut reader = Reader::new(body);
        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(KeystoreError::BadMagic(magic));
        }
        let version = reader.u32()?;
        if version != VERSION {
            return Err(KeystoreError::UnsupportedVersion(version));
        }

        let mut store = KeyStore::new();
        let count = reader.u32()?;
        for _ in 0..count {
            let tag = reader.u32()?;
            let alias = reader.utf()?;
            let created_millis = reader.u64()? as i64;
            let entry = match tag {
                PRIVATE_KEY_TAG => {
                    let protected = reader.bytes()?;
                    let key = recover_key(protected, &password)?;
                    let chain_len = reader.u32()?;
                    let mut chain = Vec::new();
                    for _ in 0..chain_len {
                        reader.utf()?;
                        chain.push(reader.bytes()?.to_vec());
                    }
                    Entry::PrivateKey { key, chain }
                }
                TRUSTED_CERT_TAG => {
                    reader.utf()?;
                    Entry::TrustedCertificate(reader.bytes()?.to_vec())
                }
                other => return Err(KeystoreError::UnknownTag(other)),
            };
            store.entries.insert(
                alias,
                StoredEntry {
                    created_millis,
                    entry,
                },
            );
        }
        Ok(store)
    }
}

/// Build a keystore holding one private key entry aliased "alias".
///
/// The key is the first PEM block of `key_pem`; the chain is every PEM block
/// of `cert_pem`.
pub fn keystore_from_pem(
    cert_pem: &[u8],
    key_pem: &[u8],
    created: DateTime<Utc>,
    password: &str,
) -> Result<Vec<u8>> {
    let key = pem_blocks(key_pem)
        .into_iter()
        .next()
        .ok_or(KeystoreError::MissingPem("private key"))?;
    if !key.label.contains("PRIVATE KEY") {
        return Err(KeystoreError::NotAPrivateKey(key.label));
    }
    let chain: Vec<Vec<u8>> = pem_blocks(cert_pem)
        .into_iter()
        .map(|block| block.contents)
        .collect();
    if chain.is_empty() {
        return Err(KeystoreError::MissingPem("certificate"));
    }

    let mut store = KeyStore::new();
    store.insert(
        "alias",
        created,
        Entry::PrivateKey {
            key: key.contents,
            chain,
        },
    );
    store.encode(password)
}

/// Build a truststore with one trusted certificate per PEM block, aliased
/// "alias0", "alias1", ... in bundle order.
pub fn truststore_from_pem(ca_pem: &[u8], created: DateTime<Utc>, password: &str) -> Result<Vec<u8>> {
    let mut store = KeyStore::new();
    for (i, block) in pem_blocks(ca_pem).into_iter().enumerate() {
        store.insert(
            format!("alias{}", i),
            created,
            Entry::TrustedCertificate(block.contents),
        );
    }
    store.encode(password)
}

/// Whether two encoded keystores hold the same aliases and entries under
/// `password`. Anything that fails to decode is never equivalent.
pub fn equivalent(a: &[u8], b: &[u8], password: &str) -> bool {
    match (KeyStore::decode(a, password), KeyStore::decode(b, password)) {
        (Ok(a), Ok(b)) => a.same_content(&b),
        (a, b) => {
            debug!(
                "Keystore comparison failed to decode: {:?} / {:?}",
                a.err(),
                b.err()
            );
            false
        }
    }
}

fn password_bytes(password: &str) -> Vec<u8> {
    password.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

fn store_digest(password: &[u8], body: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(password);
    hasher.update(WHITENER);
    hasher.update(body);
    digest_array(hasher)
}

fn keystream(password: &[u8], salt: &[u8], len: usize) -> Vec<u8> {
    let mut stream = Vec::with_capacity(len + DIGEST_LEN);
    let mut digest = salt.to_vec();
    while stream.len() < len {
        let mut hasher = Sha1::new();
        hasher.update(password);
        hasher.update(&digest);
        digest = hasher.finalize().to_vec();
        stream.extend_from_slice(&digest);
    }
    stream.truncate(len);
    stream
}

fn key_check(password: &[u8], key: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(password);
    hasher.update(key);
    digest_array(hasher)
}

fn digest_array(hasher: Sha1) -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn protect_key(key: &[u8], password: &[u8], salt: &[u8; SALT_LEN]) -> Vec<u8> {
    let stream = keystream(password, salt, key.len());
    let mut protected = Vec::with_capacity(SALT_LEN + key.len() + DIGEST_LEN);
    protected.extend_from_slice(salt);
    protected.extend(key.iter().zip(&stream).map(|(k, s)| k ^ s));
    protected.extend_from_slice(&key_check(password, key));

    let algorithm = [der(DER_OID, KEY_PROTECTOR_OID), vec![DER_NULL, 0x00]].concat();
    der(
        DER_SEQUENCE,
        &[der(DER_SEQUENCE, &algorithm), der(DER_OCTET_STRING, &protected)].concat(),
    )
}

fn recover_key(encrypted_info: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    let (info, _) = der_read(encrypted_info, DER_SEQUENCE)?;
    let (algorithm, rest) = der_read(info, DER_SEQUENCE)?;
    let (oid, _) = der_read(algorithm, DER_OID)?;
    if oid != KEY_PROTECTOR_OID {
        return Err(KeystoreError::KeyRecovery("unsupported key protection algorithm"));
    }
    let (protected, _) = der_read(rest, DER_OCTET_STRING)?;
    if protected.len() < SALT_LEN + DIGEST_LEN {
        return Err(KeystoreError::Truncated);
    }

    let (salt, rest) = protected.split_at(SALT_LEN);
    let (encrypted, check) = rest.split_at(rest.len() - DIGEST_LEN);
    let stream = keystream(password, salt, encrypted.len());
    let key: Vec<u8> = encrypted.iter().zip(&stream).map(|(e, s)| e ^ s).collect();
    if key_check(password, &key).as_slice() != check {
        return Err(KeystoreError::KeyRecovery("wrong password or corrupt key"));
    }
    Ok(key)
}

fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}

/// Read one DER element with the expected tag, returning its content and
/// the remaining input.
fn der_read(input: &[u8], tag: u8) -> Result<(&[u8], &[u8])> {
    let (&actual, rest) = input.split_first().ok_or(KeystoreError::Truncated)?;
    if actual != tag {
        return Err(KeystoreError::KeyRecovery("malformed key encoding"));
    }
    let (&first, rest) = rest.split_first().ok_or(KeystoreError::Truncated)?;
    let (len, rest) = if first < 0x80 {
        (first as usize, rest)
    } else {
        let width = (first & 0x7f) as usize;
        if width == 0 || width > 4 || rest.len() < width {
            return Err(KeystoreError::KeyRecovery("malformed key encoding"));
        }
        let len = rest[..width]
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (len, &rest[width..])
    };
    if rest.len() < len {
        return Err(KeystoreError::Truncated);
    }
    Ok(rest.split_at(len))
}

fn length_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| KeystoreError::FieldTooLarge(what.to_string()))
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_utf(out: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| KeystoreError::FieldTooLarge(value.to_string()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn put_bytes(out: &mut Vec<u8>, value: &[u8]) -> Result<()> {
    put_u32(out, length_u32(value.len(), "byte field")?);
    out.extend_from_slice(value);
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(KeystoreError::Truncated);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut array = [0u8; 8];
        array.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(array))
    }

    fn utf(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| KeystoreError::InvalidString)
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}
