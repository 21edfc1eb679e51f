// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Owned, parsed forms of certificates and revocation evidence.
//!
//! The engine never touches DER itself. Adapters (or test builders) extract
//! the fields the decision logic needs into these plain structs once, and
//! everything downstream works on owned values.

use std::fmt;
use std::sync::Arc;

use flagset::{flags, FlagSet};
use time::OffsetDateTime;

flags! {
    /// RFC 5280 key usage bits.
    pub enum KeyUsage: u16 {
        DigitalSignature,
        NonRepudiation,
        KeyEncipherment,
        DataEncipherment,
        KeyAgreement,
        KeyCertSign,
        CrlSign,
        EncipherOnly,
        DecipherOnly,
    }

    /// Revocation reasons, as scoped by an issuing-distribution-point
    /// extension and as recorded on revoked entries.
    pub enum CrlReason: u16 {
        Unspecified,
        KeyCompromise,
        CaCompromise,
        AffiliationChanged,
        Superseded,
        CessationOfOperation,
        CertificateHold,
        PrivilegeWithdrawn,
        AaCompromise,
    }
}

/// Extended-key-usage OIDs the engine cares about.
pub mod eku_oid {
    pub const OCSP_SIGNING: &str = "1.3.6.1.5.5.7.3.9";
    pub const TIME_STAMPING: &str = "1.3.6.1.5.5.7.3.8";
}

/// Certificate serial number, rendered upper-hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerialNumber(Vec<u8>);

impl SerialNumber {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_u64(value: u64) -> Self {
        let bytes = value.to_be_bytes();
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
        Self(bytes[start..].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

/// Identifies a verification key without committing to a key format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyHandle {
    /// Opaque key identity, matched by equality.
    Id(String),
    /// DER-encoded SubjectPublicKeyInfo.
    Spki(Arc<Vec<u8>>),
}

/// Signature material attached to a piece of evidence.
///
/// Checked only through the injected signature-verification capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidenceSignature {
    /// Names the key that produced the signature; matched against the
    /// signer certificate's key handle.
    KeyBinding(KeyHandle),
    /// Raw signed bytes, verified cryptographically by an adapter.
    Der {
        signed_data: Arc<Vec<u8>>,
        algorithm_oid: String,
        signature: Arc<Vec<u8>>,
    },
}

/// Parsed certificate.
#[derive(Debug, Clone, PartialEq)]
pub struct Certificate {
    pub subject: String,
    pub issuer: String,
    pub serial: SerialNumber,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub public_key: KeyHandle,
    /// Key-usage bits; `None` when the extension is absent.
    pub key_usage: Option<FlagSet<KeyUsage>>,
    /// Extended-key-usage OIDs; `None` when the extension is absent.
    pub extended_key_usage: Option<Vec<String>>,
    pub is_ca: bool,
    /// id-pkix-ocsp-nocheck: this OCSP responder needs no revocation check.
    pub ocsp_no_check: bool,
    /// The issuer assures validity for the whole certificate lifetime.
    pub validity_assured: bool,
    /// id-ce-noRevAvail: no revocation information will ever be available.
    pub no_rev_avail: bool,
    /// AIA caIssuers URLs.
    pub issuer_certificate_urls: Vec<String>,
    /// CRL distribution point URLs.
    pub crl_distribution_urls: Vec<String>,
    /// AIA OCSP responder URLs.
    pub ocsp_responder_urls: Vec<String>,
    /// SHA-1 thumbprint of the encoded certificate, when decoded from DER.
    pub thumbprint_sha1_hex: Option<String>,
    pub raw_der: Option<Arc<Vec<u8>>>,
}

impl Certificate {
    pub fn new(
        subject: impl Into<String>,
        issuer: impl Into<String>,
        serial: SerialNumber,
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
        public_key: KeyHandle,
    ) -> Self {
        Self {
            subject: subject.into(),
            issuer: issuer.into(),
            serial,
            not_before,
            not_after,
            public_key,
            key_usage: None,
            extended_key_usage: None,
            is_ca: false,
            ocsp_no_check: false,
            validity_assured: false,
            no_rev_avail: false,
            issuer_certificate_urls: Vec::new(),
            crl_distribution_urls: Vec::new(),
            ocsp_responder_urls: Vec::new(),
            thumbprint_sha1_hex: None,
            raw_der: None,
        }
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }

    /// Stable identity used for cycle detection and diagnostics.
    pub fn fingerprint(&self) -> String {
        match &self.thumbprint_sha1_hex {
            Some(thumb) => thumb.clone(),
            None => format!("{}#{}", self.subject, self.serial),
        }
    }
}

/// One entry of a certificate revocation list.
#[derive(Debug, Clone, PartialEq)]
pub struct RevokedEntry {
    pub serial: SerialNumber,
    pub revocation_date: OffsetDateTime,
    pub reason: Option<CrlReason>,
}

/// Parsed certificate revocation list.
#[derive(Debug, Clone, PartialEq)]
pub struct Crl {
    pub issuer: String,
    pub this_update: OffsetDateTime,
    pub next_update: Option<OffsetDateTime>,
    pub revoked: Vec<RevokedEntry>,
    /// Reason scope from an issuing-distribution-point extension; `None`
    /// means the list covers every reason.
    pub only_some_reasons: Option<FlagSet<CrlReason>>,
    pub signature: EvidenceSignature,
}

impl Crl {
    pub fn find_revoked(&self, serial: &SerialNumber) -> Option<&RevokedEntry> {
        self.revoked.iter().find(|entry| entry.serial == *serial)
    }
}

/// Identifies the signer of an OCSP response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponderId {
    ByName(String),
    ByKey(KeyHandle),
}

impl ResponderId {
    pub fn matches(&self, certificate: &Certificate) -> bool {
        match self {
            ResponderId::ByName(name) => *name == certificate.subject,
            ResponderId::ByKey(key) => *key == certificate.public_key,
        }
    }
}

/// Revocation status reported for one certificate.
#[derive(Debug, Clone, PartialEq)]
pub enum OcspCertStatus {
    Good,
    Revoked {
        revoked_at: OffsetDateTime,
        reason: Option<CrlReason>,
    },
    Unknown,
}

/// Status entry for a single certificate within an OCSP response.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleOcspResponse {
    pub serial: SerialNumber,
    /// Issuer the queried certificate was expected to chain to.
    pub issuer_name: String,
    pub status: OcspCertStatus,
    pub this_update: OffsetDateTime,
    pub next_update: Option<OffsetDateTime>,
}

/// Parsed OCSP response.
#[derive(Debug, Clone, PartialEq)]
pub struct OcspResponse {
    pub responder: ResponderId,
    pub produced_at: OffsetDateTime,
    pub responses: Vec<SingleOcspResponse>,
    /// Certificates embedded alongside the response, usually the responder's.
    pub responder_certificates: Vec<Arc<Certificate>>,
    pub signature: EvidenceSignature,
}

impl OcspResponse {
    /// The entry covering the given certificate, or the first entry so the
    /// validator can report the mismatch.
    pub fn response_for(&self, certificate: &Certificate) -> Option<&SingleOcspResponse> {
        self.responses
            .iter()
            .find(|single| single.serial == certificate.serial)
            .or_else(|| self.responses.first())
    }
}
