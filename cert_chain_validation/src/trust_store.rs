// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Explicit trust anchors, scoped by purpose.
//!
//! Entries are held in insertion order so lookups are deterministic. An
//! entry may carry a timestamped status history (e.g. from a national trust
//! list): trust then only holds while the status at the check date is
//! granted.

use std::sync::Arc;

use flagset::{flags, FlagSet};
use time::OffsetDateTime;

use crate::capabilities::TrustProvider;
use crate::context::{CertificateSource, ValidationContext};
use crate::error::Fault;
use crate::model::Certificate;

flags! {
    /// What a trust entry is trusted for.
    pub enum TrustPurpose: u8 {
        /// Trusted in every role.
        General,
        CertificateAuthority,
        OcspResponder,
        CrlIssuer,
        Timestamping,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Granted,
    Withdrawn,
}

/// One transition in a trust entry's status history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub at: OffsetDateTime,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone)]
struct TrustedEntry {
    certificate: Arc<Certificate>,
    purposes: FlagSet<TrustPurpose>,
    status_history: Vec<StatusChange>,
}

/// Outcome of a trust lookup for one certificate in one context.
#[derive(Debug, Clone, PartialEq)]
pub enum TrustLookup {
    TrustedForPurpose(TrustPurpose),
    /// Known, but only for purposes the current context doesn't need.
    TrustedForOtherPurpose { available: FlagSet<TrustPurpose> },
    /// Trust existed but was withdrawn before the check date.
    TrustRevoked { since: OffsetDateTime },
    NotTrusted,
}

#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    entries: Vec<TrustedEntry>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trusted_certificates(
        certificates: impl IntoIterator<Item = Arc<Certificate>>,
    ) -> Self {
        let mut store = Self::new();
        for certificate in certificates {
            store.add_trusted_certificate(certificate);
        }
        store
    }

    pub fn add_trusted_certificate(&mut self, certificate: Arc<Certificate>) {
        self.add_certificate_for(certificate, TrustPurpose::General.into());
    }

    pub fn add_ca_certificate(&mut self, certificate: Arc<Certificate>) {
        self.add_certificate_for(certificate, TrustPurpose::CertificateAuthority.into());
    }

    pub fn add_ocsp_responder(&mut self, certificate: Arc<Certificate>) {
        self.add_certificate_for(certificate, TrustPurpose::OcspResponder.into());
    }

    pub fn add_crl_issuer(&mut self, certificate: Arc<Certificate>) {
        self.add_certificate_for(certificate, TrustPurpose::CrlIssuer.into());
    }

    pub fn add_timestamping_certificate(&mut self, certificate: Arc<Certificate>) {
        self.add_certificate_for(certificate, TrustPurpose::Timestamping.into());
    }

    pub fn add_certificate_for(
        &mut self,
        certificate: Arc<Certificate>,
        purposes: FlagSet<TrustPurpose>,
    ) {
        self.entries.push(TrustedEntry {
            certificate,
            purposes,
            status_history: Vec::new(),
        });
    }

    /// Adds an externally supplied entry (e.g. from a trust-list feed) whose
    /// trust validity follows a granted/withdrawn status history.
    pub fn add_service_entry(
        &mut self,
        certificate: Arc<Certificate>,
        purposes: FlagSet<TrustPurpose>,
        status_history: Vec<StatusChange>,
    ) {
        self.entries.push(TrustedEntry {
            certificate,
            purposes,
            status_history,
        });
    }

    pub fn all_certificates(&self) -> Vec<Arc<Certificate>> {
        self.entries.iter().map(|e| e.certificate.clone()).collect()
    }

    pub fn certificates_for(&self, purpose: TrustPurpose) -> Vec<Arc<Certificate>> {
        self.entries
            .iter()
            .filter(|e| e.purposes.contains(purpose) || e.purposes.contains(TrustPurpose::General))
            .map(|e| e.certificate.clone())
            .collect()
    }

    fn needed_purpose(source: CertificateSource) -> TrustPurpose {
        match source {
            CertificateSource::SignerCert => TrustPurpose::General,
            CertificateSource::CertIssuer => TrustPurpose::CertificateAuthority,
            CertificateSource::CrlIssuer => TrustPurpose::CrlIssuer,
            CertificateSource::OcspIssuer => TrustPurpose::OcspResponder,
            CertificateSource::Timestamp => TrustPurpose::Timestamping,
        }
    }

    /// Status of an entry at the check date, honoring its history.
    /// `None` means the entry doesn't apply at that date at all.
    fn status_at(entry: &TrustedEntry, at: OffsetDateTime) -> Option<(ServiceStatus, OffsetDateTime)> {
        if entry.status_history.is_empty() {
            return Some((ServiceStatus::Granted, at));
        }
        entry
            .status_history
            .iter()
            .filter(|change| change.at <= at)
            .last()
            .map(|change| (change.status, change.at))
    }

    pub fn trust_for(
        &self,
        context: &ValidationContext,
        certificate: &Certificate,
        at: OffsetDateTime,
    ) -> TrustLookup {
        let needed = Self::needed_purpose(context.certificate_source());
        let mut other_purposes: FlagSet<TrustPurpose> = FlagSet::default();
        let mut revoked_since: Option<OffsetDateTime> = None;

        for entry in &self.entries {
            if entry.certificate.subject != certificate.subject
                || entry.certificate.serial != certificate.serial
            {
                continue;
            }

            match Self::status_at(entry, at) {
                // Queried before the entry ever existed.
                None => continue,
                Some((ServiceStatus::Withdrawn, since)) => {
                    revoked_since.get_or_insert(since);
                    continue;
                }
                Some((ServiceStatus::Granted, _)) => {}
            }

            if entry.purposes.contains(needed) || entry.purposes.contains(TrustPurpose::General) {
                return TrustLookup::TrustedForPurpose(needed);
            }
            other_purposes |= entry.purposes;
        }

        if let Some(since) = revoked_since {
            return TrustLookup::TrustRevoked { since };
        }
        if !other_purposes.is_empty() {
            return TrustLookup::TrustedForOtherPurpose {
                available: other_purposes,
            };
        }
        TrustLookup::NotTrusted
    }
}

impl TrustProvider for TrustStore {
    fn lookup(
        &self,
        context: &ValidationContext,
        certificate: &Certificate,
        at: OffsetDateTime,
    ) -> Result<TrustLookup, Fault> {
        Ok(self.trust_for(context, certificate, at))
    }
}
