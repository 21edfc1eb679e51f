// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The validation context threaded through every call.
//!
//! The context names who is validating, in which role the current
//! certificate is being checked, and whether validation runs against the
//! present or a historical point in time. Policy lookups key off the full
//! triple; derivation methods re-scope it at each hop without mutating the
//! original.

use flagset::{flags, FlagSet};

flags! {
    /// The validator performing the current check.
    pub enum ValidatorContext: u8 {
        SignatureValidator,
        CertificateChainValidator,
        RevocationDataValidator,
        CrlValidator,
        OcspValidator,
    }

    /// The role of the certificate currently being checked.
    pub enum CertificateSource: u8 {
        SignerCert,
        CertIssuer,
        CrlIssuer,
        OcspIssuer,
        Timestamp,
    }

    /// Present-time validation (live data) vs. validation as of a past date.
    pub enum TimeContext: u8 {
        Present,
        Historical,
    }
}

pub type ValidatorContexts = FlagSet<ValidatorContext>;
pub type CertificateSources = FlagSet<CertificateSource>;
pub type TimeContexts = FlagSet<TimeContext>;

impl ValidatorContext {
    pub(crate) const COUNT: usize = 5;

    pub(crate) fn index(self) -> usize {
        match self {
            ValidatorContext::SignatureValidator => 0,
            ValidatorContext::CertificateChainValidator => 1,
            ValidatorContext::RevocationDataValidator => 2,
            ValidatorContext::CrlValidator => 3,
            ValidatorContext::OcspValidator => 4,
        }
    }
}

impl CertificateSource {
    pub(crate) const COUNT: usize = 5;

    pub(crate) fn index(self) -> usize {
        match self {
            CertificateSource::SignerCert => 0,
            CertificateSource::CertIssuer => 1,
            CertificateSource::CrlIssuer => 2,
            CertificateSource::OcspIssuer => 3,
            CertificateSource::Timestamp => 4,
        }
    }
}

impl TimeContext {
    pub(crate) const COUNT: usize = 2;

    pub(crate) fn index(self) -> usize {
        match self {
            TimeContext::Present => 0,
            TimeContext::Historical => 1,
        }
    }
}

/// Hops a single chain walk may take before failing closed.
pub const DEFAULT_MAX_CHAIN_HOPS: usize = 20;

/// Immutable validation scope.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    validator: ValidatorContext,
    certificate_source: CertificateSource,
    time_context: TimeContext,
    remaining_hops: usize,
}

impl ValidationContext {
    pub fn new(
        validator: ValidatorContext,
        certificate_source: CertificateSource,
        time_context: TimeContext,
    ) -> Self {
        Self {
            validator,
            certificate_source,
            time_context,
            remaining_hops: DEFAULT_MAX_CHAIN_HOPS,
        }
    }

    pub fn validator(&self) -> ValidatorContext {
        self.validator
    }

    pub fn certificate_source(&self) -> CertificateSource {
        self.certificate_source
    }

    pub fn time_context(&self) -> TimeContext {
        self.time_context
    }

    pub fn remaining_hops(&self) -> usize {
        self.remaining_hops
    }

    pub fn with_validator(self, validator: ValidatorContext) -> Self {
        Self { validator, ..self }
    }

    pub fn with_certificate_source(self, certificate_source: CertificateSource) -> Self {
        Self {
            certificate_source,
            ..self
        }
    }

    pub fn with_time_context(self, time_context: TimeContext) -> Self {
        Self {
            time_context,
            ..self
        }
    }

    /// Consumes one hop of the remaining depth, or reports exhaustion.
    pub(crate) fn consume_hop(self) -> Option<Self> {
        self.remaining_hops.checked_sub(1).map(|remaining_hops| Self {
            remaining_hops,
            ..self
        })
    }
}
