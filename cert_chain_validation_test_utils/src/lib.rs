// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test-only utilities for composing validation scenarios.
//!
//! This crate exists to keep the production `cert_chain_validation` surface
//! focused while still supporting concise test composition in this repo:
//! model builders for certificates and revocation evidence, plus recording
//! and failing capability fakes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use time::{Date, Duration, Month, OffsetDateTime};

use cert_chain_validation::capabilities::{
    CertificateFetcher, CrlFetcher, CrlPayload, CrlSource, IssuerResolver, OcspFetcher,
    OcspPayload, OcspSource, SourcedCrl, SourcedOcsp, TrustProvider, ValidationComponents,
};
use cert_chain_validation::context::{
    CertificateSource, TimeContext, ValidationContext, ValidatorContext,
};
use cert_chain_validation::error::{Fault, FaultKind};
use cert_chain_validation::events::{ValidationEvent, ValidationEventSink};
use cert_chain_validation::model::{
    Certificate, Crl, CrlReason, EvidenceSignature, KeyHandle, KeyUsage, OcspCertStatus,
    OcspResponse, ResponderId, RevokedEntry, SerialNumber, SingleOcspResponse,
};
use cert_chain_validation::trust_store::{TrustLookup, TrustPurpose, TrustStore};
use cert_chain_validation::FlagSet;

pub fn datetime(year: i32, month: u8, day: u8) -> OffsetDateTime {
    Date::from_calendar_date(year, Month::try_from(month).unwrap(), day)
        .unwrap()
        .midnight()
        .assume_utc()
}

/// The fixed "now" all scenario tests validate against.
pub fn test_date() -> OffsetDateTime {
    datetime(2024, 7, 15)
}

pub fn days(n: i64) -> Duration {
    Duration::days(n)
}

pub fn minutes(n: i64) -> Duration {
    Duration::minutes(n)
}

/// A context as the top-level signature validator would create it.
pub fn signer_context() -> ValidationContext {
    ValidationContext::new(
        ValidatorContext::SignatureValidator,
        CertificateSource::SignerCert,
        TimeContext::Present,
    )
}

pub fn components(
    trust_store: TrustStore,
    issuer_resolver: Arc<dyn IssuerResolver>,
) -> ValidationComponents {
    ValidationComponents::new(Arc::new(trust_store), issuer_resolver)
}

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Builds model certificates with sensible scenario defaults: self-signed,
/// valid for a year around [`test_date`], key identified by the subject.
pub struct CertificateBuilder {
    certificate: Certificate,
}

impl CertificateBuilder {
    pub fn new(subject: &str) -> Self {
        let serial = SerialNumber::from_u64(NEXT_SERIAL.fetch_add(1, Ordering::Relaxed));
        Self {
            certificate: Certificate::new(
                subject,
                subject,
                serial,
                test_date() - days(365),
                test_date() + days(365),
                KeyHandle::Id(format!("key:{subject}")),
            ),
        }
    }

    pub fn issued_by(mut self, issuer: &Certificate) -> Self {
        self.certificate.issuer = issuer.subject.clone();
        self
    }

    pub fn serial(mut self, serial: u64) -> Self {
        self.certificate.serial = SerialNumber::from_u64(serial);
        self
    }

    pub fn valid_from(mut self, not_before: OffsetDateTime) -> Self {
        self.certificate.not_before = not_before;
        self
    }

    pub fn valid_until(mut self, not_after: OffsetDateTime) -> Self {
        self.certificate.not_after = not_after;
        self
    }

    pub fn key_usage(mut self, usage: impl Into<FlagSet<KeyUsage>>) -> Self {
        self.certificate.key_usage = Some(usage.into());
        self
    }

    pub fn extended_key_usage(mut self, oids: &[&str]) -> Self {
        self.certificate.extended_key_usage =
            Some(oids.iter().map(|oid| oid.to_string()).collect());
        self
    }

    pub fn ca(mut self) -> Self {
        self.certificate.is_ca = true;
        self
    }

    pub fn ocsp_no_check(mut self) -> Self {
        self.certificate.ocsp_no_check = true;
        self
    }

    pub fn validity_assured(mut self) -> Self {
        self.certificate.validity_assured = true;
        self
    }

    pub fn no_rev_avail(mut self) -> Self {
        self.certificate.no_rev_avail = true;
        self
    }

    pub fn issuer_certificate_url(mut self, url: &str) -> Self {
        self.certificate.issuer_certificate_urls.push(url.to_string());
        self
    }

    pub fn build(self) -> Arc<Certificate> {
        Arc::new(self.certificate)
    }
}

/// Builds model CRLs signed (by key binding) with the issuer's key.
pub struct CrlBuilder {
    crl: Crl,
}

impl CrlBuilder {
    pub fn issued_by(issuer: &Certificate) -> Self {
        Self {
            crl: Crl {
                issuer: issuer.subject.clone(),
                this_update: test_date() - days(1),
                next_update: Some(test_date() + days(30)),
                revoked: Vec::new(),
                only_some_reasons: None,
                signature: EvidenceSignature::KeyBinding(issuer.public_key.clone()),
            },
        }
    }

    pub fn this_update(mut self, this_update: OffsetDateTime) -> Self {
        self.crl.this_update = this_update;
        self
    }

    pub fn next_update(mut self, next_update: Option<OffsetDateTime>) -> Self {
        self.crl.next_update = next_update;
        self
    }

    pub fn revoke(mut self, certificate: &Certificate, at: OffsetDateTime) -> Self {
        self.crl.revoked.push(RevokedEntry {
            serial: certificate.serial.clone(),
            revocation_date: at,
            reason: Some(CrlReason::Unspecified),
        });
        self
    }

    pub fn only_some_reasons(mut self, reasons: impl Into<FlagSet<CrlReason>>) -> Self {
        self.crl.only_some_reasons = Some(reasons.into());
        self
    }

    pub fn signed_with(mut self, signature: EvidenceSignature) -> Self {
        self.crl.signature = signature;
        self
    }

    pub fn build(self) -> Arc<Crl> {
        Arc::new(self.crl)
    }
}

/// Builds single-entry model OCSP responses, by default produced now, fresh,
/// signed by the queried certificate's issuer.
pub struct OcspResponseBuilder {
    serial: SerialNumber,
    issuer_name: String,
    status: OcspCertStatus,
    this_update: OffsetDateTime,
    next_update: Option<OffsetDateTime>,
    responder: ResponderId,
    produced_at: OffsetDateTime,
    responder_certificates: Vec<Arc<Certificate>>,
    signature: EvidenceSignature,
}

impl OcspResponseBuilder {
    pub fn for_certificate(certificate: &Certificate, issuer: &Certificate) -> Self {
        Self {
            serial: certificate.serial.clone(),
            issuer_name: certificate.issuer.clone(),
            status: OcspCertStatus::Good,
            this_update: test_date(),
            next_update: Some(test_date() + days(1)),
            responder: ResponderId::ByName(issuer.subject.clone()),
            produced_at: test_date(),
            responder_certificates: Vec::new(),
            signature: EvidenceSignature::KeyBinding(issuer.public_key.clone()),
        }
    }

    /// Sets the production date and aligns the entry's `this_update` with it.
    pub fn produced_at(mut self, produced_at: OffsetDateTime) -> Self {
        self.produced_at = produced_at;
        self.this_update = produced_at;
        self
    }

    pub fn this_update(mut self, this_update: OffsetDateTime) -> Self {
        self.this_update = this_update;
        self
    }

    pub fn next_update(mut self, next_update: Option<OffsetDateTime>) -> Self {
        self.next_update = next_update;
        self
    }

    pub fn serial(mut self, serial: u64) -> Self {
        self.serial = SerialNumber::from_u64(serial);
        self
    }

    pub fn issuer_name(mut self, issuer_name: &str) -> Self {
        self.issuer_name = issuer_name.to_string();
        self
    }

    pub fn status(mut self, status: OcspCertStatus) -> Self {
        self.status = status;
        self
    }

    pub fn revoked_at(self, revoked_at: OffsetDateTime) -> Self {
        self.status(OcspCertStatus::Revoked {
            revoked_at,
            reason: None,
        })
    }

    pub fn unknown(self) -> Self {
        self.status(OcspCertStatus::Unknown)
    }

    /// Signs the response with a delegated responder instead of the CA and
    /// embeds its certificate in the response.
    pub fn signed_by(mut self, responder: &Arc<Certificate>) -> Self {
        self.responder = ResponderId::ByName(responder.subject.clone());
        self.signature = EvidenceSignature::KeyBinding(responder.public_key.clone());
        self.responder_certificates.push(responder.clone());
        self
    }

    pub fn signed_with(mut self, signature: EvidenceSignature) -> Self {
        self.signature = signature;
        self
    }

    pub fn build(self) -> Arc<OcspResponse> {
        Arc::new(OcspResponse {
            responder: self.responder,
            produced_at: self.produced_at,
            responses: vec![SingleOcspResponse {
                serial: self.serial,
                issuer_name: self.issuer_name,
                status: self.status,
                this_update: self.this_update,
                next_update: self.next_update,
            }],
            responder_certificates: self.responder_certificates,
            signature: self.signature,
        })
    }
}

/// Issuer resolution over a fixed certificate set, recording lookups.
#[derive(Default)]
pub struct StaticIssuerResolver {
    known: Vec<Arc<Certificate>>,
    trusted: Vec<(FlagSet<TrustPurpose>, Arc<Certificate>)>,
    find_issuer_calls: Mutex<usize>,
}

impl StaticIssuerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_certificates(certificates: impl IntoIterator<Item = Arc<Certificate>>) -> Self {
        let mut resolver = Self::new();
        for certificate in certificates {
            resolver.add(certificate);
        }
        resolver
    }

    pub fn add(&mut self, certificate: Arc<Certificate>) {
        self.known.push(certificate);
    }

    pub fn add_trusted(
        &mut self,
        certificate: Arc<Certificate>,
        purposes: impl Into<FlagSet<TrustPurpose>>,
    ) {
        self.trusted.push((purposes.into(), certificate));
    }

    /// How often `find_issuer` was called.
    pub fn find_issuer_calls(&self) -> usize {
        *self.find_issuer_calls.lock()
    }
}

impl IssuerResolver for StaticIssuerResolver {
    fn find_issuer(&self, certificate: &Certificate) -> Result<Option<Arc<Certificate>>, Fault> {
        *self.find_issuer_calls.lock() += 1;
        Ok(self
            .known
            .iter()
            .find(|c| c.subject == certificate.issuer)
            .cloned())
    }

    fn known_certificates(&self) -> Result<Vec<Arc<Certificate>>, Fault> {
        Ok(self.known.clone())
    }

    fn trusted_certificates(&self, purpose: TrustPurpose) -> Result<Vec<Arc<Certificate>>, Fault> {
        Ok(self
            .trusted
            .iter()
            .filter(|(purposes, _)| purposes.contains(purpose))
            .map(|(_, certificate)| certificate.clone())
            .collect())
    }
}

/// Fails every resolution with an issuer-retrieval fault.
#[derive(Debug, Default)]
pub struct FailingIssuerResolver;

impl IssuerResolver for FailingIssuerResolver {
    fn find_issuer(&self, _certificate: &Certificate) -> Result<Option<Arc<Certificate>>, Fault> {
        Err(Fault::new(FaultKind::IssuerRetrieval, "resolver offline"))
    }

    fn known_certificates(&self) -> Result<Vec<Arc<Certificate>>, Fault> {
        Err(Fault::new(FaultKind::IssuerRetrieval, "resolver offline"))
    }

    fn trusted_certificates(&self, _purpose: TrustPurpose) -> Result<Vec<Arc<Certificate>>, Fault> {
        Err(Fault::new(FaultKind::IssuerRetrieval, "resolver offline"))
    }
}

/// Fails every trust lookup.
#[derive(Debug, Default)]
pub struct FailingTrustProvider;

impl TrustProvider for FailingTrustProvider {
    fn lookup(
        &self,
        _context: &ValidationContext,
        _certificate: &Certificate,
        _at: OffsetDateTime,
    ) -> Result<TrustLookup, Fault> {
        Err(Fault::new(FaultKind::TrustStoreRetrieval, "store offline"))
    }
}

/// Serves fixed CRLs, recording how often it was asked.
#[derive(Default)]
pub struct StaticCrlSource {
    items: Vec<SourcedCrl>,
    calls: Mutex<usize>,
}

impl StaticCrlSource {
    pub fn with_crl(crl: Arc<Crl>) -> Self {
        let mut source = Self::default();
        source.add(crl, TimeContext::Present);
        source
    }

    pub fn add(&mut self, crl: Arc<Crl>, origin: TimeContext) {
        self.items.push(SourcedCrl {
            payload: CrlPayload::Parsed(crl),
            origin,
        });
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl CrlSource for StaticCrlSource {
    fn collect(
        &self,
        _certificate: &Certificate,
        _at: OffsetDateTime,
    ) -> Result<Vec<SourcedCrl>, Fault> {
        *self.calls.lock() += 1;
        Ok(self.items.clone())
    }
}

/// Serves fixed OCSP responses, recording how often it was asked.
#[derive(Default)]
pub struct StaticOcspSource {
    items: Vec<SourcedOcsp>,
    calls: Mutex<usize>,
}

impl StaticOcspSource {
    pub fn with_response(response: Arc<OcspResponse>) -> Self {
        let mut source = Self::default();
        source.add(response, TimeContext::Present);
        source
    }

    pub fn add(&mut self, response: Arc<OcspResponse>, origin: TimeContext) {
        self.items.push(SourcedOcsp {
            payload: OcspPayload::Parsed(response),
            origin,
        });
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl OcspSource for StaticOcspSource {
    fn collect(
        &self,
        _certificate: &Certificate,
        _at: OffsetDateTime,
    ) -> Result<Vec<SourcedOcsp>, Fault> {
        *self.calls.lock() += 1;
        Ok(self.items.clone())
    }
}

#[derive(Debug, Default)]
pub struct FailingCrlSource;

impl CrlSource for FailingCrlSource {
    fn collect(
        &self,
        _certificate: &Certificate,
        _at: OffsetDateTime,
    ) -> Result<Vec<SourcedCrl>, Fault> {
        Err(Fault::client("CRL source broke"))
    }
}

#[derive(Debug, Default)]
pub struct FailingOcspSource;

impl OcspSource for FailingOcspSource {
    fn collect(
        &self,
        _certificate: &Certificate,
        _at: OffsetDateTime,
    ) -> Result<Vec<SourcedOcsp>, Fault> {
        Err(Fault::client("OCSP source broke"))
    }
}

/// Online CRL client fake: returns fixed blobs and counts calls.
#[derive(Default)]
pub struct RecordingCrlFetcher {
    blobs: Vec<Vec<u8>>,
    calls: Mutex<usize>,
}

impl RecordingCrlFetcher {
    pub fn with_blobs(blobs: Vec<Vec<u8>>) -> Self {
        Self {
            blobs,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl CrlFetcher for RecordingCrlFetcher {
    fn fetch(
        &self,
        _certificate: &Certificate,
        _issuer: Option<&Certificate>,
    ) -> Result<Vec<Vec<u8>>, Fault> {
        *self.calls.lock() += 1;
        Ok(self.blobs.clone())
    }
}

/// Online OCSP client fake: returns fixed blobs and counts calls.
#[derive(Default)]
pub struct RecordingOcspFetcher {
    blobs: Vec<Vec<u8>>,
    calls: Mutex<usize>,
}

impl RecordingOcspFetcher {
    pub fn with_blobs(blobs: Vec<Vec<u8>>) -> Self {
        Self {
            blobs,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl OcspFetcher for RecordingOcspFetcher {
    fn fetch(
        &self,
        _certificate: &Certificate,
        _issuer: &Certificate,
    ) -> Result<Vec<Vec<u8>>, Fault> {
        *self.calls.lock() += 1;
        Ok(self.blobs.clone())
    }
}

#[derive(Debug, Default)]
pub struct FailingOcspFetcher;

impl OcspFetcher for FailingOcspFetcher {
    fn fetch(
        &self,
        _certificate: &Certificate,
        _issuer: &Certificate,
    ) -> Result<Vec<Vec<u8>>, Fault> {
        Err(Fault::client("OCSP client broke"))
    }
}

/// Serves fixed certificate blobs for one URL, standing in for an AIA fetch.
#[derive(Default)]
pub struct StaticCertificateFetcher {
    url: String,
    blobs: Vec<Vec<u8>>,
    calls: Mutex<usize>,
}

impl StaticCertificateFetcher {
    pub fn serving(url: &str, blobs: Vec<Vec<u8>>) -> Self {
        Self {
            url: url.to_string(),
            blobs,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl CertificateFetcher for StaticCertificateFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<Vec<u8>>, Fault> {
        *self.calls.lock() += 1;
        if url == self.url {
            Ok(self.blobs.clone())
        } else {
            Err(Fault::client(format!("no route to {url}")))
        }
    }
}

/// Maps fixed byte blobs to parsed model values, standing in for a real DER
/// decoder in orchestration tests.
#[derive(Default)]
pub struct MapEvidenceDecoder {
    certificates: Vec<(Vec<u8>, Certificate)>,
    crls: Vec<(Vec<u8>, Crl)>,
    ocsps: Vec<(Vec<u8>, OcspResponse)>,
}

impl MapEvidenceDecoder {
    pub fn add_certificate(&mut self, bytes: Vec<u8>, certificate: Certificate) {
        self.certificates.push((bytes, certificate));
    }

    pub fn add_crl(&mut self, bytes: Vec<u8>, crl: Crl) {
        self.crls.push((bytes, crl));
    }

    pub fn add_ocsp(&mut self, bytes: Vec<u8>, response: OcspResponse) {
        self.ocsps.push((bytes, response));
    }
}

impl cert_chain_validation::capabilities::EvidenceDecoder for MapEvidenceDecoder {
    fn decode_certificate(&self, der: &[u8]) -> Result<Certificate, Fault> {
        self.certificates
            .iter()
            .find(|(bytes, _)| bytes == der)
            .map(|(_, certificate)| certificate.clone())
            .ok_or_else(|| Fault::parse("unknown certificate blob"))
    }

    fn decode_crl(&self, der: &[u8]) -> Result<Crl, Fault> {
        self.crls
            .iter()
            .find(|(bytes, _)| bytes == der)
            .map(|(_, crl)| crl.clone())
            .ok_or_else(|| Fault::parse("unknown CRL blob"))
    }

    fn decode_ocsp(&self, der: &[u8]) -> Result<OcspResponse, Fault> {
        self.ocsps
            .iter()
            .find(|(bytes, _)| bytes == der)
            .map(|(_, response)| response.clone())
            .ok_or_else(|| Fault::parse("unknown OCSP blob"))
    }
}

/// Captures telemetry events for assertions.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<ValidationEvent>>,
}

impl RecordingEventSink {
    pub fn events(&self) -> Vec<ValidationEvent> {
        self.events.lock().clone()
    }
}

impl ValidationEventSink for RecordingEventSink {
    fn report(&self, event: &ValidationEvent) {
        self.events.lock().push(event.clone());
    }
}
