// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Injected collaborator capabilities and their wiring.
//!
//! Every external dependency of the engine (trust decisions, issuer
//! resolution, revocation-data sources, online clients, decoding, signature
//! verification, telemetry) is a trait object handed in through
//! [`ValidationComponents`]. Swapping behavior (including in tests) is a
//! matter of injecting a different implementation, never of subclassing.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::context::{TimeContext, ValidationContext};
use crate::error::Fault;
use crate::events::ValidationEventSink;
use crate::model::{Certificate, Crl, EvidenceSignature, OcspResponse};
use crate::properties::SignatureValidationProperties;
use crate::trust_store::{TrustLookup, TrustPurpose, TrustStore};

/// Answers "is this certificate trusted for this context at this time".
pub trait TrustProvider: Send + Sync {
    fn lookup(
        &self,
        context: &ValidationContext,
        certificate: &Certificate,
        at: OffsetDateTime,
    ) -> Result<TrustLookup, Fault>;
}

/// Locates issuer certificates and related certificate sets.
pub trait IssuerResolver: Send + Sync {
    fn find_issuer(&self, certificate: &Certificate) -> Result<Option<Arc<Certificate>>, Fault>;

    fn known_certificates(&self) -> Result<Vec<Arc<Certificate>>, Fault>;

    fn trusted_certificates(&self, purpose: TrustPurpose) -> Result<Vec<Arc<Certificate>>, Fault>;
}

/// A CRL, as delivered by a source: already parsed, or raw DER to be decoded.
#[derive(Debug, Clone)]
pub enum CrlPayload {
    Parsed(Arc<Crl>),
    Der(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct SourcedCrl {
    pub payload: CrlPayload,
    /// Present for live data, historical for data captured at signing time.
    pub origin: TimeContext,
}

#[derive(Debug, Clone)]
pub enum OcspPayload {
    Parsed(Arc<OcspResponse>),
    Der(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct SourcedOcsp {
    pub payload: OcspPayload,
    pub origin: TimeContext,
}

/// Revocation data already available without going to the network.
pub trait CrlSource: Send + Sync {
    fn collect(
        &self,
        certificate: &Certificate,
        at: OffsetDateTime,
    ) -> Result<Vec<SourcedCrl>, Fault>;
}

pub trait OcspSource: Send + Sync {
    fn collect(
        &self,
        certificate: &Certificate,
        at: OffsetDateTime,
    ) -> Result<Vec<SourcedOcsp>, Fault>;
}

/// Online CRL retrieval. The transport (and its timeouts) belong to the
/// implementation.
pub trait CrlFetcher: Send + Sync {
    fn fetch(
        &self,
        certificate: &Certificate,
        issuer: Option<&Certificate>,
    ) -> Result<Vec<Vec<u8>>, Fault>;
}

/// Online OCSP retrieval; needs the issuer to address the query.
pub trait OcspFetcher: Send + Sync {
    fn fetch(&self, certificate: &Certificate, issuer: &Certificate)
        -> Result<Vec<Vec<u8>>, Fault>;
}

/// Fetches certificate bytes from an AIA URL.
pub trait CertificateFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<Vec<u8>>, Fault>;
}

/// The parse-certificate / parse-CRL / parse-OCSP capability.
pub trait EvidenceDecoder: Send + Sync {
    fn decode_certificate(&self, der: &[u8]) -> Result<Certificate, Fault>;

    fn decode_crl(&self, der: &[u8]) -> Result<Crl, Fault>;

    fn decode_ocsp(&self, der: &[u8]) -> Result<OcspResponse, Fault>;
}

/// The verify-signature-bytes capability.
pub trait SignatureVerifier: Send + Sync {
    /// `Ok(false)` is a verified mismatch; `Err` is an inability to verify.
    fn verify(&self, signature: &EvidenceSignature, signer: &Certificate) -> Result<bool, Fault>;
}

/// Default verifier for model-level evidence: a key binding verifies when it
/// names the signer certificate's key.
#[derive(Debug, Default)]
pub struct KeyBindingVerifier;

impl SignatureVerifier for KeyBindingVerifier {
    fn verify(&self, signature: &EvidenceSignature, signer: &Certificate) -> Result<bool, Fault> {
        match signature {
            EvidenceSignature::KeyBinding(key) => Ok(*key == signer.public_key),
            EvidenceSignature::Der { .. } => Err(Fault::unsupported(
                "DER signature verification requires a cryptographic verifier",
            )),
        }
    }
}

/// Everything a validator needs, wired once and shared.
///
/// Defaults are minimal: no revocation sources, no online clients, no
/// decoder, the key-binding verifier, no telemetry sink. Override what the
/// deployment actually has.
pub struct ValidationComponents {
    pub trust: Arc<dyn TrustProvider>,
    pub properties: Arc<SignatureValidationProperties>,
    pub issuer_resolver: Arc<dyn IssuerResolver>,
    pub crl_sources: Vec<Arc<dyn CrlSource>>,
    pub ocsp_sources: Vec<Arc<dyn OcspSource>>,
    pub crl_fetcher: Option<Arc<dyn CrlFetcher>>,
    pub ocsp_fetcher: Option<Arc<dyn OcspFetcher>>,
    pub decoder: Option<Arc<dyn EvidenceDecoder>>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub event_sink: Option<Arc<dyn ValidationEventSink>>,
}

impl ValidationComponents {
    pub fn new(trust: Arc<dyn TrustProvider>, issuer_resolver: Arc<dyn IssuerResolver>) -> Self {
        Self {
            trust,
            properties: Arc::new(SignatureValidationProperties::default()),
            issuer_resolver,
            crl_sources: Vec::new(),
            ocsp_sources: Vec::new(),
            crl_fetcher: None,
            ocsp_fetcher: None,
            decoder: None,
            verifier: Arc::new(KeyBindingVerifier),
            event_sink: None,
        }
    }

    pub fn with_properties(mut self, properties: SignatureValidationProperties) -> Self {
        self.properties = Arc::new(properties);
        self
    }

    pub fn with_crl_source(mut self, source: Arc<dyn CrlSource>) -> Self {
        self.crl_sources.push(source);
        self
    }

    pub fn with_ocsp_source(mut self, source: Arc<dyn OcspSource>) -> Self {
        self.ocsp_sources.push(source);
        self
    }

    pub fn with_crl_fetcher(mut self, fetcher: Arc<dyn CrlFetcher>) -> Self {
        self.crl_fetcher = Some(fetcher);
        self
    }

    pub fn with_ocsp_fetcher(mut self, fetcher: Arc<dyn OcspFetcher>) -> Self {
        self.ocsp_fetcher = Some(fetcher);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn EvidenceDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn ValidationEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }
}

/// Standard issuer resolution: known certificates first, then an AIA fetch,
/// then the trust store.
pub struct CertificateRetriever {
    known: Vec<Arc<Certificate>>,
    trust_store: Arc<TrustStore>,
    fetcher: Option<Arc<dyn CertificateFetcher>>,
    decoder: Option<Arc<dyn EvidenceDecoder>>,
}

impl CertificateRetriever {
    pub fn new(trust_store: Arc<TrustStore>) -> Self {
        Self {
            known: Vec::new(),
            trust_store,
            fetcher: None,
            decoder: None,
        }
    }

    pub fn add_known_certificate(&mut self, certificate: Arc<Certificate>) {
        self.known.push(certificate);
    }

    pub fn add_known_certificates(
        &mut self,
        certificates: impl IntoIterator<Item = Arc<Certificate>>,
    ) {
        self.known.extend(certificates);
    }

    pub fn with_fetcher(
        mut self,
        fetcher: Arc<dyn CertificateFetcher>,
        decoder: Arc<dyn EvidenceDecoder>,
    ) -> Self {
        self.fetcher = Some(fetcher);
        self.decoder = Some(decoder);
        self
    }

    fn fetch_issuer(&self, certificate: &Certificate) -> Option<Arc<Certificate>> {
        let (fetcher, decoder) = match (&self.fetcher, &self.decoder) {
            (Some(f), Some(d)) => (f, d),
            _ => return None,
        };

        for url in &certificate.issuer_certificate_urls {
            // Best effort: a broken distribution point must not end the search.
            let blobs = match fetcher.fetch(url) {
                Ok(blobs) => blobs,
                Err(fault) => {
                    log::debug!("issuer fetch from {url} failed: {fault}");
                    continue;
                }
            };
            for der in blobs {
                match decoder.decode_certificate(&der) {
                    Ok(candidate) if candidate.subject == certificate.issuer => {
                        return Some(Arc::new(candidate));
                    }
                    Ok(_) => {}
                    Err(fault) => log::debug!("issuer candidate from {url} unusable: {fault}"),
                }
            }
        }
        None
    }
}

impl IssuerResolver for CertificateRetriever {
    fn find_issuer(&self, certificate: &Certificate) -> Result<Option<Arc<Certificate>>, Fault> {
        if let Some(known) = self
            .known
            .iter()
            .find(|c| c.subject == certificate.issuer)
            .cloned()
        {
            return Ok(Some(known));
        }

        if let Some(fetched) = self.fetch_issuer(certificate) {
            return Ok(Some(fetched));
        }

        Ok(self
            .trust_store
            .all_certificates()
            .into_iter()
            .find(|c| c.subject == certificate.issuer))
    }

    fn known_certificates(&self) -> Result<Vec<Arc<Certificate>>, Fault> {
        Ok(self.known.clone())
    }

    fn trusted_certificates(&self, purpose: TrustPurpose) -> Result<Vec<Arc<Certificate>>, Fault> {
        Ok(self.trust_store.certificates_for(purpose))
    }
}
