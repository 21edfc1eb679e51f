// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Revocation-evidence orchestration.
//!
//! Gathers CRL and OCSP evidence from every registered source, decides
//! whether to additionally go online, ranks all evidence by recency, and
//! evaluates it sequentially until one piece is conclusive. Discarded
//! (inconclusive) evaluations stay in the report as informational findings
//! so the audit trail is complete either way.

use std::sync::Arc;

use flagset::FlagSet;
use time::OffsetDateTime;

use crate::capabilities::{CrlPayload, OcspPayload, ValidationComponents};
use crate::context::{CertificateSource, TimeContext, ValidationContext, ValidatorContext};
use crate::crl_validator::CrlValidator;
use crate::error::{Fault, FaultKind};
use crate::model::{Certificate, Crl, CrlReason, OcspResponse};
use crate::ocsp_validator::OcspValidator;
use crate::properties::OnlineFetching;
use crate::report::{ReportItem, ValidationReport, ValidationResult};

pub const REVOCATION_DATA_CHECK: &str = "Revocation data check.";

enum EvidencePayload {
    Crl(Arc<Crl>),
    Ocsp(Arc<OcspResponse>),
}

struct EvidenceItem {
    produced_at: OffsetDateTime,
    origin: TimeContext,
    payload: EvidencePayload,
}

impl EvidenceItem {
    /// OCSP evidence is preferred over a CRL of the same date.
    fn kind_rank(&self) -> u8 {
        match self.payload {
            EvidencePayload::Ocsp(_) => 0,
            EvidencePayload::Crl(_) => 1,
        }
    }
}

/// Collects and sequentially evaluates revocation evidence for one
/// certificate.
pub struct RevocationDataValidator {
    components: Arc<ValidationComponents>,
}

impl RevocationDataValidator {
    pub fn new(components: Arc<ValidationComponents>) -> Self {
        Self { components }
    }

    pub fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &Arc<Certificate>,
        at: OffsetDateTime,
    ) {
        let context = context.with_validator(ValidatorContext::RevocationDataValidator);

        if self.fast_path(report, &context, certificate) {
            return;
        }

        let mut evidence = Vec::new();
        self.gather_crls(report, certificate, at, &mut evidence);
        self.gather_ocsps(report, certificate, at, &mut evidence);

        let issuer_unavailable_for_fetch =
            self.fetch_online(report, &context, certificate, &mut evidence);

        // Most recent first; an OCSP response beats a CRL of the same date.
        evidence.sort_by(|a, b| {
            b.produced_at
                .cmp(&a.produced_at)
                .then_with(|| a.kind_rank().cmp(&b.kind_rank()))
        });

        let mut checked_reasons: FlagSet<CrlReason> = FlagSet::default();
        for item in &evidence {
            let item_context = context.with_time_context(item.origin);
            let mut candidate = ValidationReport::new();

            match &item.payload {
                EvidencePayload::Ocsp(response) => match response.response_for(certificate) {
                    Some(single) => OcspValidator::new(self.components.clone()).validate(
                        &mut candidate,
                        item_context,
                        certificate,
                        single,
                        response,
                        at,
                        item.produced_at,
                    ),
                    None => candidate.add(
                        ReportItem::indeterminate(
                            REVOCATION_DATA_CHECK,
                            "A gathered OCSP response contains no status entries.",
                        )
                        .with_certificate(certificate.clone()),
                    ),
                },
                EvidencePayload::Crl(crl) => CrlValidator::new(self.components.clone())
                    .validate_scoped(
                        &mut candidate,
                        item_context,
                        certificate,
                        crl,
                        at,
                        item.produced_at,
                        &mut checked_reasons,
                    ),
            }

            if candidate.result() == ValidationResult::Indeterminate {
                // Inconclusive; keep the findings, keep looking.
                report.merge_as_info(&candidate);
            } else {
                report.merge(&candidate);
                return;
            }
        }

        if issuer_unavailable_for_fetch {
            report.add(
                ReportItem::indeterminate(
                    REVOCATION_DATA_CHECK,
                    format!(
                        "Revocation data couldn't be retrieved online for certificate {}.",
                        certificate.subject
                    ),
                )
                .with_certificate(certificate.clone()),
            );
        } else {
            report.add(
                ReportItem::indeterminate(
                    REVOCATION_DATA_CHECK,
                    format!(
                        "No revocation data was found for certificate {}.",
                        certificate.subject
                    ),
                )
                .with_certificate(certificate.clone()),
            );
        }
    }

    /// Cases where no revocation evidence is needed (or can exist). Returns
    /// true when a fast path applied.
    fn fast_path(
        &self,
        report: &mut ValidationReport,
        context: &ValidationContext,
        certificate: &Arc<Certificate>,
    ) -> bool {
        if certificate.is_self_signed() {
            report.add(
                ReportItem::info(
                    REVOCATION_DATA_CHECK,
                    format!(
                        "Certificate {} is self-signed, revocation data checks are not performed.",
                        certificate.subject
                    ),
                )
                .with_certificate(certificate.clone()),
            );
            return true;
        }

        if context.certificate_source() == CertificateSource::OcspIssuer
            && certificate.ocsp_no_check
        {
            report.add(
                ReportItem::info(
                    REVOCATION_DATA_CHECK,
                    format!(
                        "OCSP responder certificate {} carries the no-check marker, revocation \
                         data checks are not required.",
                        certificate.subject
                    ),
                )
                .with_certificate(certificate.clone()),
            );
            return true;
        }

        if certificate.validity_assured {
            report.add(
                ReportItem::info(
                    REVOCATION_DATA_CHECK,
                    format!(
                        "The issuer of certificate {} assures its validity for the whole \
                         certificate lifetime, revocation data checks are not required.",
                        certificate.subject
                    ),
                )
                .with_certificate(certificate.clone()),
            );
            return true;
        }

        if certificate.no_rev_avail {
            if certificate.is_ca {
                // Absence of data can't be told apart from a CA-side failure.
                report.add(
                    ReportItem::indeterminate(
                        REVOCATION_DATA_CHECK,
                        format!(
                            "CA certificate {} declares that no revocation information is \
                             available; its status can't be established.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
            } else {
                report.add(
                    ReportItem::info(
                        REVOCATION_DATA_CHECK,
                        format!(
                            "Certificate {} declares that no revocation information is available.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
            }
            return true;
        }

        false
    }

    fn gather_crls(
        &self,
        report: &mut ValidationReport,
        certificate: &Arc<Certificate>,
        at: OffsetDateTime,
        evidence: &mut Vec<EvidenceItem>,
    ) {
        for source in &self.components.crl_sources {
            let items = match source.collect(certificate, at) {
                Ok(items) => items,
                Err(fault) => {
                    log::debug!("CRL source failed for {}: {fault}", certificate.subject);
                    report.add(
                        ReportItem::indeterminate(
                            REVOCATION_DATA_CHECK,
                            format!(
                                "A CRL source failed while gathering revocation data for \
                                 certificate {}.",
                                certificate.subject
                            ),
                        )
                        .with_certificate(certificate.clone())
                        .with_cause(fault.kind),
                    );
                    continue;
                }
            };

            for item in items {
                let crl = match item.payload {
                    CrlPayload::Parsed(crl) => crl,
                    CrlPayload::Der(bytes) => match self.decode_crl(&bytes) {
                        Ok(crl) => crl,
                        Err(fault) => {
                            report.add(
                                ReportItem::indeterminate(
                                    REVOCATION_DATA_CHECK,
                                    "A gathered CRL couldn't be parsed.",
                                )
                                .with_certificate(certificate.clone())
                                .with_cause(fault.kind),
                            );
                            continue;
                        }
                    },
                };
                evidence.push(EvidenceItem {
                    produced_at: crl.this_update,
                    origin: item.origin,
                    payload: EvidencePayload::Crl(crl),
                });
            }
        }
    }

    fn gather_ocsps(
        &self,
        report: &mut ValidationReport,
        certificate: &Arc<Certificate>,
        at: OffsetDateTime,
        evidence: &mut Vec<EvidenceItem>,
    ) {
        for source in &self.components.ocsp_sources {
            let items = match source.collect(certificate, at) {
                Ok(items) => items,
                Err(fault) => {
                    log::debug!("OCSP source failed for {}: {fault}", certificate.subject);
                    report.add(
                        ReportItem::indeterminate(
                            REVOCATION_DATA_CHECK,
                            format!(
                                "An OCSP source failed while gathering revocation data for \
                                 certificate {}.",
                                certificate.subject
                            ),
                        )
                        .with_certificate(certificate.clone())
                        .with_cause(fault.kind),
                    );
                    continue;
                }
            };

            for item in items {
                let response = match item.payload {
                    OcspPayload::Parsed(response) => response,
                    OcspPayload::Der(bytes) => match self.decode_ocsp(&bytes) {
                        Ok(response) => response,
                        Err(fault) => {
                            report.add(
                                ReportItem::indeterminate(
                                    REVOCATION_DATA_CHECK,
                                    "A gathered OCSP response couldn't be parsed.",
                                )
                                .with_certificate(certificate.clone())
                                .with_cause(fault.kind),
                            );
                            continue;
                        }
                    },
                };
                evidence.push(EvidenceItem {
                    produced_at: response.produced_at,
                    origin: item.origin,
                    payload: EvidencePayload::Ocsp(response),
                });
            }
        }
    }

    /// Fetches online evidence where policy asks for it, OCSP ahead of CRL so
    /// a usable OCSP response suppresses a fetch-if-needed CRL download.
    /// Returns true when the issuer needed for fetching couldn't be resolved.
    fn fetch_online(
        &self,
        report: &mut ValidationReport,
        context: &ValidationContext,
        certificate: &Arc<Certificate>,
        evidence: &mut Vec<EvidenceItem>,
    ) -> bool {
        let mut issuer_unavailable = false;

        let ocsp_context = context.with_validator(ValidatorContext::OcspValidator);
        if self.should_fetch(&ocsp_context, evidence.is_empty()) {
            if let Some(fetcher) = &self.components.ocsp_fetcher {
                match self.components.issuer_resolver.find_issuer(certificate) {
                    Err(fault) => {
                        report.add(
                            ReportItem::indeterminate(
                                REVOCATION_DATA_CHECK,
                                format!(
                                    "The issuer certificate needed to fetch an OCSP response \
                                     couldn't be retrieved for {}.",
                                    certificate.subject
                                ),
                            )
                            .with_certificate(certificate.clone())
                            .with_cause(fault.kind),
                        );
                        issuer_unavailable = true;
                    }
                    Ok(None) => {
                        report.add(
                            ReportItem::indeterminate(
                                REVOCATION_DATA_CHECK,
                                format!(
                                    "The issuer certificate needed to fetch an OCSP response \
                                     couldn't be retrieved for {}.",
                                    certificate.subject
                                ),
                            )
                            .with_certificate(certificate.clone())
                            .with_cause(FaultKind::IssuerRetrieval),
                        );
                        issuer_unavailable = true;
                    }
                    Ok(Some(issuer)) => match fetcher.fetch(certificate, &issuer) {
                        Err(fault) => {
                            report.add(
                                ReportItem::indeterminate(
                                    REVOCATION_DATA_CHECK,
                                    format!(
                                        "The online OCSP client failed for certificate {}.",
                                        certificate.subject
                                    ),
                                )
                                .with_certificate(certificate.clone())
                                .with_cause(fault.kind),
                            );
                        }
                        Ok(blobs) => {
                            for bytes in blobs {
                                match self.decode_ocsp(&bytes) {
                                    Ok(response) => evidence.push(EvidenceItem {
                                        produced_at: response.produced_at,
                                        origin: TimeContext::Present,
                                        payload: EvidencePayload::Ocsp(response),
                                    }),
                                    Err(fault) => {
                                        report.add(
                                            ReportItem::indeterminate(
                                                REVOCATION_DATA_CHECK,
                                                "A fetched OCSP response couldn't be parsed.",
                                            )
                                            .with_certificate(certificate.clone())
                                            .with_cause(fault.kind),
                                        );
                                    }
                                }
                            }
                        }
                    },
                }
            }
        }

        let crl_context = context.with_validator(ValidatorContext::CrlValidator);
        if self.should_fetch(&crl_context, evidence.is_empty()) {
            if let Some(fetcher) = &self.components.crl_fetcher {
                // The issuer is a nicety for CRL fetching, not a requirement.
                let issuer = self
                    .components
                    .issuer_resolver
                    .find_issuer(certificate)
                    .ok()
                    .flatten();
                match fetcher.fetch(certificate, issuer.as_deref()) {
                    Err(fault) => {
                        report.add(
                            ReportItem::indeterminate(
                                REVOCATION_DATA_CHECK,
                                format!(
                                    "The online CRL client failed for certificate {}.",
                                    certificate.subject
                                ),
                            )
                            .with_certificate(certificate.clone())
                            .with_cause(fault.kind),
                        );
                    }
                    Ok(blobs) => {
                        for bytes in blobs {
                            match self.decode_crl(&bytes) {
                                Ok(crl) => evidence.push(EvidenceItem {
                                    produced_at: crl.this_update,
                                    origin: TimeContext::Present,
                                    payload: EvidencePayload::Crl(crl),
                                }),
                                Err(fault) => {
                                    report.add(
                                        ReportItem::indeterminate(
                                            REVOCATION_DATA_CHECK,
                                            "A fetched CRL couldn't be parsed.",
                                        )
                                        .with_certificate(certificate.clone())
                                        .with_cause(fault.kind),
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }

        issuer_unavailable
    }

    fn should_fetch(&self, context: &ValidationContext, nothing_gathered: bool) -> bool {
        match self.components.properties.online_fetching(context) {
            OnlineFetching::NeverFetch => false,
            OnlineFetching::AlwaysFetch => true,
            OnlineFetching::FetchIfNoOtherDataAvailable => nothing_gathered,
        }
    }

    fn decode_crl(&self, bytes: &[u8]) -> Result<Arc<Crl>, Fault> {
        match &self.components.decoder {
            Some(decoder) => decoder.decode_crl(bytes).map(Arc::new),
            None => Err(Fault::unsupported("no evidence decoder is configured")),
        }
    }

    fn decode_ocsp(&self, bytes: &[u8]) -> Result<Arc<OcspResponse>, Fault> {
        match &self.components.decoder {
            Some(decoder) => decoder.decode_ocsp(bytes).map(Arc::new),
            None => Err(Fault::unsupported("no evidence decoder is configured")),
        }
    }
}
