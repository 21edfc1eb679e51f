// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Evaluation of one OCSP response against one certificate at one point in
//! time.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::capabilities::ValidationComponents;
use crate::chain_validator::CertificateChainValidator;
use crate::context::{CertificateSource, ValidationContext, ValidatorContext};
use crate::model::{Certificate, OcspCertStatus, OcspResponse, SingleOcspResponse};
use crate::report::{ReportItem, ValidationReport, ValidationResult};
use crate::trust_store::TrustPurpose;

pub const OCSP_CHECK: &str = "OCSP response check.";

/// Validates a single OCSP status entry as revocation evidence.
pub struct OcspValidator {
    components: Arc<ValidationComponents>,
}

impl OcspValidator {
    pub fn new(components: Arc<ValidationComponents>) -> Self {
        Self { components }
    }

    /// Evaluates one status entry of one response, writing findings into the
    /// report. `evidence_date` is when the response was produced; the
    /// responder's chain is validated as of that date.
    #[allow(clippy::too_many_arguments)]
    pub fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &Arc<Certificate>,
        single: &SingleOcspResponse,
        response: &OcspResponse,
        at: OffsetDateTime,
        evidence_date: OffsetDateTime,
    ) {
        let context = context.with_validator(ValidatorContext::OcspValidator);

        if single.serial != certificate.serial {
            report.add(
                ReportItem::indeterminate(
                    OCSP_CHECK,
                    format!(
                        "The OCSP status entry is for serial number {}, not for certificate {} \
                         (serial number {}).",
                        single.serial, certificate.subject, certificate.serial
                    ),
                )
                .with_certificate(certificate.clone()),
            );
            return;
        }
        if single.issuer_name != certificate.issuer {
            report.add(
                ReportItem::indeterminate(
                    OCSP_CHECK,
                    format!(
                        "The OCSP status entry was issued for certificates of {}, but \
                         certificate {} was issued by {}.",
                        single.issuer_name, certificate.subject, certificate.issuer
                    ),
                )
                .with_certificate(certificate.clone()),
            );
            return;
        }

        let issuer = match self.components.issuer_resolver.find_issuer(certificate) {
            Ok(issuer) => issuer,
            Err(fault) => {
                report.add(
                    ReportItem::indeterminate(
                        OCSP_CHECK,
                        format!(
                            "Retrieval of the issuer certificate failed while verifying the OCSP \
                             response for {}.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone())
                    .with_cause(fault.kind),
                );
                return;
            }
        };

        let Some(responder) = self.resolve_responder(report, certificate, response, &issuer)
        else {
            return;
        };
        let responder_is_issuer = issuer
            .as_ref()
            .map(|i| i.fingerprint() == responder.fingerprint())
            .unwrap_or(false);

        match self.components.verifier.verify(&response.signature, &responder) {
            Err(fault) => {
                report.add(
                    ReportItem::indeterminate(
                        OCSP_CHECK,
                        format!(
                            "The OCSP response signature for {} couldn't be checked.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone())
                    .with_cause(fault.kind),
                );
                return;
            }
            Ok(false) => {
                report.add(
                    ReportItem::invalid(
                        OCSP_CHECK,
                        format!(
                            "The OCSP response is not signed by the key of responder {}.",
                            responder.subject
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
                return;
            }
            Ok(true) => {}
        }

        // The CA's own key needs no separate responder validation; a
        // delegated responder must prove its chain.
        if !responder_is_issuer {
            let mut responder_report = ValidationReport::new();
            CertificateChainValidator::new(self.components.clone()).validate_subordinate(
                &mut responder_report,
                context.with_certificate_source(CertificateSource::OcspIssuer),
                &responder,
                evidence_date,
            );
            report.merge(&responder_report);
            if responder_report.result() != ValidationResult::Valid {
                return;
            }
        }

        if let Some(next_update) = single.next_update {
            if next_update < at {
                report.add(
                    ReportItem::indeterminate(
                        OCSP_CHECK,
                        format!(
                            "The OCSP response is no longer valid: its next update date \
                             ({next_update}) is before the validation date ({at})."
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
                report.add(
                    ReportItem::indeterminate(
                        OCSP_CHECK,
                        format!(
                            "No usable OCSP response was found for certificate {}.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
                return;
            }
        }

        let freshness = self.components.properties.freshness(&context);
        if single.this_update < at - freshness {
            report.add(
                ReportItem::indeterminate(
                    OCSP_CHECK,
                    format!(
                        "The OCSP status was produced on {}, outside the allowed freshness \
                         window of {} seconds before the validation date ({at}).",
                        single.this_update,
                        freshness.whole_seconds()
                    ),
                )
                .with_certificate(certificate.clone()),
            );
            report.add(
                ReportItem::indeterminate(
                    OCSP_CHECK,
                    format!(
                        "No usable OCSP response was found for certificate {}.",
                        certificate.subject
                    ),
                )
                .with_certificate(certificate.clone()),
            );
            return;
        }

        match &single.status {
            OcspCertStatus::Good => {}
            OcspCertStatus::Revoked { revoked_at, .. } => {
                if *revoked_at <= at {
                    report.add(
                        ReportItem::invalid(
                            OCSP_CHECK,
                            format!(
                                "Certificate {} was revoked on {revoked_at}.",
                                certificate.subject
                            ),
                        )
                        .with_certificate(certificate.clone()),
                    );
                } else {
                    report.add(
                        ReportItem::info(
                            OCSP_CHECK,
                            format!(
                                "Certificate {} is scheduled to be revoked on {revoked_at}, \
                                 after the validation date.",
                                certificate.subject
                            ),
                        )
                        .with_certificate(certificate.clone()),
                    );
                }
            }
            OcspCertStatus::Unknown => {
                report.add(
                    ReportItem::indeterminate(
                        OCSP_CHECK,
                        format!(
                            "The OCSP responder doesn't know certificate {}.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
            }
        }
    }

    /// The certificate to verify the response signature against: one of the
    /// certificates embedded in the response, the CA itself, or a trusted
    /// responder. `None` means an unverifiable response (already reported).
    fn resolve_responder(
        &self,
        report: &mut ValidationReport,
        certificate: &Arc<Certificate>,
        response: &OcspResponse,
        issuer: &Option<Arc<Certificate>>,
    ) -> Option<Arc<Certificate>> {
        if let Some(embedded) = response
            .responder_certificates
            .iter()
            .find(|c| response.responder.matches(c))
        {
            return Some(embedded.clone());
        }

        if let Some(issuer) = issuer {
            if response.responder.matches(issuer) {
                return Some(issuer.clone());
            }
        }

        let trusted = match self
            .components
            .issuer_resolver
            .trusted_certificates(TrustPurpose::OcspResponder)
        {
            Ok(trusted) => trusted,
            Err(fault) => {
                report.add(
                    ReportItem::indeterminate(
                        OCSP_CHECK,
                        format!(
                            "Retrieval of trusted OCSP responder certificates failed for {}.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone())
                    .with_cause(fault.kind),
                );
                return None;
            }
        };
        if let Some(candidate) = trusted
            .into_iter()
            .find(|c| response.responder.matches(c))
        {
            return Some(candidate);
        }

        report.add(
            ReportItem::indeterminate(
                OCSP_CHECK,
                format!(
                    "The OCSP response for {} couldn't be verified: no responder certificate \
                     was found.",
                    certificate.subject
                ),
            )
            .with_certificate(certificate.clone()),
        );
        None
    }
}
