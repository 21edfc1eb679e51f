// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Recursive certificate chain validation.
//!
//! For each certificate the walk checks trust, required extensions, the
//! validity period, and revocation evidence, then resolves the issuer and
//! recurses. Every collaborator failure is downgraded to an indeterminate
//! finding; the walk either completes or stops early per policy, but the
//! caller always gets a fully resolved report.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::capabilities::ValidationComponents;
use crate::context::{CertificateSource, ValidationContext, ValidatorContext};
use crate::error::FaultKind;
use crate::events::ValidationEvent;
use crate::model::Certificate;
use crate::properties::RequiredExtension;
use crate::report::{ReportItem, ReportItemStatus, ValidationReport};
use crate::revocation_data_validator::RevocationDataValidator;
use crate::trust_store::TrustLookup;

pub const CERTIFICATE_CHECK: &str = "Certificate check.";
pub const EXTENSIONS_CHECK: &str = "Required certificate extensions check.";
pub const VALIDITY_PERIOD_CHECK: &str = "Certificate validity period check.";

/// Walks a certificate's issuance chain, writing findings into the report.
pub struct CertificateChainValidator {
    components: Arc<ValidationComponents>,
}

impl CertificateChainValidator {
    pub fn new(components: Arc<ValidationComponents>) -> Self {
        Self { components }
    }

    /// Validates the certificate and, hop by hop, its issuers.
    ///
    /// Never fails; the outcome is the report's aggregate result.
    pub fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &Arc<Certificate>,
        at: OffsetDateTime,
    ) {
        let mut seen = Vec::new();
        self.validate_chain(
            report,
            context.with_validator(ValidatorContext::CertificateChainValidator),
            certificate,
            at,
            &mut seen,
        );

        if let Some(sink) = &self.components.event_sink {
            sink.report(&ValidationEvent::ChainValidated {
                subject: certificate.subject.clone(),
                result: report.result(),
                hops: seen.len(),
            });
        }
    }

    /// Chain walk on behalf of another validator (CRL/OCSP issuer chains).
    /// Identical semantics, but no telemetry event: at most one event is
    /// reported per top-level validation.
    pub(crate) fn validate_subordinate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &Arc<Certificate>,
        at: OffsetDateTime,
    ) {
        let mut seen = Vec::new();
        self.validate_chain(
            report,
            context.with_validator(ValidatorContext::CertificateChainValidator),
            certificate,
            at,
            &mut seen,
        );
    }

    fn validate_chain(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &Arc<Certificate>,
        at: OffsetDateTime,
        seen: &mut Vec<String>,
    ) {
        let fingerprint = certificate.fingerprint();
        if seen.contains(&fingerprint) {
            report.add(
                ReportItem::indeterminate(
                    CERTIFICATE_CHECK,
                    format!(
                        "Certificate {} appeared twice in its own issuance chain.",
                        certificate.subject
                    ),
                )
                .with_certificate(certificate.clone())
                .with_cause(FaultKind::DepthExceeded),
            );
            return;
        }
        let Some(context) = context.consume_hop() else {
            report.add(
                ReportItem::indeterminate(
                    CERTIFICATE_CHECK,
                    format!(
                        "Maximum chain depth was reached at certificate {}.",
                        certificate.subject
                    ),
                )
                .with_certificate(certificate.clone())
                .with_cause(FaultKind::DepthExceeded),
            );
            return;
        };
        seen.push(fingerprint);

        let invalid_before = report.count_of(ReportItemStatus::Invalid);

        match self.components.trust.lookup(&context, certificate, at) {
            Ok(TrustLookup::TrustedForPurpose(_)) => {
                report.add(
                    ReportItem::info(
                        CERTIFICATE_CHECK,
                        format!(
                            "Certificate {} is trusted, revocation data checks are not required.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
                return;
            }
            Ok(TrustLookup::TrustedForOtherPurpose { available }) => {
                report.add(
                    ReportItem::indeterminate(
                        CERTIFICATE_CHECK,
                        format!(
                            "Certificate {} is trusted for {:?}, but it is not used in this \
                             context. Validation continues as for an untrusted certificate.",
                            certificate.subject, available
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
                // Revocation was vouched for by the trust entry; only the
                // issuer still needs to be established.
                self.resolve_and_recurse(report, context, certificate, at, seen);
                return;
            }
            Ok(TrustLookup::TrustRevoked { since }) => {
                report.add(
                    ReportItem::invalid(
                        CERTIFICATE_CHECK,
                        format!(
                            "Trust for certificate {} was withdrawn on {since}.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
            }
            Ok(TrustLookup::NotTrusted) => {}
            Err(fault) => {
                log::debug!(
                    "trust lookup failed for {}: {fault}",
                    certificate.subject
                );
                report.add(
                    ReportItem::indeterminate(
                        CERTIFICATE_CHECK,
                        format!(
                            "Trust store retrieval failed for certificate {}.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone())
                    .with_cause(FaultKind::TrustStoreRetrieval),
                );
            }
        }

        self.check_required_extensions(report, &context, certificate);
        self.check_validity_period(report, certificate, at);

        let mut revocation_report = ValidationReport::new();
        RevocationDataValidator::new(self.components.clone()).validate(
            &mut revocation_report,
            context,
            certificate,
            at,
        );
        report.merge(&revocation_report);

        if !self.components.properties.continue_after_failure(&context)
            && report.count_of(ReportItemStatus::Invalid) > invalid_before
        {
            // Stop emitting new checks; the report keeps what it has.
            return;
        }

        self.resolve_and_recurse(report, context, certificate, at, seen);
    }

    fn resolve_and_recurse(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &Arc<Certificate>,
        at: OffsetDateTime,
        seen: &mut Vec<String>,
    ) {
        if certificate.is_self_signed() {
            // The root of the chain was reached.
            return;
        }

        match self.components.issuer_resolver.find_issuer(certificate) {
            Err(fault) => {
                log::debug!(
                    "issuer resolution failed for {}: {fault}",
                    certificate.subject
                );
                report.add(
                    ReportItem::indeterminate(
                        CERTIFICATE_CHECK,
                        format!(
                            "Retrieval of the issuer certificate failed for {}.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone())
                    .with_cause(FaultKind::IssuerRetrieval),
                );
            }
            Ok(None) => {
                report.add(
                    ReportItem::indeterminate(
                        CERTIFICATE_CHECK,
                        format!(
                            "Certificate {} isn't trusted and its issuer certificate is missing.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
            }
            Ok(Some(issuer)) => {
                self.validate_chain(
                    report,
                    context.with_certificate_source(CertificateSource::CertIssuer),
                    &issuer,
                    at,
                    seen,
                );
            }
        }
    }

    fn check_required_extensions(
        &self,
        report: &mut ValidationReport,
        context: &ValidationContext,
        certificate: &Arc<Certificate>,
    ) {
        let severity = self.components.properties.required_extension_severity(context);

        for required in self.components.properties.required_extensions(context) {
            match required {
                RequiredExtension::KeyUsage(needed) => {
                    let present = certificate.key_usage.unwrap_or_default();
                    if !present.contains(needed) {
                        report.add(
                            ReportItem::new(
                                EXTENSIONS_CHECK,
                                format!(
                                    "Certificate {} lacks the required key usage {:?}.",
                                    certificate.subject, needed
                                ),
                                severity,
                            )
                            .with_certificate(certificate.clone()),
                        );
                    }
                }
                RequiredExtension::ExtendedKeyUsage(oids) => {
                    let present = certificate.extended_key_usage.as_deref().unwrap_or(&[]);
                    for oid in &oids {
                        if !present.iter().any(|p| p == oid) {
                            report.add(
                                ReportItem::new(
                                    EXTENSIONS_CHECK,
                                    format!(
                                        "Certificate {} lacks the required extended key usage \
                                         {oid}.",
                                        certificate.subject
                                    ),
                                    severity,
                                )
                                .with_certificate(certificate.clone()),
                            );
                        }
                    }
                }
            }
        }
    }

    fn check_validity_period(
        &self,
        report: &mut ValidationReport,
        certificate: &Arc<Certificate>,
        at: OffsetDateTime,
    ) {
        if certificate.not_before > at {
            report.add(
                ReportItem::invalid(
                    VALIDITY_PERIOD_CHECK,
                    format!(
                        "Certificate {} is not yet valid: it becomes valid on {}.",
                        certificate.subject, certificate.not_before
                    ),
                )
                .with_certificate(certificate.clone())
                .with_cause(FaultKind::NotYetValid),
            );
        } else if certificate.not_after < at {
            report.add(
                ReportItem::invalid(
                    VALIDITY_PERIOD_CHECK,
                    format!(
                        "Certificate {} is expired: it was valid until {}.",
                        certificate.subject, certificate.not_after
                    ),
                )
                .with_certificate(certificate.clone())
                .with_cause(FaultKind::Expired),
            );
        }
    }
}
