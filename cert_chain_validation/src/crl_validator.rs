// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Evaluation of one CRL against one certificate at one point in time.

use std::sync::Arc;

use flagset::FlagSet;
use time::OffsetDateTime;

use crate::capabilities::ValidationComponents;
use crate::chain_validator::CertificateChainValidator;
use crate::context::{CertificateSource, ValidationContext, ValidatorContext};
use crate::model::{Certificate, Crl, CrlReason};
use crate::report::{ReportItem, ValidationReport, ValidationResult};
use crate::trust_store::TrustPurpose;

pub const CRL_CHECK: &str = "CRL response check.";

/// Validates a single CRL as revocation evidence for a certificate.
pub struct CrlValidator {
    components: Arc<ValidationComponents>,
}

impl CrlValidator {
    pub fn new(components: Arc<ValidationComponents>) -> Self {
        Self { components }
    }

    /// Evaluates the CRL, writing findings into the report.
    ///
    /// `evidence_date` is when the evidence was produced; the CRL issuer's
    /// own chain is validated as of that date.
    pub fn validate(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &Arc<Certificate>,
        crl: &Arc<Crl>,
        at: OffsetDateTime,
        evidence_date: OffsetDateTime,
    ) {
        let mut checked_reasons = FlagSet::default();
        self.validate_scoped(
            report,
            context,
            certificate,
            crl,
            at,
            evidence_date,
            &mut checked_reasons,
        );
    }

    /// Like [`validate`](Self::validate), accumulating reason-flag coverage
    /// across several CRLs evaluated for the same certificate.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn validate_scoped(
        &self,
        report: &mut ValidationReport,
        context: ValidationContext,
        certificate: &Arc<Certificate>,
        crl: &Arc<Crl>,
        at: OffsetDateTime,
        evidence_date: OffsetDateTime,
        checked_reasons: &mut FlagSet<CrlReason>,
    ) {
        let context = context.with_validator(ValidatorContext::CrlValidator);

        // The CRL must come from an issuer the certificate's own chain leads
        // to; resolve it first.
        let issuer = match self.resolve_crl_issuer(certificate, crl) {
            Err(fault) => {
                report.add(
                    ReportItem::indeterminate(
                        CRL_CHECK,
                        format!(
                            "Resolution of the certificate issuing the CRL for {} failed.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone())
                    .with_cause(fault.kind),
                );
                return;
            }
            Ok(None) => {
                report.add(
                    ReportItem::indeterminate(
                        CRL_CHECK,
                        format!(
                            "The certificate issuing the CRL for {} couldn't be found.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
                return;
            }
            Ok(Some(issuer)) => issuer,
        };

        match self.shares_root(certificate, &issuer) {
            Err(fault) => {
                report.add(
                    ReportItem::indeterminate(
                        CRL_CHECK,
                        format!(
                            "The chain of the CRL issuer for {} couldn't be established.",
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
                    ReportItem::indeterminate(
                        CRL_CHECK,
                        format!(
                            "The CRL issuer for {} doesn't share a root with the certificate's \
                             own chain.",
                            certificate.subject
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
                return;
            }
            Ok(true) => {}
        }

        match self.components.verifier.verify(&crl.signature, &issuer) {
            Err(fault) => {
                report.add(
                    ReportItem::indeterminate(
                        CRL_CHECK,
                        format!(
                            "The CRL signature for {} couldn't be checked.",
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
                    ReportItem::indeterminate(
                        CRL_CHECK,
                        format!(
                            "The CRL for {} is not signed by the key of its issuer certificate \
                             {}.",
                            certificate.subject, issuer.subject
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
                return;
            }
            Ok(true) => {}
        }

        let mut issuer_report = ValidationReport::new();
        CertificateChainValidator::new(self.components.clone()).validate_subordinate(
            &mut issuer_report,
            context.with_certificate_source(CertificateSource::CrlIssuer),
            &issuer,
            evidence_date,
        );
        report.merge(&issuer_report);
        if issuer_report.result() != ValidationResult::Valid {
            return;
        }

        if let Some(next_update) = crl.next_update {
            if next_update < at {
                report.add(
                    ReportItem::indeterminate(
                        CRL_CHECK,
                        format!(
                            "The CRL's next update date ({next_update}) is before the validation \
                             date ({at})."
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
                return;
            }
        }

        let freshness = self.components.properties.freshness(&context);
        if crl.this_update < at - freshness {
            report.add(
                ReportItem::indeterminate(
                    CRL_CHECK,
                    format!(
                        "The CRL was issued on {}, outside the allowed freshness window of {} \
                         seconds before the validation date ({at}).",
                        crl.this_update,
                        freshness.whole_seconds()
                    ),
                )
                .with_certificate(certificate.clone()),
            );
            return;
        }

        match crl.only_some_reasons {
            Some(reasons) => {
                *checked_reasons |= reasons;
                if *checked_reasons != FlagSet::full() {
                    report.add(
                        ReportItem::info(
                            CRL_CHECK,
                            "Only part of the revocation reasons is covered by the CRLs checked \
                             so far.",
                        )
                        .with_certificate(certificate.clone()),
                    );
                }
            }
            None => *checked_reasons = FlagSet::full(),
        }

        if let Some(entry) = crl.find_revoked(&certificate.serial) {
            if entry.revocation_date <= at {
                report.add(
                    ReportItem::invalid(
                        CRL_CHECK,
                        format!(
                            "Certificate {} was revoked on {}.",
                            certificate.subject, entry.revocation_date
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
            } else {
                report.add(
                    ReportItem::info(
                        CRL_CHECK,
                        format!(
                            "Certificate {} is scheduled to be revoked on {}, after the \
                             validation date.",
                            certificate.subject, entry.revocation_date
                        ),
                    )
                    .with_certificate(certificate.clone()),
                );
            }
        }
    }

    /// The certificate that issued the CRL: the certificate's own issuer for
    /// the usual case, otherwise a known or trusted certificate whose
    /// subject matches the CRL issuer name (indirect CRLs).
    fn resolve_crl_issuer(
        &self,
        certificate: &Certificate,
        crl: &Crl,
    ) -> Result<Option<Arc<Certificate>>, crate::error::Fault> {
        if crl.issuer == certificate.issuer {
            return self.components.issuer_resolver.find_issuer(certificate);
        }

        let known = self.components.issuer_resolver.known_certificates()?;
        if let Some(candidate) = known.into_iter().find(|c| c.subject == crl.issuer) {
            return Ok(Some(candidate));
        }

        let trusted = self
            .components
            .issuer_resolver
            .trusted_certificates(TrustPurpose::CrlIssuer)?;
        Ok(trusted.into_iter().find(|c| c.subject == crl.issuer))
    }

    fn shares_root(
        &self,
        certificate: &Arc<Certificate>,
        crl_issuer: &Arc<Certificate>,
    ) -> Result<bool, crate::error::Fault> {
        if crl_issuer.subject == certificate.issuer {
            return Ok(true);
        }
        let certificate_root = self.root_of(certificate)?;
        let crl_issuer_root = self.root_of(crl_issuer)?;
        Ok(certificate_root.fingerprint() == crl_issuer_root.fingerprint())
    }

    fn root_of(
        &self,
        certificate: &Arc<Certificate>,
    ) -> Result<Arc<Certificate>, crate::error::Fault> {
        let mut current = certificate.clone();
        let mut hops = 0usize;
        while !current.is_self_signed() && hops < crate::context::DEFAULT_MAX_CHAIN_HOPS {
            match self.components.issuer_resolver.find_issuer(&current)? {
                Some(issuer) => {
                    current = issuer;
                    hops += 1;
                }
                None => break,
            }
        }
        Ok(current)
    }
}
