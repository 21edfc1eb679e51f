// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end chain walks over model certificates.

use std::sync::Arc;

use cert_chain_validation::context::{CertificateSources, TimeContexts, ValidatorContexts};
use cert_chain_validation::error::FaultKind;
use cert_chain_validation::events::ValidationEvent;
use cert_chain_validation::model::KeyUsage;
use cert_chain_validation::report::{ReportItemStatus, ValidationReport, ValidationResult};
use cert_chain_validation::trust_store::{ServiceStatus, StatusChange, TrustPurpose, TrustStore};
use cert_chain_validation::{
    CertificateChainValidator, SignatureValidationProperties, ValidationComponents,
};
use cert_chain_validation_test_utils::{
    components, days, signer_context, test_date, CertificateBuilder, CrlBuilder,
    FailingIssuerResolver, FailingTrustProvider, RecordingEventSink, StaticCrlSource,
    StaticIssuerResolver, StaticOcspSource,
};

#[test]
fn directly_trusted_certificate_short_circuits_without_revocation_checks() {
    let certificate = CertificateBuilder::new("CN=Signer").build();
    let mut trust = TrustStore::new();
    trust.add_trusted_certificate(certificate.clone());

    let crl_source = Arc::new(StaticCrlSource::default());
    let ocsp_source = Arc::new(StaticOcspSource::default());
    let resolver = Arc::new(StaticIssuerResolver::new());
    let comps = Arc::new(
        components(trust, resolver.clone())
            .with_crl_source(crl_source.clone())
            .with_ocsp_source(ocsp_source.clone()),
    );

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(
        &mut report,
        signer_context(),
        &certificate,
        test_date(),
    );

    assert_eq!(report.result(), ValidationResult::Valid);
    assert_eq!(report.items().len(), 1);
    assert_eq!(report.items()[0].status, ReportItemStatus::Info);
    assert!(report.items()[0].message.contains("is trusted"));
    assert_eq!(crl_source.calls(), 0);
    assert_eq!(ocsp_source.calls(), 0);
    assert_eq!(resolver.find_issuer_calls(), 0);
}

#[test]
fn trusted_for_other_purpose_logs_once_and_walks_on_to_the_issuer() {
    let ca = CertificateBuilder::new("CN=Root")
        .ca()
        .key_usage(KeyUsage::KeyCertSign)
        .build();
    let certificate = CertificateBuilder::new("CN=Signer")
        .issued_by(&ca)
        .key_usage(KeyUsage::NonRepudiation)
        .build();

    let mut trust = TrustStore::new();
    trust.add_timestamping_certificate(certificate.clone());

    let resolver = Arc::new(StaticIssuerResolver::with_certificates([ca.clone()]));
    let comps = Arc::new(components(trust, resolver.clone()));

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(
        &mut report,
        signer_context(),
        &certificate,
        test_date(),
    );

    assert_eq!(report.result(), ValidationResult::Indeterminate);
    let other_purpose: Vec<_> = report
        .items()
        .iter()
        .filter(|i| i.message.contains("not used in this context"))
        .collect();
    assert_eq!(other_purpose.len(), 1);
    assert_eq!(other_purpose[0].status, ReportItemStatus::Indeterminate);
    // The walk still resolved and visited the issuer.
    assert_eq!(resolver.find_issuer_calls(), 1);
}

#[test]
fn expired_certificate_is_invalid_with_the_expiry_cause() {
    let ca = CertificateBuilder::new("CN=Root").ca().build();
    let certificate = CertificateBuilder::new("CN=Signer")
        .issued_by(&ca)
        .key_usage(KeyUsage::NonRepudiation)
        .valid_until(test_date() - days(1))
        .validity_assured()
        .build();

    let mut trust = TrustStore::new();
    trust.add_trusted_certificate(ca.clone());
    let resolver = Arc::new(StaticIssuerResolver::with_certificates([ca]));
    let comps = Arc::new(components(trust, resolver));

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(
        &mut report,
        signer_context(),
        &certificate,
        test_date(),
    );

    assert_eq!(report.result(), ValidationResult::Invalid);
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].cause, Some(FaultKind::Expired));
}

#[test]
fn not_yet_valid_certificate_is_invalid_with_the_matching_cause() {
    let ca = CertificateBuilder::new("CN=Root").ca().build();
    let certificate = CertificateBuilder::new("CN=Signer")
        .issued_by(&ca)
        .key_usage(KeyUsage::NonRepudiation)
        .valid_from(test_date() + days(1))
        .validity_assured()
        .build();

    let mut trust = TrustStore::new();
    trust.add_trusted_certificate(ca.clone());
    let resolver = Arc::new(StaticIssuerResolver::with_certificates([ca]));
    let comps = Arc::new(components(trust, resolver));

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(
        &mut report,
        signer_context(),
        &certificate,
        test_date(),
    );

    assert_eq!(report.result(), ValidationResult::Invalid);
    assert_eq!(report.failures()[0].cause, Some(FaultKind::NotYetValid));
}

#[test]
fn missing_issuer_ends_the_walk_indeterminate() {
    let ca = CertificateBuilder::new("CN=Root").ca().build();
    let certificate = CertificateBuilder::new("CN=Signer")
        .issued_by(&ca)
        .key_usage(KeyUsage::NonRepudiation)
        .validity_assured()
        .build();

    let resolver = Arc::new(StaticIssuerResolver::new());
    let comps = Arc::new(components(TrustStore::new(), resolver));

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(
        &mut report,
        signer_context(),
        &certificate,
        test_date(),
    );

    assert_eq!(report.result(), ValidationResult::Indeterminate);
    assert!(report
        .items()
        .iter()
        .any(|i| i.message.contains("issuer certificate is missing")));
}

#[test]
fn trust_store_failure_is_downgraded_and_the_walk_continues() {
    let certificate = CertificateBuilder::new("CN=Signer")
        .key_usage(KeyUsage::NonRepudiation)
        .build();

    let comps = Arc::new(ValidationComponents::new(
        Arc::new(FailingTrustProvider),
        Arc::new(StaticIssuerResolver::new()),
    ));

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(
        &mut report,
        signer_context(),
        &certificate,
        test_date(),
    );

    assert_eq!(report.result(), ValidationResult::Indeterminate);
    assert!(report
        .items()
        .iter()
        .any(|i| i.cause == Some(FaultKind::TrustStoreRetrieval)));
    // Later checks still ran: the self-signed revocation fast path reported.
    assert!(report
        .items()
        .iter()
        .any(|i| i.message.contains("self-signed")));
}

#[test]
fn issuer_resolver_failure_is_downgraded() {
    let ca = CertificateBuilder::new("CN=Root").ca().build();
    let certificate = CertificateBuilder::new("CN=Signer")
        .issued_by(&ca)
        .key_usage(KeyUsage::NonRepudiation)
        .validity_assured()
        .build();

    let comps = Arc::new(components(TrustStore::new(), Arc::new(FailingIssuerResolver)));

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(
        &mut report,
        signer_context(),
        &certificate,
        test_date(),
    );

    assert_eq!(report.result(), ValidationResult::Indeterminate);
    assert!(report
        .items()
        .iter()
        .any(|i| i.cause == Some(FaultKind::IssuerRetrieval)));
}

#[test]
fn an_issuance_cycle_fails_closed() {
    let b_stub = CertificateBuilder::new("CN=B").build();
    let a = CertificateBuilder::new("CN=A")
        .issued_by(&b_stub)
        .key_usage(KeyUsage::NonRepudiation)
        .validity_assured()
        .build();
    let b = CertificateBuilder::new("CN=B")
        .issued_by(&a)
        .ca()
        .key_usage(KeyUsage::KeyCertSign)
        .validity_assured()
        .build();

    let resolver = Arc::new(StaticIssuerResolver::with_certificates([a.clone(), b.clone()]));
    let comps = Arc::new(components(TrustStore::new(), resolver));

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(&mut report, signer_context(), &a, test_date());

    assert_eq!(report.result(), ValidationResult::Indeterminate);
    assert!(report
        .items()
        .iter()
        .any(|i| i.cause == Some(FaultKind::DepthExceeded)));
}

#[test]
fn stop_on_failure_halts_issuer_resolution_at_the_failing_hop() {
    let root = CertificateBuilder::new("CN=Root").build();
    let intermediate = CertificateBuilder::new("CN=Intermediate")
        .issued_by(&root)
        .ca()
        .key_usage(KeyUsage::KeyCertSign)
        .valid_until(test_date() - days(1))
        .validity_assured()
        .build();
    let leaf = CertificateBuilder::new("CN=Signer")
        .issued_by(&intermediate)
        .key_usage(KeyUsage::NonRepudiation)
        .validity_assured()
        .build();

    let mut trust = TrustStore::new();
    trust.add_trusted_certificate(root.clone());

    let mut properties = SignatureValidationProperties::default();
    properties.set_continue_after_failure(
        ValidatorContexts::full(),
        CertificateSources::full(),
        TimeContexts::full(),
        false,
    );

    let resolver = Arc::new(StaticIssuerResolver::with_certificates([
        root.clone(),
        intermediate.clone(),
    ]));
    let comps = Arc::new(components(trust, resolver.clone()).with_properties(properties));

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(&mut report, signer_context(), &leaf, test_date());

    assert_eq!(report.result(), ValidationResult::Invalid);
    // One lookup to reach the failing intermediate, none past it.
    assert_eq!(resolver.find_issuer_calls(), 1);
}

#[test]
fn with_continue_after_failure_the_walk_reaches_the_root() {
    let root = CertificateBuilder::new("CN=Root").build();
    let intermediate = CertificateBuilder::new("CN=Intermediate")
        .issued_by(&root)
        .ca()
        .key_usage(KeyUsage::KeyCertSign)
        .valid_until(test_date() - days(1))
        .validity_assured()
        .build();
    let leaf = CertificateBuilder::new("CN=Signer")
        .issued_by(&intermediate)
        .key_usage(KeyUsage::NonRepudiation)
        .validity_assured()
        .build();

    let mut trust = TrustStore::new();
    trust.add_trusted_certificate(root.clone());

    let resolver = Arc::new(StaticIssuerResolver::with_certificates([
        root.clone(),
        intermediate.clone(),
    ]));
    let comps = Arc::new(components(trust, resolver.clone()));

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(&mut report, signer_context(), &leaf, test_date());

    assert_eq!(report.result(), ValidationResult::Invalid);
    assert_eq!(resolver.find_issuer_calls(), 2);
    assert!(report
        .items()
        .iter()
        .any(|i| i.message.contains("CN=Root") && i.message.contains("is trusted")));
}

#[test]
fn cleared_required_extensions_validate_a_chain_with_an_untrusted_root() {
    let root = CertificateBuilder::new("CN=Plain Root").validity_assured().build();
    let leaf = CertificateBuilder::new("CN=Plain Signer")
        .issued_by(&root)
        .validity_assured()
        .build();

    let resolver = Arc::new(StaticIssuerResolver::with_certificates([root.clone()]));

    let mut properties = SignatureValidationProperties::default();
    properties.set_required_extensions(
        ValidatorContexts::full(),
        CertificateSources::full(),
        TimeContexts::full(),
        Vec::new(),
    );
    let comps = Arc::new(components(TrustStore::new(), resolver.clone()).with_properties(properties));

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(&mut report, signer_context(), &leaf, test_date());
    assert_eq!(report.result(), ValidationResult::Valid);

    // With the default extension policy the same chain fails the key-usage
    // requirement on the signer certificate.
    let comps = Arc::new(components(
        TrustStore::new(),
        Arc::new(StaticIssuerResolver::with_certificates([root])),
    ));
    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(&mut report, signer_context(), &leaf, test_date());
    assert_eq!(report.result(), ValidationResult::Invalid);
}

#[test]
fn required_extension_severity_is_policy_configurable() {
    let ca = CertificateBuilder::new("CN=Root").ca().build();
    let leaf = CertificateBuilder::new("CN=Signer")
        .issued_by(&ca)
        .validity_assured()
        .build();

    let mut trust = TrustStore::new();
    trust.add_trusted_certificate(ca.clone());

    let mut properties = SignatureValidationProperties::default();
    properties.set_required_extension_severity(
        ValidatorContexts::full(),
        CertificateSources::full(),
        TimeContexts::full(),
        ReportItemStatus::Indeterminate,
    );
    let comps = Arc::new(
        components(trust, Arc::new(StaticIssuerResolver::with_certificates([ca])))
            .with_properties(properties),
    );

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(&mut report, signer_context(), &leaf, test_date());

    assert_eq!(report.result(), ValidationResult::Indeterminate);
}

#[test]
fn withdrawn_trust_is_an_explicit_invalid_finding() {
    let certificate = CertificateBuilder::new("CN=Listed Signer")
        .key_usage(KeyUsage::NonRepudiation)
        .build();

    let mut trust = TrustStore::new();
    trust.add_service_entry(
        certificate.clone(),
        TrustPurpose::General.into(),
        vec![
            StatusChange {
                at: test_date() - days(30),
                status: ServiceStatus::Granted,
            },
            StatusChange {
                at: test_date() - days(2),
                status: ServiceStatus::Withdrawn,
            },
        ],
    );
    let comps = Arc::new(components(trust, Arc::new(StaticIssuerResolver::new())));

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(
        &mut report,
        signer_context(),
        &certificate,
        test_date(),
    );

    assert_eq!(report.result(), ValidationResult::Invalid);
    assert!(report
        .items()
        .iter()
        .any(|i| i.status == ReportItemStatus::Invalid && i.message.contains("withdrawn")));
}

#[test]
fn repeated_validation_produces_identical_reports() {
    let ca = CertificateBuilder::new("CN=Root")
        .ca()
        .key_usage(KeyUsage::KeyCertSign | KeyUsage::CrlSign)
        .build();
    let leaf = CertificateBuilder::new("CN=Signer")
        .issued_by(&ca)
        .key_usage(KeyUsage::NonRepudiation)
        .build();

    let crl = CrlBuilder::issued_by(&ca)
        .this_update(test_date() - days(5))
        .next_update(Some(test_date() + days(5)))
        .build();

    let mut trust = TrustStore::new();
    trust.add_trusted_certificate(ca.clone());
    let resolver = Arc::new(StaticIssuerResolver::with_certificates([ca]));
    let comps = Arc::new(
        components(trust, resolver).with_crl_source(Arc::new(StaticCrlSource::with_crl(crl))),
    );
    let validator = CertificateChainValidator::new(comps);

    let mut first = ValidationReport::new();
    validator.validate(&mut first, signer_context(), &leaf, test_date());
    let mut second = ValidationReport::new();
    validator.validate(&mut second, signer_context(), &leaf, test_date());

    assert_eq!(first, second);
    assert_eq!(format!("{first:?}"), format!("{second:?}"));
    assert_eq!(first.result(), ValidationResult::Valid);
    assert!(first.failures().is_empty());
}

#[test]
fn the_event_sink_sees_one_event_per_top_level_validation() {
    let ca = CertificateBuilder::new("CN=Root").ca().build();
    let leaf = CertificateBuilder::new("CN=Signer")
        .issued_by(&ca)
        .key_usage(KeyUsage::NonRepudiation)
        .validity_assured()
        .build();

    let mut trust = TrustStore::new();
    trust.add_trusted_certificate(ca.clone());
    let sink = Arc::new(RecordingEventSink::default());
    let comps = Arc::new(
        components(trust, Arc::new(StaticIssuerResolver::with_certificates([ca])))
            .with_event_sink(sink.clone()),
    );

    let mut report = ValidationReport::new();
    CertificateChainValidator::new(comps).validate(&mut report, signer_context(), &leaf, test_date());

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0],
        ValidationEvent::ChainValidated {
            subject: "CN=Signer".to_string(),
            result: ValidationResult::Valid,
            hops: 2,
        }
    );
}
