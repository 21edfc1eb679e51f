// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Evaluation of individual OCSP responses as revocation evidence.

use std::sync::Arc;

use cert_chain_validation::model::{
    eku_oid, EvidenceSignature, KeyHandle, KeyUsage, OcspResponse, SingleOcspResponse,
};
use cert_chain_validation::report::{ReportItemStatus, ValidationReport, ValidationResult};
use cert_chain_validation::trust_store::TrustStore;
use cert_chain_validation::OcspValidator;
use cert_chain_validation_test_utils::{
    components, days, minutes, signer_context, test_date, CertificateBuilder,
    OcspResponseBuilder, StaticIssuerResolver,
};

struct Scenario {
    validator: OcspValidator,
    leaf: Arc<cert_chain_validation::Certificate>,
    ca: Arc<cert_chain_validation::Certificate>,
}

fn scenario() -> Scenario {
    let ca = CertificateBuilder::new("CN=Root CA")
        .ca()
        .key_usage(KeyUsage::KeyCertSign)
        .build();
    let leaf = CertificateBuilder::new("CN=Signer")
        .issued_by(&ca)
        .key_usage(KeyUsage::NonRepudiation)
        .build();

    let mut trust = TrustStore::new();
    trust.add_trusted_certificate(ca.clone());
    let resolver = Arc::new(StaticIssuerResolver::with_certificates([ca.clone()]));
    let validator = OcspValidator::new(Arc::new(components(trust, resolver)));

    Scenario { validator, leaf, ca }
}

fn validate(
    scenario: &Scenario,
    response: &Arc<OcspResponse>,
) -> ValidationReport {
    let single: &SingleOcspResponse = &response.responses[0];
    let mut report = ValidationReport::new();
    scenario.validator.validate(
        &mut report,
        signer_context(),
        &scenario.leaf,
        single,
        response,
        test_date(),
        response.produced_at,
    );
    report
}

#[test]
fn a_good_status_from_the_ca_itself_is_valid_with_no_findings() {
    let s = scenario();
    let response = OcspResponseBuilder::for_certificate(&s.leaf, &s.ca).build();

    let report = validate(&s, &response);

    assert_eq!(report.result(), ValidationResult::Valid);
    assert!(report.items().is_empty());
}

#[test]
fn an_expired_next_update_yields_the_stale_notice_and_the_summary() {
    let s = scenario();
    let response = OcspResponseBuilder::for_certificate(&s.leaf, &s.ca)
        .produced_at(test_date() - days(10))
        .next_update(Some(test_date() - days(5)))
        .build();

    let report = validate(&s, &response);

    assert_eq!(report.result(), ValidationResult::Indeterminate);
    assert_eq!(report.items().len(), 2);
    assert!(report.items()[0].message.contains("no longer valid"));
    assert!(report.items()[1].message.contains("No usable OCSP response"));
    assert!(report
        .items()
        .iter()
        .all(|i| i.status == ReportItemStatus::Indeterminate));
}

#[test]
fn a_status_outside_the_freshness_window_is_unusable() {
    let s = scenario();
    // Present-time OCSP freshness defaults to 30 minutes.
    let response = OcspResponseBuilder::for_certificate(&s.leaf, &s.ca)
        .produced_at(test_date() - minutes(90))
        .next_update(Some(test_date() + days(1)))
        .build();

    let report = validate(&s, &response);

    assert_eq!(report.result(), ValidationResult::Indeterminate);
    assert!(report
        .failures()
        .iter()
        .any(|i| i.message.contains("freshness window")));
    assert!(report
        .failures()
        .iter()
        .any(|i| i.message.contains("No usable OCSP response")));
}

#[test]
fn a_serial_number_mismatch_is_indeterminate() {
    let s = scenario();
    let response = OcspResponseBuilder::for_certificate(&s.leaf, &s.ca)
        .serial(0xABCD)
        .build();

    let report = validate(&s, &response);

    assert_eq!(report.result(), ValidationResult::Indeterminate);
    assert_eq!(report.items().len(), 1);
    assert!(report.items()[0].message.contains("ABCD"));
}

#[test]
fn an_issuer_mismatch_is_indeterminate() {
    let s = scenario();
    let response = OcspResponseBuilder::for_certificate(&s.leaf, &s.ca)
        .issuer_name("CN=Somebody Else")
        .build();

    let report = validate(&s, &response);

    assert_eq!(report.result(), ValidationResult::Indeterminate);
    assert!(report.items()[0].message.contains("CN=Somebody Else"));
}

#[test]
fn revocation_before_the_validation_date_is_invalid() {
    let s = scenario();
    let response = OcspResponseBuilder::for_certificate(&s.leaf, &s.ca)
        .revoked_at(test_date() - days(2))
        .build();

    let report = validate(&s, &response);

    assert_eq!(report.result(), ValidationResult::Invalid);
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].message.contains("was revoked on"));
}

#[test]
fn revocation_after_the_validation_date_stays_valid_with_a_note() {
    let s = scenario();
    let response = OcspResponseBuilder::for_certificate(&s.leaf, &s.ca)
        .revoked_at(test_date() + days(2))
        .build();

    let report = validate(&s, &response);

    assert_eq!(report.result(), ValidationResult::Valid);
    assert!(report.failures().is_empty());
    assert!(report
        .items()
        .iter()
        .any(|i| i.message.contains("scheduled to be revoked")));
}

#[test]
fn an_unknown_status_is_indeterminate() {
    let s = scenario();
    let response = OcspResponseBuilder::for_certificate(&s.leaf, &s.ca)
        .unknown()
        .build();

    let report = validate(&s, &response);

    assert_eq!(report.result(), ValidationResult::Indeterminate);
    assert!(report
        .failures()
        .iter()
        .any(|i| i.message.contains("doesn't know")));
}

#[test]
fn a_response_signed_with_a_foreign_key_is_invalid() {
    let s = scenario();
    let response = OcspResponseBuilder::for_certificate(&s.leaf, &s.ca)
        .signed_with(EvidenceSignature::KeyBinding(KeyHandle::Id(
            "key:CN=Evil".to_string(),
        )))
        .build();

    let report = validate(&s, &response);

    assert_eq!(report.result(), ValidationResult::Invalid);
    assert!(report
        .failures()
        .iter()
        .any(|i| i.message.contains("not signed by the key")));
}

#[test]
fn a_delegated_responder_is_chain_validated_in_the_responder_role() {
    let s = scenario();
    let responder = CertificateBuilder::new("CN=OCSP Service")
        .issued_by(&s.ca)
        .extended_key_usage(&[eku_oid::OCSP_SIGNING])
        .ocsp_no_check()
        .build();
    let response = OcspResponseBuilder::for_certificate(&s.leaf, &s.ca)
        .signed_by(&responder)
        .build();

    let report = validate(&s, &response);

    assert_eq!(report.result(), ValidationResult::Valid);
    // The responder's own revocation check was satisfied by its no-check
    // marker, and its chain ended at the trusted root.
    assert!(report
        .items()
        .iter()
        .any(|i| i.message.contains("no-check marker")));
    assert!(report
        .items()
        .iter()
        .any(|i| i.message.contains("CN=Root CA") && i.message.contains("is trusted")));
}

#[test]
fn a_delegated_responder_without_the_signing_purpose_fails() {
    let s = scenario();
    let responder = CertificateBuilder::new("CN=OCSP Service")
        .issued_by(&s.ca)
        .ocsp_no_check()
        .build();
    let response = OcspResponseBuilder::for_certificate(&s.leaf, &s.ca)
        .signed_by(&responder)
        .build();

    let report = validate(&s, &response);

    assert_eq!(report.result(), ValidationResult::Invalid);
    assert!(report
        .failures()
        .iter()
        .any(|i| i.message.contains("extended key usage")));
}

#[test]
fn a_response_without_any_resolvable_responder_is_indeterminate() {
    let s = scenario();
    let ghost = CertificateBuilder::new("CN=Ghost Responder").build();
    let mut response = OcspResponseBuilder::for_certificate(&s.leaf, &s.ca)
        .signed_by(&ghost)
        .build();
    // Strip the embedded certificate so nothing can resolve the responder.
    Arc::get_mut(&mut response).unwrap().responder_certificates.clear();

    let report = validate(&s, &response);

    assert_eq!(report.result(), ValidationResult::Indeterminate);
    assert!(report
        .failures()
        .iter()
        .any(|i| i.message.contains("no responder certificate")));
}
