// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Signature verification against rcgen-generated material.

use std::sync::Arc;

use cert_chain_validation::capabilities::SignatureVerifier as _;
use cert_chain_validation::model::{EvidenceSignature, KeyHandle};
use cert_chain_validation_x509::{decode_certificate, verify_signature, DerSignatureVerifier};
use x509_parser::prelude::*;

struct SignedLeaf {
    tbs: Vec<u8>,
    algorithm_oid: String,
    signature: Vec<u8>,
    ca_spki: Vec<u8>,
}

/// A CA-signed leaf, decomposed into the pieces signature checks need.
fn signed_leaf() -> SignedLeaf {
    let ca_key = rcgen::KeyPair::generate().unwrap();
    let mut ca_params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    ca_params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "Verify Root");
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let leaf_key = rcgen::KeyPair::generate().unwrap();
    let leaf_params = rcgen::CertificateParams::new(vec!["leaf.example".to_string()]).unwrap();
    let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

    let (_, parsed) = X509Certificate::from_der(leaf_cert.der()).unwrap();
    let ca_model = decode_certificate(ca_cert.der()).unwrap();
    let KeyHandle::Spki(ca_spki) = &ca_model.public_key else {
        panic!("decoded CA certificate carries no SPKI");
    };

    SignedLeaf {
        tbs: parsed.tbs_certificate.as_ref().to_vec(),
        algorithm_oid: parsed.signature_algorithm.algorithm.to_id_string(),
        signature: parsed.signature_value.data.to_vec(),
        ca_spki: ca_spki.as_ref().clone(),
    }
}

#[test]
fn a_genuine_ecdsa_signature_verifies() {
    let leaf = signed_leaf();
    // rcgen's default key pair signs with ecdsa-with-SHA256.
    assert_eq!(leaf.algorithm_oid, "1.2.840.10045.4.3.2");
    assert!(
        verify_signature(&leaf.ca_spki, &leaf.tbs, &leaf.algorithm_oid, &leaf.signature).unwrap()
    );
}

#[test]
fn tampered_data_fails_verification_cleanly() {
    let leaf = signed_leaf();
    let mut tampered = leaf.tbs.clone();
    tampered[20] ^= 0xFF;
    assert!(
        !verify_signature(&leaf.ca_spki, &tampered, &leaf.algorithm_oid, &leaf.signature).unwrap()
    );
}

#[test]
fn an_unsupported_algorithm_is_a_fault_not_a_mismatch() {
    let leaf = signed_leaf();
    let result = verify_signature(&leaf.ca_spki, &leaf.tbs, "1.2.3.4.5", &leaf.signature);
    assert!(result.is_err());
}

#[test]
fn the_verifier_capability_dispatches_on_the_signature_form() {
    let ca_key = rcgen::KeyPair::generate().unwrap();
    let mut ca_params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    ca_params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "Dispatch Root");
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();
    let ca_model = decode_certificate(ca_cert.der()).unwrap();

    let (_, parsed_ca) = X509Certificate::from_der(ca_cert.der()).unwrap();
    let evidence = EvidenceSignature::Der {
        signed_data: Arc::new(parsed_ca.tbs_certificate.as_ref().to_vec()),
        algorithm_oid: parsed_ca.signature_algorithm.algorithm.to_id_string(),
        signature: Arc::new(parsed_ca.signature_value.data.to_vec()),
    };

    let verifier = DerSignatureVerifier;
    // The self-signed CA's own signature verifies against its own key.
    assert!(verifier.verify(&evidence, &ca_model).unwrap());

    // A key binding is matched by handle equality.
    let binding = EvidenceSignature::KeyBinding(ca_model.public_key.clone());
    assert!(verifier.verify(&binding, &ca_model).unwrap());
    let foreign = EvidenceSignature::KeyBinding(KeyHandle::Id("key:someone-else".to_string()));
    assert!(!verifier.verify(&foreign, &ca_model).unwrap());
}
