// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! DER decoding into the engine's owned model.

use std::sync::Arc;

use cert_chain_validation::capabilities::EvidenceDecoder;
use cert_chain_validation::error::Fault;
use cert_chain_validation::model::{
    Certificate, Crl, CrlReason, EvidenceSignature, KeyHandle, KeyUsage, OcspResponse,
    RevokedEntry, SerialNumber,
};
use cert_chain_validation::FlagSet;
use sha1::{Digest as _, Sha1};
use x509_parser::prelude::*;

const OID_AIA_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";
const OID_AIA_OCSP: &str = "1.3.6.1.5.5.7.48.1";
const OID_OCSP_NO_CHECK: &str = "1.3.6.1.5.5.7.48.1.5";
const OID_NO_REV_AVAIL: &str = "2.5.29.56";
const OID_VALIDITY_ASSURED: &str = "0.4.0.194121.2.1";

fn thumbprint_sha1_hex(der: &[u8]) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(der);
    hex::encode_upper(sha1.finalize())
}

fn key_usage_flags(ku: &x509_parser::extensions::KeyUsage) -> FlagSet<KeyUsage> {
    let mut flags = FlagSet::default();
    if ku.digital_signature() {
        flags |= KeyUsage::DigitalSignature;
    }
    if ku.non_repudiation() {
        flags |= KeyUsage::NonRepudiation;
    }
    if ku.key_encipherment() {
        flags |= KeyUsage::KeyEncipherment;
    }
    if ku.data_encipherment() {
        flags |= KeyUsage::DataEncipherment;
    }
    if ku.key_agreement() {
        flags |= KeyUsage::KeyAgreement;
    }
    if ku.key_cert_sign() {
        flags |= KeyUsage::KeyCertSign;
    }
    if ku.crl_sign() {
        flags |= KeyUsage::CrlSign;
    }
    if ku.encipher_only() {
        flags |= KeyUsage::EncipherOnly;
    }
    if ku.decipher_only() {
        flags |= KeyUsage::DecipherOnly;
    }
    flags
}

fn eku_oids(eku: &x509_parser::extensions::ExtendedKeyUsage) -> Vec<String> {
    // x509-parser models common EKUs as booleans and keeps unknown OIDs in
    // `other`; emit OIDs so callers don't depend on enum shapes.
    let mut oids = Vec::new();
    if eku.any {
        oids.push("2.5.29.37.0".to_string());
    }
    if eku.server_auth {
        oids.push("1.3.6.1.5.5.7.3.1".to_string());
    }
    if eku.client_auth {
        oids.push("1.3.6.1.5.5.7.3.2".to_string());
    }
    if eku.code_signing {
        oids.push("1.3.6.1.5.5.7.3.3".to_string());
    }
    if eku.email_protection {
        oids.push("1.3.6.1.5.5.7.3.4".to_string());
    }
    if eku.time_stamping {
        oids.push("1.3.6.1.5.5.7.3.8".to_string());
    }
    if eku.ocsp_signing {
        oids.push("1.3.6.1.5.5.7.3.9".to_string());
    }
    for oid in eku.other.iter() {
        oids.push(oid.to_id_string());
    }
    oids
}

fn reason_from_index(index: u16) -> Option<CrlReason> {
    match index {
        0 => Some(CrlReason::Unspecified),
        1 => Some(CrlReason::KeyCompromise),
        2 => Some(CrlReason::CaCompromise),
        3 => Some(CrlReason::AffiliationChanged),
        4 => Some(CrlReason::Superseded),
        5 => Some(CrlReason::CessationOfOperation),
        6 => Some(CrlReason::CertificateHold),
        7 => Some(CrlReason::PrivilegeWithdrawn),
        8 => Some(CrlReason::AaCompromise),
        _ => None,
    }
}

/// Decodes a DER certificate into the engine model.
pub fn decode_certificate(der: &[u8]) -> Result<Certificate, Fault> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Fault::parse(format!("x509 parse failed: {e:?}")))?;

    let mut out = Certificate::new(
        cert.subject().to_string(),
        cert.issuer().to_string(),
        SerialNumber::new(cert.serial.to_bytes_be()),
        cert.validity().not_before.to_datetime(),
        cert.validity().not_after.to_datetime(),
        KeyHandle::Spki(Arc::new(cert.tbs_certificate.subject_pki.raw.to_vec())),
    );
    out.thumbprint_sha1_hex = Some(thumbprint_sha1_hex(der));
    out.raw_der = Some(Arc::new(der.to_vec()));

    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::KeyUsage(ku) => out.key_usage = Some(key_usage_flags(ku)),
            ParsedExtension::ExtendedKeyUsage(eku) => {
                out.extended_key_usage = Some(eku_oids(eku));
            }
            ParsedExtension::BasicConstraints(bc) => out.is_ca = bc.ca,
            ParsedExtension::AuthorityInfoAccess(aia) => {
                for descriptor in &aia.accessdescs {
                    let GeneralName::URI(uri) = &descriptor.access_location else {
                        continue;
                    };
                    match descriptor.access_method.to_id_string().as_str() {
                        OID_AIA_CA_ISSUERS => out.issuer_certificate_urls.push(uri.to_string()),
                        OID_AIA_OCSP => out.ocsp_responder_urls.push(uri.to_string()),
                        _ => {}
                    }
                }
            }
            ParsedExtension::CRLDistributionPoints(points) => {
                for point in &points.points {
                    if let Some(DistributionPointName::FullName(names)) = &point.distribution_point
                    {
                        for name in names {
                            if let GeneralName::URI(uri) = name {
                                out.crl_distribution_urls.push(uri.to_string());
                            }
                        }
                    }
                }
            }
            _ => {}
        }

        match ext.oid.to_id_string().as_str() {
            OID_OCSP_NO_CHECK => out.ocsp_no_check = true,
            OID_NO_REV_AVAIL => out.no_rev_avail = true,
            OID_VALIDITY_ASSURED => out.validity_assured = true,
            _ => {}
        }
    }

    Ok(out)
}

/// Decodes a DER certificate revocation list into the engine model.
pub fn decode_crl(der: &[u8]) -> Result<Crl, Fault> {
    let (_, crl) = CertificateRevocationList::from_der(der)
        .map_err(|e| Fault::parse(format!("CRL parse failed: {e:?}")))?;

    let mut revoked = Vec::new();
    for entry in crl.iter_revoked_certificates() {
        let mut reason = None;
        for ext in entry.extensions() {
            if let ParsedExtension::ReasonCode(code) = ext.parsed_extension() {
                reason = reason_from_index(u16::from(code.0));
            }
        }
        revoked.push(RevokedEntry {
            serial: SerialNumber::new(entry.user_certificate.to_bytes_be()),
            revocation_date: entry.revocation_date.to_datetime(),
            reason,
        });
    }

    let mut only_some_reasons = None;
    for ext in crl.extensions() {
        if let ParsedExtension::IssuingDistributionPoint(idp) = ext.parsed_extension() {
            if let Some(flags) = &idp.only_some_reasons {
                let mut reasons: FlagSet<CrlReason> = FlagSet::default();
                for index in 0..9u16 {
                    if flags.flags & (1 << index) != 0 {
                        if let Some(reason) = reason_from_index(index) {
                            reasons |= reason;
                        }
                    }
                }
                only_some_reasons = Some(reasons);
            }
        }
    }

    Ok(Crl {
        issuer: crl.issuer().to_string(),
        this_update: crl.last_update().to_datetime(),
        next_update: crl.next_update().map(|t| t.to_datetime()),
        revoked,
        only_some_reasons,
        signature: EvidenceSignature::Der {
            signed_data: Arc::new(crl.tbs_cert_list.as_ref().to_vec()),
            algorithm_oid: crl.signature_algorithm.algorithm.to_id_string(),
            signature: Arc::new(crl.signature_value.data.to_vec()),
        },
    })
}

/// [`EvidenceDecoder`] backed by `x509-parser`.
///
/// OCSP decoding is left to the embedding application; responses reach the
/// engine as already-parsed model values.
#[derive(Debug, Default)]
pub struct DerEvidenceDecoder;

impl EvidenceDecoder for DerEvidenceDecoder {
    fn decode_certificate(&self, der: &[u8]) -> Result<Certificate, Fault> {
        decode_certificate(der)
    }

    fn decode_crl(&self, der: &[u8]) -> Result<Crl, Fault> {
        decode_crl(der)
    }

    fn decode_ocsp(&self, _der: &[u8]) -> Result<OcspResponse, Fault> {
        Err(Fault::unsupported(
            "OCSP DER decoding is not provided by this adapter",
        ))
    }
}
