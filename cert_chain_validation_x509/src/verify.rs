// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Signature verification over decoded evidence.
//!
//! Dispatches on the signature-algorithm OID. A structurally broken key or
//! signature is a fault; a well-formed signature that doesn't verify is a
//! clean `false`.

use cert_chain_validation::capabilities::SignatureVerifier;
use cert_chain_validation::error::Fault;
use cert_chain_validation::model::{Certificate, EvidenceSignature, KeyHandle};

use p256::elliptic_curve::sec1::ToEncodedPoint as _;
use rsa::pkcs1v15;
use rsa::pkcs8::DecodePublicKey as _;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha384, Sha512};
use signature::Verifier as _;

fn rsa_public_key_from_spki(spki_der: &[u8]) -> Result<RsaPublicKey, Fault> {
    RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| Fault::signature(format!("bad RSA public key: {e}")))
}

/// Verifies `signature` over `signed_data` with the key in `signer_spki_der`.
pub fn verify_signature(
    signer_spki_der: &[u8],
    signed_data: &[u8],
    algorithm_oid: &str,
    signature: &[u8],
) -> Result<bool, Fault> {
    match algorithm_oid {
        // sha256/sha384/sha512 WithRSAEncryption
        "1.2.840.113549.1.1.11" => {
            let key = rsa_public_key_from_spki(signer_spki_der)?;
            let vk = pkcs1v15::VerifyingKey::<Sha256>::new(key);
            let sig = pkcs1v15::Signature::try_from(signature)
                .map_err(|e| Fault::signature(format!("bad RSA signature bytes: {e}")))?;
            Ok(vk.verify(signed_data, &sig).is_ok())
        }
        "1.2.840.113549.1.1.12" => {
            let key = rsa_public_key_from_spki(signer_spki_der)?;
            let vk = pkcs1v15::VerifyingKey::<Sha384>::new(key);
            let sig = pkcs1v15::Signature::try_from(signature)
                .map_err(|e| Fault::signature(format!("bad RSA signature bytes: {e}")))?;
            Ok(vk.verify(signed_data, &sig).is_ok())
        }
        "1.2.840.113549.1.1.13" => {
            let key = rsa_public_key_from_spki(signer_spki_der)?;
            let vk = pkcs1v15::VerifyingKey::<Sha512>::new(key);
            let sig = pkcs1v15::Signature::try_from(signature)
                .map_err(|e| Fault::signature(format!("bad RSA signature bytes: {e}")))?;
            Ok(vk.verify(signed_data, &sig).is_ok())
        }

        // ecdsa-with-SHA256 / SHA384 / SHA512
        "1.2.840.10045.4.3.2" => {
            let pk = p256::PublicKey::from_public_key_der(signer_spki_der)
                .map_err(|e| Fault::signature(format!("bad P-256 public key: {e}")))?;
            let ep = pk.to_encoded_point(false);
            let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(ep.as_bytes())
                .map_err(|e| Fault::signature(format!("bad P-256 public key: {e}")))?;
            let sig = p256::ecdsa::Signature::from_der(signature)
                .map_err(|e| Fault::signature(format!("bad ECDSA signature bytes: {e}")))?;
            Ok(vk.verify(signed_data, &sig).is_ok())
        }
        "1.2.840.10045.4.3.3" => {
            let pk = p384::PublicKey::from_public_key_der(signer_spki_der)
                .map_err(|e| Fault::signature(format!("bad P-384 public key: {e}")))?;
            let ep = pk.to_encoded_point(false);
            let vk = p384::ecdsa::VerifyingKey::from_sec1_bytes(ep.as_bytes())
                .map_err(|e| Fault::signature(format!("bad P-384 public key: {e}")))?;
            let sig = p384::ecdsa::Signature::from_der(signature)
                .map_err(|e| Fault::signature(format!("bad ECDSA signature bytes: {e}")))?;
            Ok(vk.verify(signed_data, &sig).is_ok())
        }
        "1.2.840.10045.4.3.4" => {
            let pk = p521::PublicKey::from_public_key_der(signer_spki_der)
                .map_err(|e| Fault::signature(format!("bad P-521 public key: {e}")))?;
            let ep = pk.to_encoded_point(false);
            let vk = p521::ecdsa::VerifyingKey::from_sec1_bytes(ep.as_bytes())
                .map_err(|e| Fault::signature(format!("bad P-521 public key: {e}")))?;
            let sig = p521::ecdsa::Signature::from_der(signature)
                .map_err(|e| Fault::signature(format!("bad ECDSA signature bytes: {e}")))?;
            Ok(vk.verify(signed_data, &sig).is_ok())
        }

        _ => Err(Fault::unsupported(format!(
            "unsupported signature algorithm OID: {algorithm_oid}"
        ))),
    }
}

/// [`SignatureVerifier`] for DER-backed evidence; key bindings still verify
/// by key-handle equality so mixed deployments keep working.
#[derive(Debug, Default)]
pub struct DerSignatureVerifier;

impl SignatureVerifier for DerSignatureVerifier {
    fn verify(&self, signature: &EvidenceSignature, signer: &Certificate) -> Result<bool, Fault> {
        match signature {
            EvidenceSignature::KeyBinding(key) => Ok(*key == signer.public_key),
            EvidenceSignature::Der {
                signed_data,
                algorithm_oid,
                signature,
            } => {
                let KeyHandle::Spki(spki) = &signer.public_key else {
                    return Err(Fault::unsupported(
                        "the signer certificate carries no DER public key",
                    ));
                };
                verify_signature(spki, signed_data, algorithm_oid, signature)
            }
        }
    }
}
