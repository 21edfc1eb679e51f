// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! X.509 adapter for the validation engine.
//!
//! Decodes DER certificates and CRLs into the engine's owned model and
//! implements the signature-verification capability with real cryptography
//! (RSA PKCS#1 v1.5 and ECDSA over P-256/P-384/P-521).
//!
//! OCSP responses are not decoded here: the engine consumes them as parsed
//! model values supplied by the embedding application's sources.

pub mod decode;
pub mod verify;

pub use decode::{decode_certificate, decode_crl, DerEvidenceDecoder};
pub use verify::{verify_signature, DerSignatureVerifier};
