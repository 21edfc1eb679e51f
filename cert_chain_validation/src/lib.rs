// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Certificate chain, trust, and revocation-evidence validation.
//!
//! Given a certificate, a [`ValidationContext`] and a date, the
//! [`CertificateChainValidator`] walks the issuance chain, consults the
//! configured trust store and policy, gathers and evaluates CRL/OCSP
//! evidence, and accumulates every outcome as a typed finding in a
//! [`ValidationReport`] with a tri-state aggregate result.
//!
//! External concerns (trust decisions, issuer lookup, evidence sources,
//! network clients, DER decoding, signature verification) are injected as
//! capability traits via [`ValidationComponents`]; see [`capabilities`].
//! No collaborator failure ever escapes a `validate` entry point: faults are
//! downgraded to indeterminate findings and the walk carries on per policy.

pub mod capabilities;
pub mod chain_validator;
pub mod context;
pub mod crl_validator;
pub mod error;
pub mod events;
pub mod model;
pub mod ocsp_validator;
pub mod properties;
pub mod report;
pub mod revocation_data_validator;
pub mod trust_store;

pub use flagset::FlagSet;

pub use capabilities::{CertificateRetriever, ValidationComponents};
pub use chain_validator::CertificateChainValidator;
pub use context::{
    CertificateSource, CertificateSources, TimeContext, TimeContexts, ValidationContext,
    ValidatorContext, ValidatorContexts,
};
pub use crl_validator::CrlValidator;
pub use error::{Fault, FaultKind};
pub use model::{Certificate, Crl, OcspResponse};
pub use ocsp_validator::OcspValidator;
pub use properties::{OnlineFetching, RequiredExtension, SignatureValidationProperties};
pub use report::{ReportItem, ReportItemStatus, ValidationReport, ValidationResult};
pub use revocation_data_validator::RevocationDataValidator;
pub use trust_store::{TrustLookup, TrustPurpose, TrustStore};
