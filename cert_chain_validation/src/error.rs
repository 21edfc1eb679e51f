// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use thiserror::Error;

/// Classifies why a collaborator call failed.
///
/// Findings carry the kind only, never a live error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    NotYetValid,
    Expired,
    TrustStoreRetrieval,
    IssuerRetrieval,
    RevocationDataRetrieval,
    ClientFailure,
    ParseFailure,
    SignatureFailure,
    DepthExceeded,
    Unsupported,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::NotYetValid => "certificate not yet valid",
            FaultKind::Expired => "certificate expired",
            FaultKind::TrustStoreRetrieval => "trust store retrieval failed",
            FaultKind::IssuerRetrieval => "issuer retrieval failed",
            FaultKind::RevocationDataRetrieval => "revocation data retrieval failed",
            FaultKind::ClientFailure => "client failure",
            FaultKind::ParseFailure => "parse failure",
            FaultKind::SignatureFailure => "signature check failure",
            FaultKind::DepthExceeded => "validation depth exceeded",
            FaultKind::Unsupported => "unsupported operation",
        };
        f.write_str(name)
    }
}

/// Failure value returned by injected capabilities.
///
/// A fault never escapes a public `validate` entry point: every call site
/// downgrades it to an indeterminate finding carrying [`FaultKind`].
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ParseFailure, message)
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ClientFailure, message)
    }

    pub fn signature(message: impl Into<String>) -> Self {
        Self::new(FaultKind::SignatureFailure, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Unsupported, message)
    }
}
