// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Optional telemetry side channel.
//!
//! The engine reports at most one event per top-level chain validation; the
//! sink is never required for the validation logic itself.

use crate::report::ValidationResult;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationEvent {
    ChainValidated {
        /// Subject of the certificate the walk started from.
        subject: String,
        result: ValidationResult,
        /// Certificates visited, the starting one included.
        hops: usize,
    },
}

pub trait ValidationEventSink: Send + Sync {
    fn report(&self, event: &ValidationEvent);
}
