// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Validation findings and their aggregation.
//!
//! Validators never raise errors towards callers; they append typed findings
//! to a [`ValidationReport`] and the report resolves to a tri-state result.
//! Sub-validations always build a fresh report of their own which the caller
//! merges by value, so finding order is deterministic and reproducible.

use std::sync::Arc;

use crate::error::FaultKind;
use crate::model::Certificate;

/// Severity of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportItemStatus {
    /// Informational, never a failure.
    Info,
    /// Evidence insufficient or a collaborator failed.
    Indeterminate,
    /// An affirmative violation.
    Invalid,
}

/// Aggregate outcome of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Indeterminate,
    Invalid,
}

/// One finding produced during validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportItem {
    /// Name of the check that produced this finding.
    pub check_name: String,
    /// Human-readable message, parameters already formatted in.
    pub message: String,
    pub status: ReportItemStatus,
    /// Certificate the finding is about, when one applies.
    pub certificate: Option<Arc<Certificate>>,
    /// Kind of the underlying collaborator fault, when one caused this finding.
    pub cause: Option<FaultKind>,
}

impl ReportItem {
    pub fn new(
        check_name: impl Into<String>,
        message: impl Into<String>,
        status: ReportItemStatus,
    ) -> Self {
        Self {
            check_name: check_name.into(),
            message: message.into(),
            status,
            certificate: None,
            cause: None,
        }
    }

    pub fn info(check_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(check_name, message, ReportItemStatus::Info)
    }

    pub fn indeterminate(check_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(check_name, message, ReportItemStatus::Indeterminate)
    }

    pub fn invalid(check_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(check_name, message, ReportItemStatus::Invalid)
    }

    pub fn with_certificate(mut self, certificate: Arc<Certificate>) -> Self {
        self.certificate = Some(certificate);
        self
    }

    pub fn with_cause(mut self, cause: FaultKind) -> Self {
        self.cause = Some(cause);
        self
    }
}

/// Append-only, mergeable log of findings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    items: Vec<ReportItem>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: ReportItem) {
        self.items.push(item);
    }

    /// All findings in insertion order.
    pub fn items(&self) -> &[ReportItem] {
        &self.items
    }

    /// Findings that are not merely informational.
    pub fn failures(&self) -> Vec<&ReportItem> {
        self.items
            .iter()
            .filter(|i| i.status != ReportItemStatus::Info)
            .collect()
    }

    pub fn count_of(&self, status: ReportItemStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }

    /// Aggregate result: any invalid finding wins, then any indeterminate one.
    pub fn result(&self) -> ValidationResult {
        let mut result = ValidationResult::Valid;
        for item in &self.items {
            match item.status {
                ReportItemStatus::Invalid => return ValidationResult::Invalid,
                ReportItemStatus::Indeterminate => result = ValidationResult::Indeterminate,
                ReportItemStatus::Info => {}
            }
        }
        result
    }

    /// Appends the other report's findings, preserving their relative order.
    /// The other report is left untouched.
    pub fn merge(&mut self, other: &ValidationReport) {
        self.items.extend(other.items.iter().cloned());
    }

    /// Appends the other report's findings downgraded to informational.
    ///
    /// Used for discarded (inconclusive) sub-validations: the audit trail is
    /// kept without affecting the aggregate result.
    pub fn merge_as_info(&mut self, other: &ValidationReport) {
        for item in &other.items {
            let mut item = item.clone();
            item.status = ReportItemStatus::Info;
            self.items.push(item);
        }
    }
}
