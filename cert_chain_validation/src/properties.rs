// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Policy resolution for validation behavior.
//!
//! Policies are registered against sets of validator contexts, certificate
//! sources, and time contexts. Registration applies the value to every
//! covered combination immediately, so a later registration overwrites any
//! earlier one for exactly the combinations it covers: last write wins per
//! combination, never per rule. Storage is a dense table indexed
//! arithmetically; no lookup depends on map iteration order.

use flagset::FlagSet;
use time::Duration;

use crate::context::{
    CertificateSource, CertificateSources, TimeContext, ValidationContext, ValidatorContext,
    ValidatorContexts, TimeContexts,
};
use crate::model::{eku_oid, KeyUsage};
use crate::report::ReportItemStatus;

/// When the revocation orchestrator may go to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlineFetching {
    NeverFetch,
    AlwaysFetch,
    FetchIfNoOtherDataAvailable,
}

/// An extension a certificate must carry to act in a given role.
#[derive(Debug, Clone, PartialEq)]
pub enum RequiredExtension {
    /// Every listed key-usage bit must be asserted.
    KeyUsage(FlagSet<KeyUsage>),
    /// Every listed extended-key-usage OID must be present.
    ExtendedKeyUsage(Vec<String>),
}

#[derive(Debug, Clone, Default)]
struct PropertyBag {
    freshness: Option<Duration>,
    online_fetching: Option<OnlineFetching>,
    continue_after_failure: Option<bool>,
    required_extensions: Option<Vec<RequiredExtension>>,
    required_extension_severity: Option<ReportItemStatus>,
}

const BAG_COUNT: usize = ValidatorContext::COUNT * CertificateSource::COUNT * TimeContext::COUNT;

fn bag_index(
    validator: ValidatorContext,
    source: CertificateSource,
    time: TimeContext,
) -> usize {
    (validator.index() * CertificateSource::COUNT + source.index()) * TimeContext::COUNT
        + time.index()
}

/// Rule table mapping `(validator, certificate source, time context)` to
/// policy values, with built-in defaults for unset combinations.
#[derive(Debug, Clone)]
pub struct SignatureValidationProperties {
    bags: Vec<PropertyBag>,
}

impl Default for SignatureValidationProperties {
    fn default() -> Self {
        Self {
            bags: vec![PropertyBag::default(); BAG_COUNT],
        }
    }
}

impl SignatureValidationProperties {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(
        &mut self,
        validators: ValidatorContexts,
        sources: CertificateSources,
        times: TimeContexts,
        mutate: impl Fn(&mut PropertyBag),
    ) {
        for validator in validators {
            for source in sources {
                for time in times {
                    mutate(&mut self.bags[bag_index(validator, source, time)]);
                }
            }
        }
    }

    fn bag(&self, context: &ValidationContext) -> &PropertyBag {
        &self.bags[bag_index(
            context.validator(),
            context.certificate_source(),
            context.time_context(),
        )]
    }

    pub fn set_freshness(
        &mut self,
        validators: ValidatorContexts,
        sources: CertificateSources,
        times: TimeContexts,
        freshness: Duration,
    ) -> &mut Self {
        self.apply(validators, sources, times, |bag| {
            bag.freshness = Some(freshness);
        });
        self
    }

    pub fn set_online_fetching(
        &mut self,
        validators: ValidatorContexts,
        sources: CertificateSources,
        times: TimeContexts,
        online_fetching: OnlineFetching,
    ) -> &mut Self {
        self.apply(validators, sources, times, |bag| {
            bag.online_fetching = Some(online_fetching);
        });
        self
    }

    pub fn set_continue_after_failure(
        &mut self,
        validators: ValidatorContexts,
        sources: CertificateSources,
        times: TimeContexts,
        continue_after_failure: bool,
    ) -> &mut Self {
        self.apply(validators, sources, times, |bag| {
            bag.continue_after_failure = Some(continue_after_failure);
        });
        self
    }

    pub fn set_required_extensions(
        &mut self,
        validators: ValidatorContexts,
        sources: CertificateSources,
        times: TimeContexts,
        required_extensions: Vec<RequiredExtension>,
    ) -> &mut Self {
        self.apply(validators, sources, times, |bag| {
            bag.required_extensions = Some(required_extensions.clone());
        });
        self
    }

    pub fn set_required_extension_severity(
        &mut self,
        validators: ValidatorContexts,
        sources: CertificateSources,
        times: TimeContexts,
        severity: ReportItemStatus,
    ) -> &mut Self {
        self.apply(validators, sources, times, |bag| {
            bag.required_extension_severity = Some(severity);
        });
        self
    }

    /// Maximum tolerated age of revocation evidence relative to the
    /// validation date. May be negative.
    pub fn freshness(&self, context: &ValidationContext) -> Duration {
        self.bag(context)
            .freshness
            .unwrap_or_else(|| default_freshness(context))
    }

    pub fn online_fetching(&self, context: &ValidationContext) -> OnlineFetching {
        self.bag(context)
            .online_fetching
            .unwrap_or(OnlineFetching::FetchIfNoOtherDataAvailable)
    }

    pub fn continue_after_failure(&self, context: &ValidationContext) -> bool {
        self.bag(context).continue_after_failure.unwrap_or(true)
    }

    pub fn required_extensions(&self, context: &ValidationContext) -> Vec<RequiredExtension> {
        match &self.bag(context).required_extensions {
            Some(extensions) => extensions.clone(),
            None => default_required_extensions(context.certificate_source()),
        }
    }

    pub fn required_extension_severity(&self, context: &ValidationContext) -> ReportItemStatus {
        self.bag(context)
            .required_extension_severity
            .unwrap_or(ReportItemStatus::Invalid)
    }
}

fn default_freshness(context: &ValidationContext) -> Duration {
    match context.time_context() {
        TimeContext::Historical => Duration::minutes(1),
        TimeContext::Present => match context.validator() {
            ValidatorContext::CrlValidator => Duration::days(30),
            _ => Duration::minutes(30),
        },
    }
}

fn default_required_extensions(source: CertificateSource) -> Vec<RequiredExtension> {
    match source {
        CertificateSource::SignerCert => {
            vec![RequiredExtension::KeyUsage(KeyUsage::NonRepudiation.into())]
        }
        CertificateSource::CertIssuer => {
            vec![RequiredExtension::KeyUsage(KeyUsage::KeyCertSign.into())]
        }
        CertificateSource::CrlIssuer => {
            vec![RequiredExtension::KeyUsage(KeyUsage::CrlSign.into())]
        }
        CertificateSource::OcspIssuer => vec![RequiredExtension::ExtendedKeyUsage(vec![
            eku_oid::OCSP_SIGNING.to_string(),
        ])],
        CertificateSource::Timestamp => vec![RequiredExtension::ExtendedKeyUsage(vec![
            eku_oid::TIME_STAMPING.to_string(),
        ])],
    }
}
