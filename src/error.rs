//! Error types used by the mediation engine and its collaborators.
//!
//! This module defines:
//!
//! - [`ErrorCode`]: stable numeric codes grouped by phase (initialization, prebid,
//!   load, show, invalidate, other).
//! - [`MediationError`]: the typed error every operation reports to its caller.
//! - [`PartnerError`]: the raw error a partner adapter hands back.
//! - [`DispatchError`]: failures of the execution contexts themselves.
//! - [`BuildError`]: failures while wiring a [`Mediation`](crate::Mediation) container.
//!
//! All types provide `as_label` for logs/metrics.

use std::fmt;

use thiserror::Error;

use crate::dispatch::Context;

/// Stable mediation error codes.
///
/// Codes are grouped by hundreds:
/// - `1xx` initialization
/// - `2xx` prebid (bidder token collection)
/// - `3xx` load
/// - `4xx` show
/// - `5xx` invalidate
/// - `6xx` other
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InitializationFailureUnknown,
    InitializationFailureTimeout,
    InitializationSkipped,

    PrebidFailureUnknown,
    PrebidFailureTimeout,

    LoadFailureUnknown,
    LoadFailureAborted,
    LoadFailureMismatchedAdFormat,
    LoadFailurePartnerNotInitialized,
    LoadFailureRateLimited,
    LoadFailureTimeout,
    LoadFailureInvalidBannerSize,
    LoadFailureNoBannerView,
    LoadFailureMediationNotInitialized,
    LoadFailureWaterfallExhaustedNoFill,
    LoadFailureAdTooLarge,

    ShowFailureUnknown,
    ShowFailureAdNotReady,
    ShowFailureTimeout,
    ShowFailureWrongResourceType,

    InvalidateFailureUnknown,

    Unknown,
    PartnerError,
    Internal,
}

impl ErrorCode {
    /// Numeric value reported to metrics.
    pub fn code(self) -> u16 {
        match self {
            ErrorCode::InitializationFailureUnknown => 100,
            ErrorCode::InitializationFailureTimeout => 108,
            ErrorCode::InitializationSkipped => 109,
            ErrorCode::PrebidFailureUnknown => 200,
            ErrorCode::PrebidFailureTimeout => 205,
            ErrorCode::LoadFailureUnknown => 300,
            ErrorCode::LoadFailureAborted => 301,
            ErrorCode::LoadFailureMismatchedAdFormat => 311,
            ErrorCode::LoadFailurePartnerNotInitialized => 314,
            ErrorCode::LoadFailureRateLimited => 317,
            ErrorCode::LoadFailureTimeout => 319,
            ErrorCode::LoadFailureInvalidBannerSize => 325,
            ErrorCode::LoadFailureNoBannerView => 329,
            ErrorCode::LoadFailureMediationNotInitialized => 331,
            ErrorCode::LoadFailureWaterfallExhaustedNoFill => 335,
            ErrorCode::LoadFailureAdTooLarge => 336,
            ErrorCode::ShowFailureUnknown => 400,
            ErrorCode::ShowFailureAdNotReady => 405,
            ErrorCode::ShowFailureTimeout => 415,
            ErrorCode::ShowFailureWrongResourceType => 419,
            ErrorCode::InvalidateFailureUnknown => 500,
            ErrorCode::Unknown => 600,
            ErrorCode::PartnerError => 601,
            ErrorCode::Internal => 602,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use adflow::ErrorCode;
    ///
    /// assert_eq!(ErrorCode::LoadFailureTimeout.as_label(), "load_failure_timeout");
    /// assert_eq!(ErrorCode::LoadFailureTimeout.code(), 319);
    /// ```
    pub fn as_label(self) -> &'static str {
        match self {
            ErrorCode::InitializationFailureUnknown => "initialization_failure_unknown",
            ErrorCode::InitializationFailureTimeout => "initialization_failure_timeout",
            ErrorCode::InitializationSkipped => "initialization_skipped",
            ErrorCode::PrebidFailureUnknown => "prebid_failure_unknown",
            ErrorCode::PrebidFailureTimeout => "prebid_failure_timeout",
            ErrorCode::LoadFailureUnknown => "load_failure_unknown",
            ErrorCode::LoadFailureAborted => "load_failure_aborted",
            ErrorCode::LoadFailureMismatchedAdFormat => "load_failure_mismatched_ad_format",
            ErrorCode::LoadFailurePartnerNotInitialized => "load_failure_partner_not_initialized",
            ErrorCode::LoadFailureRateLimited => "load_failure_rate_limited",
            ErrorCode::LoadFailureTimeout => "load_failure_timeout",
            ErrorCode::LoadFailureInvalidBannerSize => "load_failure_invalid_banner_size",
            ErrorCode::LoadFailureNoBannerView => "load_failure_no_banner_view",
            ErrorCode::LoadFailureMediationNotInitialized => {
                "load_failure_mediation_not_initialized"
            }
            ErrorCode::LoadFailureWaterfallExhaustedNoFill => {
                "load_failure_waterfall_exhausted_no_fill"
            }
            ErrorCode::LoadFailureAdTooLarge => "load_failure_ad_too_large",
            ErrorCode::ShowFailureUnknown => "show_failure_unknown",
            ErrorCode::ShowFailureAdNotReady => "show_failure_ad_not_ready",
            ErrorCode::ShowFailureTimeout => "show_failure_timeout",
            ErrorCode::ShowFailureWrongResourceType => "show_failure_wrong_resource_type",
            ErrorCode::InvalidateFailureUnknown => "invalidate_failure_unknown",
            ErrorCode::Unknown => "unknown",
            ErrorCode::PartnerError => "partner_error",
            ErrorCode::Internal => "internal",
        }
    }

    /// Default human-readable description of the code.
    pub fn as_message(self) -> &'static str {
        match self {
            ErrorCode::InitializationFailureUnknown => "Initialization has failed for an unknown reason.",
            ErrorCode::InitializationFailureTimeout => "Initialization did not complete within the timeout.",
            ErrorCode::InitializationSkipped => "Initialization was skipped.",
            ErrorCode::PrebidFailureUnknown => "Bidder token fetch failed for an unknown reason.",
            ErrorCode::PrebidFailureTimeout => "Bidder token fetch did not complete within the timeout.",
            ErrorCode::LoadFailureUnknown => "Ad load failed for an unknown reason.",
            ErrorCode::LoadFailureAborted => "Ad load was aborted.",
            ErrorCode::LoadFailureMismatchedAdFormat => "The placement format does not match the requested format.",
            ErrorCode::LoadFailurePartnerNotInitialized => "The partner adapter is not initialized.",
            ErrorCode::LoadFailureRateLimited => "Too many load requests for this placement.",
            ErrorCode::LoadFailureTimeout => "The partner did not load the ad within the timeout.",
            ErrorCode::LoadFailureInvalidBannerSize => "The requested banner size is invalid.",
            ErrorCode::LoadFailureNoBannerView => "The partner returned a banner without a view.",
            ErrorCode::LoadFailureMediationNotInitialized => "Mediation is not initialized.",
            ErrorCode::LoadFailureWaterfallExhaustedNoFill => "No bid could be fulfilled.",
            ErrorCode::LoadFailureAdTooLarge => "The loaded ad is larger than the requested size.",
            ErrorCode::ShowFailureUnknown => "Ad show failed for an unknown reason.",
            ErrorCode::ShowFailureAdNotReady => "There is no loaded ad to show.",
            ErrorCode::ShowFailureTimeout => "The partner did not show the ad within the timeout.",
            ErrorCode::ShowFailureWrongResourceType => "The loaded ad cannot be shown by the slot.",
            ErrorCode::InvalidateFailureUnknown => "Ad invalidation failed for an unknown reason.",
            ErrorCode::Unknown => "An unknown error occurred.",
            ErrorCode::PartnerError => "The partner reported an error.",
            ErrorCode::Internal => "An internal error occurred.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_label(), self.code())
    }
}

/// # Typed error reported by mediation operations.
///
/// A no-fill carries every per-bid failure in `underlying`, in attempt order.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", self.as_message())]
pub struct MediationError {
    /// Classification.
    pub code: ErrorCode,
    /// Extra detail (partner error text, rate limit hint, etc.).
    pub description: Option<String>,
    /// Aggregated causes, if any.
    pub underlying: Vec<MediationError>,
}

impl MediationError {
    /// Creates an error with no extra detail.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            description: None,
            underlying: Vec::new(),
        }
    }

    /// Attaches a description.
    #[inline]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attaches aggregated causes.
    #[inline]
    pub fn with_underlying(mut self, underlying: Vec<MediationError>) -> Self {
        self.underlying = underlying;
        self
    }

    /// Converts a raw partner error into a typed one.
    ///
    /// Errors the adapter already typed pass through untouched. Native errors take
    /// `mapped` (the adapter's own error mapping) or fall back to the phase default.
    pub fn from_partner(error: PartnerError, mapped: Option<ErrorCode>, fallback: ErrorCode) -> Self {
        match error {
            PartnerError::Mediation(inner) => *inner,
            native @ PartnerError::Native { .. } => {
                MediationError::new(mapped.unwrap_or(fallback)).with_description(native.to_string())
            }
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        self.code.as_label()
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        let mut message = format!("{}: {}", self.code, self.code.as_message());
        if let Some(description) = &self.description {
            message.push(' ');
            message.push_str(description);
        }
        if !self.underlying.is_empty() {
            let causes: Vec<&'static str> = self.underlying.iter().map(|e| e.as_label()).collect();
            message.push_str(&format!(" causes={causes:?}"));
        }
        message
    }
}

impl From<ErrorCode> for MediationError {
    fn from(code: ErrorCode) -> Self {
        MediationError::new(code)
    }
}

/// # Raw error reported by a partner adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PartnerError {
    /// The adapter already produced a typed error.
    #[error(transparent)]
    Mediation(Box<MediationError>),

    /// A network-specific error the adapter did not classify.
    #[error("partner error {code}: {message}")]
    Native {
        /// Network-specific code.
        code: i64,
        /// Network-specific message.
        message: String,
    },
}

impl PartnerError {
    /// Shorthand for a native error.
    pub fn native(code: i64, message: impl Into<String>) -> Self {
        PartnerError::Native {
            code,
            message: message.into(),
        }
    }
}

impl From<MediationError> for PartnerError {
    fn from(error: MediationError) -> Self {
        PartnerError::Mediation(Box::new(error))
    }
}

/// # Errors produced by the task dispatcher.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The serial queue backing the context is gone.
    #[error("{context} context is no longer running")]
    Disconnected {
        /// Target context.
        context: Context,
    },

    /// The submitted work panicked before producing a value.
    #[error("work submitted to {context} context panicked")]
    Panicked {
        /// Target context.
        context: Context,
    },

    /// An execution thread could not be started.
    #[error("failed to start dispatcher thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Disconnected { .. } => "dispatch_disconnected",
            DispatchError::Panicked { .. } => "dispatch_panicked",
            DispatchError::Spawn(_) => "dispatch_spawn_failed",
        }
    }
}

/// # Errors produced while building a [`Mediation`](crate::Mediation) container.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BuildError {
    /// No load-result producer or auction service was configured.
    #[error("an auction service or ad loader is required")]
    MissingLoader,

    /// The dispatcher could not be started.
    #[error(transparent)]
    Dispatcher(#[from] DispatchError),
}

impl BuildError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BuildError::MissingLoader => "build_missing_loader",
            BuildError::Dispatcher(_) => "build_dispatcher",
        }
    }
}
