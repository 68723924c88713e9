//! Error types for the blobflow dispatch core.
//!
//! The taxonomy mirrors how failures travel through a pipeline:
//! - [`RestError`] is the structured HTTP error. It is the only kind the retry
//!   engines look at.
//! - [`PolicyOrderingError`] is raised while resolving policy order, before any
//!   request goes out.
//! - [`PipelineError`] wraps both and adds cancellation, authentication and
//!   internal failures.

use crate::http::PipelineResponse;
use thiserror::Error;

/// Error code used by transports when a request could not be sent.
pub const REQUEST_SEND_ERROR: &str = "REQUEST_SEND_ERROR";

/// Error code used when a response body could not be parsed.
pub const PARSE_ERROR: &str = "PARSE_ERROR";

/// The main error type returned from pipeline dispatch.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// A structured HTTP error, possibly carrying the response.
    #[error("{0}")]
    Rest(#[from] RestError),

    /// The policy set could not be ordered.
    #[error("{0}")]
    Ordering(#[from] PolicyOrderingError),

    /// The request's cancellation token fired.
    #[error("Operation aborted: {0}")]
    Aborted(String),

    /// A credential could not be obtained or applied.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// An invariant of the dispatch core was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Creates an aborted error with the default message.
    #[must_use]
    pub fn aborted() -> Self {
        Self::Aborted("The operation was aborted.".to_string())
    }

    /// Returns the structured HTTP error, if this is one.
    #[must_use]
    pub fn as_rest(&self) -> Option<&RestError> {
        match self {
            Self::Rest(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if this error represents a cancellation.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

/// A structured HTTP error.
///
/// Transports raise it for connection level failures (with a `code` such as
/// `ECONNRESET`), and deserializing layers raise it for unexpected status
/// codes (with the response attached).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RestError {
    /// Human readable description.
    pub message: String,
    /// Machine readable error code.
    pub code: Option<String>,
    /// HTTP status code, when the failure came from a response.
    pub status_code: Option<u16>,
    /// The response that triggered the error, if any.
    pub response: Option<Box<PipelineResponse>>,
}

impl RestError {
    /// Creates a new error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            status_code: None,
            response: None,
        }
    }

    /// Creates an error describing an unexpected response.
    #[must_use]
    pub fn from_response(response: PipelineResponse) -> Self {
        Self::new(format!("Unexpected status code: {}", response.status)).with_response(response)
    }

    /// Sets the error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the status code.
    #[must_use]
    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Attaches the response and copies its status.
    #[must_use]
    pub fn with_response(mut self, response: PipelineResponse) -> Self {
        self.status_code = Some(response.status);
        self.response = Some(Box::new(response));
        self
    }

    /// Returns the attached response.
    #[must_use]
    pub fn response(&self) -> Option<&PipelineResponse> {
        self.response.as_deref()
    }

    /// Returns the status code from the error or its response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status_code
            .or_else(|| self.response.as_ref().map(|r| r.status))
    }
}

/// Errors raised while validating or ordering pipeline policies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyOrderingError {
    /// `phase` and `after_phase` were both set.
    #[error("Policy '{policy}' is inside a phase and cannot specify afterPhase")]
    PhaseConflict {
        /// The offending policy.
        policy: String,
    },

    /// A phase name did not match any known phase.
    #[error("Invalid phase name: {0}")]
    InvalidPhase(String),

    /// Two registered policies share a name.
    #[error("Duplicate policy name '{0}' is not allowed in a pipeline")]
    DuplicatePolicyName(String),

    /// The dependency graph cannot be satisfied.
    #[error(
        "Cannot satisfy policy dependencies due to requirements cycle; unresolved: {}",
        remaining.join(", ")
    )]
    UnsatisfiableDependencies {
        /// Policies that could not be placed.
        remaining: Vec<String>,
    },
}

impl PolicyOrderingError {
    /// Returns a stable code for the error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PhaseConflict { .. } => "PIPELINE-PHASE-CONFLICT",
            Self::InvalidPhase(_) => "PIPELINE-INVALID-PHASE",
            Self::DuplicatePolicyName(_) => "PIPELINE-DUPLICATE-NAME",
            Self::UnsatisfiableDependencies { .. } => "PIPELINE-CYCLE",
        }
    }
}
