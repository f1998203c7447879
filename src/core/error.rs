//! Error handling for the solution deployer
//!
//! The error system follows the same two principles throughout the crate:
//! 1. **Strongly-typed errors** ([`SolutionError`]) that library code returns and
//!    callers can match on
//! 2. **User-friendly messages** ([`ErrorContext`]) with details and suggestions
//!    for the command line
//!
//! # Error Categories
//!
//! - **Ordering**: [`SolutionError::CyclicDependency`] is raised synchronously by the
//!   sequencer and aborts a deployment before any backend call is made.
//! - **Backend**: [`SolutionError::RemoteRequest`] wraps every failed catalog call in
//!   the uniform [`RemoteRequestError`] shape (`success = false` plus an `error`
//!   payload). Nothing retries these.
//! - **Composite assembly**: [`SolutionError::PartialCompositeFailure`] is the
//!   fail-fast result of a sub-part addition failing mid-sequence.
//! - **Bundle shape**: [`SolutionError::MalformedTemplate`] covers dangling dependency
//!   ids and composite items without sub-resource properties.
//!
//! # Examples
//!
//! ```rust,no_run
//! use solution_deployer::core::{SolutionError, user_friendly_error};
//!
//! let err = SolutionError::CyclicDependency;
//! let ctx = user_friendly_error(anyhow::Error::from(err));
//! ctx.display();
//! ```

use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result alias used by every library module.
pub type Result<T> = std::result::Result<T, SolutionError>;

/// The uniform shape of a failed backend call.
///
/// Every catalog client failure (network, validation, permission) is reported
/// with `success = false` and whatever payload the backend or transport
/// produced under `error`. The shape serializes exactly like the JSON the
/// catalog returns for failed requests so it can be echoed to users verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequestError {
    /// Always `false`.
    pub success: bool,
    /// Backend or transport error payload.
    pub error: Value,
    /// Catalog operation that failed (`createItem`, `addToDefinition`, ...).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation: String,
}

impl RemoteRequestError {
    /// Wrap an arbitrary payload as a failed request.
    pub fn new(operation: impl Into<String>, error: Value) -> Self {
        Self {
            success: false,
            error,
            operation: operation.into(),
        }
    }

    /// Wrap a plain message, producing `{ "message": ... }` as payload.
    pub fn message(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(operation, serde_json::json!({ "message": message.into() }))
    }

    /// Best-effort human readable message extracted from the payload.
    pub fn error_message(&self) -> String {
        match &self.error {
            Value::String(s) => s.clone(),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| self.error.to_string()),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for RemoteRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operation.is_empty() {
            write!(f, "{}", self.error_message())
        } else {
            write!(f, "{} failed: {}", self.operation, self.error_message())
        }
    }
}

impl std::error::Error for RemoteRequestError {}

/// The main error type for deployer operations.
#[derive(Error, Debug)]
pub enum SolutionError {
    /// The bundle's dependency graph contains a cycle (including self references).
    ///
    /// Only the existence of the cycle is reported, never its members.
    #[error("Cyclical dependency graph detected")]
    CyclicDependency,

    /// A template is missing a mandatory shape or references an unknown dependency.
    #[error("Malformed template '{owner_id}': {reason}")]
    MalformedTemplate {
        /// Source id of the offending template
        owner_id: String,
        /// What is missing or wrong
        reason: String,
    },

    /// A catalog call failed.
    #[error("Remote request failed: {0}")]
    RemoteRequest(RemoteRequestError),

    /// A sub-part addition failed; later sub-parts were not attempted.
    #[error("Adding part {part_id} of '{owner_id}' failed after {attempted} attempted part(s): {source}")]
    PartialCompositeFailure {
        /// Composite item being assembled
        owner_id: String,
        /// Pre-deployment local id of the failing part
        part_id: i64,
        /// Number of parts submitted, including the failing one
        attempted: usize,
        /// The backend failure of the failing part
        source: RemoteRequestError,
    },

    /// The progress callback asked the deployment to stop.
    #[error("Deployment cancelled after item '{owner_id}'")]
    Cancelled {
        /// Item after which the callback returned `false`
        owner_id: String,
    },

    /// Configuration could not be loaded or is incomplete.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// A bundle or template file could not be parsed.
    #[error("Invalid bundle file {path}: {reason}")]
    BundleParse {
        /// Path of the file
        path: String,
        /// Parser message
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SolutionError {
    /// Shorthand for [`SolutionError::MalformedTemplate`].
    pub fn malformed(owner_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTemplate {
            owner_id: owner_id.into(),
            reason: reason.into(),
        }
    }

    /// The uniform backend error carried by this error, if any.
    pub fn remote_error(&self) -> Option<&RemoteRequestError> {
        match self {
            Self::RemoteRequest(e) => Some(e),
            Self::PartialCompositeFailure {
                source,
                ..
            } => Some(source),
            _ => None,
        }
    }
}

impl From<RemoteRequestError> for SolutionError {
    fn from(err: RemoteRequestError) -> Self {
        Self::RemoteRequest(err)
    }
}

/// Error wrapper carrying user-facing details and a suggestion.
#[derive(Debug)]
pub struct ErrorContext {
    /// Rendered error message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with no suggestion or details.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr: error red, details yellow, suggestion green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with actionable suggestions.
///
/// The outermost [`SolutionError`] in the chain decides the suggestion; other
/// errors are rendered with their full `anyhow` context chain as details.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(err) = error.chain().find_map(|e| e.downcast_ref::<SolutionError>()) {
        return create_error_context(err, &error);
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(format!("Invalid configuration file: {toml_error}"))
            .with_suggestion("Check the TOML syntax of your soldeploy configuration");
    }

    ErrorContext::new(error.to_string()).with_details(chain_details(&error).unwrap_or_default())
}

fn create_error_context(err: &SolutionError, outer: &anyhow::Error) -> ErrorContext {
    let ctx = ErrorContext::new(outer.to_string());
    let ctx = match chain_details(outer) {
        Some(details) => ctx.with_details(details),
        None => ctx,
    };
    match err {
        SolutionError::CyclicDependency => ctx.with_suggestion(
            "Remove one of the references between the items forming the cycle and capture the bundle again",
        ),
        SolutionError::MalformedTemplate {
            ..
        } => ctx.with_suggestion(
            "Re-capture the bundle so every dependency is included and every service records its layers",
        ),
        SolutionError::RemoteRequest(_)
        | SolutionError::PartialCompositeFailure {
            ..
        } => ctx.with_suggestion(
            "Check the portal URL, credentials and permissions; already-created items are not rolled back",
        ),
        SolutionError::Config {
            ..
        } => ctx.with_suggestion("Run with --config <path> or set SOLDEPLOY_CONFIG"),
        SolutionError::BundleParse {
            ..
        }
        | SolutionError::Json(_) => ctx.with_suggestion("Verify the bundle file is valid JSON"),
        SolutionError::Cancelled {
            ..
        }
        | SolutionError::Io(_) => ctx,
    }
}

fn chain_details(error: &anyhow::Error) -> Option<String> {
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if chain.is_empty() {
        None
    } else {
        Some(chain.join(": "))
    }
}
