/*!
 * Error handling for the pricing lookup library
 *
 * Provides detailed error types with context and suggestions. Every failure
 * is local to the stage that triggered it; nothing here is fatal to a session.
 */

use std::fmt;
use thiserror::Error;
use serde::{Serialize, Deserialize};

use crate::data_types::Stage;

/// Library result type
pub type Result<T> = std::result::Result<T, RxError>;

/// Error types with context and suggestions
#[derive(Error, Debug)]
pub enum RxError {
    /// Empty or malformed user input; no request was issued
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        value: Option<String>,
    },

    /// Invalid NDC with format guidance
    #[error("Invalid NDC '{ndc}': {reason}")]
    InvalidNdc {
        ndc: String,
        reason: String,
        suggestion: String,
    },

    /// Invalid BIN code
    #[error("Invalid BIN '{code}': {reason}")]
    InvalidBin {
        code: String,
        reason: String,
    },

    /// A stage was selected before the stage it depends on
    #[error("Cannot select {stage} before a {requires} is selected")]
    MissingUpstream {
        stage: Stage,
        requires: Stage,
    },

    /// A selection that does not belong to its parent selection
    #[error("{stage} {id} does not belong to the selected {parent}")]
    ForeignSelection {
        stage: Stage,
        id: String,
        parent: Stage,
    },

    /// Connection, timeout or body-read failures
    #[error("Failed to reach {endpoint}: {message}")]
    Transport {
        endpoint: String,
        message: String,
    },

    /// Non-success status that is not an authorization failure
    #[error("HTTP {status} from {endpoint}")]
    Http {
        endpoint: String,
        status: u16,
    },

    /// 401/403 on an endpoint that is expected to be public
    #[error("Public access blocked ({status}) for {endpoint}")]
    AccessBlocked {
        endpoint: String,
        status: u16,
    },

    /// Response body did not match the expected shape
    #[error("Unexpected response from {endpoint}: {message}")]
    Schema {
        endpoint: String,
        message: String,
    },

    /// Token refresh failures
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        suggestion: Option<String>,
    },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Export errors
    #[error("Export error: {message}")]
    Export {
        message: String,
        format: ExportFormat,
        suggestion: Option<String>,
    },

    /// Feature not enabled error
    #[error("Feature '{feature}' is not enabled")]
    FeatureNotEnabled {
        feature: String,
        enable_instruction: String,
    },

    /// Generic errors with custom message
    #[error("{message}")]
    Custom {
        message: String,
        suggestion: Option<String>,
    },
}

/// Token refresh failure
///
/// Cloneable so that every request queued behind one refresh receives the
/// same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no refresh token is stored")]
    MissingRefreshToken,

    #[error("refresh rejected: {0}")]
    Rejected(String),

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("refresh was abandoned before completing")]
    Abandoned,
}

/// Export format for tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    JsonLines,
    Csv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "JSON"),
            ExportFormat::JsonLines => write!(f, "JSON Lines"),
            ExportFormat::Csv => write!(f, "CSV"),
        }
    }
}

impl RxError {
    /// Create an invalid NDC error with validation details
    pub fn invalid_ndc(ndc: &str) -> Self {
        let digits = ndc.chars().filter(|c| c.is_ascii_digit()).count();
        let (reason, suggestion) = if ndc.trim().is_empty() {
            ("NDC cannot be empty".to_string(),
             "Provide an 11-digit NDC, e.g. 00071-0155-23".to_string())
        } else if !ndc.chars().all(|c| c.is_ascii_digit() || c == '-') {
            ("NDC must contain only digits and hyphens".to_string(),
             "Remove any spaces or letters from the NDC".to_string())
        } else if ndc.contains('-') {
            (format!("hyphen groups do not form a 4-4-2, 5-3-2, 5-4-1 or 5-4-2 layout ({} digits)", digits),
             "Use the labeler-product-package layout printed on the package".to_string())
        } else {
            (format!("NDC must be exactly 11 digits, found {}", digits),
             "Zero-pad the NDC to 11 digits or keep its original hyphens".to_string())
        };

        Self::InvalidNdc {
            ndc: ndc.to_string(),
            reason,
            suggestion,
        }
    }

    /// Create an invalid BIN error
    pub fn invalid_bin(code: &str) -> Self {
        let reason = if code.len() != 6 {
            format!("BIN must be exactly 6 digits, found {} characters", code.len())
        } else {
            "BIN must contain only digits".to_string()
        };
        Self::InvalidBin {
            code: code.to_string(),
            reason,
        }
    }

    /// Validation failure for an empty search query
    pub fn empty_query(field: &str) -> Self {
        Self::Validation {
            message: format!("{} query is empty", field),
            field: Some(field.to_string()),
            value: None,
        }
    }

    /// Map a non-success HTTP status to the matching error variant
    pub fn from_status(endpoint: &str, status: u16) -> Self {
        match status {
            401 | 403 => Self::AccessBlocked {
                endpoint: endpoint.to_string(),
                status,
            },
            _ => Self::Http {
                endpoint: endpoint.to_string(),
                status,
            },
        }
    }

    /// Create a schema error for a response body
    pub fn schema(endpoint: &str, message: impl Into<String>) -> Self {
        Self::Schema {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    /// Create a feature not enabled error
    pub fn feature_required(feature: &str) -> Self {
        let enable_instruction = match feature {
            "http" => "Add 'rxlookup = { version = \"0.0\", features = [\"http\"] }' to your Cargo.toml",
            _ => "Enable the required feature in your Cargo.toml",
        };

        Self::FeatureNotEnabled {
            feature: feature.to_string(),
            enable_instruction: enable_instruction.to_string(),
        }
    }

    /// Whether this is a 401/403 on a public endpoint
    pub fn is_access_blocked(&self) -> bool {
        matches!(self, Self::AccessBlocked { .. })
    }

    /// Whether this failure came from the network rather than the caller
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Http { .. } | Self::Schema { .. })
    }

    /// Short message to show next to the stage that failed
    pub fn stage_message(&self, what: &str) -> String {
        match self {
            Self::AccessBlocked { .. } => {
                format!("Public access to {} is blocked by the server", what)
            }
            Self::Validation { .. } => String::new(),
            _ => format!("Failed to load {}", what),
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidNdc { suggestion, .. } => {
                format!("{}\n\nSuggestion: {}", self, suggestion)
            }
            Self::AccessBlocked { .. } => {
                format!("{}\n\nSuggestion: the endpoint requires credentials; enable auth in the configuration", self)
            }
            Self::FeatureNotEnabled { enable_instruction, .. } => {
                format!("{}\n\nTo enable: {}", self, enable_instruction)
            }
            Self::Configuration { suggestion: Some(sug), .. }
            | Self::Export { suggestion: Some(sug), .. }
            | Self::Custom { suggestion: Some(sug), .. } => {
                format!("{}\n\nSuggestion: {}", self, sug)
            }
            _ => self.to_string(),
        }
    }
}

// Convenience conversions
impl From<std::io::Error> for RxError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<csv::Error> for RxError {
    fn from(err: csv::Error) -> Self {
        Self::Export {
            message: err.to_string(),
            format: ExportFormat::Csv,
            suggestion: None,
        }
    }
}

impl From<serde_json::Error> for RxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Export {
            message: err.to_string(),
            format: ExportFormat::Json,
            suggestion: Some("Check if the data is serializable to JSON.".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(RxError::from_status("/drug/GetDetails", 401).is_access_blocked());
        assert!(RxError::from_status("/drug/GetDetails", 403).is_access_blocked());
        let err = RxError::from_status("/drug/GetDetails", 500);
        assert!(!err.is_access_blocked());
        assert!(err.is_network());
    }

    #[test]
    fn test_stage_messages_distinguish_access_blocked() {
        let blocked = RxError::from_status("/drug/GetInsurancesPcnByBinId", 403);
        let failed = RxError::from_status("/drug/GetInsurancesPcnByBinId", 502);
        assert_eq!(blocked.stage_message("PCNs"), "Public access to PCNs is blocked by the server");
        assert_eq!(failed.stage_message("PCNs"), "Failed to load PCNs");
    }

    #[test]
    fn test_invalid_ndc_reasons() {
        match RxError::invalid_ndc("") {
            RxError::InvalidNdc { reason, .. } => assert!(reason.contains("empty")),
            other => panic!("unexpected {other:?}"),
        }
        match RxError::invalid_ndc("12AB") {
            RxError::InvalidNdc { reason, .. } => assert!(reason.contains("only digits")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
