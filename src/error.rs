//! Error taxonomy.
//!
//! Soft errors ([`ToolError`], unreachable servers) are folded into the turn's
//! data; fatal errors ([`ConfigError`], [`ModelError`], iteration cap) surface
//! through [`AgentError`].

use thiserror::Error;

/// Malformed tool-server configuration. Fatal to a registry load.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document is not valid JSON.
    #[error("tool configuration is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed but has the wrong shape.
    #[error("tool configuration is malformed: {0}")]
    Shape(String),

    /// The configuration file could not be read.
    #[error("tool configuration could not be read: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single `tools/call` (or a handshake step).
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments rejected before any network activity.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {status} from tool server")]
    Http { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    /// `error.message` from the RPC response, verbatim.
    #[error("{0}")]
    Rpc(String),

    /// The response did not have the expected shape.
    #[error("Invalid tools/call response: {0}")]
    InvalidResponse(String),

    /// The tool ran but flagged its result with `isError`.
    #[error("{0}")]
    Reported(String),
}

impl ToolError {
    pub(crate) fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Failure talking to the language model endpoint. Fatal to the turn.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model request timeout after {secs}s")]
    Timeout { secs: u64 },

    #[error("Model endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error talking to model: {0}")]
    Network(String),

    /// The endpoint answered with an unparseable shape.
    #[error("Invalid model response: {0}")]
    Protocol(String),

    /// The response carried neither content nor tool calls.
    #[error("Model returned neither text nor tool calls")]
    Empty,
}

impl ModelError {
    pub(crate) fn from_reqwest(e: &reqwest::Error, secs: u64) -> Self {
        if e.is_timeout() {
            Self::Timeout { secs }
        } else if e.is_decode() {
            Self::Protocol(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Failure reported by the page-content collaborator.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PageError(pub String);

/// Fatal outcome of an orchestration turn.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Tool configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Maximum tool iterations ({max}) exceeded without a final answer")]
    IterationCapExceeded { max: usize },

    #[error("Could not read the current page: {0}")]
    Page(#[from] PageError),

    #[error(
        "This page does not contain enough text to answer questions about it (at least {min_chars} characters are needed)"
    )]
    InsufficientPageContent { min_chars: usize },

    #[error("Request cancelled")]
    Cancelled,
}

impl AgentError {
    /// Stable code for programmatic handling in error events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Model(ModelError::Timeout { .. }) => "TIMEOUT",
            Self::Model(_) => "MODEL",
            Self::IterationCapExceeded { .. } => "MAX_ITERATIONS",
            Self::Page(_) => "PAGE",
            Self::InsufficientPageContent { .. } => "PAGE_TOO_SHORT",
            Self::Cancelled => "CANCELLED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_timeout_message_is_exact() {
        assert_eq!(ToolError::Timeout.to_string(), "Request timeout");
    }

    #[test]
    fn invalid_response_is_distinct_from_timeout() {
        let e = ToolError::InvalidResponse("missing content array".into());
        assert_eq!(
            e.to_string(),
            "Invalid tools/call response: missing content array"
        );
    }

    #[test]
    fn model_timeout_mentions_timeout() {
        let e = AgentError::from(ModelError::Timeout { secs: 60 });
        assert!(e.to_string().to_lowercase().contains("timeout"));
        assert_eq!(e.code(), "TIMEOUT");
    }

    #[test]
    fn iteration_cap_code() {
        let e = AgentError::IterationCapExceeded { max: 5 };
        assert_eq!(e.code(), "MAX_ITERATIONS");
        assert!(e.to_string().contains('5'));
    }
}
