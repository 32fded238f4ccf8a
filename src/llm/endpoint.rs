//! Endpoint resolution.
//!
//! Self-hosted runtimes differ in where they mount the chat endpoint, so a
//! configured endpoint is either expanded to the standard path or used as-is.

use serde::Deserialize;
use url::Url;

const CHAT_PATH: &str = "/v1/chat/completions";

/// How the configured endpoint is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
    /// Bare hosts are expanded to `/v1/chat/completions`.
    #[default]
    Standard,
    /// The URL is used exactly as configured.
    Custom,
}

impl EndpointType {
    /// Parse from a settings string; unknown values fall back to standard.
    #[must_use]
    pub fn from_setting(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "custom" => Self::Custom,
            _ => Self::Standard,
        }
    }

    /// Build the URL requests are sent to.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pagewise::llm::EndpointType;
    ///
    /// let url = EndpointType::Standard.resolve("localhost:11434");
    /// assert_eq!(url, "http://localhost:11434/v1/chat/completions");
    /// ```
    #[must_use]
    pub fn resolve(self, endpoint: &str) -> String {
        let endpoint = endpoint.trim();
        match self {
            Self::Custom => endpoint.to_string(),
            Self::Standard => normalize_standard(endpoint),
        }
    }
}

fn normalize_standard(endpoint: &str) -> String {
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    };

    let Ok(mut url) = Url::parse(&with_scheme) else {
        // Not a URL we understand; let the HTTP layer report it.
        return with_scheme;
    };

    let path = url.path().trim_end_matches('/').to_string();
    let new_path = if path.ends_with("/chat/completions") {
        path
    } else if path.ends_with("/v1") {
        format!("{path}/chat/completions")
    } else if path.is_empty() {
        CHAT_PATH.to_string()
    } else {
        format!("{path}{CHAT_PATH}")
    };
    url.set_path(&new_path);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_port_is_expanded() {
        assert_eq!(
            EndpointType::Standard.resolve("http://localhost:1234"),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn missing_scheme_gets_http() {
        assert_eq!(
            EndpointType::Standard.resolve("127.0.0.1:8080/"),
            "http://127.0.0.1:8080/v1/chat/completions"
        );
    }

    #[test]
    fn v1_suffix_is_completed() {
        assert_eq!(
            EndpointType::Standard.resolve("https://api.openai.com/v1"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn full_path_is_kept() {
        assert_eq!(
            EndpointType::Standard.resolve("https://host/api/v1/chat/completions"),
            "https://host/api/v1/chat/completions"
        );
    }

    #[test]
    fn custom_is_used_as_is() {
        assert_eq!(
            EndpointType::Custom.resolve(" http://localhost:11434/api/chat "),
            "http://localhost:11434/api/chat"
        );
    }

    #[test]
    fn from_setting_defaults_to_standard() {
        assert_eq!(EndpointType::from_setting("CUSTOM"), EndpointType::Custom);
        assert_eq!(EndpointType::from_setting("other"), EndpointType::Standard);
    }
}
