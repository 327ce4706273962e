//! Error taxonomy shared across the crate.
//!
//! Validation errors are raised synchronously before a worker is spawned;
//! runtime errors travel back through the worker result channel and are
//! surfaced by the session once the slot is released.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Everything that can go wrong between a keypress and a rendered response.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChatError {
    /// No usable API key for the selected provider; blocks submission.
    #[error("no API key configured for {provider}")]
    NoCredential { provider: String },

    /// Temperature or top_p outside the model's declared bounds.
    #[error("invalid {name}: {value} (allowed {min} to {max})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Attachments on a text-only model, or a vision model with nothing to see.
    #[error("{0}")]
    ModelCapabilityMismatch(String),

    /// Transport-level failure reaching the provider.
    #[error("connection error: {0}")]
    Connection(String),

    /// Structured error returned by the provider itself.
    #[error("provider returned status {status}: {message}")]
    ProviderStatus { status: u16, message: String },

    /// Invalid path, unreachable URL, wrong content type, or duplicate image.
    #[error("{0}")]
    Attachment(String),

    /// Invariant violation or a local failure the user cannot correct,
    /// such as an unwritable transcript file.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Context-length provider errors get a corrective hint (focus the model
    /// selector) instead of a plain notification.
    pub fn is_context_length(&self) -> bool {
        match self {
            ChatError::ProviderStatus { message, .. } => {
                message.contains("maximum context length")
                    || message.contains("context_length_exceeded")
            }
            _ => false,
        }
    }

    /// First URL embedded in the error message, offered as a clickable follow-up.
    pub fn embedded_url(&self) -> Option<String> {
        static URL_RE: OnceLock<Regex> = OnceLock::new();
        let re =
            URL_RE.get_or_init(|| Regex::new(r"https?://[^\s]+").expect("url regex should compile"));
        let text = self.to_string();
        re.find(&text)
            .map(|m| m.as_str().trim_end_matches('.').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_length_errors_are_recognized() {
        let err = ChatError::ProviderStatus {
            status: 400,
            message: "This model's maximum context length is 4096 tokens.".into(),
        };
        assert!(err.is_context_length());
        let other = ChatError::Connection("refused".into());
        assert!(!other.is_context_length());
    }

    #[test]
    fn embedded_url_is_extracted_without_trailing_dot() {
        let err = ChatError::ProviderStatus {
            status: 429,
            message: "Rate limited. See https://platform.openai.com/docs/guides/rate-limits."
                .into(),
        };
        assert_eq!(
            err.embedded_url().as_deref(),
            Some("https://platform.openai.com/docs/guides/rate-limits")
        );
        assert_eq!(ChatError::Connection("refused".into()).embedded_url(), None);
    }
}
