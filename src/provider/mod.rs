//! Provider client: the outbound contract to OpenAI-compatible APIs.
//!
//! Everything here runs on background worker threads; the foreground never
//! calls into this module directly. The trait exists so the session logic
//! can be tested against scripted doubles.

use crate::credentials::ProviderAuth;
use crate::error::ChatError;
use crate::registry::{Model, Provider};
use serde_json::Value;
use std::path::PathBuf;

mod http;
mod sse;

#[cfg(test)]
mod tests;

pub use http::HttpProviderClient;

/// One chat-completion request, fully resolved at submit time.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub provider: Provider,
    pub auth: ProviderAuth,
    pub model_id: String,
    pub messages: Vec<Value>,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

/// A speech-to-text request over a recorded or picked audio file.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub provider: Provider,
    pub auth: ProviderAuth,
    pub audio_path: PathBuf,
    /// "json", "srt", or "vtt".
    pub response_format: String,
}

/// A text-to-speech request.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub provider: Provider,
    pub auth: ProviderAuth,
    pub text: String,
    pub voice: String,
    pub model: String,
}

/// Receives response text as it is produced. Returning `false` asks the
/// client to stop consuming the stream (cooperative cancel).
pub type DeltaSink<'a> = &'a mut dyn FnMut(&str) -> bool;

pub trait ProviderClient: Send + Sync {
    /// Run one completion. Streaming requests push each delta through
    /// `sink` as it arrives; non-streaming requests push the whole text
    /// once. Returns the accumulated response text.
    fn complete(&self, request: &CompletionRequest, sink: DeltaSink<'_>)
        -> Result<String, ChatError>;

    fn transcribe(&self, request: &TranscriptionRequest) -> Result<String, ChatError>;

    fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, ChatError>;

    fn list_models(&self, provider: Provider, auth: &ProviderAuth)
        -> Result<Vec<Model>, ChatError>;
}
