//! Blocking HTTP implementation of [`ProviderClient`].

use super::sse;
use super::{CompletionRequest, DeltaSink, ProviderClient, SpeechRequest, TranscriptionRequest};
use crate::credentials::ProviderAuth;
use crate::error::ChatError;
use crate::registry::{Model, Provider};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::io::BufReader;

const TRANSCRIPTION_MODEL: &str = "whisper-1";

pub struct HttpProviderClient {
    client: Client,
}

impl Default for HttpProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProviderClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn authorized(
        &self,
        builder: RequestBuilder,
        provider: Provider,
        auth: &ProviderAuth,
    ) -> RequestBuilder {
        let builder = builder.bearer_auth(&auth.api_key);
        match (&auth.organization_key, provider) {
            (Some(org), Provider::OpenAi) => builder.header("OpenAI-Organization", org),
            _ => builder,
        }
    }

    fn send(&self, builder: RequestBuilder) -> Result<Response, ChatError> {
        let response = builder
            .send()
            .map_err(|err| ChatError::Connection(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(ChatError::ProviderStatus {
            status: status.as_u16(),
            message: provider_error_message(&body),
        })
    }
}

/// Pull the human-readable message out of an error body, falling back to
/// the raw body when it is not the usual `{"error": {"message": ...}}`.
pub(super) fn provider_error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| v["error"]["message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

pub(super) fn completion_body(request: &CompletionRequest) -> Value {
    json!({
        "model": request.model_id,
        "messages": request.messages,
        "temperature": request.temperature,
        "top_p": request.top_p,
        "max_tokens": request.max_tokens,
        "stream": request.stream,
    })
}

/// Turn one entry of a provider's model listing into a catalog entry.
/// Entries without an id are skipped.
pub(super) fn model_from_listing(provider: Provider, entry: &Value) -> Option<Model> {
    let id = entry["id"].as_str()?.to_string();
    let display_name = entry["name"].as_str().unwrap_or(&id).to_string();
    let description = entry["description"].as_str().unwrap_or_default().to_string();
    let context_window = entry["context_length"].as_u64().unwrap_or(0) as u32;
    let max_output_tokens = entry["top_provider"]["max_completion_tokens"]
        .as_u64()
        .unwrap_or(0) as u32;
    let supports_vision = entry["architecture"]["modality"]
        .as_str()
        .map(|m| m.contains("image"))
        .unwrap_or(false);
    Some(Model {
        provider,
        id,
        display_name,
        description,
        context_window,
        max_output_tokens,
        max_temperature: 2.0,
        default_temperature: 1.0,
        supports_vision,
        is_preview: false,
    })
}

/// Text of a transcription response: JSON carries it in `.text`, the
/// subtitle formats are the body itself.
pub(super) fn transcription_text(response_format: &str, body: String) -> String {
    if response_format != "json" {
        return body;
    }
    serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["text"].as_str().map(str::to_string))
        .unwrap_or(body)
}

impl ProviderClient for HttpProviderClient {
    fn complete(
        &self,
        request: &CompletionRequest,
        sink: DeltaSink<'_>,
    ) -> Result<String, ChatError> {
        let url = format!("{}/chat/completions", request.provider.base_url());
        let builder = self
            .authorized(self.client.post(&url), request.provider, &request.auth)
            .json(&completion_body(request));
        let response = self.send(builder)?;

        if request.stream {
            return sse::read_stream(BufReader::new(response), sink);
        }

        let body: Value = response
            .json()
            .map_err(|err| ChatError::Connection(err.to_string()))?;
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        sink(&text);
        Ok(text)
    }

    fn transcribe(&self, request: &TranscriptionRequest) -> Result<String, ChatError> {
        let url = format!("{}/audio/transcriptions", request.provider.base_url());
        let form = reqwest::blocking::multipart::Form::new()
            .text("model", TRANSCRIPTION_MODEL)
            .text("response_format", request.response_format.clone())
            .file("file", &request.audio_path)
            .map_err(|err| {
                ChatError::Attachment(format!(
                    "cannot read {}: {err}",
                    request.audio_path.display()
                ))
            })?;
        let builder = self
            .authorized(self.client.post(&url), request.provider, &request.auth)
            .multipart(form);
        let body = self
            .send(builder)?
            .text()
            .map_err(|err| ChatError::Connection(err.to_string()))?;
        Ok(transcription_text(&request.response_format, body))
    }

    fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, ChatError> {
        let url = format!("{}/audio/speech", request.provider.base_url());
        let builder = self
            .authorized(self.client.post(&url), request.provider, &request.auth)
            .json(&json!({
                "model": request.model,
                "input": request.text,
                "voice": request.voice,
            }));
        let bytes = self
            .send(builder)?
            .bytes()
            .map_err(|err| ChatError::Connection(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn list_models(
        &self,
        provider: Provider,
        auth: &ProviderAuth,
    ) -> Result<Vec<Model>, ChatError> {
        let url = format!("{}/models", provider.base_url());
        let builder = self.authorized(self.client.get(&url), provider, auth);
        let body: Value = self
            .send(builder)?
            .json()
            .map_err(|err| ChatError::Connection(err.to_string()))?;
        let entries = body["data"].as_array().cloned().unwrap_or_default();
        Ok(entries
            .iter()
            .filter_map(|entry| model_from_listing(provider, entry))
            .collect())
    }
}
