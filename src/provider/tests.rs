use super::http::{
    completion_body, model_from_listing, provider_error_message, transcription_text,
};
use super::sse;
use crate::credentials::ProviderAuth;
use crate::registry::Provider;
use serde_json::json;
use std::io::Cursor;

fn chunk(content: &str) -> String {
    json!({ "choices": [{ "delta": { "content": content } }] }).to_string()
}

#[test]
fn sse_stream_accumulates_deltas_in_order() {
    let body = format!(
        "data: {}\n\ndata: {}\n\ndata: {}\n\ndata: [DONE]\n\n",
        json!({ "choices": [{ "delta": { "role": "assistant" } }] }),
        chunk("Hi "),
        chunk("there"),
    );
    let mut seen = Vec::new();
    let text = sse::read_stream(Cursor::new(body), &mut |delta| {
        seen.push(delta.to_string());
        true
    })
    .expect("stream");
    assert_eq!(text, "Hi there");
    assert_eq!(seen, ["Hi ", "there"]);
}

#[test]
fn sse_stream_stops_when_sink_declines() {
    let body = format!("data: {}\n\ndata: {}\n\n", chunk("first"), chunk("second"));
    let mut calls = 0;
    let text = sse::read_stream(Cursor::new(body), &mut |_| {
        calls += 1;
        false
    })
    .expect("stream");
    assert_eq!(calls, 1);
    assert_eq!(text, "first");
}

#[test]
fn sse_skips_comments_blanks_and_unparsable_payloads() {
    let body = format!(
        ": keep-alive\n\n\ndata: not json\n\ndata: {}\n\n",
        chunk("ok")
    );
    let text = sse::read_stream(Cursor::new(body), &mut |_| true).expect("stream");
    assert_eq!(text, "ok");
}

#[test]
fn delta_extraction_handles_terminator_and_contentless_chunks() {
    assert_eq!(sse::delta_from_event("[DONE]"), None);
    assert!(sse::is_done(" [DONE] "));
    let finish = json!({ "choices": [{ "delta": {}, "finish_reason": "stop" }] });
    assert_eq!(sse::delta_from_event(&finish.to_string()), None);
    assert_eq!(sse::delta_from_event(&chunk("x")).as_deref(), Some("x"));
}

#[test]
fn completion_body_carries_all_parameters() {
    let request = super::CompletionRequest {
        provider: Provider::OpenAi,
        auth: ProviderAuth {
            api_key: "sk".into(),
            organization_key: None,
        },
        model_id: "gpt-4o".into(),
        messages: vec![json!({ "role": "user", "content": "hi" })],
        temperature: 0.7,
        top_p: 0.9,
        max_tokens: 512,
        stream: true,
    };
    let body = completion_body(&request);
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["temperature"], 0.7);
    assert_eq!(body["top_p"], 0.9);
    assert_eq!(body["max_tokens"], 512);
    assert_eq!(body["stream"], true);
    assert_eq!(body["messages"].as_array().expect("messages").len(), 1);
}

#[test]
fn provider_error_message_prefers_structured_body() {
    let structured = json!({ "error": { "message": "context_length_exceeded" } }).to_string();
    assert_eq!(provider_error_message(&structured), "context_length_exceeded");
    assert_eq!(provider_error_message("  plain failure  "), "plain failure");
}

#[test]
fn model_listing_entries_map_to_catalog_models() {
    let entry = json!({
        "id": "meta-llama/llama-3-70b",
        "name": "Llama 3 70B",
        "description": "Open model",
        "context_length": 8192,
        "top_provider": { "max_completion_tokens": 4096 },
        "architecture": { "modality": "text+image->text" },
    });
    let model = model_from_listing(Provider::OpenRouter, &entry).expect("model");
    assert_eq!(model.id, "meta-llama/llama-3-70b");
    assert_eq!(model.display_name, "Llama 3 70B");
    assert_eq!(model.context_window, 8192);
    assert_eq!(model.max_output_tokens, 4096);
    assert!(model.supports_vision);

    assert!(model_from_listing(Provider::OpenRouter, &json!({ "name": "no id" })).is_none());
}

#[test]
fn transcription_text_depends_on_response_format() {
    let body = json!({ "text": "hello world" }).to_string();
    assert_eq!(transcription_text("json", body), "hello world");
    let srt = "1\n00:00:00,000 --> 00:00:01,000\nhello\n".to_string();
    assert_eq!(transcription_text("srt", srt.clone()), srt);
}
