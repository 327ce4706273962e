//! End-to-end conversation flow through the public API only.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxchat::attachment::ImageOps;
use voxchat::config::Settings;
use voxchat::credentials::{Credential, ProviderAuth};
use voxchat::error::ChatError;
use voxchat::history::NavDirection;
use voxchat::provider::{
    CompletionRequest, DeltaSink, ProviderClient, SpeechRequest, TranscriptionRequest,
};
use voxchat::registry::{Model, Provider};
use voxchat::{Earcon, HostServices, Session};

#[derive(Default)]
struct FakeHost {
    spoken: Vec<String>,
    cursor: usize,
}

impl HostServices for FakeHost {
    fn speak(&mut self, text: &str) {
        self.spoken.push(text.to_string());
    }
    fn braille(&mut self, _text: &str) {}
    fn focus_transcript(&mut self) {}
    fn focus_model_selector(&mut self) {}
    fn cursor_offset(&mut self) -> usize {
        self.cursor
    }
    fn copy_to_clipboard(&mut self, _text: &str) {}
    fn open_url(&mut self, _url: &str) {}
    fn play_earcon(&mut self, _earcon: Earcon) {}
    fn play_audio(&mut self, _bytes: &[u8]) {}
    fn notify_error(&mut self, _message: &str, _url: Option<&str>) {}
}

struct FakeImageOps;

impl ImageOps for FakeImageOps {
    fn dimensions(&self, _path: &Path) -> Option<(u32, u32)> {
        None
    }
    fn resize(
        &self,
        _path: &Path,
        _max_width: u32,
        _max_height: u32,
        _quality: u8,
    ) -> Result<Option<Vec<u8>>, ChatError> {
        Ok(None)
    }
    fn probe_url(&self, _url: &str) -> Result<(), ChatError> {
        Ok(())
    }
}

/// Answers every completion with a canned reply derived from the request.
struct EchoClient {
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ProviderClient for EchoClient {
    fn complete(
        &self,
        request: &CompletionRequest,
        sink: DeltaSink<'_>,
    ) -> Result<String, ChatError> {
        self.requests.lock().expect("requests").push(request.clone());
        let count = self.requests.lock().expect("requests").len();
        let reply = format!("Reply number {count}. ");
        sink(&reply);
        Ok(reply)
    }
    fn transcribe(&self, _request: &TranscriptionRequest) -> Result<String, ChatError> {
        Ok(String::new())
    }
    fn synthesize(&self, _request: &SpeechRequest) -> Result<Vec<u8>, ChatError> {
        Ok(Vec::new())
    }
    fn list_models(
        &self,
        _provider: Provider,
        _auth: &ProviderAuth,
    ) -> Result<Vec<Model>, ChatError> {
        Ok(Vec::new())
    }
}

fn pump(session: &mut Session, host: &mut FakeHost) {
    for _ in 0..400 {
        session.tick(host);
        if !session.is_busy() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("worker never finished");
}

#[test]
fn multi_turn_conversation_grows_history_and_supports_navigation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = Arc::new(EchoClient {
        requests: Mutex::new(Vec::new()),
    });
    let mut session = Session::open(
        Settings::default(),
        Arc::clone(&client) as Arc<dyn ProviderClient>,
        Box::new(FakeImageOps),
        dir.path().to_path_buf(),
    );
    session
        .credentials_mut()
        .set(
            Provider::OpenAi,
            Credential {
                api_key: "sk-test".into(),
                ..Default::default()
            },
        )
        .expect("credential");
    let mut host = FakeHost::default();

    for prompt in ["first question", "second question", "third question"] {
        session.set_prompt(prompt);
        assert!(session.submit(&mut host).expect("submit"));
        pump(&mut session, &mut host);
    }

    assert_eq!(session.history().len(), 3);
    let transcript = session.transcript_text();
    assert!(transcript.contains("You: first question"));
    assert!(transcript.contains("Reply number 1."));
    assert!(transcript.contains("You: third question"));
    assert!(transcript.contains("Reply number 3."));

    // Context accumulates: the third request replays both prior turns.
    let requests = client.requests.lock().expect("requests");
    assert_eq!(requests[2].messages.len(), 5);
    drop(requests);

    // Forward from the first prompt speaks that turn's response.
    let transcript = transcript.to_string();
    host.cursor = transcript.find("first question").expect("prompt text");
    assert!(session.navigate(NavDirection::Forward, &mut host).is_some());
    assert_eq!(
        host.spoken.last().map(String::as_str),
        Some("Reply number 1.")
    );

    // Forward from the last response reports the boundary.
    host.cursor = transcript.find("Reply number 3.").expect("response text");
    assert!(session.navigate(NavDirection::Forward, &mut host).is_none());
    assert_eq!(
        host.spoken.last().map(String::as_str),
        Some("Bottom of conversation")
    );

    session.close();
}
