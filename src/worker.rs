//! Background tasks: one short-lived thread per network operation.
//!
//! A session holds at most one [`TaskHandle`] at a time. The worker thread
//! publishes streamed text through a shared [`ResponseBuffer`] and posts
//! exactly one terminal [`TaskOutcome`] through a bounded channel; the
//! foreground polls both on its tick and joins the thread once the outcome
//! arrives. Workers never touch session state directly.

use crate::error::ChatError;
use crate::provider::{CompletionRequest, ProviderClient, SpeechRequest, TranscriptionRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Cooperative stop flag shared with the worker thread.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Response text published incrementally by a completion worker and read
/// by the foreground renderer. Append-only until `finish`.
#[derive(Default)]
pub struct ResponseBuffer {
    text: Mutex<String>,
    finished: AtomicBool,
}

impl ResponseBuffer {
    pub fn push(&self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        if let Ok(mut text) = self.text.lock() {
            text.push_str(delta);
        }
    }

    pub fn len(&self) -> usize {
        self.text.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the text from byte offset `from` to the current end.
    pub fn read_from(&self, from: usize) -> String {
        match self.text.lock() {
            Ok(text) if from < text.len() => text[from..].to_string(),
            _ => String::new(),
        }
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// What kind of work a handle is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Completion,
    Transcription,
    Speech,
}

/// The single terminal message a worker posts.
pub enum TaskOutcome {
    /// Full response text on success.
    Completion(Result<String, ChatError>),
    /// Transcribed text on success.
    Transcription(Result<String, ChatError>),
    /// Synthesized audio bytes on success.
    Speech(Result<Vec<u8>, ChatError>),
}

impl TaskOutcome {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskOutcome::Completion(_) => TaskKind::Completion,
            TaskOutcome::Transcription(_) => TaskKind::Transcription,
            TaskOutcome::Speech(_) => TaskKind::Speech,
        }
    }
}

/// Foreground-owned handle to one in-flight background task.
pub struct TaskHandle {
    kind: TaskKind,
    receiver: Receiver<TaskOutcome>,
    join: Option<JoinHandle<()>>,
    cancel: CancelToken,
    response: Arc<ResponseBuffer>,
    done: bool,
}

impl TaskHandle {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn response(&self) -> &Arc<ResponseBuffer> {
        &self.response
    }

    /// Non-blocking check for the terminal message. Joins the worker thread
    /// once the message arrives or the channel is gone; after the outcome
    /// has been delivered once, every further poll returns `None`.
    pub fn poll(&mut self) -> Option<TaskOutcome> {
        if self.done {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(outcome) => {
                self.done = true;
                self.join_worker();
                Some(outcome)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                // The worker panicked before sending anything.
                self.done = true;
                self.join_worker();
                let err = ChatError::Internal("worker exited without posting an outcome".into());
                Some(match self.kind {
                    TaskKind::Completion => TaskOutcome::Completion(Err(err)),
                    TaskKind::Transcription => TaskOutcome::Transcription(Err(err)),
                    TaskKind::Speech => TaskOutcome::Speech(Err(err)),
                })
            }
        }
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        // Closing a session mid-request: tell the worker to stop at its
        // next chunk and let the thread finish on its own.
        self.cancel.cancel();
        if let Some(handle) = self.join.take() {
            drop(handle);
        }
    }
}

/// Spawn a worker thread running `work` and return its foreground handle.
pub(crate) fn start_task(
    kind: TaskKind,
    work: impl FnOnce(&CancelToken, &ResponseBuffer) -> TaskOutcome + Send + 'static,
) -> TaskHandle {
    let cancel = CancelToken::new();
    let response = Arc::new(ResponseBuffer::default());
    let (sender, receiver) = mpsc::sync_channel(1);
    let worker_cancel = cancel.clone();
    let worker_response = Arc::clone(&response);
    let join = std::thread::spawn(move || {
        let outcome = work(&worker_cancel, &worker_response);
        // The foreground may have dropped the handle; nothing to do then.
        let _ = sender.send(outcome);
    });
    TaskHandle {
        kind,
        receiver,
        join: Some(join),
        cancel,
        response,
        done: false,
    }
}

/// Dispatch a chat completion. Streamed deltas land in the handle's
/// [`ResponseBuffer`] in arrival order; the buffer is sealed before the
/// terminal message is posted.
pub fn start_completion(
    client: Arc<dyn ProviderClient>,
    request: CompletionRequest,
) -> TaskHandle {
    start_task(TaskKind::Completion, move |cancel, response| {
        let result = client.complete(&request, &mut |delta| {
            response.push(delta);
            !cancel.is_cancelled()
        });
        response.finish();
        if let Err(err) = &result {
            tracing::warn!(%err, model = %request.model_id, "completion failed");
        }
        TaskOutcome::Completion(result)
    })
}

pub fn start_transcription(
    client: Arc<dyn ProviderClient>,
    request: TranscriptionRequest,
) -> TaskHandle {
    start_task(TaskKind::Transcription, move |_cancel, _response| {
        let result = client.transcribe(&request);
        if let Err(err) = &result {
            tracing::warn!(%err, "transcription failed");
        }
        TaskOutcome::Transcription(result)
    })
}

pub fn start_speech(client: Arc<dyn ProviderClient>, request: SpeechRequest) -> TaskHandle {
    start_task(TaskKind::Speech, move |_cancel, _response| {
        let result = client.synthesize(&request);
        if let Err(err) = &result {
            tracing::warn!(%err, "speech synthesis failed");
        }
        TaskOutcome::Speech(result)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ProviderAuth;
    use crate::registry::{Model, Provider};
    use std::time::Duration;

    struct ScriptedClient {
        deltas: Vec<&'static str>,
        fail: Option<ChatError>,
    }

    impl ProviderClient for ScriptedClient {
        fn complete(
            &self,
            _request: &CompletionRequest,
            sink: crate::provider::DeltaSink<'_>,
        ) -> Result<String, ChatError> {
            if let Some(err) = &self.fail {
                return Err(err.clone());
            }
            let mut text = String::new();
            for delta in &self.deltas {
                text.push_str(delta);
                if !sink(delta) {
                    break;
                }
            }
            Ok(text)
        }

        fn transcribe(&self, _request: &TranscriptionRequest) -> Result<String, ChatError> {
            Ok("transcribed".into())
        }

        fn synthesize(&self, _request: &SpeechRequest) -> Result<Vec<u8>, ChatError> {
            Ok(vec![1, 2, 3])
        }

        fn list_models(
            &self,
            _provider: Provider,
            _auth: &ProviderAuth,
        ) -> Result<Vec<Model>, ChatError> {
            Ok(Vec::new())
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            provider: Provider::OpenAi,
            auth: ProviderAuth {
                api_key: "sk".into(),
                organization_key: None,
            },
            model_id: "gpt-3.5-turbo".into(),
            messages: vec![],
            temperature: 1.0,
            top_p: 1.0,
            max_tokens: 16,
            stream: true,
        }
    }

    fn wait_for_outcome(handle: &mut TaskHandle) -> TaskOutcome {
        for _ in 0..200 {
            if let Some(outcome) = handle.poll() {
                return outcome;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("worker never posted an outcome");
    }

    #[test]
    fn completion_publishes_deltas_then_one_terminal_message() {
        let client = Arc::new(ScriptedClient {
            deltas: vec!["Hi ", "there"],
            fail: None,
        });
        let mut handle = start_completion(client, request());
        let outcome = wait_for_outcome(&mut handle);
        assert_eq!(outcome.kind(), TaskKind::Completion);
        match outcome {
            TaskOutcome::Completion(Ok(text)) => assert_eq!(text, "Hi there"),
            _ => panic!("expected success"),
        }
        assert!(handle.response().is_finished());
        assert_eq!(handle.response().read_from(0), "Hi there");
        assert_eq!(handle.response().read_from(3), "there");
        assert!(handle.poll().is_none());
    }

    #[test]
    fn failed_completion_still_seals_the_buffer() {
        let client = Arc::new(ScriptedClient {
            deltas: vec![],
            fail: Some(ChatError::Connection("refused".into())),
        });
        let mut handle = start_completion(client, request());
        match wait_for_outcome(&mut handle) {
            TaskOutcome::Completion(Err(ChatError::Connection(msg))) => {
                assert_eq!(msg, "refused")
            }
            _ => panic!("expected connection error"),
        }
        assert!(handle.response().is_finished());
        assert!(handle.response().is_empty());
    }

    #[test]
    fn transcription_and_speech_post_typed_outcomes() {
        let client: Arc<dyn ProviderClient> = Arc::new(ScriptedClient {
            deltas: vec![],
            fail: None,
        });
        let mut handle = start_transcription(
            Arc::clone(&client),
            TranscriptionRequest {
                provider: Provider::OpenAi,
                auth: ProviderAuth {
                    api_key: "sk".into(),
                    organization_key: None,
                },
                audio_path: "does-not-matter.wav".into(),
                response_format: "json".into(),
            },
        );
        match wait_for_outcome(&mut handle) {
            TaskOutcome::Transcription(Ok(text)) => assert_eq!(text, "transcribed"),
            _ => panic!("expected transcription"),
        }

        let mut handle = start_speech(
            client,
            SpeechRequest {
                provider: Provider::OpenAi,
                auth: ProviderAuth {
                    api_key: "sk".into(),
                    organization_key: None,
                },
                text: "hello".into(),
                voice: "nova".into(),
                model: "tts-1".into(),
            },
        );
        match wait_for_outcome(&mut handle) {
            TaskOutcome::Speech(Ok(bytes)) => assert_eq!(bytes, vec![1, 2, 3]),
            _ => panic!("expected speech"),
        }
    }

    #[test]
    fn cancel_stops_delta_consumption() {
        let client = Arc::new(ScriptedClient {
            deltas: vec!["a", "b", "c"],
            fail: None,
        });
        let mut handle = start_completion(client, request());
        handle.cancel();
        // The worker observes the flag at its next chunk boundary and
        // still posts a terminal message.
        let _ = wait_for_outcome(&mut handle);
        assert!(handle.response().is_finished());
    }
}
