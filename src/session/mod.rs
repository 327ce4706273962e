//! One open conversation: prompt state, history, the active worker slot,
//! and the incremental renderer.
//!
//! The session is foreground-owned. Background workers only ever write the
//! shared response buffer and post one terminal outcome; `tick` runs on the
//! host's ~100ms timer, moves newly arrived text into the segment model,
//! and drives speech, braille, and earcons for the delta only.

use crate::attachment::{attach, Attachment, ImageOps};
use crate::audio::{write_wav, Recorder};
use crate::config::{Settings, SessionDefaults, TOP_P_MAX, TOP_P_MIN};
use crate::credentials::CredentialStore;
use crate::error::ChatError;
use crate::history::{History, NavDirection, TurnId, TurnParams, TurnSegments, TurnUnit};
use crate::host::{Earcon, HostServices};
use crate::provider::{CompletionRequest, ProviderClient, SpeechRequest, TranscriptionRequest};
use crate::registry::{ModelRegistry, Provider};
use crate::segment::TranscriptBuffer;
use crate::worker::{self, TaskHandle, TaskKind, TaskOutcome};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

mod registry;


pub use registry::{SessionId, SessionRegistry};

const PROMPT_LABEL: &str = "You: ";
const RESPONSE_LABEL: &str = "Assistant: ";
const IDLE_CUE_AFTER: Duration = Duration::from_secs(4);
const PROGRESS_CUE_EVERY: Duration = Duration::from_secs(1);

/// Sentence boundaries at which buffered speech is flushed, so the screen
/// reader speaks whole clauses instead of token fragments.
const SPEECH_BREAKS: [&str; 5] = ["\n", ". ", "? ", "! ", ": "];

/// Foreground bookkeeping for the one in-flight completion turn.
struct ActiveTurn {
    id: TurnId,
    /// Bytes of the worker's response buffer already consumed.
    consumed: usize,
    /// Set once the first visible (non-whitespace) text has been rendered.
    segments: Option<TurnSegments>,
    speech_buffer: String,
    last_growth: Instant,
    idle_cue_played: bool,
    last_progress_cue: Instant,
}

impl ActiveTurn {
    fn new(id: TurnId) -> Self {
        let now = Instant::now();
        Self {
            id,
            consumed: 0,
            segments: None,
            speech_buffer: String::new(),
            last_growth: now,
            idle_cue_played: false,
            last_progress_cue: now,
        }
    }
}

/// What the user currently has typed and attached, restored on failure.
#[derive(Debug, Default)]
struct PromptState {
    text: String,
    attachments: Vec<Attachment>,
}

pub struct Session {
    settings: Settings,
    defaults: SessionDefaults,
    defaults_path: PathBuf,
    registry: ModelRegistry,
    credentials: CredentialStore,
    client: Arc<dyn ProviderClient>,
    image_ops: Box<dyn ImageOps>,

    history: History,
    buffer: TranscriptBuffer<TurnId>,

    prompt: PromptState,
    system_prompt: String,
    provider: Provider,
    model_id: String,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,

    task: Option<TaskHandle>,
    active: Option<ActiveTurn>,
    recording_stop: Option<Arc<AtomicBool>>,
    last_prompt: String,
    temp_files: Vec<PathBuf>,
    idle_cue_after: Duration,
}

impl Session {
    pub fn open(
        settings: Settings,
        client: Arc<dyn ProviderClient>,
        image_ops: Box<dyn ImageOps>,
        data_dir: PathBuf,
    ) -> Self {
        let defaults_path = data_dir.join("data.json");
        let defaults = SessionDefaults::load(&defaults_path);
        let credentials = CredentialStore::new(&data_dir);
        let registry = ModelRegistry::new();

        let model_id = settings.default_model.clone();
        let model = registry.find(&model_id).cloned();
        let temperature = defaults
            .temperature(&model_id)
            .or(model.as_ref().map(|m| m.default_temperature))
            .unwrap_or(1.0);
        let max_tokens = defaults
            .max_tokens(&model_id)
            .or(model.as_ref().map(|m| m.suggested_max_tokens()))
            .unwrap_or(1024);
        let system_prompt = if settings.save_system {
            defaults.system.clone().unwrap_or_default()
        } else {
            String::new()
        };
        let top_p = settings.top_p;

        Self {
            settings,
            defaults,
            defaults_path,
            registry,
            credentials,
            client,
            image_ops,
            history: History::new(),
            buffer: TranscriptBuffer::new(),
            prompt: PromptState::default(),
            system_prompt,
            provider: model
                .as_ref()
                .map(|m| m.provider)
                .unwrap_or(Provider::OpenAi),
            model_id,
            temperature,
            top_p,
            max_tokens,
            task: None,
            active: None,
            recording_stop: None,
            last_prompt: String::new(),
            temp_files: Vec::new(),
            idle_cue_after: IDLE_CUE_AFTER,
        }
    }

    // --- accessors -------------------------------------------------------

    pub fn transcript_text(&self) -> &str {
        self.buffer.text()
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt.text
    }

    pub fn set_prompt(&mut self, text: impl Into<String>) {
        self.prompt.text = text.into();
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn set_system_prompt(&mut self, text: impl Into<String>) {
        self.system_prompt = text.into();
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.prompt.attachments
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn credentials_mut(&mut self) -> &mut CredentialStore {
        &mut self.credentials
    }

    pub fn is_busy(&self) -> bool {
        self.task.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.recording_stop.is_some()
    }

    /// Select a model, pulling remembered or suggested parameters for it.
    pub fn select_model(&mut self, model_id: &str) -> Result<(), ChatError> {
        let model = self
            .registry
            .find(model_id)
            .ok_or_else(|| ChatError::Internal(format!("unknown model '{model_id}'")))?
            .clone();
        self.provider = model.provider;
        self.model_id = model.id.clone();
        self.temperature = self
            .defaults
            .temperature(&model.id)
            .unwrap_or(model.default_temperature);
        self.max_tokens = self
            .defaults
            .max_tokens(&model.id)
            .unwrap_or_else(|| model.suggested_max_tokens());
        Ok(())
    }

    pub fn set_temperature(&mut self, value: f64) {
        self.temperature = value;
    }

    pub fn set_top_p(&mut self, value: f64) {
        self.top_p = value;
    }

    pub fn set_max_tokens(&mut self, value: u32) {
        self.max_tokens = value.max(1);
    }

    /// Toggle whether prior turns are sent as context with each request.
    pub fn set_conversation_mode(&mut self, on: bool) {
        self.settings.conversation_mode = on;
    }

    /// Populate the dynamic part of the model catalog for providers that
    /// publish a listing. No-op without credentials.
    pub fn refresh_models(&mut self, provider: Provider) {
        let Some(auth) = self.credentials.auth_for(provider) else {
            return;
        };
        let client = Arc::clone(&self.client);
        self.registry
            .extend_from(provider, || client.list_models(provider, &auth));
    }

    // --- attachments -----------------------------------------------------

    /// Attach an image by path or URL. Switches to the configured vision
    /// model when the current one cannot see.
    pub fn add_attachment(&mut self, input: &str, description: &str) -> Result<(), ChatError> {
        // Duplicates are checked against the pending list and every prior
        // turn: re-attaching an image already in the conversation is a
        // mistake worth flagging.
        let mut existing = self.prompt.attachments.clone();
        for id in self.history.iter() {
            if let Some(turn) = self.history.get(id) {
                existing.extend(turn.attachments.iter().cloned());
            }
        }
        let attachment = attach(input, description, &existing, self.image_ops.as_ref())?;
        self.prompt.attachments.push(attachment);
        self.switch_to_vision_model_if_needed();
        Ok(())
    }

    /// Attach a screenshot temp file; it is deleted when the session closes.
    pub fn add_screenshot(&mut self, path: PathBuf, description: &str) -> Result<(), ChatError> {
        let input = path.to_string_lossy().into_owned();
        self.add_attachment(&input, description)?;
        self.temp_files.push(path);
        Ok(())
    }

    pub fn remove_attachment(&mut self, index: usize) -> Option<Attachment> {
        if index < self.prompt.attachments.len() {
            Some(self.prompt.attachments.remove(index))
        } else {
            None
        }
    }

    fn switch_to_vision_model_if_needed(&mut self) {
        let current_sees = self
            .registry
            .find(&self.model_id)
            .map(|m| m.supports_vision)
            .unwrap_or(false);
        if current_sees {
            return;
        }
        let vision_id = self.settings.default_vision_model.clone();
        let is_vision = self
            .registry
            .find(&vision_id)
            .map(|m| m.supports_vision)
            .unwrap_or(false);
        if is_vision {
            tracing::debug!(from = %self.model_id, to = %vision_id, "switching to vision model");
            let _ = self.select_model(&vision_id);
        }
    }

    // --- submission ------------------------------------------------------

    /// Validate and dispatch the current prompt. `Ok(false)` is a quiet
    /// no-op (nothing to send, or a worker is already active); `Err` is a
    /// validation failure the host should announce. Nothing in the session
    /// is mutated unless the request is actually dispatched.
    pub fn submit(&mut self, host: &mut dyn HostServices) -> Result<bool, ChatError> {
        if self.task.is_some() {
            return Ok(false);
        }
        let has_attachments = !self.prompt.attachments.is_empty();
        if self.prompt.text.trim().is_empty() && !has_attachments {
            return Ok(false);
        }

        let model = self
            .registry
            .find(&self.model_id)
            .ok_or_else(|| ChatError::Internal(format!("unknown model '{}'", self.model_id)))?
            .clone();
        if has_attachments && !model.supports_vision {
            return Err(ChatError::ModelCapabilityMismatch(format!(
                "{} cannot describe images; use one of: {}",
                model.display_name,
                self.registry.vision_model_ids().join(", ")
            )));
        }
        if model.supports_vision && !has_attachments && !self.settings.conversation_mode {
            return Err(ChatError::ModelCapabilityMismatch(format!(
                "{} expects at least one image",
                model.display_name
            )));
        }
        if !(0.0..=model.max_temperature).contains(&self.temperature) {
            return Err(ChatError::InvalidParameter {
                name: "temperature",
                value: self.temperature,
                min: 0.0,
                max: model.max_temperature,
            });
        }
        if !(TOP_P_MIN..=TOP_P_MAX).contains(&self.top_p) {
            return Err(ChatError::InvalidParameter {
                name: "top_p",
                value: self.top_p,
                min: TOP_P_MIN,
                max: TOP_P_MAX,
            });
        }
        let auth = self
            .credentials
            .auth_for(model.provider)
            .ok_or_else(|| ChatError::NoCredential {
                provider: model.provider.label().to_string(),
            })?;

        let prompt_text = if self.prompt.text.trim().is_empty() {
            self.settings.image_description_prompt().to_string()
        } else {
            self.prompt.text.clone()
        };
        let system = (!self.system_prompt.trim().is_empty()).then(|| self.system_prompt.clone());
        let messages = self.history.build_messages(
            self.settings.conversation_mode,
            system.as_deref(),
            &prompt_text,
            &self.prompt.attachments,
            &self.settings.images,
            self.image_ops.as_ref(),
        )?;

        let params = TurnParams {
            model_id: model.id.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stream: self.settings.stream,
        };
        let turn = self.history.new_turn(
            system,
            prompt_text,
            self.prompt.attachments.clone(),
            params,
        );
        self.history.mark_in_flight(turn)?;

        let request = CompletionRequest {
            provider: model.provider,
            auth,
            model_id: model.id.clone(),
            messages,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stream: self.settings.stream,
        };
        if self.settings.log_content {
            tracing::debug!(model = %model.id, prompt = %self.prompt.text, "dispatching completion");
        } else {
            tracing::debug!(model = %model.id, "dispatching completion");
        }
        self.task = Some(worker::start_completion(Arc::clone(&self.client), request));
        self.active = Some(ActiveTurn::new(turn));
        if self.settings.feedback.sound_request_sent {
            host.play_earcon(Earcon::RequestSent);
        }
        Ok(true)
    }

    // --- rendering tick --------------------------------------------------

    /// Foreground timer callback. Renders newly arrived response text and
    /// resolves finished workers.
    pub fn tick(&mut self, host: &mut dyn HostServices) {
        if self.task.is_none() {
            return;
        }
        if matches!(self.task.as_ref().map(TaskHandle::kind), Some(TaskKind::Completion)) {
            self.render_active(host);
        }
        let outcome = match self.task.as_mut() {
            Some(task) => task.poll(),
            None => None,
        };
        if let Some(outcome) = outcome {
            if matches!(outcome, TaskOutcome::Completion(Ok(_))) {
                // The buffer is sealed before the terminal message, so one
                // more pass picks up any tail that arrived after the render
                // above.
                self.render_active(host);
            }
            self.resolve_outcome(outcome, host);
        }
    }

    fn render_active(&mut self, host: &mut dyn HostServices) {
        let Some(task) = self.task.as_ref() else {
            return;
        };
        let response = Arc::clone(task.response());
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let mut delta = response.read_from(active.consumed);
        if active.segments.is_none() {
            // Left-strip incidental leading whitespace before the first
            // segment exists.
            let trimmed = delta.trim_start();
            let skipped = delta.len() - trimmed.len();
            active.consumed += skipped;
            delta = trimmed.to_string();
        }
        if delta.is_empty() {
            self.cue_waiting(host, response.is_finished());
            return;
        }

        let turn_id = active.id;
        active.consumed += delta.len();
        active.last_growth = Instant::now();
        active.idle_cue_played = false;

        if active.segments.is_none() {
            let segments = self.materialize_segments(turn_id);
            if let Some(active) = self.active.as_mut() {
                active.segments = Some(segments);
            }
            let _ = self.history.mark_streaming(turn_id);
            if self.settings.feedback.braille_auto_focus {
                host.focus_transcript();
            }
        }

        if let Some(segments) = self.active.as_ref().and_then(|a| a.segments) {
            if let Err(err) = self.buffer.extend(segments.response_body, &delta) {
                tracing::error!(%err, "failed to extend response segment");
            }
        }
        let _ = self.history.append_response(turn_id, &delta);

        host.braille(&delta);
        if self.settings.feedback.speech_response_received {
            if let Some(active) = self.active.as_mut() {
                active.speech_buffer.push_str(&delta);
                for chunk in drain_speakable(&mut active.speech_buffer) {
                    host.speak(&chunk);
                }
            }
        }
    }

    /// Audible cues while waiting: a periodic progress tick before any text
    /// has arrived, and a one-shot "still working" cue when a stream goes
    /// quiet.
    fn cue_waiting(&mut self, host: &mut dyn HostServices, finished: bool) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if finished {
            return;
        }
        let now = Instant::now();
        if active.segments.is_none() {
            if self.settings.feedback.sound_progress
                && now.duration_since(active.last_progress_cue) >= PROGRESS_CUE_EVERY
            {
                active.last_progress_cue = now;
                host.play_earcon(Earcon::Progress);
            }
            return;
        }
        if !active.idle_cue_played
            && now.duration_since(active.last_growth) >= self.idle_cue_after
        {
            active.idle_cue_played = true;
            if self.settings.feedback.sound_response_pending {
                host.play_earcon(Earcon::ResponsePending);
            }
        }
    }

    fn materialize_segments(&mut self, turn: TurnId) -> TurnSegments {
        let prompt_text = self
            .history
            .get(turn)
            .map(|t| t.user_prompt.clone())
            .unwrap_or_default();
        let break_line = self.buffer.append(if self.buffer.is_empty() { "" } else { "\n" }, turn);
        let segments = TurnSegments {
            break_line,
            prompt_label: self.buffer.append(PROMPT_LABEL, turn),
            prompt_body: self.buffer.append(&format!("{prompt_text}\n"), turn),
            response_label: self.buffer.append(RESPONSE_LABEL, turn),
            response_body: self.buffer.append("", turn),
        };
        let _ = self.history.set_segments(turn, segments);
        segments
    }

    fn resolve_outcome(&mut self, outcome: TaskOutcome, host: &mut dyn HostServices) {
        self.task = None;
        self.recording_stop = None;
        match outcome {
            TaskOutcome::Completion(Ok(_)) => self.finish_completion(host),
            TaskOutcome::Completion(Err(err)) => self.fail_completion(err, host),
            TaskOutcome::Transcription(Ok(text)) => {
                if !self.prompt.text.is_empty() && !self.prompt.text.ends_with(' ') {
                    self.prompt.text.push(' ');
                }
                self.prompt.text.push_str(text.trim());
                host.speak(text.trim());
            }
            TaskOutcome::Transcription(Err(err)) => self.notify(&err, host),
            TaskOutcome::Speech(Ok(bytes)) => host.play_audio(&bytes),
            TaskOutcome::Speech(Err(err)) => self.notify(&err, host),
        }
    }

    fn finish_completion(&mut self, host: &mut dyn HostServices) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        let turn = active.id;
        // An entirely empty (or whitespace-only) response still becomes a
        // visible, navigable turn.
        if active.segments.is_none() {
            let segments = self.materialize_segments(turn);
            active.segments = Some(segments);
        }
        if !active.speech_buffer.is_empty() && self.settings.feedback.speech_response_received {
            host.speak(&active.speech_buffer);
        }
        if let Err(err) = self.history.complete(turn) {
            tracing::error!(%err, "failed to seal turn");
            return;
        }
        self.last_prompt = std::mem::take(&mut self.prompt.text);
        self.prompt.attachments.clear();
        self.remember_model_params();
        if self.settings.feedback.sound_response_received {
            host.play_earcon(Earcon::ResponseReceived);
        }
        tracing::debug!(turns = self.history.len(), "turn completed");
    }

    fn fail_completion(&mut self, err: ChatError, host: &mut dyn HostServices) {
        if let Some(active) = self.active.take() {
            if let Err(discard_err) = self.history.discard_failed(active.id, &mut self.buffer) {
                tracing::error!(%discard_err, "failed to discard turn");
            }
        }
        // The prompt and attachments are untouched so the user can retry.
        self.notify(&err, host);
        if err.is_context_length() {
            host.focus_model_selector();
        }
    }

    fn notify(&mut self, err: &ChatError, host: &mut dyn HostServices) {
        tracing::warn!(%err, "surfacing error");
        let url = err.embedded_url();
        host.notify_error(&err.to_string(), url.as_deref());
    }

    fn remember_model_params(&mut self) {
        self.defaults.set_max_tokens(&self.model_id, self.max_tokens);
        self.defaults.set_temperature(&self.model_id, self.temperature);
    }

    // --- recording / transcription / speech ------------------------------

    /// Start or stop microphone capture. Stopping hands the recording to
    /// the transcription endpoint; the resulting text lands in the prompt.
    pub fn toggle_recording(&mut self, host: &mut dyn HostServices) -> Result<bool, ChatError> {
        if let Some(stop) = &self.recording_stop {
            stop.store(true, Ordering::Relaxed);
            if self.settings.feedback.sound_record {
                host.play_earcon(Earcon::RecordStop);
            }
            return Ok(false);
        }
        if self.task.is_some() {
            return Ok(false);
        }
        let auth = self
            .credentials
            .auth_for(self.provider)
            .ok_or_else(|| ChatError::NoCredential {
                provider: self.provider.label().to_string(),
            })?;
        let stop = Arc::new(AtomicBool::new(false));
        self.recording_stop = Some(Arc::clone(&stop));

        let client = Arc::clone(&self.client);
        let provider = self.provider;
        let sample_rate = self.settings.record_sample_rate;
        let max_duration = Duration::from_secs(self.settings.max_record_secs);
        let response_format = self.settings.audio_response_format.clone();
        self.task = Some(worker::start_task(TaskKind::Transcription, move |cancel, _| {
            let result = capture_and_transcribe(
                client.as_ref(),
                provider,
                auth,
                &stop,
                cancel,
                max_duration,
                sample_rate,
                response_format,
            );
            TaskOutcome::Transcription(result)
        }));
        if self.settings.feedback.sound_record {
            host.play_earcon(Earcon::RecordStart);
        }
        Ok(true)
    }

    /// Transcribe an existing audio file into the prompt.
    pub fn transcribe_file(&mut self, path: PathBuf) -> Result<bool, ChatError> {
        if self.task.is_some() {
            return Ok(false);
        }
        let auth = self
            .credentials
            .auth_for(self.provider)
            .ok_or_else(|| ChatError::NoCredential {
                provider: self.provider.label().to_string(),
            })?;
        let request = TranscriptionRequest {
            provider: self.provider,
            auth,
            audio_path: path,
            response_format: self.settings.audio_response_format.clone(),
        };
        self.task = Some(worker::start_transcription(Arc::clone(&self.client), request));
        Ok(true)
    }

    /// Speak `text` through the provider's TTS voice.
    pub fn vocalize(&mut self, text: &str) -> Result<bool, ChatError> {
        if self.task.is_some() || text.trim().is_empty() {
            return Ok(false);
        }
        let auth = self
            .credentials
            .auth_for(self.provider)
            .ok_or_else(|| ChatError::NoCredential {
                provider: self.provider.label().to_string(),
            })?;
        let request = SpeechRequest {
            provider: self.provider,
            auth,
            text: text.to_string(),
            voice: self.settings.tts_voice.clone(),
            model: self.settings.tts_model.clone(),
        };
        self.task = Some(worker::start_speech(Arc::clone(&self.client), request));
        Ok(true)
    }

    // --- turn navigation and reuse ---------------------------------------

    fn unit_at_cursor(&mut self, host: &mut dyn HostServices) -> Option<TurnUnit> {
        let offset = host.cursor_offset();
        let segment = self.buffer.locate(offset)?;
        let turn = self.buffer.owner(segment)?;
        self.history.unit_of_segment(turn, segment)
    }

    fn unit_text(&self, unit: TurnUnit) -> Option<String> {
        let segments = self.history.get(unit.turn)?.segments()?;
        let body = match unit.part {
            crate::history::TurnPart::Prompt => segments.prompt_body,
            crate::history::TurnPart::Response => segments.response_body,
        };
        Some(self.buffer.read(body).trim_end().to_string())
    }

    /// Speak and return the adjacent logical unit; speaks a boundary notice
    /// at the ends of the chain.
    pub fn navigate(
        &mut self,
        direction: NavDirection,
        host: &mut dyn HostServices,
    ) -> Option<TurnUnit> {
        let from = self.unit_at_cursor(host)?;
        match self.history.navigate(from, direction) {
            Some(unit) => {
                if let Some(text) = self.unit_text(unit) {
                    host.speak(&text);
                }
                Some(unit)
            }
            None => {
                host.speak(match direction {
                    NavDirection::Backward => "Top of conversation",
                    NavDirection::Forward => "Bottom of conversation",
                });
                None
            }
        }
    }

    /// Speak the logical unit under the cursor.
    pub fn say_current(&mut self, host: &mut dyn HostServices) {
        if let Some(unit) = self.unit_at_cursor(host) {
            if let Some(text) = self.unit_text(unit) {
                host.speak(&text);
            }
        }
    }

    /// Copy the response text of the turn under the cursor.
    pub fn copy_response_at_cursor(&mut self, host: &mut dyn HostServices) -> bool {
        let Some(unit) = self.unit_at_cursor(host) else {
            return false;
        };
        let unit = TurnUnit {
            turn: unit.turn,
            part: crate::history::TurnPart::Response,
        };
        match self.unit_text(unit) {
            Some(text) if !text.is_empty() => {
                host.copy_to_clipboard(&text);
                host.speak("Copied");
                true
            }
            _ => false,
        }
    }

    /// Move the response under the cursor into the system prompt field.
    pub fn response_to_system_prompt(&mut self, host: &mut dyn HostServices) -> bool {
        let Some(unit) = self.unit_at_cursor(host) else {
            return false;
        };
        let unit = TurnUnit {
            turn: unit.turn,
            part: crate::history::TurnPart::Response,
        };
        match self.unit_text(unit) {
            Some(text) if !text.is_empty() => {
                self.system_prompt = text;
                host.speak("Copied to system prompt");
                true
            }
            _ => false,
        }
    }

    /// Move the prompt of the turn under the cursor back into the prompt
    /// field for editing and resubmission.
    pub fn prompt_to_prompt_field(&mut self, host: &mut dyn HostServices) -> bool {
        let Some(unit) = self.unit_at_cursor(host) else {
            return false;
        };
        let Some(turn) = self.history.get(unit.turn) else {
            return false;
        };
        self.prompt.text = turn.user_prompt.clone();
        host.speak("Prompt restored");
        true
    }

    /// Recall the last successfully submitted prompt.
    pub fn recall_previous_prompt(&mut self) -> bool {
        if self.last_prompt.is_empty() {
            return false;
        }
        self.prompt.text = self.last_prompt.clone();
        true
    }

    /// Delete the turn under the cursor from history and the transcript.
    pub fn delete_turn_at_cursor(
        &mut self,
        host: &mut dyn HostServices,
    ) -> Result<bool, ChatError> {
        let Some(unit) = self.unit_at_cursor(host) else {
            return Ok(false);
        };
        if self.active.as_ref().map(|a| a.id) == Some(unit.turn) {
            return Ok(false);
        }
        self.history.delete_turn(unit.turn, &mut self.buffer)?;
        host.speak("Deleted");
        Ok(true)
    }

    /// Save the visible transcript to a file.
    pub fn save_transcript(&self, path: &std::path::Path) -> Result<(), ChatError> {
        fs::write(path, self.buffer.text())
            .map_err(|err| ChatError::Internal(format!("cannot write {}: {err}", path.display())))
    }

    // --- close -----------------------------------------------------------

    /// Close the session: cancel any worker, discard the in-flight turn,
    /// delete screenshot temp files, and flush remembered parameters.
    pub fn close(&mut self) {
        if let Some(stop) = self.recording_stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
        if let Some(task) = self.task.take() {
            task.cancel();
            drop(task);
        }
        if let Some(active) = self.active.take() {
            if let Err(err) = self.history.discard_failed(active.id, &mut self.buffer) {
                tracing::warn!(%err, "failed to discard in-flight turn on close");
            }
        }
        for path in self.temp_files.drain(..) {
            if let Err(err) = fs::remove_file(&path) {
                tracing::debug!(path = %path.display(), %err, "temp file already gone");
            }
        }
        if self.settings.save_system {
            self.defaults.system =
                (!self.system_prompt.trim().is_empty()).then(|| self.system_prompt.clone());
        }
        if let Err(err) = self.defaults.save(&self.defaults_path) {
            tracing::warn!(%err, "failed to persist session defaults");
        }
    }

    #[cfg(test)]
    pub(crate) fn set_idle_cue_after(&mut self, value: Duration) {
        self.idle_cue_after = value;
    }
}

/// Split off the longest prefix of `buffer` ending at a sentence boundary,
/// leaving the remainder buffered.
fn drain_speakable(buffer: &mut String) -> Vec<String> {
    let mut cut = 0usize;
    for brk in SPEECH_BREAKS {
        if let Some(pos) = buffer.rfind(brk) {
            cut = cut.max(pos + brk.len());
        }
    }
    if cut == 0 {
        return Vec::new();
    }
    let spoken: String = buffer.drain(..cut).collect();
    let trimmed = spoken.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

/// Worker-thread body for record-then-transcribe: capture until the stop
/// flag (or duration cap), spill to a temp WAV, upload it, clean up.
#[allow(clippy::too_many_arguments)]
fn capture_and_transcribe(
    client: &dyn ProviderClient,
    provider: Provider,
    auth: crate::credentials::ProviderAuth,
    stop: &Arc<AtomicBool>,
    cancel: &worker::CancelToken,
    max_duration: Duration,
    sample_rate: u32,
    response_format: String,
) -> Result<String, ChatError> {
    let recorder = Recorder::new(None).map_err(|err| ChatError::Internal(err.to_string()))?;
    let samples = recorder
        .record_until(stop, max_duration, sample_rate)
        .map_err(|err| ChatError::Internal(err.to_string()))?;
    if cancel.is_cancelled() {
        return Err(ChatError::Connection("recording abandoned".into()));
    }
    let path = std::env::temp_dir().join(format!(
        "voxchat_rec_{}.wav",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    ));
    write_wav(&path, &samples, sample_rate)
        .map_err(|err| ChatError::Internal(err.to_string()))?;
    let result = client.transcribe(&TranscriptionRequest {
        provider,
        auth,
        audio_path: path.clone(),
        response_format,
    });
    if let Err(err) = fs::remove_file(&path) {
        tracing::debug!(path = %path.display(), %err, "temp recording already gone");
    }
    result
}
