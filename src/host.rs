//! Contract with the hosting screen reader.
//!
//! The session never talks to speech, braille, sounds, or the clipboard
//! directly; everything user-facing goes through this trait so the core can
//! be driven entirely by scripted doubles in tests.

/// Audible cues for chat lifecycle events. Whether each one actually plays
/// is governed by [`crate::config::FeedbackSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Earcon {
    RequestSent,
    /// Still waiting: no stream delta for a while.
    ResponsePending,
    ResponseReceived,
    Progress,
    RecordStart,
    RecordStop,
}

/// Services the host platform provides to the conversation core.
pub trait HostServices {
    /// Speak `text` through the screen reader's speech channel.
    fn speak(&mut self, text: &str);

    /// Mirror `text` on the braille display.
    fn braille(&mut self, text: &str);

    /// Move user focus to the transcript view.
    fn focus_transcript(&mut self);

    /// Move user focus to the model selector (corrective hint on
    /// context-length errors).
    fn focus_model_selector(&mut self);

    /// Caret offset inside the transcript view, in bytes.
    fn cursor_offset(&mut self) -> usize;

    fn copy_to_clipboard(&mut self, text: &str);

    fn open_url(&mut self, url: &str);

    fn play_earcon(&mut self, earcon: Earcon);

    /// Play synthesized speech audio returned by the provider.
    fn play_audio(&mut self, bytes: &[u8]);

    /// Blocking, dismissible error notification. `url` is an optional
    /// clickable follow-up extracted from the provider message.
    fn notify_error(&mut self, message: &str, url: Option<&str>);
}
