//! Conversation history: the turn chain and its state machine.
//!
//! A turn is one prompt/response pair. Turns live in an arena and are only
//! linked into the visible chain once their response completed; an in-flight
//! turn exists unlinked so a failure can discard it without History ever
//! having seen it. The arena index doubles as the owner tag on transcript
//! segments, which is what lets navigation answer "which turn is the cursor
//! in" from a segment handle alone.

use crate::attachment::{wire_url, Attachment, ImageOps};
use crate::config::ImageSettings;
use crate::error::ChatError;
use crate::segment::{SegmentId, TranscriptBuffer};
use serde_json::{json, Value};


/// Stable handle to one turn. Doubles as the segment owner tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnId(usize);

/// Lifecycle of a turn's request. `Failed` turns are never linked into the
/// chain; `Complete` is terminal and monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Pending,
    InFlight,
    Streaming,
    Complete,
    Failed,
}

/// Request parameters frozen at submit time.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnParams {
    pub model_id: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

/// The five transcript segments a rendered turn owns, in buffer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSegments {
    pub break_line: SegmentId,
    pub prompt_label: SegmentId,
    pub prompt_body: SegmentId,
    pub response_label: SegmentId,
    pub response_body: SegmentId,
}

impl TurnSegments {
    pub fn all(&self) -> [SegmentId; 5] {
        [
            self.break_line,
            self.prompt_label,
            self.prompt_body,
            self.response_label,
            self.response_body,
        ]
    }
}

/// Which half of a turn a segment (or the cursor) addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPart {
    Prompt,
    Response,
}

/// One logical unit for navigation: a specific half of a specific turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnUnit {
    pub turn: TurnId,
    pub part: TurnPart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDirection {
    Backward,
    Forward,
}

#[derive(Debug)]
pub struct Turn {
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub attachments: Vec<Attachment>,
    pub params: TurnParams,
    response_text: String,
    response_finished: bool,
    state: TurnState,
    segments: Option<TurnSegments>,
    prev: Option<TurnId>,
    next: Option<TurnId>,
}

impl Turn {
    pub fn response_text(&self) -> &str {
        &self.response_text
    }

    pub fn response_finished(&self) -> bool {
        self.response_finished
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn segments(&self) -> Option<TurnSegments> {
        self.segments
    }
}

/// Arena of turns plus the head/tail of the completed chain.
#[derive(Debug, Default)]
pub struct History {
    slots: Vec<Option<Turn>>,
    free: Vec<usize>,
    head: Option<TurnId>,
    tail: Option<TurnId>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<TurnId> {
        self.head
    }

    pub fn tail(&self) -> Option<TurnId> {
        self.tail
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of turns linked into the chain.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.slots.get(id.0).and_then(|t| t.as_ref())
    }

    fn get_mut(&mut self, id: TurnId) -> Option<&mut Turn> {
        self.slots.get_mut(id.0).and_then(|t| t.as_mut())
    }

    fn require(&self, id: TurnId) -> Result<&Turn, ChatError> {
        self.get(id)
            .ok_or_else(|| ChatError::Internal(format!("stale turn id {}", id.0)))
    }

    fn require_mut(&mut self, id: TurnId) -> Result<&mut Turn, ChatError> {
        self.get_mut(id)
            .ok_or_else(|| ChatError::Internal(format!("stale turn id {}", id.0)))
    }

    /// Allocate a turn in `Pending` state, outside the chain.
    pub fn new_turn(
        &mut self,
        system_prompt: Option<String>,
        user_prompt: String,
        attachments: Vec<Attachment>,
        params: TurnParams,
    ) -> TurnId {
        let turn = Turn {
            system_prompt,
            user_prompt,
            attachments,
            params,
            response_text: String::new(),
            response_finished: false,
            state: TurnState::Pending,
            segments: None,
            prev: None,
            next: None,
        };
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(turn);
            TurnId(index)
        } else {
            self.slots.push(Some(turn));
            TurnId(self.slots.len() - 1)
        }
    }

    pub fn mark_in_flight(&mut self, id: TurnId) -> Result<(), ChatError> {
        let turn = self.require_mut(id)?;
        turn.state = TurnState::InFlight;
        Ok(())
    }

    pub fn mark_streaming(&mut self, id: TurnId) -> Result<(), ChatError> {
        let turn = self.require_mut(id)?;
        if turn.state == TurnState::InFlight {
            turn.state = TurnState::Streaming;
        }
        Ok(())
    }

    /// Append newly arrived response text. Empty deltas are a no-op.
    pub fn append_response(&mut self, id: TurnId, delta: &str) -> Result<(), ChatError> {
        if delta.is_empty() {
            return Ok(());
        }
        let turn = self.require_mut(id)?;
        turn.response_text.push_str(delta);
        Ok(())
    }

    /// Replace the full response in one shot (non-streaming path).
    pub fn set_response(&mut self, id: TurnId, text: String) -> Result<(), ChatError> {
        let turn = self.require_mut(id)?;
        turn.response_text = text;
        Ok(())
    }

    pub fn set_segments(&mut self, id: TurnId, segments: TurnSegments) -> Result<(), ChatError> {
        let turn = self.require_mut(id)?;
        turn.segments = Some(segments);
        Ok(())
    }

    /// Seal the turn and link it at the chain tail. The only way into the
    /// chain; failed turns never get here.
    pub fn complete(&mut self, id: TurnId) -> Result<(), ChatError> {
        let tail = self.tail;
        let turn = self.require_mut(id)?;
        turn.response_finished = true;
        turn.state = TurnState::Complete;
        turn.prev = tail;
        turn.next = None;
        match tail {
            Some(tail_id) => {
                if let Some(tail_turn) = self.get_mut(tail_id) {
                    tail_turn.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        Ok(())
    }

    /// Mark the turn failed and drop it from the arena, deleting any
    /// segments it already materialized. History is left untouched.
    pub fn discard_failed(
        &mut self,
        id: TurnId,
        buffer: &mut TranscriptBuffer<TurnId>,
    ) -> Result<(), ChatError> {
        let turn = self.require_mut(id)?;
        turn.state = TurnState::Failed;
        if let Some(segments) = turn.segments.take() {
            for segment in segments.all() {
                buffer.delete(segment)?;
            }
        }
        self.slots[id.0] = None;
        self.free.push(id.0);
        Ok(())
    }

    /// Excise a completed turn: its segments leave the buffer, its
    /// neighbors are relinked, its slot is freed.
    pub fn delete_turn(
        &mut self,
        id: TurnId,
        buffer: &mut TranscriptBuffer<TurnId>,
    ) -> Result<(), ChatError> {
        let turn = self.require(id)?;
        let (prev, next, segments) = (turn.prev, turn.next, turn.segments);

        if let Some(segments) = segments {
            for segment in segments.all() {
                buffer.delete(segment)?;
            }
        }
        match prev {
            Some(prev_id) => {
                if let Some(prev_turn) = self.get_mut(prev_id) {
                    prev_turn.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next_id) => {
                if let Some(next_turn) = self.get_mut(next_id) {
                    next_turn.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        self.slots[id.0] = None;
        self.free.push(id.0);
        Ok(())
    }

    /// Linked turns, head to tail.
    pub fn iter(&self) -> impl Iterator<Item = TurnId> + '_ {
        let mut walk = self.head;
        std::iter::from_fn(move || {
            let id = walk?;
            walk = self.get(id)?.next;
            Some(id)
        })
    }

    /// Which half of its turn a segment belongs to. Labels count as part of
    /// the half they introduce; the break line belongs to the prompt half.
    pub fn unit_of_segment(&self, id: TurnId, segment: SegmentId) -> Option<TurnUnit> {
        let segments = self.get(id)?.segments?;
        let part = if segment == segments.response_label || segment == segments.response_body {
            TurnPart::Response
        } else {
            TurnPart::Prompt
        };
        Some(TurnUnit { turn: id, part })
    }

    /// Adjacent logical unit in reading order, or `None` at a chain
    /// boundary.
    pub fn navigate(&self, from: TurnUnit, direction: NavDirection) -> Option<TurnUnit> {
        let turn = self.get(from.turn)?;
        match (direction, from.part) {
            (NavDirection::Forward, TurnPart::Prompt) => Some(TurnUnit {
                turn: from.turn,
                part: TurnPart::Response,
            }),
            (NavDirection::Forward, TurnPart::Response) => turn.next.map(|next| TurnUnit {
                turn: next,
                part: TurnPart::Prompt,
            }),
            (NavDirection::Backward, TurnPart::Response) => Some(TurnUnit {
                turn: from.turn,
                part: TurnPart::Prompt,
            }),
            (NavDirection::Backward, TurnPart::Prompt) => turn.prev.map(|prev| TurnUnit {
                turn: prev,
                part: TurnPart::Response,
            }),
        }
    }

    /// The `messages` array for a new request: system prompt, prior linked
    /// turns when `conversation_mode` is on (user and assistant message per
    /// turn, images re-embedded as sent, empty assistant responses skipped),
    /// then the new user message.
    pub fn build_messages(
        &self,
        conversation_mode: bool,
        system_prompt: Option<&str>,
        prompt: &str,
        attachments: &[Attachment],
        images: &ImageSettings,
        ops: &dyn ImageOps,
    ) -> Result<Vec<Value>, ChatError> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            messages.push(json!({ "role": "system", "content": system }));
        }
        if conversation_mode {
            for id in self.iter() {
                let turn = self.require(id)?;
                messages.push(user_message(
                    &turn.user_prompt,
                    &turn.attachments,
                    images,
                    ops,
                )?);
                if !turn.response_text.is_empty() {
                    messages.push(json!({
                        "role": "assistant",
                        "content": turn.response_text,
                    }));
                }
            }
        }
        messages.push(user_message(prompt, attachments, images, ops)?);
        Ok(messages)
    }

    /// Verify the chain links are mutually consistent.
    pub fn check_chain(&self) -> Result<(), ChatError> {
        let mut walk = self.head;
        let mut prev: Option<TurnId> = None;
        let mut visited = 0usize;
        while let Some(id) = walk {
            let turn = self.require(id)?;
            if turn.prev != prev {
                return Err(ChatError::Internal(format!(
                    "turn {} has a broken back link",
                    id.0
                )));
            }
            prev = Some(id);
            walk = turn.next;
            visited += 1;
            if visited > self.slots.len() {
                return Err(ChatError::Internal("turn chain contains a cycle".into()));
            }
        }
        if self.tail != prev {
            return Err(ChatError::Internal("tail does not match chain end".into()));
        }
        Ok(())
    }
}

/// A user message: plain string content without images, a content-part
/// array when images ride along.
fn user_message(
    text: &str,
    attachments: &[Attachment],
    images: &ImageSettings,
    ops: &dyn ImageOps,
) -> Result<Value, ChatError> {
    if attachments.is_empty() {
        return Ok(json!({ "role": "user", "content": text }));
    }
    let mut parts = vec![json!({ "type": "text", "text": text })];
    for attachment in attachments {
        let url = wire_url(attachment, images, ops)?;
        parts.push(json!({
            "type": "image_url",
            "image_url": { "url": url },
        }));
    }
    Ok(json!({ "role": "user", "content": parts }))
}
