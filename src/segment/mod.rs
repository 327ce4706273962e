//! Segment-addressable transcript buffer.
//!
//! The transcript the user reads is one flat string, but every logical unit
//! of conversation (a prompt label, a response body) needs a stable handle
//! that survives edits elsewhere in the buffer. Segments form a doubly
//! linked chain of non-overlapping ranges over the flat text, stored in an
//! arena and addressed by index, so deleting a turn in the middle is pure
//! index rewiring plus an offset shift.
//!
//! This module is pure data structure: no I/O, no concurrency. The cursor
//! lives in the host's text control; callers pass its reported offset in.

use crate::error::ChatError;

#[cfg(test)]
mod tests;

/// Stable handle to one segment in a [`TranscriptBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(usize);

#[derive(Debug, Clone)]
struct Segment<T> {
    start: usize,
    end: usize,
    owner: T,
    prev: Option<SegmentId>,
    next: Option<SegmentId>,
}

/// Flat text plus its segment chain. `T` tags each segment with the logical
/// unit that owns it (a turn id, in practice).
#[derive(Debug, Default)]
pub struct TranscriptBuffer<T> {
    text: String,
    slots: Vec<Option<Segment<T>>>,
    free: Vec<usize>,
    head: Option<SegmentId>,
    tail: Option<SegmentId>,
}

impl<T: Copy + PartialEq> TranscriptBuffer<T> {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head(&self) -> Option<SegmentId> {
        self.head
    }

    pub fn tail(&self) -> Option<SegmentId> {
        self.tail
    }

    fn slot(&self, id: SegmentId) -> Option<&Segment<T>> {
        self.slots.get(id.0).and_then(|s| s.as_ref())
    }

    fn slot_mut(&mut self, id: SegmentId) -> Option<&mut Segment<T>> {
        self.slots.get_mut(id.0).and_then(|s| s.as_mut())
    }

    fn require(&self, id: SegmentId) -> Result<&Segment<T>, ChatError> {
        self.slot(id)
            .ok_or_else(|| ChatError::Internal(format!("stale segment id {}", id.0)))
    }

    pub fn owner(&self, id: SegmentId) -> Option<T> {
        self.slot(id).map(|s| s.owner)
    }

    pub fn bounds(&self, id: SegmentId) -> Option<(usize, usize)> {
        self.slot(id).map(|s| (s.start, s.end))
    }

    pub fn prev(&self, id: SegmentId) -> Option<SegmentId> {
        self.slot(id).and_then(|s| s.prev)
    }

    pub fn next(&self, id: SegmentId) -> Option<SegmentId> {
        self.slot(id).and_then(|s| s.next)
    }

    /// Buffer slice covered by the segment. Empty for stale ids.
    pub fn read(&self, id: SegmentId) -> &str {
        match self.slot(id) {
            Some(s) => &self.text[s.start..s.end],
            None => "",
        }
    }

    fn alloc(&mut self, segment: Segment<T>) -> SegmentId {
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(segment);
            SegmentId(index)
        } else {
            self.slots.push(Some(segment));
            SegmentId(self.slots.len() - 1)
        }
    }

    /// Append `text` at the logical end of the buffer and link the new
    /// segment as the chain tail.
    pub fn append(&mut self, text: &str, owner: T) -> SegmentId {
        let start = self.text.len();
        self.text.push_str(text);
        let end = self.text.len();
        let id = self.alloc(Segment {
            start,
            end,
            owner,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => {
                if let Some(tail_segment) = self.slot_mut(tail) {
                    tail_segment.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        id
    }

    /// Insert `text` at the segment's current end, growing the segment and
    /// shifting every later segment right by the inserted length.
    pub fn extend(&mut self, id: SegmentId, text: &str) -> Result<(), ChatError> {
        if text.is_empty() {
            return Ok(());
        }
        let end = self.require(id)?.end;
        self.text.insert_str(end, text);
        let delta = text.len();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(segment) = slot.as_mut() else {
                continue;
            };
            if index == id.0 {
                segment.end += delta;
            } else if segment.start >= end {
                segment.start += delta;
                segment.end += delta;
            }
        }
        Ok(())
    }

    /// Segment containing `cursor_offset`, the tail when the cursor sits
    /// past every segment, or `None` for an empty chain.
    pub fn locate(&self, cursor_offset: usize) -> Option<SegmentId> {
        let mut walk = self.head;
        while let Some(id) = walk {
            let segment = self.slot(id)?;
            if cursor_offset >= segment.start && cursor_offset < segment.end {
                return Some(id);
            }
            walk = segment.next;
        }
        self.tail
    }

    /// Remove the segment's text from the buffer, relink its neighbors, and
    /// shift every later segment left by the removed span length.
    pub fn delete(&mut self, id: SegmentId) -> Result<(), ChatError> {
        let segment = self.require(id)?.clone();
        self.text.replace_range(segment.start..segment.end, "");
        let span = segment.end - segment.start;

        match segment.prev {
            Some(prev) => {
                if let Some(prev_segment) = self.slot_mut(prev) {
                    prev_segment.next = segment.next;
                }
            }
            None => self.head = segment.next,
        }
        match segment.next {
            Some(next) => {
                if let Some(next_segment) = self.slot_mut(next) {
                    next_segment.prev = segment.prev;
                }
            }
            None => self.tail = segment.prev,
        }

        self.slots[id.0] = None;
        self.free.push(id.0);

        if span > 0 {
            for slot in self.slots.iter_mut().flatten() {
                if slot.start >= segment.end {
                    slot.start -= span;
                    slot.end -= span;
                }
            }
        }
        Ok(())
    }

    /// Chain order, head to tail.
    pub fn iter(&self) -> impl Iterator<Item = SegmentId> + '_ {
        let mut walk = self.head;
        std::iter::from_fn(move || {
            let id = walk?;
            walk = self.slot(id)?.next;
            Some(id)
        })
    }

    /// Verify the chain is forward-ordered, non-overlapping, and consistent
    /// with the flat text. Violations are programming defects.
    pub fn check_chain(&self) -> Result<(), ChatError> {
        let mut walk = self.head;
        let mut last_end = 0usize;
        let mut prev: Option<SegmentId> = None;
        let mut visited = 0usize;
        while let Some(id) = walk {
            let segment = self.require(id)?;
            if segment.prev != prev {
                return Err(ChatError::Internal(format!(
                    "segment {} has a broken back link",
                    id.0
                )));
            }
            if segment.start < last_end || segment.end < segment.start {
                return Err(ChatError::Internal(format!(
                    "segment {} overlaps or is inverted ({}..{})",
                    id.0, segment.start, segment.end
                )));
            }
            if segment.end > self.text.len() {
                return Err(ChatError::Internal(format!(
                    "segment {} extends past the buffer",
                    id.0
                )));
            }
            last_end = segment.end;
            prev = Some(id);
            walk = segment.next;
            visited += 1;
            if visited > self.slots.len() {
                return Err(ChatError::Internal("segment chain contains a cycle".into()));
            }
        }
        if self.tail != prev {
            return Err(ChatError::Internal("tail does not match chain end".into()));
        }
        Ok(())
    }
}
