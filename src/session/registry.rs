//! Process-wide session bookkeeping.
//!
//! Global hotkeys fire without a dialog in focus, so something process-wide
//! has to answer "which open session receives this screenshot". That
//! decision lives in one explicit field here, with a single setter and
//! clearer, instead of an ambient global.

use std::sync::{Mutex, OnceLock};

/// Identifies one open session for routing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_id: u64,
    open: Vec<SessionId>,
    /// The one session, if any, that incoming screenshots are routed to.
    screenshot_receiver: Option<SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry instance.
    pub fn global() -> &'static Mutex<SessionRegistry> {
        static GLOBAL: OnceLock<Mutex<SessionRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Mutex::new(SessionRegistry::new()))
    }

    /// Register a newly opened session. The newest session becomes the
    /// screenshot receiver.
    pub fn register(&mut self) -> SessionId {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.open.push(id);
        self.screenshot_receiver = Some(id);
        id
    }

    /// Drop a closed session; the receiver slot falls back to the most
    /// recently opened remaining session.
    pub fn unregister(&mut self, id: SessionId) {
        self.open.retain(|open| *open != id);
        if self.screenshot_receiver == Some(id) {
            self.screenshot_receiver = self.open.last().copied();
        }
    }

    pub fn is_open(&self, id: SessionId) -> bool {
        self.open.contains(&id)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn screenshot_receiver(&self) -> Option<SessionId> {
        self.screenshot_receiver
    }

    /// Point the screenshot slot at an open session. Unknown ids clear it.
    pub fn set_screenshot_receiver(&mut self, id: SessionId) {
        if self.is_open(id) {
            self.screenshot_receiver = Some(id);
        } else {
            self.screenshot_receiver = None;
        }
    }

    pub fn clear_screenshot_receiver(&mut self) {
        self.screenshot_receiver = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_session_receives_screenshots() {
        let mut registry = SessionRegistry::new();
        let a = registry.register();
        assert_eq!(registry.screenshot_receiver(), Some(a));
        let b = registry.register();
        assert_eq!(registry.screenshot_receiver(), Some(b));
        assert_eq!(registry.open_count(), 2);
    }

    #[test]
    fn closing_the_receiver_falls_back_to_the_previous_session() {
        let mut registry = SessionRegistry::new();
        let a = registry.register();
        let b = registry.register();
        registry.unregister(b);
        assert_eq!(registry.screenshot_receiver(), Some(a));
        registry.unregister(a);
        assert_eq!(registry.screenshot_receiver(), None);
        assert_eq!(registry.open_count(), 0);
    }

    #[test]
    fn closing_a_non_receiver_leaves_the_slot_alone() {
        let mut registry = SessionRegistry::new();
        let a = registry.register();
        let b = registry.register();
        registry.set_screenshot_receiver(a);
        registry.unregister(b);
        assert_eq!(registry.screenshot_receiver(), Some(a));
    }

    #[test]
    fn stale_ids_cannot_claim_the_slot() {
        let mut registry = SessionRegistry::new();
        let a = registry.register();
        registry.unregister(a);
        registry.set_screenshot_receiver(a);
        assert_eq!(registry.screenshot_receiver(), None);
    }
}
