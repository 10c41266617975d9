//! Playback session bookkeeping.
//!
//! A session spans from the first begin to the matching end; analytics
//! listeners fire exactly once per session, however many times
//! `begin_session` was called in between.

type SessionListener = Box<dyn Fn() + Send>;

pub struct SessionManager {
    active: bool,
    listeners: Vec<SessionListener>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            active: false,
            listeners: Vec::new(),
        }
    }

    /// Starts a session. Calling while one is active is a no-op.
    pub fn begin_session(&mut self) {
        self.active = true;
    }

    /// Ends the active session and fires listeners in registration order.
    /// No-op when no session is active.
    pub fn end_session(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        for listener in &self.listeners {
            listener();
        }
    }

    pub fn on_session_end(&mut self, listener: impl Fn() + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn is_session_active(&self) -> bool {
        self.active
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
