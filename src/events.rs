// Session lifecycle events
//
// The client never navigates; it announces session changes and a shell layer
// decides what to show.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
    TokenRefreshed,
    /// Credentials are gone; the shell should show the login surface
    SessionExpired { redirect_to: String },
}

/// Broadcasts session events and guards the login redirect
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
    login_path: String,
    redirect_signalled: AtomicBool,
    on_login_surface: AtomicBool,
}

impl SessionEvents {
    pub fn new(login_path: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sender,
            login_path: login_path.into(),
            redirect_signalled: AtomicBool::new(false),
            on_login_surface: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Tell the client whether the shell is currently showing the login surface
    pub fn set_on_login_surface(&self, on_login: bool) {
        self.on_login_surface.store(on_login, Ordering::SeqCst);
    }

    /// Whether an expired-session redirect has been signalled since the last login
    pub fn redirect_signalled(&self) -> bool {
        self.redirect_signalled.load(Ordering::SeqCst)
    }

    /// Signal the login redirect. Returns true only for the first call after a
    /// login, and never while the shell is already on the login surface.
    pub fn session_expired(&self) -> bool {
        if self.on_login_surface.load(Ordering::SeqCst) {
            tracing::debug!("Session expired while on the login surface, not redirecting");
            return false;
        }
        if self.redirect_signalled.swap(true, Ordering::SeqCst) {
            return false;
        }

        tracing::warn!(redirect_to = %self.login_path, "Session expired, signalling login redirect");
        self.emit(SessionEvent::SessionExpired {
            redirect_to: self.login_path.clone(),
        });
        true
    }

    /// A new session started; re-arm the redirect signal
    pub fn session_started(&self) {
        self.redirect_signalled.store(false, Ordering::SeqCst);
        self.emit(SessionEvent::LoggedIn);
    }

    pub fn emit(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }
}
