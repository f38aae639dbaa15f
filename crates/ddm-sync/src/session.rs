use crate::error::ApiError;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

const NOTICE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// User-facing toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(err: &ApiError) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: err.message(),
        }
    }
}

struct Inner {
    logged_in: watch::Sender<Option<bool>>,
    notices: broadcast::Sender<Notice>,
}

/// Tab-wide login tri-state. `None` until the first verification resolves.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (logged_in, _) = watch::channel(None);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(Inner { logged_in, notices }),
        }
    }

    pub fn logged_in(&self) -> Option<bool> {
        *self.inner.logged_in.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<bool>> {
        self.inner.logged_in.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    pub fn notify(&self, notice: Notice) {
        let _ = self.inner.notices.send(notice);
    }

    /// Records the startup verification result. Never notifies.
    pub fn resolve(&self, logged_in: bool) {
        self.inner.logged_in.send_replace(Some(logged_in));
        info!(logged_in, "session_resolved");
    }

    pub fn login(&self) {
        if self.transition(true) {
            self.notify(Notice::success("Logged in successfully."));
        }
    }

    pub fn logout(&self) {
        if self.transition(false) {
            self.notify(Notice::success("Logged out successfully."));
        }
    }

    /// Called when any request answers 401. Only a confirmed session flips.
    pub fn mark_unauthorized(&self) {
        let flipped = self.inner.logged_in.send_if_modified(|state| {
            if *state == Some(true) {
                *state = Some(false);
                true
            } else {
                false
            }
        });
        if flipped {
            info!("session_expired");
        }
    }

    /// Returns true when a determined state changed to `next`.
    fn transition(&self, next: bool) -> bool {
        let previous = self.inner.logged_in.send_replace(Some(next));
        info!(logged_in = next, "session_changed");
        matches!(previous, Some(prev) if prev != next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_undetermined_and_resolves_quietly() {
        let session = SessionStore::new();
        let mut notices = session.notices();
        assert_eq!(session.logged_in(), None);
        session.resolve(false);
        assert_eq!(session.logged_in(), Some(false));
        assert!(notices.try_recv().is_err());
    }

    #[test]
    fn login_and_logout_notify_on_real_transitions() {
        let session = SessionStore::new();
        let mut notices = session.notices();
        session.resolve(false);

        session.login();
        assert_eq!(session.logged_in(), Some(true));
        assert_eq!(
            notices.try_recv().expect("login notice"),
            Notice::success("Logged in successfully.")
        );
        session.login();
        assert!(notices.try_recv().is_err());

        session.logout();
        assert_eq!(
            notices.try_recv().expect("logout notice").message,
            "Logged out successfully."
        );
    }

    #[test]
    fn login_before_resolution_is_silent() {
        let session = SessionStore::new();
        let mut notices = session.notices();
        session.login();
        assert_eq!(session.logged_in(), Some(true));
        assert!(notices.try_recv().is_err());
    }

    #[test]
    fn unauthorized_only_flips_a_confirmed_session() {
        let session = SessionStore::new();
        session.mark_unauthorized();
        assert_eq!(session.logged_in(), None);

        session.resolve(true);
        let mut rx = session.subscribe();
        session.mark_unauthorized();
        assert_eq!(session.logged_in(), Some(false));
        assert!(rx.has_changed().expect("store alive"));
    }

    #[test]
    fn error_notices_use_the_fallback_message() {
        let notice = Notice::error(&ApiError::from_status(500, ""));
        assert_eq!(notice.kind, NoticeKind::Error);
        assert!(!notice.message.is_empty());
        let notice = Notice::error(&ApiError::from_status(
            422,
            r#"{"status":422,"message":"Invalid password"}"#,
        ));
        assert_eq!(notice.message, "Invalid password");
    }
}
