use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityState {
    pub visible: bool,
    /// Incremented on every background -> foreground transition.
    pub epoch: u64,
}

/// Tab-wide foreground flag. Clones share the same signal.
#[derive(Clone, Debug)]
pub struct Visibility {
    tx: Arc<watch::Sender<VisibilityState>>,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Visibility {
    pub fn new(visible: bool) -> Self {
        let (tx, _) = watch::channel(VisibilityState { visible, epoch: 0 });
        Self { tx: Arc::new(tx) }
    }

    pub fn is_visible(&self) -> bool {
        self.tx.borrow().visible
    }

    pub fn state(&self) -> VisibilityState {
        *self.tx.borrow()
    }

    pub fn set_visible(&self, visible: bool) {
        let changed = self.tx.send_if_modified(|state| {
            if state.visible == visible {
                return false;
            }
            state.visible = visible;
            if visible {
                state.epoch += 1;
            }
            true
        });
        if changed {
            info!(visible, "visibility_changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<VisibilityState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_counts_foreground_transitions_only() {
        let visibility = Visibility::default();
        assert!(visibility.is_visible());
        visibility.set_visible(true);
        assert_eq!(visibility.state().epoch, 0);

        visibility.set_visible(false);
        assert_eq!(visibility.state(), VisibilityState { visible: false, epoch: 0 });
        visibility.set_visible(false);
        visibility.set_visible(true);
        assert_eq!(visibility.state(), VisibilityState { visible: true, epoch: 1 });
    }

    #[test]
    fn clones_share_state() {
        let visibility = Visibility::new(false);
        let other = visibility.clone();
        let rx = other.subscribe();
        visibility.set_visible(true);
        assert!(other.is_visible());
        assert!(rx.has_changed().expect("sender alive"));
    }
}
