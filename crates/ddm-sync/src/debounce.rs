use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Trailing-edge debouncer. Each push restarts the quiet period; only the
/// last value pushed before the period elapses is released.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.quiet));
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Edits the pending value in place without restarting the timer.
    pub fn edit_pending(&mut self, edit: impl FnOnce(&mut T)) {
        if let Some((value, _)) = self.pending.as_mut() {
            edit(value);
        }
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.pending.take() {
            Some((value, deadline)) if deadline <= now => Some(value),
            other => {
                self.pending = other;
                None
            }
        }
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }
}

type Edit<T> = Box<dyn Fn(&mut T) + Send>;

enum Command<T> {
    Set(T),
    Now(Edit<T>),
}

/// Writer side of a debounced value. Dropping it cancels any pending commit.
pub struct DebounceInput<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    task: JoinHandle<()>,
}

impl<T> DebounceInput<T> {
    /// Schedules `value` for commit after the quiet period.
    pub fn set(&self, value: T) {
        let _ = self.tx.send(Command::Set(value));
    }

    /// Applies `edit` to the committed value right away, and to the pending
    /// value (if any) so the later commit keeps it.
    pub fn apply_now(&self, edit: impl Fn(&mut T) + Send + 'static) {
        let _ = self.tx.send(Command::Now(Box::new(edit)));
    }
}

impl<T> Drop for DebounceInput<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns a driver that republishes values from the returned input on the
/// returned receiver, at most once per quiet period. Values equal to the
/// committed one are not republished.
pub fn debounced<T>(initial: T, quiet: Duration) -> (DebounceInput<T>, watch::Receiver<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let (committed, rx) = watch::channel(initial);
    let (tx, commands) = mpsc::unbounded_channel();
    let task = tokio::spawn(drive(commands, committed, quiet));
    (DebounceInput { tx, task }, rx)
}

async fn drive<T>(
    mut commands: mpsc::UnboundedReceiver<Command<T>>,
    committed: watch::Sender<T>,
    quiet: Duration,
) where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let mut debouncer = Debouncer::new(quiet);
    loop {
        let wake = debouncer.deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Set(value)) => debouncer.push(value, Instant::now()),
                Some(Command::Now(edit)) => {
                    debouncer.edit_pending(|value| edit(value));
                    committed.send_if_modified(|current| {
                        let before = current.clone();
                        edit(current);
                        *current != before
                    });
                }
                None => return,
            },
            _ = sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                if let Some(value) = debouncer.poll(Instant::now()) {
                    let changed = committed.send_if_modified(|current| {
                        if *current == value {
                            return false;
                        }
                        *current = value;
                        true
                    });
                    debug!(changed, "debounce_committed");
                }
            }
        }
    }
}
