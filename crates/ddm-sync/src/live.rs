use crate::config::{SyncConfig, RECONNECT_MIN};
use crate::error::PushError;
use crate::visibility::{Visibility, VisibilityState};
use crate::{lock, now_ms};
use async_trait::async_trait;
use ddm_core::wire::DEFAULT_MAX_FRAME_BYTES;
use ddm_core::{parse_broadcast, LiveUpdateEvent};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

const EVENT_CAPACITY: usize = 64;

/// Per-subscription invalidation token. Every bump yields a token that
/// compares unequal to all earlier ones; `at_ms` is informational.
#[derive(Debug, Clone, Copy, Default, Eq)]
pub struct RefreshToken {
    pub seq: u64,
    pub at_ms: i64,
}

impl PartialEq for RefreshToken {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl RefreshToken {
    pub fn next(self, at_ms: i64) -> Self {
        Self {
            seq: self.seq + 1,
            at_ms,
        }
    }
}

pub type PushStream = BoxStream<'static, Result<String, PushError>>;

#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self) -> Result<PushStream, PushError>;
}

pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self) -> Result<PushStream, PushError> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|err| PushError::Connect(err.to_string()))?;
        let frames = ws.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => String::from_utf8(bytes).ok().map(Ok),
                Ok(_) => None,
                Err(err) => Some(Err(PushError::from(err))),
            }
        });
        Ok(frames.boxed())
    }
}

struct Entry {
    path: String,
    token: watch::Sender<RefreshToken>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: HashMap<u64, Entry>,
    supervisor: Option<JoinHandle<()>>,
}

struct HubInner {
    connector: Arc<dyn PushConnector>,
    visibility: Visibility,
    reconnect_max: Duration,
    max_frame_bytes: usize,
    registry: Mutex<Registry>,
    events: broadcast::Sender<LiveUpdateEvent>,
    connected: watch::Sender<bool>,
    connects: Mutex<u64>,
}

/// One push-channel connection per process, fanned out to any number of
/// path-keyed subscriptions. The connection exists only while at least one
/// subscription is alive and the tab is in the foreground.
#[derive(Clone)]
pub struct LiveUpdateHub {
    inner: Arc<HubInner>,
}

impl LiveUpdateHub {
    pub fn new(connector: Arc<dyn PushConnector>, visibility: Visibility, reconnect_max: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (connected, _) = watch::channel(false);
        Self {
            inner: Arc::new(HubInner {
                connector,
                visibility,
                reconnect_max: reconnect_max.max(RECONNECT_MIN),
                max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
                registry: Mutex::new(Registry::default()),
                events,
                connected,
                connects: Mutex::new(0),
            }),
        }
    }

    pub fn from_config(config: &SyncConfig, visibility: Visibility) -> Self {
        Self::new(
            Arc::new(WsConnector::new(config.ws_url.clone())),
            visibility,
            config.reconnect_max,
        )
    }

    pub fn subscribe(&self, path: impl Into<String>) -> LiveSubscription {
        let path = path.into();
        let (token_tx, token_rx) = watch::channel(RefreshToken::default());
        let mut registry = lock(&self.inner.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.insert(
            id,
            Entry {
                path: path.clone(),
                token: token_tx,
            },
        );
        if registry.supervisor.is_none() {
            info!(event = "push_acquired", path = %path);
            registry.supervisor = Some(tokio::spawn(supervise(self.inner.clone())));
        }
        debug!(event = "push_subscribed", id, path = %path, count = registry.entries.len());
        LiveSubscription {
            id,
            path,
            token: token_rx,
            hub: self.inner.clone(),
        }
    }

    /// Delivers an event to the matching subscriptions as if it had arrived
    /// on the push channel.
    pub fn publish(&self, event: LiveUpdateEvent) -> usize {
        self.inner.publish(event)
    }

    pub fn events(&self) -> broadcast::Receiver<LiveUpdateEvent> {
        self.inner.events.subscribe()
    }

    pub fn connected(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.registry).entries.len()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.registry).supervisor.is_some()
    }

    /// Successful transport connections made so far.
    pub fn connect_count(&self) -> u64 {
        *lock(&self.inner.connects)
    }

    pub fn visibility(&self) -> &Visibility {
        &self.inner.visibility
    }
}

impl HubInner {
    fn publish(&self, event: LiveUpdateEvent) -> usize {
        let _ = self.events.send(event.clone());
        let registry = lock(&self.registry);
        let mut matched = 0;
        for entry in registry.entries.values() {
            if event.matches(&entry.path) {
                entry.token.send_modify(|token| *token = token.next(event.timestamp));
                matched += 1;
            }
        }
        debug!(event = "push_update", path = %event.api_path, matched);
        matched
    }

    fn refresh_all(&self, reason: &str) {
        let at_ms = now_ms();
        let registry = lock(&self.registry);
        for entry in registry.entries.values() {
            entry.token.send_modify(|token| *token = token.next(at_ms));
        }
        info!(event = "push_refresh_all", reason, count = registry.entries.len());
    }

    fn dispatch_frame(&self, text: &str) {
        match parse_broadcast(text, self.max_frame_bytes) {
            Ok(Some(event)) => {
                self.publish(event);
            }
            Ok(None) => debug!(event = "push_frame_ignored"),
            Err(err) => warn!("push_decode_error: {err}"),
        }
    }

    /// Refreshes every subscription once per foreground transition and
    /// reports whether the tab is currently visible.
    fn observe_visibility(&self, visibility: &mut watch::Receiver<VisibilityState>, seen_epoch: &mut u64) -> bool {
        let state = *visibility.borrow_and_update();
        if state.epoch != *seen_epoch {
            *seen_epoch = state.epoch;
            self.refresh_all("foreground");
        }
        state.visible
    }

    fn set_connected(&self, connected: bool) {
        self.connected.send_if_modified(|current| {
            if *current == connected {
                return false;
            }
            *current = connected;
            true
        });
    }
}

async fn supervise(inner: Arc<HubInner>) {
    let mut visibility = inner.visibility.subscribe();
    let mut seen_epoch = visibility.borrow().epoch;
    let mut backoff = RECONNECT_MIN;

    loop {
        if !inner.observe_visibility(&mut visibility, &mut seen_epoch) {
            inner.set_connected(false);
            if visibility.changed().await.is_err() {
                return;
            }
            continue;
        }

        let connect = tokio::select! {
            result = inner.connector.connect() => result,
            changed = visibility.changed() => {
                if changed.is_err() {
                    return;
                }
                continue;
            }
        };
        let mut stream = match connect {
            Ok(stream) => stream,
            Err(err) => {
                warn!("push_connect_error: {err}");
                if !sleep_while_visible(&mut visibility, jittered(backoff)).await {
                    return;
                }
                backoff = next_backoff(backoff, inner.reconnect_max);
                continue;
            }
        };
        backoff = RECONNECT_MIN;
        *lock(&inner.connects) += 1;
        inner.set_connected(true);
        info!(event = "push_connected");

        let mut paused = false;
        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(text)) => inner.dispatch_frame(&text),
                    Some(Err(err)) => {
                        warn!("push_read_error: {err}");
                        break;
                    }
                    None => {
                        info!(event = "push_closed");
                        break;
                    }
                },
                changed = visibility.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !inner.observe_visibility(&mut visibility, &mut seen_epoch) {
                        info!(event = "push_paused");
                        paused = true;
                        break;
                    }
                }
            }
        }
        drop(stream);
        inner.set_connected(false);

        if !paused && !sleep_while_visible(&mut visibility, jittered(backoff)).await {
            return;
        }
        if !paused {
            backoff = next_backoff(backoff, inner.reconnect_max);
        }
    }
}

/// Sleeps for `delay` unless visibility changes first. Returns false when the
/// visibility signal is gone.
async fn sleep_while_visible(visibility: &mut watch::Receiver<VisibilityState>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        changed = visibility.changed() => changed.is_ok(),
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next = current + current;
    if next > max {
        max
    } else {
        next
    }
}

/// Half the delay fixed, half random.
fn jittered(delay: Duration) -> Duration {
    let half = delay / 2;
    let spread = half.as_millis() as u64;
    let extra = if spread == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=spread)
    };
    half + Duration::from_millis(extra)
}

/// Path-keyed view onto the hub. Dropping it detaches from the hub.
pub struct LiveSubscription {
    id: u64,
    path: String,
    token: watch::Receiver<RefreshToken>,
    hub: Arc<HubInner>,
}

impl LiveSubscription {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn token(&self) -> RefreshToken {
        *self.token.borrow()
    }

    /// Receiver that follows this subscription's token. It closes when the
    /// subscription is dropped.
    pub fn watch(&self) -> watch::Receiver<RefreshToken> {
        self.token.clone()
    }

    /// Waits for the next bump.
    pub async fn changed(&mut self) -> Option<RefreshToken> {
        self.token.changed().await.ok()?;
        Some(*self.token.borrow_and_update())
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        let mut registry = lock(&self.hub.registry);
        registry.entries.remove(&self.id);
        if registry.entries.is_empty() {
            if let Some(handle) = registry.supervisor.take() {
                handle.abort();
                info!(event = "push_released", path = %self.path);
            }
            drop(registry);
            self.hub.set_connected(false);
        }
    }
}
