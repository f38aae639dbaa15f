use crate::error::ApiError;
use crate::live::RefreshToken;
use crate::lock;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

pub type QueryParams = BTreeMap<String, String>;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
pub struct RequestState<T> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub loading: bool,
}

impl<T> RequestState<T> {
    pub fn pending() -> Self {
        Self {
            data: None,
            error: None,
            loading: true,
        }
    }

    pub fn idle() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
        }
    }
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self::pending()
    }
}

/// Everything a fetch depends on. Two keys that compare equal never cause a
/// second fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
    pub path: String,
    pub params: QueryParams,
    pub refresh: RefreshToken,
    pub skip: bool,
}

impl RequestKey {
    pub fn new(path: impl Into<String>, params: QueryParams) -> Self {
        Self {
            path: path.into(),
            params,
            refresh: RefreshToken::default(),
            skip: false,
        }
    }

    pub fn with_refresh(mut self, refresh: RefreshToken) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn skipped(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    fn same_target(&self, other: &RequestKey) -> bool {
        self.path == other.path && self.params == other.params
    }
}

#[async_trait]
pub trait Fetch<T>: Send + Sync {
    async fn fetch(&self, path: &str, params: &QueryParams) -> Result<T, ApiError>;
}

/// What a view shows while a new fetch is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Previous data or error stays visible until the new result lands.
    #[default]
    KeepStale,
    /// Path or params changes blank the view; refresh-only refetches keep it.
    BlankOnChange,
}

#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub stale: StalePolicy,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::config::DEFAULT_FETCH_TIMEOUT_SECS),
            retries: 0,
            stale: StalePolicy::KeepStale,
        }
    }
}

struct Tracking {
    generation: u64,
    last_key: Option<RequestKey>,
}

struct Shared<T> {
    tracking: Mutex<Tracking>,
    state: watch::Sender<RequestState<T>>,
    detached: AtomicBool,
    fetches: AtomicU64,
}

/// One outstanding read and its derived state. Only the response belonging
/// to the most recently issued key is ever applied.
pub struct Request<T> {
    shared: Arc<Shared<T>>,
    fetcher: Arc<dyn Fetch<T>>,
    policy: FetchPolicy,
}

impl<T> Request<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(fetcher: Arc<dyn Fetch<T>>, policy: FetchPolicy) -> Self {
        let (state, _) = watch::channel(RequestState::pending());
        Self {
            shared: Arc::new(Shared {
                tracking: Mutex::new(Tracking {
                    generation: 0,
                    last_key: None,
                }),
                state,
                detached: AtomicBool::new(false),
                fetches: AtomicU64::new(0),
            }),
            fetcher,
            policy,
        }
    }

    pub fn state(&self) -> RequestState<T> {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.shared.state.subscribe()
    }

    /// Number of fetches actually sent.
    pub fn fetch_count(&self) -> u64 {
        self.shared.fetches.load(Ordering::SeqCst)
    }

    /// Returns whether a fetch was started.
    pub fn issue(&self, key: RequestKey) -> bool {
        let generation = {
            let mut tracking = lock(&self.shared.tracking);
            if tracking.last_key.as_ref() == Some(&key) {
                return false;
            }
            let target_changed = tracking
                .last_key
                .as_ref()
                .map_or(true, |last| !last.same_target(&key));
            tracking.generation += 1;
            tracking.last_key = Some(key.clone());

            if key.skip {
                self.shared.state.send_replace(RequestState::idle());
                return false;
            }
            let blank = target_changed && self.policy.stale == StalePolicy::BlankOnChange;
            self.shared.state.send_modify(|state| {
                state.loading = true;
                if blank {
                    state.data = None;
                    state.error = None;
                }
            });
            tracking.generation
        };

        self.shared.fetches.fetch_add(1, Ordering::SeqCst);
        debug!(path = %key.path, generation, refresh = key.refresh.seq, "fetch_issued");
        let shared = self.shared.clone();
        let fetcher = self.fetcher.clone();
        let policy = self.policy;
        tokio::spawn(async move {
            let result = fetch_with_policy(fetcher.as_ref(), &key, policy).await;
            apply_result(&shared, generation, &key.path, result);
        });
        true
    }

    /// Applies an optimistic edit to the current data. Returns false when
    /// there is nothing loaded to edit.
    pub fn update_local(&self, edit: impl FnOnce(&mut T)) -> bool {
        let _tracking = lock(&self.shared.tracking);
        self.shared.state.send_if_modified(|state| match state.data.as_mut() {
            Some(data) => {
                edit(data);
                true
            }
            None => false,
        })
    }
}

impl<T> Request<T> {
    /// Marks every in-flight fetch as ignore-on-arrival.
    pub fn detach(&self) {
        self.shared.detached.store(true, Ordering::SeqCst);
    }
}

impl<T> Drop for Request<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

fn apply_result<T>(shared: &Shared<T>, generation: u64, path: &str, result: Result<T, ApiError>) {
    let tracking = lock(&shared.tracking);
    if shared.detached.load(Ordering::SeqCst) {
        debug!(path, generation, "fetch_ignored_after_unmount");
        return;
    }
    if tracking.generation != generation {
        debug!(path, generation, current = tracking.generation, "fetch_discarded");
        return;
    }
    let next = match result {
        Ok(data) => RequestState {
            data: Some(data),
            error: None,
            loading: false,
        },
        Err(err) => {
            debug!(path, code = err.code(), "fetch_failed: {err}");
            RequestState {
                data: None,
                error: Some(err),
                loading: false,
            }
        }
    };
    shared.state.send_replace(next);
}

async fn fetch_with_policy<T>(
    fetcher: &dyn Fetch<T>,
    key: &RequestKey,
    policy: FetchPolicy,
) -> Result<T, ApiError> {
    let mut attempt = 0;
    let mut delay = RETRY_BASE_DELAY;
    loop {
        let result = match tokio::time::timeout(policy.timeout, fetcher.fetch(&key.path, &key.params)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout {
                seconds: policy.timeout.as_secs(),
            }),
        };
        match result {
            Err(err) if err.is_retryable() && attempt < policy.retries => {
                attempt += 1;
                warn!(path = %key.path, attempt, "fetch_retry: {err}");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            other => return other,
        }
    }
}
