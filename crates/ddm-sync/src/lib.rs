pub mod api;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod filter;
pub mod live;
pub mod request;
pub mod session;
pub mod visibility;

pub use api::{brand_path, mixed_drink_path, ApiClient, BRANDS_PATH, LOGIN_HEADER, MIXED_DRINKS_PATH};
pub use config::SyncConfig;
pub use controller::{ResourceView, SyncContext, ViewOptions};
pub use debounce::{debounced, DebounceInput, Debouncer};
pub use error::{ApiError, ConfigError, PushError};
pub use filter::{FilterInput, FilterQuery, StockFilter};
pub use live::{LiveSubscription, LiveUpdateHub, PushConnector, PushStream, RefreshToken, WsConnector};
pub use request::{Fetch, FetchPolicy, QueryParams, Request, RequestKey, RequestState, StalePolicy};
pub use session::{Notice, NoticeKind, SessionStore};
pub use visibility::{Visibility, VisibilityState};

use std::sync::{Mutex, MutexGuard};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
