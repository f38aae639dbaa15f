use crate::api::ApiClient;
use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::filter::{FilterInput, FilterQuery};
use crate::live::{LiveSubscription, LiveUpdateHub, PushConnector, RefreshToken};
use crate::now_ms;
use crate::request::{Fetch, FetchPolicy, QueryParams, Request, RequestKey, RequestState, StalePolicy};
use crate::session::SessionStore;
use crate::visibility::Visibility;
use ddm_core::Identified;
use serde::de::DeserializeOwned;
use std::future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Process-wide services, built once at startup and handed to every view.
#[derive(Clone)]
pub struct SyncContext {
    pub config: SyncConfig,
    pub api: ApiClient,
    pub hub: LiveUpdateHub,
    pub visibility: Visibility,
    pub session: SessionStore,
}

impl SyncContext {
    pub fn new(config: SyncConfig) -> Result<Self, ApiError> {
        let visibility = Visibility::default();
        let hub = LiveUpdateHub::from_config(&config, visibility.clone());
        Self::assemble(config, visibility, hub)
    }

    pub fn with_connector(config: SyncConfig, connector: Arc<dyn PushConnector>) -> Result<Self, ApiError> {
        let visibility = Visibility::default();
        let hub = LiveUpdateHub::new(connector, visibility.clone(), config.reconnect_max);
        Self::assemble(config, visibility, hub)
    }

    fn assemble(config: SyncConfig, visibility: Visibility, hub: LiveUpdateHub) -> Result<Self, ApiError> {
        let session = SessionStore::new();
        let api = ApiClient::new(config.clone(), session.clone())?;
        Ok(Self {
            config,
            api,
            hub,
            visibility,
            session,
        })
    }

    pub fn fetch_policy(&self, stale: StalePolicy) -> FetchPolicy {
        FetchPolicy {
            timeout: self.config.fetch_timeout,
            retries: self.config.read_retries,
            stale,
        }
    }

    pub fn filter_input(&self, initial: FilterQuery) -> FilterInput {
        FilterInput::new(initial, self.config.quiet_period)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOptions {
    pub path: String,
    /// Push-channel path that invalidates this view, if any.
    pub live_path: Option<String>,
    pub stale: StalePolicy,
    pub skip: bool,
}

impl ViewOptions {
    /// A list view, refreshed by pushes for its own path.
    pub fn list(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            live_path: Some(path.clone()),
            path,
            stale: StalePolicy::KeepStale,
            skip: false,
        }
    }

    /// A single-record view under `base`. Without an id nothing is fetched.
    pub fn record(base: &str, id: Option<&str>) -> Self {
        let id = id.map(str::trim).filter(|id| !id.is_empty());
        let base = base.trim_end_matches('/');
        Self {
            path: match id {
                Some(id) => format!("{base}/{id}"),
                None => base.to_string(),
            },
            live_path: None,
            stale: StalePolicy::BlankOnChange,
            skip: id.is_none(),
        }
    }

    pub fn live(mut self, path: impl Into<String>) -> Self {
        self.live_path = Some(path.into());
        self
    }

    pub fn stale(mut self, stale: StalePolicy) -> Self {
        self.stale = stale;
        self
    }
}

/// A mounted data-consuming view: committed filter, push token and manual
/// refreshes in; one `RequestState` out.
pub struct ResourceView<T> {
    options: ViewOptions,
    request: Arc<Request<T>>,
    filter: Option<FilterInput>,
    live: Option<LiveSubscription>,
    manual: watch::Sender<u64>,
    driver: JoinHandle<()>,
}

impl<T> ResourceView<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn mount(ctx: &SyncContext, options: ViewOptions, filter: Option<FilterInput>) -> Self {
        let fetcher: Arc<dyn Fetch<T>> = Arc::new(ctx.api.clone());
        let policy = ctx.fetch_policy(options.stale);
        Self::mount_with(fetcher, &ctx.hub, policy, options, filter)
    }
}

impl<T> ResourceView<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn mount_with(
        fetcher: Arc<dyn Fetch<T>>,
        hub: &LiveUpdateHub,
        policy: FetchPolicy,
        options: ViewOptions,
        filter: Option<FilterInput>,
    ) -> Self {
        let policy = FetchPolicy {
            stale: options.stale,
            ..policy
        };
        let request = Arc::new(Request::new(fetcher, policy));
        let live = match (&options.live_path, options.skip) {
            (Some(path), false) => Some(hub.subscribe(path.clone())),
            _ => None,
        };
        let (manual, manual_rx) = watch::channel(0u64);
        let driver = tokio::spawn(drive(
            request.clone(),
            options.path.clone(),
            options.skip,
            filter.as_ref().map(FilterInput::subscribe),
            live.as_ref().map(LiveSubscription::watch),
            manual_rx,
        ));
        debug!(path = %options.path, live = ?options.live_path, skip = options.skip, "view_mounted");
        Self {
            options,
            request,
            filter,
            live,
            manual,
            driver,
        }
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn state(&self) -> RequestState<T> {
        self.request.state()
    }

    pub fn watch(&self) -> watch::Receiver<RequestState<T>> {
        self.request.subscribe()
    }

    pub fn filter(&self) -> Option<&FilterInput> {
        self.filter.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub fn update_local(&self, edit: impl FnOnce(&mut T)) -> bool {
        self.request.update_local(edit)
    }

    /// Refetches the current params, as a push for this view would.
    pub fn refresh(&self) {
        self.manual.send_modify(|count| *count += 1);
    }

    pub fn fetch_count(&self) -> u64 {
        self.request.fetch_count()
    }
}

impl<R> ResourceView<Vec<R>>
where
    R: Identified + Clone + Send + Sync + 'static,
{
    /// Optimistically drops a record after a successful delete.
    pub fn remove_local(&self, id: &str) -> bool {
        let mut removed = false;
        self.request.update_local(|items| {
            let before = items.len();
            items.retain(|item| item.id() != id);
            removed = items.len() != before;
        });
        removed
    }
}

impl<T> Drop for ResourceView<T> {
    fn drop(&mut self) {
        self.driver.abort();
        self.request.detach();
        debug!(path = %self.options.path, "view_unmounted");
    }
}

async fn drive<T>(
    request: Arc<Request<T>>,
    path: String,
    skip: bool,
    mut filter: Option<watch::Receiver<FilterQuery>>,
    mut live: Option<watch::Receiver<RefreshToken>>,
    mut manual: watch::Receiver<u64>,
) where
    T: Clone + Send + Sync + 'static,
{
    let mut refresh = RefreshToken::default();
    loop {
        let params = filter
            .as_mut()
            .map(|rx| rx.borrow_and_update().to_params())
            .unwrap_or_else(QueryParams::new);
        let key = RequestKey::new(path.clone(), params)
            .with_refresh(refresh)
            .skipped(skip);
        request.issue(key);

        tokio::select! {
            changed = next_filter(&mut filter) => {
                if !changed {
                    return;
                }
            }
            token = next_push(&mut live) => match token {
                Some(token) => refresh = refresh.next(token.at_ms),
                None => return,
            },
            changed = manual.changed() => {
                if changed.is_err() {
                    return;
                }
                refresh = refresh.next(now_ms());
            }
        }
    }
}

async fn next_filter(filter: &mut Option<watch::Receiver<FilterQuery>>) -> bool {
    match filter {
        Some(rx) => rx.changed().await.is_ok(),
        None => future::pending().await,
    }
}

async fn next_push(live: &mut Option<watch::Receiver<RefreshToken>>) -> Option<RefreshToken> {
    match live {
        Some(rx) => {
            rx.changed().await.ok()?;
            let token = *rx.borrow_and_update();
            Some(token)
        }
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PushError;
    use crate::filter::StockFilter;
    use crate::live::PushStream;
    use async_trait::async_trait;
    use ddm_core::LiveUpdateEvent;
    use futures_util::StreamExt;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: String,
    }

    impl Identified for Row {
        fn id(&self) -> &str {
            &self.id
        }
    }

    #[derive(Default)]
    struct Table {
        rows: Mutex<Vec<Row>>,
        calls: Mutex<Vec<(String, QueryParams)>>,
    }

    impl Table {
        fn with_rows(ids: &[&str]) -> Arc<Self> {
            let table = Self::default();
            *table.rows.lock().expect("rows lock") = ids
                .iter()
                .map(|id| Row { id: id.to_string() })
                .collect();
            Arc::new(table)
        }

        fn calls(&self) -> Vec<(String, QueryParams)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl Fetch<Vec<Row>> for Table {
        async fn fetch(&self, path: &str, params: &QueryParams) -> Result<Vec<Row>, ApiError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push((path.to_string(), params.clone()));
            Ok(self.rows.lock().expect("rows lock").clone())
        }
    }

    struct Quiet;

    #[async_trait]
    impl PushConnector for Quiet {
        async fn connect(&self) -> Result<PushStream, PushError> {
            Ok(futures_util::stream::pending().boxed())
        }
    }

    fn hub(visibility: Visibility) -> LiveUpdateHub {
        LiveUpdateHub::new(Arc::new(Quiet), visibility, Duration::from_secs(10))
    }

    fn mount(
        table: &Arc<Table>,
        hub: &LiveUpdateHub,
        options: ViewOptions,
        filter: Option<FilterInput>,
    ) -> ResourceView<Vec<Row>> {
        let fetcher: Arc<dyn Fetch<Vec<Row>>> = table.clone();
        ResourceView::mount_with(fetcher, hub, FetchPolicy::default(), options, filter)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn typing_commits_one_filtered_fetch() {
        let table = Table::with_rows(&["b1"]);
        let hub = hub(Visibility::default());
        let filter = FilterInput::new(FilterQuery::default(), Duration::from_millis(300));
        let view = mount(&table, &hub, ViewOptions::list("/beers-and-liquors"), Some(filter));
        settle().await;
        assert_eq!(table.calls().len(), 1);

        let input = view.filter().expect("filter attached");
        input.set_text("vod");
        tokio::time::sleep(Duration::from_millis(100)).await;
        input.set_text("vodka");
        tokio::time::sleep(Duration::from_millis(600)).await;

        let calls = table.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1.get("filter").map(String::as_str), Some("vodka"));
        assert_eq!(view.state().data.map(|rows| rows.len()), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn stock_toggles_refetch_without_waiting() {
        let table = Table::with_rows(&[]);
        let hub = hub(Visibility::default());
        let filter = FilterInput::new(FilterQuery::default(), Duration::from_millis(300));
        let view = mount(&table, &hub, ViewOptions::list("/mixed-drinks"), Some(filter));
        settle().await;

        view.filter()
            .expect("filter attached")
            .set_stock(StockFilter::OnlyInStock);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let calls = table.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1.get("onlyInStock").map(String::as_str), Some("true"));
    }

    #[tokio::test(start_paused = true)]
    async fn pushes_refetch_matching_views_only() {
        let drinks = Table::with_rows(&["d1"]);
        let brands = Table::with_rows(&["b1"]);
        let hub = hub(Visibility::default());
        let _drinks_view = mount(&drinks, &hub, ViewOptions::list("/mixed-drinks"), None);
        let _brands_view = mount(&brands, &hub, ViewOptions::list("/beers-and-liquors"), None);
        settle().await;

        hub.publish(LiveUpdateEvent::update("/mixed-drinks", 42));
        settle().await;
        assert_eq!(drinks.calls().len(), 2);
        assert_eq!(brands.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refocus_refetches_each_live_view_once() {
        let drinks = Table::with_rows(&["d1"]);
        let brands = Table::with_rows(&["b1"]);
        let visibility = Visibility::default();
        let hub = hub(visibility.clone());
        let _drinks_view = mount(&drinks, &hub, ViewOptions::list("/mixed-drinks"), None);
        let _brands_view = mount(&brands, &hub, ViewOptions::list("/beers-and-liquors"), None);
        settle().await;

        visibility.set_visible(false);
        settle().await;
        visibility.set_visible(true);
        settle().await;
        assert_eq!(drinks.calls().len(), 2);
        assert_eq!(brands.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn records_without_id_never_fetch() {
        let table = Table::with_rows(&["b1"]);
        let hub = hub(Visibility::default());
        let options = ViewOptions::record("/beer-or-liquor", None);
        assert!(options.skip);
        let view = mount(&table, &hub, options, None);
        settle().await;

        assert!(table.calls().is_empty());
        assert_eq!(view.state(), RequestState::idle());
        assert!(!view.is_live());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_and_local_removal() {
        let table = Table::with_rows(&["b1", "b2"]);
        let hub = hub(Visibility::default());
        let view = mount(&table, &hub, ViewOptions::list("/beers-and-liquors"), None);
        settle().await;

        assert!(view.remove_local("b1"));
        assert!(!view.remove_local("missing"));
        let ids: Vec<String> = view
            .state()
            .data
            .expect("loaded")
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(ids, vec!["b2".to_string()]);

        table.rows.lock().expect("rows lock").retain(|row| row.id != "b1");
        view.refresh();
        settle().await;
        assert_eq!(view.fetch_count(), 2);
        assert_eq!(view.state().data.map(|rows| rows.len()), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_releases_the_push_subscription() {
        let table = Table::with_rows(&[]);
        let hub = hub(Visibility::default());
        let view = mount(&table, &hub, ViewOptions::list("/mixed-drinks"), None);
        settle().await;
        assert_eq!(hub.subscriber_count(), 1);
        assert!(hub.is_running());

        drop(view);
        assert_eq!(hub.subscriber_count(), 0);
        assert!(!hub.is_running());
        assert_eq!(hub.publish(LiveUpdateEvent::update("/mixed-drinks", 1)), 0);
    }

    #[test]
    fn record_options_build_paths() {
        let options = ViewOptions::record("/mixed-drink/", Some("abc"));
        assert_eq!(options.path, "/mixed-drink/abc");
        assert!(!options.skip);
        assert_eq!(options.stale, StalePolicy::BlankOnChange);
        assert!(ViewOptions::record("/mixed-drink", Some("  ")).skip);

        let list = ViewOptions::list("/mixed-drinks").stale(StalePolicy::BlankOnChange);
        assert_eq!(list.live_path.as_deref(), Some("/mixed-drinks"));
        assert_eq!(list.stale, StalePolicy::BlankOnChange);
    }
}
