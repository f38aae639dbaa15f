use crate::debounce::{debounced, DebounceInput};
use crate::lock;
use crate::request::QueryParams;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

/// Stock constraint for list queries. The two "only" variants are mutually
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockFilter {
    #[default]
    Any,
    OnlyInStock,
    OnlyOutOfStock,
}

impl StockFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "all",
            Self::OnlyInStock => "in-stock",
            Self::OnlyOutOfStock => "out-of-stock",
        }
    }
}

impl fmt::Display for StockFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" | "any" => Ok(Self::Any),
            "in-stock" | "instock" => Ok(Self::OnlyInStock),
            "out-of-stock" | "outofstock" => Ok(Self::OnlyOutOfStock),
            other => Err(format!("unknown stock filter: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterQuery {
    pub text: String,
    pub stock: StockFilter,
}

impl FilterQuery {
    pub fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        match self.stock {
            StockFilter::Any => {}
            StockFilter::OnlyInStock => {
                params.insert("onlyInStock".to_string(), "true".to_string());
            }
            StockFilter::OnlyOutOfStock => {
                params.insert("onlyOutOfStock".to_string(), "true".to_string());
            }
        }
        let text = self.text.trim();
        if !text.is_empty() {
            params.insert("filter".to_string(), text.to_string());
        }
        params
    }
}

/// Raw filter state plus its committed counterpart. Text edits wait out the
/// quiet period; stock changes commit at once.
pub struct FilterInput {
    raw: Mutex<FilterQuery>,
    input: DebounceInput<FilterQuery>,
    committed: watch::Receiver<FilterQuery>,
}

impl FilterInput {
    pub fn new(initial: FilterQuery, quiet: Duration) -> Self {
        let (input, committed) = debounced(initial.clone(), quiet);
        Self {
            raw: Mutex::new(initial),
            input,
            committed,
        }
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let mut raw = lock(&self.raw);
        raw.text = text.into();
        self.input.set(raw.clone());
    }

    pub fn set_stock(&self, stock: StockFilter) {
        lock(&self.raw).stock = stock;
        self.input.apply_now(move |query| query.stock = stock);
    }

    pub fn raw(&self) -> FilterQuery {
        lock(&self.raw).clone()
    }

    pub fn committed(&self) -> FilterQuery {
        self.committed.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FilterQuery> {
        self.committed.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_follow_the_query() {
        let query = FilterQuery {
            text: "  vodka ".to_string(),
            stock: StockFilter::OnlyInStock,
        };
        let params = query.to_params();
        assert_eq!(params.get("filter").map(String::as_str), Some("vodka"));
        assert_eq!(params.get("onlyInStock").map(String::as_str), Some("true"));
        assert!(!params.contains_key("onlyOutOfStock"));

        let blank = FilterQuery {
            text: "   ".to_string(),
            stock: StockFilter::OnlyOutOfStock,
        };
        let params = blank.to_params();
        assert!(!params.contains_key("filter"));
        assert_eq!(params.len(), 1);
        assert!(FilterQuery::default().to_params().is_empty());
    }

    #[test]
    fn stock_filter_parses_cli_names() {
        assert_eq!("in-stock".parse::<StockFilter>(), Ok(StockFilter::OnlyInStock));
        assert_eq!("ALL".parse::<StockFilter>(), Ok(StockFilter::Any));
        assert!("sometimes".parse::<StockFilter>().is_err());
        assert_eq!(StockFilter::OnlyOutOfStock.to_string(), "out-of-stock");
    }

    #[tokio::test(start_paused = true)]
    async fn text_waits_and_stock_does_not() {
        let filter = FilterInput::new(FilterQuery::default(), Duration::from_millis(300));
        let mut committed = filter.subscribe();

        filter.set_text("whis");
        filter.set_stock(StockFilter::OnlyInStock);
        committed.changed().await.expect("stock committed");
        assert_eq!(
            *committed.borrow_and_update(),
            FilterQuery {
                text: String::new(),
                stock: StockFilter::OnlyInStock,
            }
        );

        filter.set_text("whiskey");
        assert_eq!(filter.raw().text, "whiskey");
        committed.changed().await.expect("text committed");
        assert_eq!(filter.committed().text, "whiskey");
        assert_eq!(filter.committed().stock, StockFilter::OnlyInStock);
    }
}
