use crate::render::{render_notice, render_session, render_state, Listed, Resource};
use anyhow::Result;
use ddm_sync::{
    ApiError, FilterQuery, Notice, ResourceView, StockFilter, SyncContext, ViewOptions,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

pub const HELP: &str = "\
type to filter, or:
  :in-stock | :out-of-stock | :all   stock filter
  :hide | :show                      simulate leaving / returning to the tab
  :refresh                           refetch now
  :login <password> | :logout
  :delete <id>                       requires login
  :stock <id> <true|false>           brands only, requires login
  :quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    Text(String),
    Stock(StockFilter),
    Hide,
    Show,
    Refresh,
    Login(String),
    Logout,
    Delete(String),
    SetStock { id: String, in_stock: bool },
    Help,
    Quit,
}

pub fn parse_line(line: &str) -> Result<WatchCommand, String> {
    let trimmed = line.trim();
    let Some(command) = trimmed.strip_prefix(':') else {
        return Ok(WatchCommand::Text(line.trim_end_matches(['\r', '\n']).to_string()));
    };
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();
    match (name, args.as_slice()) {
        ("in-stock", []) => Ok(WatchCommand::Stock(StockFilter::OnlyInStock)),
        ("out-of-stock", []) => Ok(WatchCommand::Stock(StockFilter::OnlyOutOfStock)),
        ("all", []) => Ok(WatchCommand::Stock(StockFilter::Any)),
        ("hide", []) => Ok(WatchCommand::Hide),
        ("show", []) => Ok(WatchCommand::Show),
        ("refresh", []) => Ok(WatchCommand::Refresh),
        ("login", [password]) => Ok(WatchCommand::Login(password.to_string())),
        ("logout", []) => Ok(WatchCommand::Logout),
        ("delete", [id]) => Ok(WatchCommand::Delete(id.to_string())),
        ("stock", [id, flag]) => flag
            .parse::<bool>()
            .map(|in_stock| WatchCommand::SetStock {
                id: id.to_string(),
                in_stock,
            })
            .map_err(|_| format!("expected true or false, got {flag}")),
        ("help", []) => Ok(WatchCommand::Help),
        ("quit" | "q", []) => Ok(WatchCommand::Quit),
        _ => Err(format!("unknown command: {trimmed} (:help lists commands)")),
    }
}

/// Mounts a filtered, live list view and drives it from stdin until `:quit`,
/// end of input or ctrl-c.
pub async fn run<R: Listed>(ctx: &SyncContext, password: Option<String>) -> Result<()> {
    ctx.api.verify_token().await;
    if let Some(password) = password {
        if let Err(err) = ctx.api.login(&password).await {
            ctx.session.notify(Notice::error(&err));
        }
    }

    let filter = ctx.filter_input(FilterQuery::default());
    let view: ResourceView<Vec<R>> =
        ResourceView::mount(ctx, ViewOptions::list(R::KIND.path()), Some(filter));
    let mut state = view.watch();
    let mut notices = ctx.session.notices();
    let mut session = ctx.session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", render_session(ctx.session.logged_in()));
    println!("{HELP}");
    info!(path = R::KIND.path(), "watch_started");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_line(&line) {
                    Ok(WatchCommand::Quit) => break,
                    Ok(command) => apply(ctx, &view, command).await,
                    Err(message) => println!("{message}"),
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                if snapshot.loading && snapshot.data.is_some() {
                    continue;
                }
                print_list(&view, render_state(&snapshot));
            }
            notice = notices.recv() => match notice {
                Ok(notice) => println!("{}", render_notice(&notice)),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "notices_lagged"),
                Err(RecvError::Closed) => break,
            },
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
                let logged_in = *session.borrow_and_update();
                println!("{}", render_session(logged_in));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    info!("watch_stopped");
    Ok(())
}

fn print_list<R: Listed>(view: &ResourceView<Vec<R>>, lines: Vec<String>) {
    if let Some(filter) = view.filter() {
        let committed = filter.committed();
        println!("-- filter \"{}\" ({}) --", committed.text.trim(), committed.stock);
    }
    for line in lines {
        println!("{line}");
    }
}

async fn apply<R: Listed>(ctx: &SyncContext, view: &ResourceView<Vec<R>>, command: WatchCommand) {
    let Some(filter) = view.filter() else {
        return;
    };
    let outcome = match command {
        WatchCommand::Text(text) => {
            filter.set_text(text);
            Ok(())
        }
        WatchCommand::Stock(stock) => {
            filter.set_stock(stock);
            Ok(())
        }
        WatchCommand::Hide => {
            ctx.visibility.set_visible(false);
            Ok(())
        }
        WatchCommand::Show => {
            ctx.visibility.set_visible(true);
            Ok(())
        }
        WatchCommand::Refresh => {
            view.refresh();
            Ok(())
        }
        WatchCommand::Login(password) => ctx.api.login(&password).await,
        WatchCommand::Logout => ctx.api.logout().await,
        WatchCommand::Delete(id) => delete(ctx, view, &id).await,
        WatchCommand::SetStock { id, in_stock } => set_stock::<R>(ctx, &id, in_stock).await,
        WatchCommand::Help => {
            println!("{HELP}");
            Ok(())
        }
        WatchCommand::Quit => Ok(()),
    };
    if let Err(err) = outcome {
        ctx.session.notify(Notice::error(&err));
    }
}

fn require_login(ctx: &SyncContext) -> bool {
    if ctx.session.logged_in() == Some(true) {
        return true;
    }
    println!("login required (:login <password>)");
    false
}

async fn delete<R: Listed>(ctx: &SyncContext, view: &ResourceView<Vec<R>>, id: &str) -> Result<(), ApiError> {
    if !require_login(ctx) {
        return Ok(());
    }
    match R::KIND {
        Resource::Brands => ctx.api.delete_brand(id).await?,
        Resource::Drinks => ctx.api.delete_mixed_drink(id).await?,
    }
    view.remove_local(id);
    ctx.session.notify(Notice::success("Item deleted successfully."));
    Ok(())
}

async fn set_stock<R: Listed>(ctx: &SyncContext, id: &str, in_stock: bool) -> Result<(), ApiError> {
    if R::KIND != Resource::Brands {
        println!(":stock applies to brands only");
        return Ok(());
    }
    if !require_login(ctx) {
        return Ok(());
    }
    ctx.api.mark_in_stock(id, in_stock).await
}
