mod commands;
mod logging;
mod render;
mod watch;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use commands::{AuthArgs, BrandCommand, DrinkCommand};
use ddm_core::{BeerOrLiquorBrand, MixedDrinkRecipeWithIngredients};
use ddm_sync::{SyncConfig, SyncContext};
use render::Resource;

#[derive(Parser, Debug)]
#[command(name = "ddm")]
#[command(about = "Drink menu client with live list sync", long_about = None)]
struct Cli {
    /// API base URL (falls back to DDM_API)
    #[arg(long, global = true, default_value = "")]
    api: String,
    /// Push channel URL (falls back to DDM_WS)
    #[arg(long, global = true, default_value = "")]
    ws: String,
    #[arg(long, global = true, default_value = "")]
    log_dir: String,
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    /// Watch a list; stdin lines drive the filter
    Watch(WatchArgs),
    /// Report whether the stored session is valid
    Verify,
    Brand {
        #[command(subcommand)]
        action: BrandCommand,
    },
    Drink {
        #[command(subcommand)]
        action: DrinkCommand,
    },
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[arg(value_enum)]
    resource: Resource,
    #[command(flatten)]
    auth: AuthArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(cli.debug, &cli.log_dir);

    let config = SyncConfig::resolve(&cli.api, &cli.ws).context("invalid configuration")?;
    let ctx = SyncContext::new(config).context("failed to build HTTP client")?;

    match cli.command {
        Command::Watch(args) => match args.resource {
            Resource::Brands => watch::run::<BeerOrLiquorBrand>(&ctx, args.auth.password).await,
            Resource::Drinks => {
                watch::run::<MixedDrinkRecipeWithIngredients>(&ctx, args.auth.password).await
            }
        },
        Command::Verify => commands::verify(&ctx).await,
        Command::Brand { action } => commands::brand(&ctx, action).await,
        Command::Drink { action } => commands::drink(&ctx, action).await,
    }
}
