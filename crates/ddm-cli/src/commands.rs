use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Subcommand};
use ddm_core::{BrandDraft, BrandType, MixedDrinkDraft, MixedDrinkRecipeIngredient};
use ddm_sync::SyncContext;
use serde::Serialize;
use std::str::FromStr;
use tracing::info;

#[derive(Args, Debug, Clone, Default)]
pub struct AuthArgs {
    /// Log in with this password before running the command
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum BrandCommand {
    Get {
        id: String,
    },
    Save(BrandSaveArgs),
    #[command(alias = "rm")]
    Delete {
        id: String,
        #[command(flatten)]
        auth: AuthArgs,
    },
    Stock {
        id: String,
        #[arg(action = ArgAction::Set)]
        in_stock: bool,
        #[command(flatten)]
        auth: AuthArgs,
    },
}

#[derive(Args, Debug)]
pub struct BrandSaveArgs {
    /// Existing brand id; omit to create
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub name: String,
    #[arg(long = "type", value_parser = BrandType::from_str)]
    pub brand_type: BrandType,
    #[arg(long, default_value_t = 0.0)]
    pub price: f64,
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub in_stock: bool,
    #[command(flatten)]
    pub auth: AuthArgs,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum DrinkCommand {
    Get {
        id: String,
    },
    Save(DrinkSaveArgs),
    #[command(alias = "rm")]
    Delete {
        id: String,
        #[command(flatten)]
        auth: AuthArgs,
    },
}

#[derive(Args, Debug)]
pub struct DrinkSaveArgs {
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub name: String,
    /// Ingredient as <brand-id>:<count>; repeat for each
    #[arg(long = "ingredient", value_parser = parse_ingredient)]
    pub ingredients: Vec<MixedDrinkRecipeIngredient>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long)]
    pub price: Option<f64>,
    #[command(flatten)]
    pub auth: AuthArgs,
}

pub fn parse_ingredient(value: &str) -> Result<MixedDrinkRecipeIngredient, String> {
    let (id, count) = match value.split_once(':') {
        Some((id, count)) => (id.trim(), count.trim()),
        None => (value.trim(), "1"),
    };
    if id.is_empty() {
        return Err("ingredient id is empty".to_string());
    }
    let count = count
        .parse::<f64>()
        .map_err(|_| format!("invalid ingredient count: {count}"))?;
    Ok(MixedDrinkRecipeIngredient {
        id: id.to_string(),
        count,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolves the session and, when a password is given, logs in. Mutations
/// refuse to run without a confirmed session.
async fn authenticate(ctx: &SyncContext, auth: &AuthArgs) -> Result<()> {
    if let Some(password) = &auth.password {
        ctx.api.login(password).await.context("login failed")?;
    } else if !ctx.api.verify_token().await {
        bail!("not logged in; pass --password");
    }
    Ok(())
}

pub async fn verify(ctx: &SyncContext) -> Result<()> {
    let logged_in = ctx.api.verify_token().await;
    println!("{}", if logged_in { "logged in" } else { "logged out" });
    Ok(())
}

pub async fn brand(ctx: &SyncContext, command: BrandCommand) -> Result<()> {
    match command {
        BrandCommand::Get { id } => print_json(&ctx.api.get_brand(&id).await?),
        BrandCommand::Save(args) => {
            authenticate(ctx, &args.auth).await?;
            let draft = BrandDraft {
                name: args.name,
                brand_type: args.brand_type,
                price: args.price,
                in_stock: args.in_stock,
            };
            ctx.api.save_brand(args.id.as_deref(), &draft).await?;
            info!(name = %draft.name, "brand_save_done");
            println!("Item saved successfully.");
            Ok(())
        }
        BrandCommand::Delete { id, auth } => {
            authenticate(ctx, &auth).await?;
            ctx.api.delete_brand(&id).await?;
            println!("Item deleted successfully.");
            Ok(())
        }
        BrandCommand::Stock { id, in_stock, auth } => {
            authenticate(ctx, &auth).await?;
            ctx.api.mark_in_stock(&id, in_stock).await?;
            println!("{id} marked {}", if in_stock { "in stock" } else { "out of stock" });
            Ok(())
        }
    }
}

pub async fn drink(ctx: &SyncContext, command: DrinkCommand) -> Result<()> {
    match command {
        DrinkCommand::Get { id } => print_json(&ctx.api.get_mixed_drink(&id).await?),
        DrinkCommand::Save(args) => {
            authenticate(ctx, &args.auth).await?;
            let draft = MixedDrinkDraft {
                name: args.name,
                ingredients: args.ingredients,
                additional_notes: args.notes,
                price: args.price,
            };
            ctx.api.save_mixed_drink(args.id.as_deref(), &draft).await?;
            println!("Item saved successfully.");
            Ok(())
        }
        DrinkCommand::Delete { id, auth } => {
            authenticate(ctx, &auth).await?;
            ctx.api.delete_mixed_drink(&id).await?;
            println!("Item deleted successfully.");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingredients_parse_with_optional_count() {
        let ingredient = parse_ingredient("b1:1.5").expect("ingredient");
        assert_eq!(ingredient.id, "b1");
        assert_eq!(ingredient.count, 1.5);
        assert_eq!(parse_ingredient("b2").expect("ingredient").count, 1.0);
        assert!(parse_ingredient(":2").is_err());
        assert!(parse_ingredient("b3:lots").is_err());
    }
}
