use clap::ValueEnum;
use ddm_core::{BeerOrLiquorBrand, Identified, MixedDrinkRecipeWithIngredients};
use ddm_sync::{Notice, NoticeKind, RequestState, BRANDS_PATH, MIXED_DRINKS_PATH};
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Resource {
    Brands,
    Drinks,
}

impl Resource {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Brands => BRANDS_PATH,
            Self::Drinks => MIXED_DRINKS_PATH,
        }
    }
}

/// A record type that can be shown as one line of a watched list.
pub trait Listed: DeserializeOwned + Identified + Clone + Send + Sync + 'static {
    const KIND: Resource;

    fn line(&self) -> String;
}

fn stock_label(in_stock: bool) -> &'static str {
    if in_stock {
        "in stock"
    } else {
        "out of stock"
    }
}

impl Listed for BeerOrLiquorBrand {
    const KIND: Resource = Resource::Brands;

    fn line(&self) -> String {
        format!(
            "{:<24} {:<28} {:<10} {:>8}  {}",
            self.id,
            self.name,
            self.brand_type.display_name(),
            format!("${:.2}", self.price),
            stock_label(self.in_stock)
        )
    }
}

impl Listed for MixedDrinkRecipeWithIngredients {
    const KIND: Resource = Resource::Drinks;

    fn line(&self) -> String {
        let ingredients = self
            .required_beers_or_liquors
            .iter()
            .map(|ingredient| {
                let mark = if ingredient.in_stock { "" } else { "*" };
                format!("{} x{}{}", ingredient.name, ingredient.count, mark)
            })
            .collect::<Vec<_>>()
            .join(", ");
        let price = if self.price > 0.0 {
            format!("${:.2}", self.price)
        } else {
            String::new()
        };
        format!(
            "{:<24} {:<28} {:>8}  {}  [{}]",
            self.id,
            self.name,
            price,
            stock_label(self.all_in_stock()),
            ingredients
        )
    }
}

pub fn render_state<R: Listed>(state: &RequestState<Vec<R>>) -> Vec<String> {
    if let Some(err) = &state.error {
        return vec![format!("error: {}", err.message())];
    }
    match &state.data {
        Some(rows) if rows.is_empty() => vec!["(no results)".to_string()],
        Some(rows) => rows.iter().map(R::line).collect(),
        None if state.loading => vec!["loading...".to_string()],
        None => Vec::new(),
    }
}

pub fn render_notice(notice: &Notice) -> String {
    match notice.kind {
        NoticeKind::Success => format!("ok: {}", notice.message),
        NoticeKind::Error => format!("error: {}", notice.message),
    }
}

pub fn render_session(logged_in: Option<bool>) -> &'static str {
    match logged_in {
        None => "session: checking",
        Some(true) => "session: logged in",
        Some(false) => "session: logged out",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddm_core::{BrandType, IngredientWithBrand};
    use ddm_sync::ApiError;

    fn brand(in_stock: bool) -> BeerOrLiquorBrand {
        serde_json::from_value(serde_json::json!({
            "_id": "b1",
            "name": "Bacardi",
            "type": "RUM",
            "price": 6.5,
            "inStock": in_stock
        }))
        .expect("brand")
    }

    #[test]
    fn brand_lines_show_type_price_and_stock() {
        let line = brand(false).line();
        assert!(line.starts_with("b1"));
        assert!(line.contains("Bacardi"));
        assert!(line.contains(BrandType::Rum.display_name()));
        assert!(line.contains("$6.50"));
        assert!(line.ends_with("out of stock"));
    }

    #[test]
    fn drink_lines_mark_missing_ingredients() {
        let drink = MixedDrinkRecipeWithIngredients {
            id: "d1".to_string(),
            name: "Mojito".to_string(),
            required_beers_or_liquors: vec![IngredientWithBrand {
                id: "b1".to_string(),
                count: 2.0,
                name: "Bacardi".to_string(),
                in_stock: false,
                brand_type: Some(BrandType::Rum),
            }],
            additional_notes: None,
            price: 0.0,
        };
        let line = drink.line();
        assert!(line.contains("out of stock"));
        assert!(line.contains("[Bacardi x2*]"));
        assert!(!line.contains('$'));
    }

    #[test]
    fn states_render_errors_first() {
        let state: RequestState<Vec<BeerOrLiquorBrand>> = RequestState {
            data: Some(vec![brand(true)]),
            error: Some(ApiError::from_status(500, "")),
            loading: false,
        };
        let lines = render_state(&state);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("error: "));

        let pending: RequestState<Vec<BeerOrLiquorBrand>> = RequestState::pending();
        assert_eq!(render_state(&pending), vec!["loading...".to_string()]);
        let empty: RequestState<Vec<BeerOrLiquorBrand>> = RequestState {
            data: Some(Vec::new()),
            error: None,
            loading: false,
        };
        assert_eq!(render_state(&empty), vec!["(no results)".to_string()]);
    }
}
