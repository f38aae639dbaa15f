use crate::{BrandType, MixedDrinkRecipeIngredient};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

fn name_filter() -> &'static Regex {
    static FILTER: OnceLock<Regex> = OnceLock::new();
    // A-z also admits [\]^_` and 0 is dropped; stored names use this exact rule.
    FILTER.get_or_init(|| Regex::new(r"[^A-z1-9 ]").expect("static name filter"))
}

/// Search key stored as `nameNormalized` next to every saved name.
pub fn normalize_name(name: &str) -> String {
    name_filter().replace_all(name, "").to_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrandDraft {
    pub name: String,
    pub brand_type: BrandType,
    pub price: f64,
    pub in_stock: bool,
}

impl Default for BrandDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            brand_type: BrandType::Beer,
            price: 0.0,
            in_stock: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BrandBody {
    pub name: String,
    #[serde(rename = "nameNormalized")]
    pub name_normalized: String,
    #[serde(rename = "type")]
    pub brand_type: BrandType,
    pub price: f64,
    #[serde(rename = "inStock")]
    pub in_stock: bool,
}

impl BrandDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        validate_price(self.price)
    }

    pub fn body(&self) -> Result<BrandBody, ValidationError> {
        self.validate()?;
        let name = self.name.trim().to_string();
        Ok(BrandBody {
            name_normalized: normalize_name(&name),
            name,
            brand_type: self.brand_type,
            price: self.price,
            in_stock: self.in_stock,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixedDrinkDraft {
    pub name: String,
    pub ingredients: Vec<MixedDrinkRecipeIngredient>,
    pub additional_notes: Option<String>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MixedDrinkBody {
    pub name: String,
    #[serde(rename = "nameNormalized")]
    pub name_normalized: String,
    #[serde(rename = "requiredBeersOrLiquors")]
    pub required_beers_or_liquors: Vec<MixedDrinkRecipeIngredient>,
    #[serde(rename = "additionalNotes", skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl MixedDrinkDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        if self.ingredients.is_empty() {
            return Err(ValidationError::new(
                "requiredBeersOrLiquors",
                "at least one ingredient is required",
            ));
        }
        for (index, ingredient) in self.ingredients.iter().enumerate() {
            if ingredient.id.trim().is_empty() {
                return Err(ValidationError::new(
                    "requiredBeersOrLiquors",
                    format!("ingredient {} has no beer or liquor selected", index + 1),
                ));
            }
            if !(ingredient.count.is_finite() && ingredient.count > 0.0) {
                return Err(ValidationError::new(
                    "requiredBeersOrLiquors",
                    format!("ingredient {} needs a positive count", index + 1),
                ));
            }
        }
        Ok(())
    }

    pub fn body(&self) -> Result<MixedDrinkBody, ValidationError> {
        self.validate()?;
        let name = self.name.trim().to_string();
        let additional_notes = self
            .additional_notes
            .as_ref()
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty());
        Ok(MixedDrinkBody {
            name_normalized: normalize_name(&name),
            name,
            required_beers_or_liquors: self.ingredients.clone(),
            additional_notes,
            price: self.price,
        })
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("name", "name is required"));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), ValidationError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ValidationError::new("price", "price must be a non-negative amount"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(id: &str, count: f64) -> MixedDrinkRecipeIngredient {
        MixedDrinkRecipeIngredient {
            id: id.to_string(),
            count,
        }
    }

    #[test]
    fn normalize_strips_punctuation_and_lowercases() {
        assert_eq!(normalize_name("Tito's Handmade Vodka!"), "titos handmade vodka");
        assert_eq!(normalize_name("Bacardí 151"), "bacard 151");
        assert_eq!(normalize_name("Route 10"), "route 1");
    }

    #[test]
    fn brand_body_carries_normalized_name() {
        let draft = BrandDraft {
            name: "  Jack Daniel's ".to_string(),
            brand_type: BrandType::Whiskey,
            price: 7.25,
            in_stock: false,
        };
        let body = draft.body().expect("valid draft");
        assert_eq!(body.name, "Jack Daniel's");
        assert_eq!(body.name_normalized, "jack daniels");
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["type"], "WHISKEY");
        assert_eq!(json["inStock"], false);
    }

    #[test]
    fn brand_validation_rejects_blank_name_and_negative_price() {
        let blank = BrandDraft::default();
        assert_eq!(blank.validate().expect_err("blank name").field, "name");

        let negative = BrandDraft {
            name: "Coors".to_string(),
            price: -1.0,
            ..BrandDraft::default()
        };
        assert_eq!(negative.validate().expect_err("negative price").field, "price");

        let nan = BrandDraft {
            name: "Coors".to_string(),
            price: f64::NAN,
            ..BrandDraft::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn mixed_drink_requires_complete_ingredients() {
        let mut draft = MixedDrinkDraft {
            name: "Screwdriver".to_string(),
            ..MixedDrinkDraft::default()
        };
        assert!(draft.validate().is_err());

        draft.ingredients = vec![ingredient("b1", 2.0), ingredient("", 1.0)];
        let err = draft.validate().expect_err("missing id");
        assert!(err.message.contains("ingredient 2"));

        draft.ingredients = vec![ingredient("b1", 0.0)];
        assert!(draft.validate().is_err());

        draft.ingredients = vec![ingredient("b1", 2.0)];
        draft.additional_notes = Some("   ".to_string());
        let body = draft.body().expect("valid draft");
        assert_eq!(body.additional_notes, None);
        let json = serde_json::to_value(&body).expect("serialize");
        assert!(json.get("additionalNotes").is_none());
        assert_eq!(json["requiredBeersOrLiquors"][0]["_id"], "b1");
    }
}
