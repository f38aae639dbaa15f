pub mod draft;
pub mod wire;

pub use draft::{normalize_name, BrandDraft, MixedDrinkDraft, ValidationError};
pub use wire::{parse_broadcast, LiveUpdateEvent, ServiceError, UpdateKind, WireError};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const BRAND_TYPES: [BrandType; 12] = [
    BrandType::Vodka,
    BrandType::Liqueur,
    BrandType::Rum,
    BrandType::Tequila,
    BrandType::Whiskey,
    BrandType::Gin,
    BrandType::Beer,
    BrandType::Seltzer,
    BrandType::DrinkMix,
    BrandType::Wine,
    BrandType::Cider,
    BrandType::Other,
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BeerOrLiquorBrand {
    #[serde(rename = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "nameNormalized")]
    pub name_normalized: String,
    #[serde(rename = "type")]
    pub brand_type: BrandType,
    #[serde(default)]
    pub price: f64,
    #[serde(rename = "inStock")]
    pub in_stock: bool,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrandType {
    Vodka,
    Liqueur,
    Rum,
    Tequila,
    Whiskey,
    Gin,
    Beer,
    Seltzer,
    DrinkMix,
    Wine,
    Cider,
    Other,
}

impl Default for BrandType {
    fn default() -> Self {
        Self::Beer
    }
}

impl BrandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrandType::Vodka => "VODKA",
            BrandType::Liqueur => "LIQUEUR",
            BrandType::Rum => "RUM",
            BrandType::Tequila => "TEQUILA",
            BrandType::Whiskey => "WHISKEY",
            BrandType::Gin => "GIN",
            BrandType::Beer => "BEER",
            BrandType::Seltzer => "SELTZER",
            BrandType::DrinkMix => "DRINK_MIX",
            BrandType::Wine => "WINE",
            BrandType::Cider => "CIDER",
            BrandType::Other => "OTHER",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BrandType::Vodka => "Vodka",
            BrandType::Liqueur => "Liqueur",
            BrandType::Rum => "Rum",
            BrandType::Tequila => "Tequila",
            BrandType::Whiskey => "Whiskey",
            BrandType::Gin => "Gin",
            BrandType::Beer => "Beer",
            BrandType::Seltzer => "Seltzer",
            BrandType::DrinkMix => "Drink Mix",
            BrandType::Wine => "Wine",
            BrandType::Cider => "Cider",
            BrandType::Other => "Other",
        }
    }
}

impl fmt::Display for BrandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for BrandType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_uppercase().replace(['-', ' '], "_");
        BRAND_TYPES
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("Unknown brand type: {}", input.trim()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MixedDrinkRecipeIngredient {
    #[serde(rename = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    pub count: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MixedDrinkRecipe {
    #[serde(rename = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "nameNormalized")]
    pub name_normalized: String,
    #[serde(default, rename = "requiredBeersOrLiquors")]
    pub required_beers_or_liquors: Vec<MixedDrinkRecipeIngredient>,
    #[serde(default, rename = "additionalNotes")]
    pub additional_notes: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

/// Ingredient as returned by list endpoints, joined with its brand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngredientWithBrand {
    #[serde(rename = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    pub count: f64,
    pub name: String,
    #[serde(rename = "inStock")]
    pub in_stock: bool,
    #[serde(default, rename = "type")]
    pub brand_type: Option<BrandType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MixedDrinkRecipeWithIngredients {
    #[serde(rename = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "requiredBeersOrLiquors")]
    pub required_beers_or_liquors: Vec<IngredientWithBrand>,
    #[serde(default, rename = "additionalNotes")]
    pub additional_notes: Option<String>,
    #[serde(default)]
    pub price: f64,
}

impl MixedDrinkRecipeWithIngredients {
    pub fn all_in_stock(&self) -> bool {
        self.required_beers_or_liquors
            .iter()
            .all(|ingredient| ingredient.in_stock)
    }
}

/// Records addressable by their `_id`; used for optimistic list edits.
pub trait Identified {
    fn id(&self) -> &str;
}

impl Identified for BeerOrLiquorBrand {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for MixedDrinkRecipe {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for MixedDrinkRecipeWithIngredients {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Deserialize an ID that can be either a string or a number into a String
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected string or number for _id")),
    }
}
