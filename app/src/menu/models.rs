use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Longest title the `drinks` table accepts.
pub const TITLE_MAX_LEN: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrinkId(i32);

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Ingredient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub color: String,
    pub parts: serde_json::Number,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct Recipe(Vec<Ingredient>);

/// A drink as stored, and its long (staff) view when serialised.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Drink {
    pub id: DrinkId,
    pub title: String,
    pub recipe: Recipe,
}

/// Public view of a drink: the recipe shows colours only.
#[derive(Serialize, Debug)]
pub struct ShortDrink<'a> {
    id: DrinkId,
    title: &'a str,
    recipe: Vec<ShortIngredient<'a>>,
}

#[derive(Serialize, Debug)]
struct ShortIngredient<'a> {
    color: &'a str,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct NewDrink {
    pub title: String,
    pub recipe: Recipe,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct DrinkPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub recipe: Option<Recipe>,
}

/// How an edit request decides which fields to apply.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatchSemantics {
    /// Every field present in the request is applied.
    Independent,
    /// At most one field per request: a non-empty `title` wins, otherwise a
    /// non-empty `recipe`. Kept for clients written against the older API.
    Legacy,
}

impl DrinkId {
    pub fn new(id: i32) -> Self {
        DrinkId(id)
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

impl fmt::Display for DrinkId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

impl Ingredient {
    pub fn new(color: &str, parts: u64) -> Self {
        Ingredient {
            name: None,
            color: color.to_string(),
            parts: parts.into(),
        }
    }

    pub fn named(name: &str, color: &str, parts: u64) -> Self {
        Ingredient {
            name: Some(name.to_string()),
            ..Ingredient::new(color, parts)
        }
    }
}

impl Recipe {
    pub fn new(ingredients: Vec<Ingredient>) -> Self {
        Recipe(ingredients)
    }

    pub fn ingredients(&self) -> &[Ingredient] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Text form kept in the `recipe` column.
    pub fn to_column(&self) -> Result<String> {
        serde_json::to_string(self).context("serialise recipe")
    }

    pub fn from_column(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parse stored recipe")
    }
}

impl Drink {
    pub fn short(&self) -> ShortDrink<'_> {
        let recipe = self
            .recipe
            .ingredients()
            .iter()
            .map(|i| ShortIngredient { color: &i.color })
            .collect();
        ShortDrink {
            id: self.id,
            title: &self.title,
            recipe,
        }
    }

    /// Rebuilds a drink from its stored columns. A recipe that does not parse
    /// means the row is corrupt.
    pub(crate) fn from_row(id: DrinkId, title: String, recipe: &str) -> Result<Self> {
        let recipe = Recipe::from_column(recipe)
            .with_context(|| format!("drink {} has a corrupt recipe", id))?;
        Ok(Drink { id, title, recipe })
    }
}

impl DrinkPatch {
    pub fn resolve(self, semantics: PatchSemantics) -> Self {
        match semantics {
            PatchSemantics::Independent => self,
            PatchSemantics::Legacy => match (self.title, self.recipe) {
                (Some(title), _) if !title.is_empty() => DrinkPatch {
                    title: Some(title),
                    recipe: None,
                },
                (_, Some(recipe)) if !recipe.is_empty() => DrinkPatch {
                    title: None,
                    recipe: Some(recipe),
                },
                _ => DrinkPatch::default(),
            },
        }
    }

    pub fn apply(self, drink: &mut Drink) {
        if let Some(title) = self.title {
            drink.title = title;
        }
        if let Some(recipe) = self.recipe {
            drink.recipe = recipe;
        }
    }
}

impl Default for PatchSemantics {
    fn default() -> Self {
        PatchSemantics::Independent
    }
}
