use std::collections::BTreeMap;

use anyhow::{Context, Result};
use err_derive::Error;
use log::*;
use postgres::Client;

use infra::memory::MemoryConnection;

use super::models::{Drink, DrinkId, DrinkPatch, Ingredient, NewDrink, Recipe, TITLE_MAX_LEN};

#[derive(Debug, Error, PartialEq, Eq)]
#[error(display = "drink not found: {}", _0)]
pub struct NotFound(pub DrinkId);

/// The storage engine refused a write, e.g. a constraint violation.
#[derive(Debug, Error, PartialEq, Eq)]
#[error(display = "write rejected: {}", _0)]
pub struct Rejected(pub String);

/// Persistence boundary for drinks. Implemented on connection types, so a
/// pooled connection can be used directly.
pub trait DrinkStore {
    fn setup(&mut self) -> Result<()>;
    /// Drops everything and leaves a single seed drink behind.
    fn reset(&mut self) -> Result<()>;
    fn list_all(&mut self) -> Result<Vec<Drink>>;
    fn insert(&mut self, drink: NewDrink) -> Result<Drink>;
    fn update(&mut self, id: DrinkId, patch: DrinkPatch) -> Result<Drink>;
    fn delete(&mut self, id: DrinkId) -> Result<DrinkId>;
}

pub(crate) fn seed_drink() -> NewDrink {
    NewDrink {
        title: "water".to_string(),
        recipe: Recipe::new(vec![Ingredient::named("water", "blue", 1)]),
    }
}

const SETUP_SQL: &str = include_str!("schema.sql");
const DROP_SQL: &str = "DROP TABLE IF EXISTS drinks";
const LIST_SQL: &str = "SELECT id, title, recipe FROM drinks ORDER BY id";
const INSERT_SQL: &str = "INSERT INTO drinks (title, recipe) VALUES ($1, $2) RETURNING id";
const LOAD_FOR_UPDATE_SQL: &str = "SELECT title, recipe FROM drinks WHERE id = $1 FOR UPDATE";
const UPDATE_SQL: &str = "UPDATE drinks SET title = $2, recipe = $3 WHERE id = $1";
const DELETE_SQL: &str = "DELETE FROM drinks WHERE id = $1";

fn rejected(err: postgres::Error) -> anyhow::Error {
    match err.as_db_error() {
        Some(db) => {
            warn!("Write rejected: {}", db);
            Rejected(db.message().to_string()).into()
        }
        None => err.into(),
    }
}

impl DrinkStore for Client {
    fn setup(&mut self) -> Result<()> {
        self.batch_execute(SETUP_SQL).context("create schema")?;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        let mut t = self.transaction()?;
        t.batch_execute(DROP_SQL).context("drop schema")?;
        t.batch_execute(SETUP_SQL).context("create schema")?;
        let seed = seed_drink();
        t.execute(INSERT_SQL, &[&seed.title, &seed.recipe.to_column()?])
            .context("insert seed drink")?;
        t.commit()?;
        info!("Reset drinks table");
        Ok(())
    }

    fn list_all(&mut self) -> Result<Vec<Drink>> {
        let rows = self.query(LIST_SQL, &[]).context("list drinks")?;
        rows.iter()
            .map(|row| {
                Drink::from_row(
                    DrinkId::new(row.get(0)),
                    row.get(1),
                    row.get::<_, &str>(2),
                )
            })
            .collect()
    }

    fn insert(&mut self, drink: NewDrink) -> Result<Drink> {
        let recipe = drink.recipe.to_column()?;
        let row = self
            .query_one(INSERT_SQL, &[&drink.title, &recipe])
            .map_err(rejected)?;
        let id = DrinkId::new(row.get(0));
        debug!("Inserted drink {}: {:?}", id, drink.title);
        let NewDrink { title, recipe } = drink;
        Ok(Drink { id, title, recipe })
    }

    fn update(&mut self, id: DrinkId, patch: DrinkPatch) -> Result<Drink> {
        let mut t = self.transaction()?;
        let row = t
            .query_opt(LOAD_FOR_UPDATE_SQL, &[&id.value()])
            .context("load drink")?
            .ok_or(NotFound(id))?;
        let mut drink = Drink::from_row(id, row.get(0), row.get::<_, &str>(1))?;

        patch.apply(&mut drink);
        let recipe = drink.recipe.to_column()?;
        t.execute(UPDATE_SQL, &[&id.value(), &drink.title, &recipe])
            .map_err(rejected)?;
        t.commit()?;
        debug!("Updated drink {}", id);
        Ok(drink)
    }

    fn delete(&mut self, id: DrinkId) -> Result<DrinkId> {
        let nrows = self
            .execute(DELETE_SQL, &[&id.value()])
            .map_err(rejected)?;
        debug!("Delete of {} removed {} rows", id, nrows);
        if nrows == 0 {
            return Err(NotFound(id).into());
        }
        Ok(id)
    }
}

/// State behind the in-memory backend. Rows hold the recipe as text, the same
/// as the `drinks` table does.
#[derive(Debug, Default)]
pub struct MemoryDrinks {
    last_id: i32,
    rows: BTreeMap<DrinkId, StoredDrink>,
}

#[derive(Debug, Clone)]
struct StoredDrink {
    title: String,
    recipe: String,
}

impl MemoryDrinks {
    fn next_id(&mut self) -> DrinkId {
        self.last_id += 1;
        DrinkId::new(self.last_id)
    }

    fn check_title(&self, id: Option<DrinkId>, title: &str) -> Result<(), Rejected> {
        if title.chars().count() > TITLE_MAX_LEN {
            return Err(Rejected(format!(
                "title longer than {} characters",
                TITLE_MAX_LEN
            )));
        }
        let taken = self
            .rows
            .iter()
            .any(|(other, row)| Some(*other) != id && row.title == title);
        if taken {
            return Err(Rejected(format!("duplicate title {:?}", title)));
        }
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<Drink>> {
        self.rows
            .iter()
            .map(|(id, row)| Drink::from_row(*id, row.title.clone(), &row.recipe))
            .collect()
    }

    fn insert(&mut self, drink: NewDrink) -> Result<Drink> {
        self.check_title(None, &drink.title)?;
        let recipe = drink.recipe.to_column()?;
        let id = self.next_id();
        let row = StoredDrink {
            title: drink.title.clone(),
            recipe,
        };
        self.rows.insert(id, row);
        debug!("Inserted drink {}: {:?}", id, drink.title);
        let NewDrink { title, recipe } = drink;
        Ok(Drink { id, title, recipe })
    }

    fn update(&mut self, id: DrinkId, patch: DrinkPatch) -> Result<Drink> {
        let row = self.rows.get(&id).ok_or(NotFound(id))?;
        let mut drink = Drink::from_row(id, row.title.clone(), &row.recipe)?;

        patch.apply(&mut drink);
        self.check_title(Some(id), &drink.title)?;
        let row = StoredDrink {
            title: drink.title.clone(),
            recipe: drink.recipe.to_column()?,
        };
        self.rows.insert(id, row);
        debug!("Updated drink {}", id);
        Ok(drink)
    }

    fn delete(&mut self, id: DrinkId) -> Result<DrinkId> {
        self.rows.remove(&id).ok_or(NotFound(id))?;
        debug!("Deleted drink {}", id);
        Ok(id)
    }
}

impl DrinkStore for MemoryConnection<MemoryDrinks> {
    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        let mut drinks = self.lock()?;
        *drinks = MemoryDrinks::default();
        drinks.insert(seed_drink())?;
        info!("Reset in-memory drinks");
        Ok(())
    }

    fn list_all(&mut self) -> Result<Vec<Drink>> {
        self.lock()?.list_all()
    }

    fn insert(&mut self, drink: NewDrink) -> Result<Drink> {
        self.lock()?.insert(drink)
    }

    fn update(&mut self, id: DrinkId, patch: DrinkPatch) -> Result<Drink> {
        self.lock()?.update(id, patch)
    }

    fn delete(&mut self, id: DrinkId) -> Result<DrinkId> {
        self.lock()?.delete(id)
    }
}
