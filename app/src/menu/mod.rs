mod models;
mod resources;
mod store;

pub use self::models::{
    Drink, DrinkId, DrinkPatch, Ingredient, NewDrink, PatchSemantics, Recipe, ShortDrink,
    TITLE_MAX_LEN,
};
pub use self::resources::Menu;
pub use self::store::{DrinkStore, MemoryDrinks, NotFound, Rejected};
