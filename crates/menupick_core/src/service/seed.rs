//! Default dish set used when a medium has never held data.

use crate::model::item::{Item, ItemId};

const DEFAULT_DISHES: &[&str] = &[
    "Burger",
    "Pizza",
    "Sushi",
    "Hot Pot",
    "Fried Rice",
    "Ramen",
    "Fried Chicken",
    "Steak",
    "Salad",
    "Barbecue",
];

/// Default items with ids `1..=10`, newest (highest id) first.
pub fn default_items() -> Vec<Item> {
    DEFAULT_DISHES
        .iter()
        .enumerate()
        .rev()
        .map(|(index, name)| Item::new(index as ItemId + 1, *name, ""))
        .collect()
}

/// Counter value that follows [`default_items`].
pub fn default_next_id() -> ItemId {
    DEFAULT_DISHES.len() as ItemId + 1
}
