mod collection;
mod saved_meal;
mod shopping_item;

pub use collection::{Collection, CollectionItem};
pub use saved_meal::{SavedMeal, SavedMealUpdate};
pub use shopping_item::{ShoppingItem, ShoppingItemUpdate};
