use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Remote collections that can be mutated offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    ShoppingList,
    SavedMeals,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::ShoppingList, Collection::SavedMeals];

    /// Stable name used in storage rows and URL paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::ShoppingList => "shoppingList",
            Collection::SavedMeals => "savedMeals",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shoppingList" | "shopping_list" | "shopping-list" => Ok(Collection::ShoppingList),
            "savedMeals" | "saved_meals" | "saved-meals" => Ok(Collection::SavedMeals),
            _ => Err(format!(
                "Invalid collection '{}'. Valid options: shoppingList, savedMeals",
                s
            )),
        }
    }
}

/// A document type that lives in exactly one collection.
pub trait CollectionItem: Serialize + DeserializeOwned + Clone + Send + Sync {
    const COLLECTION: Collection;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names() {
        assert_eq!(Collection::ShoppingList.as_str(), "shoppingList");
        assert_eq!(Collection::SavedMeals.to_string(), "savedMeals");
    }

    #[test]
    fn test_collection_from_str_accepts_cli_spellings() {
        assert_eq!(
            Collection::from_str("shopping-list").unwrap(),
            Collection::ShoppingList
        );
        assert_eq!(
            Collection::from_str("savedMeals").unwrap(),
            Collection::SavedMeals
        );
        assert!(Collection::from_str("pantry").is_err());
    }

    #[test]
    fn test_collection_serde_matches_as_str() {
        let json = serde_json::to_string(&Collection::SavedMeals).unwrap();
        assert_eq!(json, "\"savedMeals\"");
    }
}
