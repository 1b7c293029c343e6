//! Shopping list items.
//!
//! Items are owned by the remote document store. The local cache and the
//! pending-operation queue only ever hold copies or deltas of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::collection::{Collection, CollectionItem};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItem {
    pub name: String,
    /// Free-form quantity ("1 gal", "a few")
    #[serde(default)]
    pub quantity: String,
    /// Linked retailer product id (Kroger/Instacart)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aisle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub checked: bool,
    /// Meal this item was generated from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_name: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ShoppingItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: String::new(),
            product_id: None,
            price: None,
            aisle: None,
            image_url: None,
            checked: false,
            meal_id: None,
            meal_name: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_quantity(mut self, quantity: impl Into<String>) -> Self {
        self.quantity = quantity.into();
        self
    }

    pub fn with_product(
        mut self,
        product_id: impl Into<String>,
        price: Option<f64>,
        aisle: Option<String>,
    ) -> Self {
        self.product_id = Some(product_id.into());
        self.price = price;
        self.aisle = aisle;
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn from_meal(mut self, meal_id: impl Into<String>, meal_name: impl Into<String>) -> Self {
        self.meal_id = Some(meal_id.into());
        self.meal_name = Some(meal_name.into());
        self
    }
}

impl CollectionItem for ShoppingItem {
    const COLLECTION: Collection = Collection::ShoppingList;
}

impl fmt::Display for ShoppingItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check = if self.checked { "[x]" } else { "[ ]" };
        write!(f, "{} {:<20}", check, self.name)?;
        if !self.quantity.is_empty() {
            write!(f, " {}", self.quantity)?;
        }
        if let Some(price) = self.price {
            write!(f, " ${:.2}", price)?;
        }
        if let Some(aisle) = &self.aisle {
            write!(f, " (aisle {})", aisle)?;
        }
        Ok(())
    }
}

/// Partial update for a shopping item. Only set fields are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItemUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aisle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

impl ShoppingItemUpdate {
    pub fn checked(checked: bool) -> Self {
        Self {
            checked: Some(checked),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.quantity.is_none()
            && self.price.is_none()
            && self.aisle.is_none()
            && self.checked.is_none()
    }

    pub fn apply_to(&self, item: &mut ShoppingItem) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(quantity) = &self.quantity {
            item.quantity = quantity.clone();
        }
        if let Some(price) = self.price {
            item.price = Some(price);
        }
        if let Some(aisle) = &self.aisle {
            item.aisle = Some(aisle.clone());
        }
        if let Some(checked) = self.checked {
            item.checked = checked;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shopping_item_new() {
        let item = ShoppingItem::new("milk").with_quantity("1 gal");
        assert_eq!(item.name, "milk");
        assert_eq!(item.quantity, "1 gal");
        assert!(!item.checked);
        assert!(item.product_id.is_none());
    }

    #[test]
    fn test_shopping_item_wire_format_is_camel_case() {
        let item = ShoppingItem::new("eggs")
            .with_product("0001111", Some(3.49), Some("12".into()))
            .from_meal("meal-1", "Omelette");
        let json = serde_json::to_value(&item).unwrap();

        assert_eq!(json["productId"], "0001111");
        assert_eq!(json["mealName"], "Omelette");
        assert!(json.get("imageUrl").is_none());
    }

    #[test]
    fn test_shopping_item_deserializes_minimal_document() {
        let item: ShoppingItem =
            serde_json::from_str(r#"{"name": "milk", "quantity": "1 gal"}"#).unwrap();
        assert_eq!(item.name, "milk");
        assert!(!item.checked);
    }

    #[test]
    fn test_shopping_item_display() {
        let mut item = ShoppingItem::new("bread").with_quantity("1 loaf");
        item.checked = true;
        let output = format!("{}", item);
        assert!(output.starts_with("[x] bread"));
        assert!(output.contains("1 loaf"));
    }

    #[test]
    fn test_update_only_serializes_set_fields() {
        let update = ShoppingItemUpdate::checked(true);
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"checked":true}"#);
    }

    #[test]
    fn test_update_apply_to() {
        let mut item = ShoppingItem::new("milk").with_quantity("1 gal");
        let update = ShoppingItemUpdate {
            quantity: Some("2 gal".into()),
            checked: Some(true),
            ..Default::default()
        };
        update.apply_to(&mut item);

        assert_eq!(item.quantity, "2 gal");
        assert!(item.checked);
        assert_eq!(item.name, "milk");
        assert!(!update.is_empty());
        assert!(ShoppingItemUpdate::default().is_empty());
    }
}
