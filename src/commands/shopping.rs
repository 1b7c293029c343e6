use clap::{Args, Subcommand};

use super::OutputFormat;
use crate::db::{CachedEntity, SyncStatus};
use crate::models::{ShoppingItem, ShoppingItemUpdate};
use crate::sync::SyncShoppingRepository;

#[derive(Args)]
pub struct ShoppingCommand {
    #[command(subcommand)]
    pub command: ShoppingSubcommand,
}

#[derive(Subcommand)]
pub enum ShoppingSubcommand {
    /// Show the shopping list
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Add an item to the shopping list
    Add {
        /// Item name
        name: String,

        /// Quantity ("2", "1 gal")
        #[arg(long)]
        qty: Option<String>,

        /// Price in dollars
        #[arg(long)]
        price: Option<f64>,

        /// Store aisle
        #[arg(long)]
        aisle: Option<String>,
    },

    /// Update an item
    Update {
        /// Item ID or name
        identifier: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New quantity
        #[arg(long)]
        qty: Option<String>,

        /// New price
        #[arg(long)]
        price: Option<f64>,

        /// New aisle
        #[arg(long)]
        aisle: Option<String>,
    },

    /// Check off an item
    Check {
        /// Item ID or name
        identifier: String,
    },

    /// Uncheck an item
    Uncheck {
        /// Item ID or name
        identifier: String,
    },

    /// Remove an item from the list
    Remove {
        /// Item ID or name
        identifier: String,
    },
}

impl ShoppingSubcommand {
    /// Whether the command queues a mutation.
    pub fn is_write(&self) -> bool {
        !matches!(self, ShoppingSubcommand::List { .. })
    }
}

impl ShoppingCommand {
    pub async fn run(
        &self,
        repo: &SyncShoppingRepository,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ShoppingSubcommand::List { format } => {
                let items = repo.list().await?;
                match format {
                    OutputFormat::Json => {
                        let output: Vec<_> = items.iter().map(item_json).collect();
                        println!("{}", serde_json::to_string_pretty(&output)?);
                    }
                    OutputFormat::Text => {
                        if items.is_empty() {
                            println!("Shopping list is empty.");
                            return Ok(());
                        }

                        println!("Shopping List");
                        println!("{}", "=".repeat(44));
                        for entry in &items {
                            let marker = match entry.sync_status {
                                SyncStatus::Pending => " *",
                                SyncStatus::Synced => "",
                            };
                            println!("{}{}", entry.payload, marker);
                            println!("    id: {}", entry.id);
                        }

                        let checked = items.iter().filter(|e| e.payload.checked).count();
                        println!("{}", "-".repeat(44));
                        println!("{} of {} items checked", checked, items.len());
                        if items.iter().any(|e| e.sync_status == SyncStatus::Pending) {
                            println!("* not yet synced");
                        }
                    }
                }
                Ok(())
            }

            ShoppingSubcommand::Add {
                name,
                qty,
                price,
                aisle,
            } => {
                if name.trim().is_empty() {
                    return Err("Item name cannot be empty".into());
                }

                let mut item = ShoppingItem::new(name.trim());
                if let Some(qty) = qty {
                    item = item.with_quantity(qty);
                }
                item.price = *price;
                item.aisle = aisle.clone();

                let id = repo.add_item(&item).await?;
                println!("Added '{}' to shopping list ({})", item.name, id);
                Ok(())
            }

            ShoppingSubcommand::Update {
                identifier,
                name,
                qty,
                price,
                aisle,
            } => {
                let entry = find_item(repo, identifier).await?;
                let update = ShoppingItemUpdate {
                    name: name.clone(),
                    quantity: qty.clone(),
                    price: *price,
                    aisle: aisle.clone(),
                    checked: None,
                };
                if update.is_empty() {
                    println!("Nothing to update");
                    return Ok(());
                }

                let item = repo.update_item(&entry.id, &update).await?;
                println!("Updated '{}'", item.name);
                Ok(())
            }

            ShoppingSubcommand::Check { identifier } => {
                let entry = find_item(repo, identifier).await?;
                if entry.payload.checked {
                    println!("'{}' is already checked", entry.payload.name);
                } else {
                    repo.set_checked(&entry.id, true).await?;
                    println!("Checked '{}'", entry.payload.name);
                }
                Ok(())
            }

            ShoppingSubcommand::Uncheck { identifier } => {
                let entry = find_item(repo, identifier).await?;
                if !entry.payload.checked {
                    println!("'{}' is not checked", entry.payload.name);
                } else {
                    repo.set_checked(&entry.id, false).await?;
                    println!("Unchecked '{}'", entry.payload.name);
                }
                Ok(())
            }

            ShoppingSubcommand::Remove { identifier } => {
                let entry = find_item(repo, identifier).await?;
                repo.remove_item(&entry.id).await?;
                println!("Removed '{}' from shopping list", entry.payload.name);
                Ok(())
            }
        }
    }
}

/// Looks an item up by id, then by case-insensitive name.
async fn find_item(
    repo: &SyncShoppingRepository,
    identifier: &str,
) -> Result<CachedEntity<ShoppingItem>, Box<dyn std::error::Error>> {
    if let Some(entry) = repo.get(identifier).await? {
        return Ok(entry);
    }

    let mut matches: Vec<_> = repo
        .list()
        .await?
        .into_iter()
        .filter(|e| e.payload.name.eq_ignore_ascii_case(identifier))
        .collect();

    match matches.len() {
        0 => Err(format!("Item not found: {}", identifier).into()),
        1 => Ok(matches.remove(0)),
        n => Err(format!(
            "'{}' matches {} items, use the item id instead",
            identifier, n
        )
        .into()),
    }
}

fn item_json(entry: &CachedEntity<ShoppingItem>) -> serde_json::Value {
    let mut value = serde_json::to_value(&entry.payload).unwrap_or_default();
    if let Some(fields) = value.as_object_mut() {
        fields.insert("id".to_string(), entry.id.clone().into());
        fields.insert(
            "syncStatus".to_string(),
            entry.sync_status.as_str().into(),
        );
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalStore;
    use tempfile::TempDir;

    struct TestContext {
        repo: SyncShoppingRepository,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open(&temp_dir.path().join("cli.db"))
            .await
            .unwrap();
        TestContext {
            repo: SyncShoppingRepository::new(&store),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_find_item_by_id_or_name() {
        let ctx = setup().await;
        let id = ctx.repo.add_item(&ShoppingItem::new("Milk")).await.unwrap();

        assert_eq!(find_item(&ctx.repo, &id).await.unwrap().id, id);
        assert_eq!(find_item(&ctx.repo, "milk").await.unwrap().id, id);
        assert!(find_item(&ctx.repo, "bread").await.is_err());
    }

    #[tokio::test]
    async fn test_find_item_rejects_ambiguous_name() {
        let ctx = setup().await;
        ctx.repo.add_item(&ShoppingItem::new("Eggs")).await.unwrap();
        ctx.repo.add_item(&ShoppingItem::new("eggs")).await.unwrap();

        let err = find_item(&ctx.repo, "EGGS").await.unwrap_err();
        assert!(err.to_string().contains("matches 2 items"));
    }

    #[tokio::test]
    async fn test_item_json_includes_id_and_status() {
        let ctx = setup().await;
        let id = ctx.repo.add_item(&ShoppingItem::new("Milk")).await.unwrap();
        let entry = ctx.repo.get(&id).await.unwrap().unwrap();

        let value = item_json(&entry);
        assert_eq!(value["id"], id.as_str());
        assert_eq!(value["syncStatus"], "pending");
        assert_eq!(value["name"], "Milk");
    }

    #[test]
    fn test_list_is_not_a_write() {
        let list = ShoppingSubcommand::List {
            format: OutputFormat::Text,
        };
        let check = ShoppingSubcommand::Check {
            identifier: "milk".to_string(),
        };
        assert!(!list.is_write());
        assert!(check.is_write());
    }
}
