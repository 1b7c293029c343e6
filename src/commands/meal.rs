use clap::{Args, Subcommand};

use super::OutputFormat;
use crate::db::{CachedEntity, SyncStatus};
use crate::models::{SavedMeal, SavedMealUpdate};
use crate::sync::SyncMealRepository;

#[derive(Args)]
pub struct MealCommand {
    #[command(subcommand)]
    pub command: MealSubcommand,
}

#[derive(Subcommand)]
pub enum MealSubcommand {
    /// List saved meals
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a saved meal
    Show {
        /// Meal ID or name
        identifier: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Save a meal
    Save {
        /// Meal name
        name: String,

        /// Short description
        #[arg(long)]
        description: Option<String>,

        /// Ingredient line (can be repeated)
        #[arg(long = "ingredient", value_name = "INGREDIENT")]
        ingredients: Vec<String>,

        /// Instruction step (can be repeated)
        #[arg(long = "step", value_name = "STEP")]
        instructions: Vec<String>,

        /// Number of servings
        #[arg(long)]
        servings: Option<u32>,
    },

    /// Update a saved meal
    Update {
        /// Meal ID or name
        identifier: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// Number of servings
        #[arg(long)]
        servings: Option<u32>,
    },

    /// Delete a saved meal
    Delete {
        /// Meal ID or name
        identifier: String,
    },
}

impl MealSubcommand {
    /// Whether the command queues a mutation.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            MealSubcommand::Save { .. } | MealSubcommand::Update { .. } | MealSubcommand::Delete { .. }
        )
    }
}

impl MealCommand {
    pub async fn run(&self, repo: &SyncMealRepository) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            MealSubcommand::List { format } => {
                let meals = repo.list().await?;
                match format {
                    OutputFormat::Json => {
                        let output: Vec<_> = meals.iter().map(meal_json).collect();
                        println!("{}", serde_json::to_string_pretty(&output)?);
                    }
                    OutputFormat::Text => {
                        if meals.is_empty() {
                            println!("No saved meals.");
                            return Ok(());
                        }
                        for entry in &meals {
                            let pending = match entry.sync_status {
                                SyncStatus::Pending => " (pending sync)",
                                SyncStatus::Synced => "",
                            };
                            let servings = entry
                                .payload
                                .servings
                                .map(|s| format!(", serves {}", s))
                                .unwrap_or_default();
                            println!(
                                "{}  {}{}{}",
                                entry.id, entry.payload.name, servings, pending
                            );
                        }
                    }
                }
                Ok(())
            }

            MealSubcommand::Show { identifier, format } => {
                let entry = find_meal(repo, identifier).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&meal_json(&entry))?);
                    }
                    OutputFormat::Text => {
                        print!("{}", entry.payload);
                        println!("\nID: {} ({})", entry.id, entry.sync_status.as_str());
                    }
                }
                Ok(())
            }

            MealSubcommand::Save {
                name,
                description,
                ingredients,
                instructions,
                servings,
            } => {
                if name.trim().is_empty() {
                    return Err("Meal name cannot be empty".into());
                }

                let mut meal = SavedMeal::new(name.trim())
                    .with_ingredients(ingredients.clone())
                    .with_instructions(instructions.clone());
                if let Some(description) = description {
                    meal = meal.with_description(description);
                }
                if let Some(servings) = servings {
                    meal = meal.with_servings(*servings);
                }

                let id = repo.save_meal(&meal).await?;
                println!("Saved meal '{}' ({})", meal.name, id);
                Ok(())
            }

            MealSubcommand::Update {
                identifier,
                name,
                description,
                servings,
            } => {
                let entry = find_meal(repo, identifier).await?;
                let update = SavedMealUpdate {
                    name: name.clone(),
                    description: description.clone(),
                    servings: *servings,
                };
                if update.is_empty() {
                    println!("Nothing to update");
                    return Ok(());
                }

                let meal = repo.update_meal(&entry.id, &update).await?;
                println!("Updated meal '{}'", meal.name);
                Ok(())
            }

            MealSubcommand::Delete { identifier } => {
                let entry = find_meal(repo, identifier).await?;
                repo.delete_meal(&entry.id).await?;
                println!("Deleted meal '{}'", entry.payload.name);
                Ok(())
            }
        }
    }
}

async fn find_meal(
    repo: &SyncMealRepository,
    identifier: &str,
) -> Result<CachedEntity<SavedMeal>, Box<dyn std::error::Error>> {
    if let Some(entry) = repo.get(identifier).await? {
        return Ok(entry);
    }

    repo.list()
        .await?
        .into_iter()
        .find(|e| e.payload.name.eq_ignore_ascii_case(identifier))
        .ok_or_else(|| format!("Meal not found: {}", identifier).into())
}

fn meal_json(entry: &CachedEntity<SavedMeal>) -> serde_json::Value {
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
