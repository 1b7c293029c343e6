use clap::ValueEnum;

mod config_cmd;
mod meal;
mod shopping;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use meal::{MealCommand, MealSubcommand};
pub use shopping::{ShoppingCommand, ShoppingSubcommand};
pub use sync_cmd::{SyncCommand, SyncCommandError};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
