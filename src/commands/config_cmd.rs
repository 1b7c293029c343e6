use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&redacted(config))?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!("sync:");
                        println!(
                            "  server_url: {}",
                            config.sync.server_url.as_deref().unwrap_or("(not set)")
                        );
                        println!(
                            "  api_key: {}",
                            if config.sync.api_key.is_some() {
                                "(set)"
                            } else {
                                "(not set)"
                            }
                        );
                        println!("  auto_sync: {}", config.sync.auto_sync);
                        println!("  retry_interval_secs: {}", config.sync.retry_interval_secs);
                        println!("  max_backoff_secs: {}", config.sync.max_backoff_secs);
                        println!("  probe_interval_secs: {}", config.sync.probe_interval_secs);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                // Check if config already exists
                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'cartsense config show' to view current configuration.");
                    return Ok(());
                }

                // Create parent directory
                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let default_config = r#"# cartsense configuration

# Path to the local cache and pending-operation queue
# database_path: ~/.local/share/cartsense/cartsense.db

# sync:
#   server_url: "http://localhost:8080"
#   api_key: "your-api-key"
#   auto_sync: false
#   retry_interval_secs: 30
#   max_backoff_secs: 600
#   probe_interval_secs: 15
"#;

                let mut file = fs::File::create(&config_path)?;
                file.write_all(default_config.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

/// Config as JSON with the API key masked.
fn redacted(config: &Config) -> serde_json::Value {
    let mut config = config.clone();
    if config.sync.api_key.is_some() {
        config.sync.api_key = Some("********".to_string());
    }
    serde_json::to_value(&config).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, ConfigValue, SyncConfig};
    use std::path::PathBuf;

    #[test]
    fn test_json_output_masks_api_key() {
        let config = Config {
            database_path: ConfigValue::new(PathBuf::from("/tmp/cs.db"), ConfigSource::Default),
            config_file: None,
            sync: SyncConfig {
                api_key: Some("secret".to_string()),
                ..Default::default()
            },
        };

        let value = redacted(&config);
        assert_eq!(value["sync"]["api_key"], "********");
        assert_eq!(value["database_path"]["source"], "default");
    }
}
