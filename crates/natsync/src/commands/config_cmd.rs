//! Config subcommand handlers.

use std::path::PathBuf;

use natsync_config::{self as config, PasswordSource};
use natsync_core::ConfigProvider;
use natsync_core::config::keys;
use secrecy::SecretString;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Serialize, Tabled)]
struct Entry {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn config_file(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config_file(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let settings = super::load_settings(global)?;
            let entries: Vec<Entry> = keys::ALL
                .iter()
                .map(|&key| {
                    let value = if key == keys::PASS {
                        match settings.password_source() {
                            PasswordSource::Missing => String::new(),
                            source => format!("**** ({source})"),
                        }
                    } else {
                        settings.get(key).unwrap_or_default()
                    };
                    Entry {
                        key: key.to_owned(),
                        value,
                    }
                })
                .collect();

            let out = output::render_list(
                &global.output,
                &entries,
                |e| Entry {
                    key: e.key.clone(),
                    value: e.value.clone(),
                },
                |e| format!("{}={}", e.key, e.value),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let path = config_file(global);
            let mut cfg = config::load_file(&path)?;

            if key == keys::PASS && !global.no_keyring {
                config::store_password(&cfg, &SecretString::from(value))?;
                if !global.quiet {
                    eprintln!("Password stored in the OS keyring");
                }
                return Ok(());
            }

            cfg.set(&key, &value)?;
            config::save_config(&path, &cfg)?;
            if !global.quiet {
                eprintln!("Saved {key} to {}", path.display());
            }
            Ok(())
        }
    }
}
