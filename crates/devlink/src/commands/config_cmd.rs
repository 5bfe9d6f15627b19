//! Config command handlers.

use devlink_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = super::load_config(global)?;
            let out = output::render_single(&global.output, &cfg, |c| {
                toml::to_string_pretty(c).unwrap_or_default()
            })?;
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&super::config_path(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init {
            ref node_name,
            force,
        } => {
            let path = super::config_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }

            let cfg = Config {
                node_name: node_name.clone().unwrap_or_default(),
                ..Config::default()
            };
            devlink_config::save_config_to(&cfg, &path)?;
            tracing::debug!(path = %path.display(), "config written");
            if !global.quiet {
                eprintln!("Config written to {}", path.display());
            }
            Ok(())
        }
    }
}
