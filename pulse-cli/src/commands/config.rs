use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::{ConfigLoader, PulseConfig};

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration (files, environment and defaults)
    Show,
    /// Show configuration file paths
    Path,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(),
        ConfigCommands::Path => show_paths(),
    }
}

fn show_config() -> Result<()> {
    let config = redacted(ConfigLoader::load()?);
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{}", toml_str);
    Ok(())
}

fn show_paths() -> Result<()> {
    match ConfigLoader::user_config_path() {
        Some(path) => println!("User config:    {}", describe(&path)),
        None => println!("User config:    (no home directory)"),
    }
    println!(
        "Project config: {}",
        describe(&ConfigLoader::project_config_path())
    );
    Ok(())
}

fn describe(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found)", path.display())
    }
}

/// Hide passwords embedded in connection strings.
fn redacted(mut config: PulseConfig) -> PulseConfig {
    config.database.url = config.database.url.as_deref().map(redact_password);
    config.nats.url = config.nats.url.as_deref().map(redact_password);
    config
}

fn redact_password(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((userinfo, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match userinfo.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_password_hides_secret() {
        assert_eq!(
            redact_password("postgres://pulse:s3cret@db:5432/pulse"),
            "postgres://pulse:***@db:5432/pulse"
        );
    }

    #[test]
    fn test_redact_password_keeps_urls_without_secret() {
        assert_eq!(redact_password("nats://localhost:4222"), "nats://localhost:4222");
        assert_eq!(
            redact_password("postgres://pulse@db/pulse"),
            "postgres://pulse@db/pulse"
        );
        assert_eq!(redact_password("not a url"), "not a url");
    }
}
