//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use eventsync_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "data_dir, api_url, auth_token, request_timeout_secs, \
                          sync_interval_secs, cleanup_interval_secs, max_age_hours, \
                          max_retries, retry_base_delay_ms, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "api_url": config.api_url,
                    "auth_token": config.auth_token.as_ref().map(|_| "(set)"),
                    "request_timeout_secs": config.request_timeout_secs,
                    "sync_interval_secs": config.sync_interval_secs,
                    "cleanup_interval_secs": config.cleanup_interval_secs,
                    "max_age_hours": config.max_age_hours,
                    "max_retries": config.max_retries,
                    "retry_base_delay_ms": config.retry_base_delay_ms,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.api_url);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:              {}", config.data_dir.display());
            println!("  api_url:               {}", config.api_url);
            println!(
                "  auth_token:            {}",
                if config.auth_token.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!("  request_timeout_secs:  {}", config.request_timeout_secs);
            println!("  sync_interval_secs:    {}", config.sync_interval_secs);
            println!("  cleanup_interval_secs: {}", config.cleanup_interval_secs);
            println!("  max_age_hours:         {}", config.max_age_hours);
            println!("  max_retries:           {}", config.max_retries);
            println!("  retry_base_delay_ms:   {}", config.retry_base_delay_ms);
            println!(
                "  log_file:              {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "auth_token" {
        "(hidden)"
    } else {
        value.as_str()
    };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "api_url" => {
            if value.is_empty() {
                bail!("api_url cannot be empty");
            }
            config.api_url = value.trim_end_matches('/').to_string();
        }
        "auth_token" => {
            config.auth_token = optional(value);
        }
        "request_timeout_secs" => {
            config.request_timeout_secs = parse_period(key, value)?;
        }
        "sync_interval_secs" => {
            config.sync_interval_secs = parse_period(key, value)?;
        }
        "cleanup_interval_secs" => {
            config.cleanup_interval_secs = parse_period(key, value)?;
        }
        "max_age_hours" => {
            config.max_age_hours = parse_number(key, value)?;
        }
        "max_retries" => {
            config.max_retries = parse_number(key, value)?;
        }
        "retry_base_delay_ms" => {
            config.retry_base_delay_ms = parse_number(key, value)?;
        }
        "log_file" => {
            config.log_file = optional(value).map(PathBuf::from);
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let parsed = value
        .parse()
        .with_context(|| format!("Invalid value for {}: expected a number", key))?;
    Ok(parsed)
}

fn parse_period(key: &str, value: &str) -> Result<u64> {
    let secs: u64 = parse_number(key, value)?;
    if secs == 0 {
        bail!("Invalid value for {}: must be at least 1", key);
    }
    Ok(secs)
}
