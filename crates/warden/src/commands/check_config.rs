//! Check-config command - load, validate, and print the effective config.

use anyhow::{Context as _, Result};

use super::Context;

pub fn run(ctx: &Context) -> Result<()> {
    let loaded = warden_config::load_config(ctx.config_path.as_deref())
        .context("configuration is invalid")?;

    match &loaded.source {
        Some(path) => println!("# Loaded from {}", path.display()),
        None => println!("# No config file found, using defaults"),
    }

    let config = &loaded.config;
    println!(
        "# session ttl: {}d, access token ttl: {}m, redis: {}",
        config.service.session_ttl_days,
        config.service.access_token_ttl_mins,
        redact_url(&config.redis.connection_url()),
    );
    print!("{}", config.redacted().to_toml()?);

    Ok(())
}

/// Mask the password in `redis://:password@host`.
fn redact_url(url: &str) -> String {
    match (url.find("://:"), url.rfind('@')) {
        (Some(start), Some(end)) if start + 4 <= end => {
            format!("{}********{}", &url[..start + 4], &url[end..])
        }
        _ => url.to_string(),
    }
}
