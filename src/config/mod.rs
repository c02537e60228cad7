mod size;
mod types;

pub use size::ByteSize;
pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./cliphost.toml",
        "~/.config/cliphost/config.toml",
        "/etc/cliphost/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let config = Config::default();
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration.
///
/// A bad quality table is fatal: the pipeline must not accept jobs it cannot
/// build a ladder for.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }
    if config.server.internal_port == 0 {
        anyhow::bail!("Internal server port cannot be 0");
    }
    if config.server.host == config.server.internal_host
        && config.server.port == config.server.internal_port
    {
        anyhow::bail!(
            "Public and internal listeners both bind {}:{}",
            config.server.host,
            config.server.port
        );
    }

    if config.storage.chunk_size.as_u64() == 0 {
        anyhow::bail!("Storage chunk_size must be greater than 0");
    }
    if config.storage.max_upload_size.as_u64() == 0 {
        anyhow::bail!("Storage max_upload_size must be greater than 0");
    }

    if config.transcode.concurrency == 0 {
        anyhow::bail!("Transcode concurrency must be at least 1");
    }

    config
        .transcode
        .quality_table()
        .context("Invalid transcode.quality_presets")?;

    Ok(())
}
