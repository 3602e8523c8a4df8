use crate::error::VaultError;
use crate::vault::record::parse_utc_offset;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Discord caps history pages at 100 messages.
pub const MAX_PAGE_LIMIT: u8 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Root directory the per-guild/per-channel tree lives under.
    pub archive_root: PathBuf,
    /// When false, attachment acquisition is skipped and rows carry empty
    /// name arrays.
    pub include_attachments: bool,
    /// Fixed UTC offset (`[+|-]hh:mm`) used to render timestamps.
    pub display_offset: String,
    /// Messages requested per history page.
    pub page_limit: u8,
}

impl Default for VaultConfig {
    fn default() -> Self {
        let root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chanvault");
        Self {
            archive_root: root,
            include_attachments: true,
            display_offset: "+00:00".to_string(),
            page_limit: MAX_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PartialVaultConfig {
    archive_root: Option<PathBuf>,
    include_attachments: Option<bool>,
    display_offset: Option<String>,
    page_limit: Option<u8>,
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_u8(var: &str, fallback: u8) -> u8 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u8>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

fn validate(cfg: &VaultConfig) -> Result<()> {
    if cfg.archive_root.as_os_str().is_empty() {
        return Err(VaultError::Config("archive root cannot be empty".into()).into());
    }
    if cfg.page_limit == 0 || cfg.page_limit > MAX_PAGE_LIMIT {
        return Err(VaultError::Config(format!(
            "invalid page limit {}: require 1..={MAX_PAGE_LIMIT}",
            cfg.page_limit
        ))
        .into());
    }
    parse_utc_offset(&cfg.display_offset)
        .map_err(|err| VaultError::Config(format!("invalid display offset: {err}")))?;
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("CHANVAULT_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".chanvault").join("config.toml"))
}

fn merge_file_config(base: &mut VaultConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialVaultConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse config {}: {err}", path.display()))?;
    if let Some(archive_root) = parsed.archive_root {
        base.archive_root = archive_root;
    }
    if let Some(include_attachments) = parsed.include_attachments {
        base.include_attachments = include_attachments;
    }
    if let Some(display_offset) = parsed.display_offset {
        base.display_offset = display_offset;
    }
    if let Some(page_limit) = parsed.page_limit {
        base.page_limit = page_limit;
    }
    Ok(())
}

pub fn load_config() -> Result<VaultConfig> {
    let mut cfg = VaultConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.archive_root = env_or_path("CHANVAULT_DIR", cfg.archive_root);
    cfg.include_attachments =
        env_or_bool("CHANVAULT_INCLUDE_ATTACHMENTS", cfg.include_attachments);
    cfg.display_offset = env_or_string("CHANVAULT_FORMAT_OFFSET", &cfg.display_offset);
    cfg.page_limit = env_or_u8("CHANVAULT_PAGE_LIMIT", cfg.page_limit);

    validate(&cfg)?;
    Ok(cfg)
}

/// Bot credential, environment only; never read from the config file.
pub fn bot_token() -> Result<String> {
    match env::var("DISCORD_TOKEN") {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(VaultError::Config("DISCORD_TOKEN is required and cannot be empty".into()).into()),
    }
}
