use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const ARCHIVE_FILE: &str = "Messages.tsv";
pub const CHRONOLOGICAL_FILE: &str = "Messages_Chronological.tsv";
pub const ATTACHMENTS_DIR: &str = "attachments";
pub const LOGS_DIR: &str = "logs";
const LOCK_FILE: &str = "chanvault.lock";

/// On-disk layout for one archived channel:
/// `<root>/<guildId>/<channelId>/` holding the archive file, the optional
/// chronological file, the attachments tree, and the run logs.
#[derive(Debug, Clone)]
pub struct ChannelPaths {
    pub channel_dir: PathBuf,
    pub archive_file: PathBuf,
    pub chronological_file: PathBuf,
    pub attachments_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub lock_file: PathBuf,
}

pub fn resolve_channel_paths(root: &Path, guild_id: u64, channel_id: u64) -> ChannelPaths {
    let channel_dir = root.join(guild_id.to_string()).join(channel_id.to_string());
    ChannelPaths {
        archive_file: channel_dir.join(ARCHIVE_FILE),
        chronological_file: channel_dir.join(CHRONOLOGICAL_FILE),
        attachments_dir: channel_dir.join(ATTACHMENTS_DIR),
        logs_dir: channel_dir.join(LOGS_DIR),
        lock_file: channel_dir.join(LOCK_FILE),
        channel_dir,
    }
}

impl ChannelPaths {
    /// Create the channel and attachments directories up front so every
    /// later append sees an existing layout.
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(&self.attachments_dir)
            .with_context(|| format!("failed to create {}", self.attachments_dir.display()))?;
        Ok(())
    }
}
