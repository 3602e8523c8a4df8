use crate::chat::client::{ChatClient, ChatMessage};
use crate::error::VaultError;
use crate::vault::paths::ChannelPaths;
use crate::vault::record::{HEADER_LINE, MessageRecord};
use anyhow::{Context, Result};
use std::fs;

/// How the run begins. `Resume` carries the re-validated anchor message;
/// the fetcher's first page request uses its id as the exclusive bound.
#[derive(Debug, Clone)]
pub enum StartPlan {
    Fresh,
    Resume(ChatMessage),
}

/// Inspect the channel directory and decide how the run should begin.
///
/// The archive file itself is the only checkpoint store: the last row's id
/// is the resume anchor, and it must still resolve upstream. Anything that
/// makes the file untrustworthy is a `VaultError::Validation`, which the
/// caller may recover from with a destructive reset; plain I/O failures
/// surface as ordinary errors.
pub fn plan_start(
    paths: &ChannelPaths,
    client: &dyn ChatClient,
    channel_id: u64,
) -> Result<StartPlan> {
    if !paths.archive_file.exists() {
        return Ok(StartPlan::Fresh);
    }

    if paths.chronological_file.exists() {
        return Err(VaultError::Validation(format!(
            "{} exists; this archive was finalized and cannot be resumed",
            paths.chronological_file.display()
        ))
        .into());
    }

    let raw = fs::read_to_string(&paths.archive_file)
        .with_context(|| format!("failed to read {}", paths.archive_file.display()))?;
    let mut lines = raw.lines().filter(|l| !l.trim().is_empty());

    match lines.next() {
        Some(header) if header == HEADER_LINE => {}
        Some(_) => {
            return Err(VaultError::Validation(format!(
                "{} has an unexpected header row",
                paths.archive_file.display()
            ))
            .into());
        }
        None => {
            return Err(VaultError::Validation(format!(
                "{} is empty",
                paths.archive_file.display()
            ))
            .into());
        }
    }

    // Every row must decode, not just the tail: a corrupt record anywhere
    // means the file cannot be trusted as a checkpoint.
    let mut tail: Option<MessageRecord> = None;
    for line in lines {
        let record = MessageRecord::decode_line(line)
            .map_err(|err| VaultError::Validation(format!("unparsable record: {err}")))?;
        tail = Some(record);
    }
    let Some(tail) = tail else {
        return Err(VaultError::Validation(format!(
            "{} has a header but no records",
            paths.archive_file.display()
        ))
        .into());
    };

    match client.message_by_id(channel_id, tail.id)? {
        Some(anchor) => Ok(StartPlan::Resume(anchor)),
        None => Err(VaultError::Validation(format!(
            "message {} from the last archive row no longer exists in channel {channel_id}",
            tail.id
        ))
        .into()),
    }
}

/// Destructive reset: delete the archive file, the attachments tree, and
/// any chronological file, so the next plan is a fresh start. Only called
/// after the user confirmed.
pub fn reset_directory(paths: &ChannelPaths) -> Result<()> {
    if paths.archive_file.exists() {
        fs::remove_file(&paths.archive_file)
            .with_context(|| format!("failed to remove {}", paths.archive_file.display()))?;
    }
    if paths.chronological_file.exists() {
        fs::remove_file(&paths.chronological_file).with_context(|| {
            format!("failed to remove {}", paths.chronological_file.display())
        })?;
    }
    if paths.attachments_dir.exists() {
        fs::remove_dir_all(&paths.attachments_dir)
            .with_context(|| format!("failed to remove {}", paths.attachments_dir.display()))?;
    }
    paths.ensure_layout()
}
