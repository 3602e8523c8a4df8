use crate::chat::client::{ChatClient, ChatMessage};
use crate::vault::attachments::Downloader;
use crate::vault::audit;
use crate::vault::config::VaultConfig;
use crate::vault::fetcher::run_fetcher;
use crate::vault::paths::{ChannelPaths, resolve_channel_paths};
use crate::vault::record::parse_utc_offset;
use crate::vault::resume::{StartPlan, plan_start, reset_directory};
use crate::vault::writer::{ProgressSink, WriterOptions, run_writer};
use anyhow::{Context, Result, anyhow};
use fs2::FileExt;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

pub const NOTICE_TITLE: &str = "Channel Archive";
pub const COLOR_SUCCESS: u32 = 0x00FF00;
pub const COLOR_FAILURE: u32 = 0xFF0000;

/// The channel being archived.
#[derive(Debug, Clone, Copy)]
pub struct ChannelRef {
    pub guild_id: u64,
    pub channel_id: u64,
}

/// What a finished run reports back.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub records_written: u64,
    pub resumed: bool,
    pub archive_file: PathBuf,
}

/// Human-readable completion payload for whatever collaborator relays the
/// outcome (terminal, bot reply, webhook).
#[derive(Debug, Clone, Serialize)]
pub struct RunNotice {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub success: bool,
}

impl RunNotice {
    pub fn success(summary: &RunSummary) -> Self {
        Self {
            title: NOTICE_TITLE.to_string(),
            description: format!(
                "Archive finished! {} records written to {}",
                summary.records_written,
                summary.archive_file.display()
            ),
            color: COLOR_SUCCESS,
            success: true,
        }
    }

    pub fn failure(err: &anyhow::Error) -> Self {
        Self {
            title: NOTICE_TITLE.to_string(),
            description: format!("Archive failed.\n{err:#}"),
            color: COLOR_FAILURE,
            success: false,
        }
    }
}

/// Exclusive per-channel run lock; released when dropped.
#[derive(Debug)]
struct RunLock {
    _file: fs::File,
}

fn acquire_lock(paths: &ChannelPaths) -> Result<RunLock> {
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&paths.lock_file)
        .with_context(|| format!("failed to open {}", paths.lock_file.display()))?;
    file.try_lock_exclusive().map_err(|_| {
        anyhow!(
            "another archive run is already active for {}",
            paths.channel_dir.display()
        )
    })?;
    Ok(RunLock { _file: file })
}

fn truncate_preview(input: &str, max_chars: usize) -> String {
    let clean: String = input.chars().filter(|c| !c.is_control()).collect();
    if clean.chars().count() > max_chars {
        let mut s: String = clean.chars().take(max_chars).collect();
        s.push('…');
        s
    } else {
        clean
    }
}

/// One archive run. The token is consumed by `start`, so a finished run
/// can never be restarted; build a new one instead.
pub struct BackupRun {
    config: VaultConfig,
    channel: ChannelRef,
    announcement: Option<ChatMessage>,
}

impl BackupRun {
    pub fn new(config: VaultConfig, channel: ChannelRef) -> Self {
        Self {
            config,
            channel,
            announcement: None,
        }
    }

    /// Supply a message to persist as record zero of a fresh archive,
    /// e.g. the confirmation message that triggered the backup.
    pub fn with_announcement(mut self, message: ChatMessage) -> Self {
        self.announcement = Some(message);
        self
    }

    /// Run the full pipeline: resume gate, then producer and consumer in
    /// parallel, joined before the outcome is reported. `confirm_reset`
    /// is consulted only when validation fails and decides whether the
    /// channel directory is destructively reset or the run aborts.
    pub fn start(
        self,
        client: &dyn ChatClient,
        downloader: &dyn Downloader,
        confirm_reset: &dyn Fn(&Path) -> bool,
        progress: &dyn ProgressSink,
    ) -> Result<RunSummary> {
        let BackupRun {
            config,
            channel,
            announcement,
        } = self;

        let offset = parse_utc_offset(&config.display_offset)?;
        let paths = resolve_channel_paths(&config.archive_root, channel.guild_id, channel.channel_id);
        paths.ensure_layout()?;
        let _lock = acquire_lock(&paths)?;

        let plan = match plan_start(&paths, client, channel.channel_id) {
            Ok(plan) => plan,
            Err(err) if crate::error::VaultError::is_validation(&err) => {
                audit::append_event(&paths, "validation", "failed", &format!("{err:#}"))?;
                if !confirm_reset(&paths.channel_dir) {
                    audit::append_event(&paths, "validation", "aborted", "reset declined")?;
                    return Err(err);
                }
                reset_directory(&paths)?;
                audit::append_event(&paths, "validation", "reset", "directory cleared")?;
                StartPlan::Fresh
            }
            Err(err) => return Err(err),
        };

        let (fresh, cursor_id, resumed) = match &plan {
            StartPlan::Fresh => {
                let cursor = announcement.as_ref().map(|m| m.id).unwrap_or(u64::MAX);
                audit::append_event(&paths, "run", "started", "fresh start")?;
                (true, cursor, false)
            }
            StartPlan::Resume(anchor) => {
                let preview = truncate_preview(&anchor.content, 80);
                println!("resuming from message {}: {preview}", anchor.id);
                audit::append_event(
                    &paths,
                    "run",
                    "started",
                    &format!("resume anchor={}", anchor.id),
                )?;
                (false, anchor.id, true)
            }
        };

        let opts = WriterOptions {
            fresh,
            include_attachments: config.include_attachments,
            offset,
        };
        let (tx, rx) = mpsc::channel::<Vec<ChatMessage>>();
        let failed = AtomicBool::new(false);
        let channel_id = channel.channel_id;
        let page_limit = config.page_limit;

        let written = thread::scope(|scope| -> Result<u64> {
            let producer = scope.spawn(|| {
                run_fetcher(client, channel_id, cursor_id, page_limit, tx, &failed);
            });
            let consumer = scope.spawn(|| {
                run_writer(
                    &paths,
                    &opts,
                    announcement.as_ref(),
                    downloader,
                    rx,
                    &failed,
                    progress,
                )
            });

            producer
                .join()
                .map_err(|_| anyhow!("history fetcher thread panicked"))?;
            consumer
                .join()
                .map_err(|_| anyhow!("archive writer thread panicked"))
        })?;

        if failed.load(Ordering::SeqCst) {
            audit::append_event(
                &paths,
                "run",
                "failed",
                &format!("records_written={written}"),
            )?;
            return Err(anyhow!(
                "archive run failed after {written} records; partial progress is preserved on disk"
            ));
        }

        audit::append_event(
            &paths,
            "run",
            "finished",
            &format!("records_written={written} resumed={resumed}"),
        )?;

        Ok(RunSummary {
            records_written: written,
            resumed,
            archive_file: paths.archive_file.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::{MemoryChannel, sample_message};
    use crate::error::VaultError;
    use crate::vault::record::{HEADER_LINE, MessageRecord};
    use crate::vault::reverse::reverse_archive;
    use anyhow::Result;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    const CHANNEL: ChannelRef = ChannelRef {
        guild_id: 11,
        channel_id: 22,
    };

    struct NullDownloader;

    impl Downloader for NullDownloader {
        fn fetch(&self, _url: &str, dest: &Path) -> Result<()> {
            fs::write(dest, b"data")?;
            Ok(())
        }
    }

    struct QuietProgress;

    impl ProgressSink for QuietProgress {
        fn record_written(&self, _count: u64, _message_id: u64) {}
    }

    fn config_for(root: &Path) -> VaultConfig {
        VaultConfig {
            archive_root: root.to_path_buf(),
            include_attachments: true,
            display_offset: "+00:00".to_string(),
            page_limit: 2,
        }
    }

    fn run(root: &Path, client: &MemoryChannel) -> Result<RunSummary> {
        BackupRun::new(config_for(root), CHANNEL).start(
            client,
            &NullDownloader,
            &|_| false,
            &QuietProgress,
        )
    }

    fn archived_ids(root: &Path) -> Vec<u64> {
        let paths = resolve_channel_paths(root, CHANNEL.guild_id, CHANNEL.channel_id);
        fs::read_to_string(&paths.archive_file)
            .expect("read archive")
            .lines()
            .skip(1)
            .map(|l| MessageRecord::decode_line(l).expect("decode").id)
            .collect()
    }

    #[test]
    fn fresh_run_archives_everything_newest_first() {
        let tmp = tempdir().expect("tempdir");
        let client = MemoryChannel::with_ids(CHANNEL.channel_id, &[50, 40, 30, 20, 10]);

        let summary = run(tmp.path(), &client).expect("run");
        assert_eq!(summary.records_written, 5);
        assert!(!summary.resumed);

        let ids = archived_ids(tmp.path());
        assert_eq!(ids, vec![50, 40, 30, 20, 10]);
        let unique: BTreeSet<u64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());

        let notice = RunNotice::success(&summary);
        assert_eq!(notice.color, COLOR_SUCCESS);
        assert!(notice.description.contains("5 records"));
    }

    #[test]
    fn empty_channel_yields_header_only_archive_and_success() {
        let tmp = tempdir().expect("tempdir");
        let client = MemoryChannel::new(CHANNEL.channel_id, Vec::new());

        let summary = run(tmp.path(), &client).expect("run");
        assert_eq!(summary.records_written, 0);

        let raw = fs::read_to_string(&summary.archive_file).expect("read");
        assert_eq!(raw, format!("{HEADER_LINE}\n"));
    }

    #[test]
    fn resume_appends_only_strictly_older_messages() {
        let tmp = tempdir().expect("tempdir");

        let first = MemoryChannel::with_ids(CHANNEL.channel_id, &[50, 40]);
        run(tmp.path(), &first).expect("first run");
        assert_eq!(archived_ids(tmp.path()), vec![50, 40]);

        // Older history becomes visible; the anchor (40) still resolves.
        let second = MemoryChannel::with_ids(CHANNEL.channel_id, &[50, 40, 30, 20]);
        let summary = run(tmp.path(), &second).expect("second run");
        assert!(summary.resumed);
        assert_eq!(summary.records_written, 2);
        assert_eq!(archived_ids(tmp.path()), vec![50, 40, 30, 20]);
    }

    #[test]
    fn announcement_seeds_record_zero() {
        let tmp = tempdir().expect("tempdir");
        let client = MemoryChannel::with_ids(CHANNEL.channel_id, &[40, 30]);

        let announcement = sample_message(CHANNEL.channel_id, 99);
        let summary = BackupRun::new(config_for(tmp.path()), CHANNEL)
            .with_announcement(announcement)
            .start(&client, &NullDownloader, &|_| false, &QuietProgress)
            .expect("run");

        assert_eq!(summary.records_written, 3);
        assert_eq!(archived_ids(tmp.path()), vec![99, 40, 30]);
    }

    #[test]
    fn fetch_failure_fails_the_run_but_preserves_partial_progress() {
        let tmp = tempdir().expect("tempdir");
        let client = MemoryChannel::with_ids(CHANNEL.channel_id, &[10]);
        client.fail_fetches();

        let err = run(tmp.path(), &client).expect_err("run fails");
        let notice = RunNotice::failure(&err);
        assert_eq!(notice.color, COLOR_FAILURE);
        assert!(!notice.success);

        // Header was already written before the failure surfaced.
        let paths = resolve_channel_paths(tmp.path(), CHANNEL.guild_id, CHANNEL.channel_id);
        let raw = fs::read_to_string(&paths.archive_file).expect("read");
        assert!(raw.starts_with(HEADER_LINE));
    }

    #[test]
    fn declined_reset_aborts_with_the_validation_error() {
        let tmp = tempdir().expect("tempdir");
        let paths = resolve_channel_paths(tmp.path(), CHANNEL.guild_id, CHANNEL.channel_id);
        paths.ensure_layout().expect("layout");
        fs::write(&paths.archive_file, "corrupt\n").expect("seed");

        let client = MemoryChannel::with_ids(CHANNEL.channel_id, &[10]);
        let err = run(tmp.path(), &client).expect_err("aborted");
        assert!(VaultError::is_validation(&err));
        // Nothing was deleted.
        assert_eq!(fs::read_to_string(&paths.archive_file).expect("read"), "corrupt\n");
    }

    #[test]
    fn confirmed_reset_recovers_with_a_fresh_run() {
        let tmp = tempdir().expect("tempdir");
        let paths = resolve_channel_paths(tmp.path(), CHANNEL.guild_id, CHANNEL.channel_id);
        paths.ensure_layout().expect("layout");
        fs::write(&paths.archive_file, "corrupt\n").expect("seed");
        fs::create_dir_all(paths.attachments_dir.join("1")).expect("seed attachments");

        let client = MemoryChannel::with_ids(CHANNEL.channel_id, &[30, 20]);
        let summary = BackupRun::new(config_for(tmp.path()), CHANNEL)
            .start(&client, &NullDownloader, &|_| true, &QuietProgress)
            .expect("recovered run");

        assert_eq!(summary.records_written, 2);
        assert_eq!(archived_ids(tmp.path()), vec![30, 20]);
        assert!(!paths.attachments_dir.join("1").exists());
    }

    #[test]
    fn finalized_archive_is_never_resumed() {
        let tmp = tempdir().expect("tempdir");
        let client = MemoryChannel::with_ids(CHANNEL.channel_id, &[30, 20]);
        let summary = run(tmp.path(), &client).expect("run");

        let paths = resolve_channel_paths(tmp.path(), CHANNEL.guild_id, CHANNEL.channel_id);
        reverse_archive(&paths).expect("finalize");
        assert!(paths.chronological_file.exists());
        assert_eq!(summary.records_written, 2);

        let err = run(tmp.path(), &client).expect_err("refused");
        assert!(VaultError::is_validation(&err));
    }

    #[test]
    fn second_concurrent_run_is_locked_out() {
        let tmp = tempdir().expect("tempdir");
        let paths = resolve_channel_paths(tmp.path(), CHANNEL.guild_id, CHANNEL.channel_id);
        paths.ensure_layout().expect("layout");

        let _held = acquire_lock(&paths).expect("first lock");
        let err = acquire_lock(&paths).expect_err("second lock refused");
        assert!(err.to_string().contains("already active"));
    }
}
