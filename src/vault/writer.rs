use crate::chat::client::ChatMessage;
use crate::error::VaultError;
use crate::vault::attachments::{DownloadOutcome, Downloader, download_attachments};
use crate::vault::audit;
use crate::vault::paths::ChannelPaths;
use crate::vault::record::{HEADER_LINE, MessageRecord};
use anyhow::Result;
use chrono::FixedOffset;
use std::fs;
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;

/// Where progress counts go. The CLI installs a console sink; tests use a
/// collecting one.
pub trait ProgressSink: Send + Sync {
    fn record_written(&self, count: u64, message_id: u64);
}

pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn record_written(&self, count: u64, _message_id: u64) {
        println!("wrote record #{count}");
    }
}

#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Fresh runs create the file and write the header; resumed runs
    /// append and must never rewrite it.
    pub fresh: bool,
    pub include_attachments: bool,
    pub offset: FixedOffset,
}

fn write_message(
    out: &mut BufWriter<fs::File>,
    paths: &ChannelPaths,
    opts: &WriterOptions,
    downloader: &dyn Downloader,
    message: &ChatMessage,
) -> Result<()> {
    let outcome = if opts.include_attachments {
        download_attachments(downloader, &paths.attachments_dir, message)?
    } else {
        DownloadOutcome::default()
    };
    if !outcome.failed.is_empty() {
        let _ = audit::append_event(
            paths,
            "attachments",
            "degraded",
            &format!("message={} failed={}", message.id, outcome.failed.join(",")),
        );
    }

    let record = MessageRecord::from_message(message, &outcome, opts.offset)?;
    writeln!(out, "{}", record.encode_line()).map_err(|err| {
        VaultError::Write(format!("failed to append record {}: {err}", message.id))
    })?;
    Ok(())
}

fn drain_queue(
    out: &mut BufWriter<fs::File>,
    paths: &ChannelPaths,
    opts: &WriterOptions,
    announcement: Option<&ChatMessage>,
    downloader: &dyn Downloader,
    rx: &Receiver<Vec<ChatMessage>>,
    failed: &AtomicBool,
    progress: &dyn ProgressSink,
    written: &mut u64,
) -> Result<()> {
    if opts.fresh {
        writeln!(out, "{HEADER_LINE}")
            .map_err(|err| VaultError::Write(format!("failed to write archive header: {err}")))?;
        if let Some(first) = announcement {
            write_message(out, paths, opts, downloader, first)?;
            *written += 1;
            progress.record_written(*written, first.id);
        }
    }

    // Blocks while the queue is open, drains whatever was queued after it
    // closes, then falls through.
    for batch in rx.iter() {
        if failed.load(Ordering::SeqCst) {
            break;
        }
        for message in &batch {
            write_message(out, paths, opts, downloader, message)?;
            *written += 1;
            progress.record_written(*written, message.id);
        }
    }

    out.flush()
        .map_err(|err| VaultError::Write(format!("failed to flush archive file: {err}")))?;
    Ok(())
}

/// Archive consumer: owns the output file for the whole run, drains the
/// handoff queue, and appends one record per message in encounter order.
///
/// Never raises past this boundary: any encode/append error latches the
/// shared failure flag. The file handle is released on every exit path,
/// so a partial write is bounded to the in-flight record. Returns the
/// number of records appended, counting those that landed before a
/// failure.
pub fn run_writer(
    paths: &ChannelPaths,
    opts: &WriterOptions,
    announcement: Option<&ChatMessage>,
    downloader: &dyn Downloader,
    rx: Receiver<Vec<ChatMessage>>,
    failed: &AtomicBool,
    progress: &dyn ProgressSink,
) -> u64 {
    let file = if opts.fresh {
        fs::File::create_new(&paths.archive_file)
    } else {
        fs::OpenOptions::new().append(true).open(&paths.archive_file)
    };
    let file = match file {
        Ok(f) => f,
        Err(err) => {
            eprintln!(
                "failed to open {}: {err}",
                paths.archive_file.display()
            );
            failed.store(true, Ordering::SeqCst);
            return 0;
        }
    };
    let mut out = BufWriter::new(file);
    let mut written = 0u64;

    match drain_queue(
        &mut out,
        paths,
        opts,
        announcement,
        downloader,
        &rx,
        failed,
        progress,
        &mut written,
    ) {
        Ok(()) => println!("done writing all records"),
        Err(err) => {
            eprintln!("archive write failed after {written} records, stopping: {err:#}");
            failed.store(true, Ordering::SeqCst);
            let _ = out.flush();
        }
    }
    written
}
