use anyhow::Result;
use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::chat::rest::DiscordRestClient;
use crate::commands::CommandReport;
use crate::vault::attachments::HttpDownloader;
use crate::vault::config::{self, VaultConfig};
use crate::vault::paths::resolve_channel_paths;
use crate::vault::pipeline::{BackupRun, ChannelRef, RunNotice};
use crate::vault::reverse::reverse_archive;
use crate::vault::writer::ConsoleProgress;

pub struct BackupArgs {
    pub guild_id: u64,
    pub channel_id: u64,
    /// Write the chronological file once the archive completes.
    pub chronological: bool,
    /// Skip the interactive prompt and confirm destructive resets.
    pub assume_yes: bool,
}

fn prompt_reset(dir: &Path) -> bool {
    print!(
        "archive at {} failed validation; delete it and start over? [y/N] ",
        dir.display()
    );
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn print_notice(notice: &RunNotice) {
    println!("== {} (#{:06X}) ==", notice.title, notice.color);
    println!("{}", notice.description);
}

pub fn run(args: BackupArgs) -> Result<CommandReport> {
    let mut report = CommandReport::new("backup");
    let config: VaultConfig = config::load_config()?;
    let token = config::bot_token()?;

    report.detail(format!("archive_root={}", config.archive_root.display()));
    report.detail(format!(
        "guild={} channel={}",
        args.guild_id, args.channel_id
    ));

    let client = DiscordRestClient::new(token)?;
    let downloader = HttpDownloader::new()?;
    let channel = ChannelRef {
        guild_id: args.guild_id,
        channel_id: args.channel_id,
    };

    let confirm: Box<dyn Fn(&Path) -> bool> = if args.assume_yes {
        Box::new(|_: &Path| true)
    } else {
        Box::new(prompt_reset)
    };

    let run = BackupRun::new(config.clone(), channel);
    match run.start(&client, &downloader, confirm.as_ref(), &ConsoleProgress) {
        Ok(summary) => {
            print_notice(&RunNotice::success(&summary));
            report.detail(format!("records_written={}", summary.records_written));
            report.detail(format!("resumed={}", summary.resumed));
            report.detail(format!("archive_file={}", summary.archive_file.display()));
        }
        Err(err) => {
            print_notice(&RunNotice::failure(&err));
            report.issue(format!("archive run failed: {err:#}"));
            return Ok(report);
        }
    }

    if args.chronological {
        let paths = resolve_channel_paths(&config.archive_root, args.guild_id, args.channel_id);
        let rows = reverse_archive(&paths)?;
        report.detail(format!(
            "chronological_file={} rows={rows}",
            paths.chronological_file.display()
        ));
    }

    Ok(report)
}
