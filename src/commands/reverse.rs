use anyhow::Result;

use crate::commands::CommandReport;
use crate::vault::config;
use crate::vault::paths::resolve_channel_paths;
use crate::vault::reverse::reverse_archive;

pub struct ReverseArgs {
    pub guild_id: u64,
    pub channel_id: u64,
}

/// Offline finalization: rewrite an existing archive oldest-first. Needs
/// no credentials, only the on-disk tree.
pub fn run(args: ReverseArgs) -> Result<CommandReport> {
    let mut report = CommandReport::new("reverse");
    let config = config::load_config()?;
    let paths = resolve_channel_paths(&config.archive_root, args.guild_id, args.channel_id);
    report.detail(format!("archive_file={}", paths.archive_file.display()));

    let rows = reverse_archive(&paths)?;
    report.detail(format!(
        "chronological_file={}",
        paths.chronological_file.display()
    ));
    report.detail(format!("rows={rows}"));
    Ok(report)
}
