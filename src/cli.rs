use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, CommandReport};

#[derive(Parser)]
#[command(
    name = "chanvault",
    version,
    about = "Resumable Discord channel archiver"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Emit the command report as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive a channel's full history, resuming if a previous run was
    /// interrupted.
    Backup {
        /// Guild (server) id the channel belongs to.
        #[arg(long)]
        guild: u64,
        /// Channel id to archive.
        #[arg(long)]
        channel: u64,
        /// Also write the chronological file when the run completes.
        #[arg(long)]
        chronological: bool,
        /// Confirm destructive resets without prompting.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Rewrite an already archived channel oldest-first, finalizing it.
    Reverse {
        #[arg(long)]
        guild: u64,
        #[arg(long)]
        channel: u64,
    },
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for detail in &report.details {
        println!("{detail}");
    }
    for issue in &report.issues {
        eprintln!("issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match cli.command {
        Commands::Backup {
            guild,
            channel,
            chronological,
            yes,
        } => commands::backup::run(commands::backup::BackupArgs {
            guild_id: guild,
            channel_id: channel,
            chronological,
            assume_yes: yes,
        })?,
        Commands::Reverse { guild, channel } => {
            commands::reverse::run(commands::reverse::ReverseArgs {
                guild_id: guild,
                channel_id: channel,
            })?
        }
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}
