// SPDX-FileCopyrightText: 2026 Promptgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Promptgate - a gated prompt-challenge activity bot.
//!
//! This is the binary entry point.

mod serve;

use clap::{Parser, Subcommand};

/// Promptgate - a gated prompt-challenge activity bot.
#[derive(Parser, Debug)]
#[command(name = "promptgate", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the bot: admission front, worker pool, Telegram polling.
    Serve,
    /// Validate the three content documents and exit.
    Validate,
    /// Print one day of audit events as JSON lines.
    ExportLogs {
        /// UTC calendar date, YYYY-MM-DD.
        date: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve => serve::run().await,
        Commands::Validate => serve::validate().await,
        Commands::ExportLogs { date } => serve::export_logs(&date).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
