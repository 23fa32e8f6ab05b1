// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OctoDash: headless dashboard for OctoPrint-compatible printers.
//
// Entry point. Initialises logging, loads the printer config, and either
// watches every printer's event stream until Ctrl-C or runs one control
// command.

mod services;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use octodash_core::types::FileLocation;

use services::config_dir;
use services::dashboard::{ControlCommand, Dashboard, JobAction};

/// Headless dashboard for OctoPrint-compatible printers.
#[derive(Parser, Debug)]
#[command(name = "octodash")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/octodash/config.json)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Printer to command; optional when only one is configured
    #[arg(short, long)]
    printer: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow every printer's status until Ctrl-C (default)
    Watch,
    /// Show the controller's version
    Version,
    /// Switch the printer's power supply
    Psu {
        #[arg(value_enum)]
        state: PowerArg,
    },
    /// Control the current job
    Job {
        #[arg(value_enum)]
        action: JobArg,
    },
    /// Show file or folder metadata
    Files {
        /// `local` or `sdcard`
        location: FileLocation,
        /// Folder or file path; the root when omitted
        path: Option<String>,
    },
    /// Select a file for printing
    Select { location: FileLocation, path: String },
    /// Delete a file
    Delete { location: FileLocation, path: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PowerArg {
    On,
    Off,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum JobArg {
    Start,
    Pause,
    Resume,
    Cancel,
}

impl Command {
    /// The one-shot request this command stands for; `None` for `watch`.
    fn into_control(self) -> Option<ControlCommand> {
        let command = match self {
            Command::Watch => return None,
            Command::Version => ControlCommand::Version,
            Command::Psu { state } => ControlCommand::Psu {
                on: matches!(state, PowerArg::On),
            },
            Command::Job { action } => ControlCommand::Job(match action {
                JobArg::Start => JobAction::Start,
                JobArg::Pause => JobAction::Pause,
                JobArg::Resume => JobAction::Resume,
                JobArg::Cancel => JobAction::Cancel,
            }),
            Command::Files { location, path } => ControlCommand::Files { location, path },
            Command::Select { location, path } => ControlCommand::Select { location, path },
            Command::Delete { location, path } => ControlCommand::Delete { location, path },
        };
        Some(command)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("OctoDash starting");

    let path = config_dir::config_path(cli.config.as_deref());
    let dashboard = match Dashboard::init(&path) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, path = %path.display(), "could not load config");
            return ExitCode::FAILURE;
        }
    };

    let Some(command) = cli.command.unwrap_or(Command::Watch).into_control() else {
        dashboard.watch(shutdown_signal()).await;
        return ExitCode::SUCCESS;
    };

    match dashboard.run(cli.printer.as_deref(), command).await {
        Ok(Some(body)) => {
            let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
            println!("{text}");
            ExitCode::SUCCESS
        }
        Ok(None) => {
            info!("command accepted");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl-C, shutting down");
    }
}
