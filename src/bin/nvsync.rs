// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use nvsync::{
    bootstrap::{host::SystemInstaller, Resolver},
    config::Settings,
    context::BootstrapContext,
    health::HealthReport,
    path::default_settings_file,
    setup::{sync_plugins, Setup},
    sync::{ConfigRepo, PushOutcome},
};

use anyhow::Result;
use chrono::Local;
use clap::{CommandFactory, Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "nvsync [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to settings file.
    #[arg(short, long, global = true, value_name = "path")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Some(Command::Install(opts)) => run_install(self.settings, opts),
            Some(Command::Push(opts)) => run_push(self.settings, opts),
            Some(Command::Pull) => run_pull(self.settings),
            Some(Command::Health) => run_health(self.settings),
            Some(Command::FixNvim(opts)) => run_fix_nvim(self.settings, opts),
            None => run_usage(),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Install dependencies, editor, and configuration.
    #[command(override_usage = "nvsync install [options]")]
    Install(InstallOptions),

    /// Commit and push local configuration changes.
    #[command(override_usage = "nvsync push [options]")]
    Push(PushOptions),

    /// Pull remote configuration changes.
    Pull,

    /// Report status of installed components.
    #[command(visible_alias = "check")]
    Health,

    /// Reinstall only the editor binary.
    #[command(override_usage = "nvsync fix-nvim [options]")]
    FixNvim(FixNvimOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallOptions {
    /// URL of remote to clone configuration from.
    #[arg(short, long, value_name = "url")]
    pub url: Option<String>,

    /// Branch to check out instead of the configured one.
    #[arg(short, long, value_name = "branch")]
    pub branch: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PushOptions {
    /// Commit message to use instead of a timestamped one.
    #[arg(short, long, value_name = "message")]
    pub message: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct FixNvimOptions {
    /// Reinstall even if a working editor binary is in place.
    #[arg(short, long)]
    pub force: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let path = match path {
        Some(path) => path,
        None => default_settings_file()?,
    };

    Ok(Settings::load(path)?)
}

fn run_install(settings: Option<PathBuf>, opts: InstallOptions) -> Result<()> {
    let mut settings = load_settings(settings)?;
    if let Some(url) = opts.url {
        settings.repository.url = Some(url);
    }
    if let Some(branch) = opts.branch {
        settings.repository.branch = branch;
    }

    let context = BootstrapContext::probe();
    info!("detected {context}");
    let installer = SystemInstaller::new(&settings);
    Setup::new(&installer, &settings).run(&context)?;

    Ok(())
}

fn run_push(settings: Option<PathBuf>, opts: PushOptions) -> Result<()> {
    let settings = load_settings(settings)?;
    let repo = ConfigRepo::open(settings.config_dir()?, &settings.repository.branch)?;
    let message = match opts.message {
        Some(message) => message,
        None => format!("Update config {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
    };

    match repo.push_changes(message)? {
        PushOutcome::NothingToCommit => warn!("nothing to commit, config is unchanged"),
        PushOutcome::Pushed { commit } => info!("config pushed as {commit}"),
    }

    Ok(())
}

fn run_pull(settings: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(settings)?;
    let mut repo = ConfigRepo::open(settings.config_dir()?, &settings.repository.branch)?;
    repo.pull()?;
    if let Err(error) = sync_plugins("nvim") {
        warn!("plugin sync failed, run it again from the editor: {error}");
    }

    Ok(())
}

fn run_health(settings: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(settings).unwrap_or_else(|error| {
        warn!("cannot load settings, using defaults: {error}");
        Settings::default()
    });
    let config_dir = settings.config_dir().unwrap_or_else(|error| {
        warn!("{error}");
        PathBuf::new()
    });

    let installer = SystemInstaller::new(&settings);
    HealthReport::gather(&installer, BootstrapContext::probe(), config_dir).log();

    Ok(())
}

fn run_fix_nvim(settings: Option<PathBuf>, opts: FixNvimOptions) -> Result<()> {
    let settings = load_settings(settings)?;
    let installer = SystemInstaller::new(&settings);
    let installed = Resolver::new(&installer, &settings.editor)
        .with_force(opts.force)
        .probe_and_install()?;
    info!("editor ready: {installed}");

    Ok(())
}

fn run_usage() -> Result<()> {
    Cli::command().print_help()?;
    println!("\nDetected: {}", BootstrapContext::probe());

    Ok(())
}
