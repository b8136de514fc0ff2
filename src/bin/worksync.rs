//! # Worksync CLI - workspace mirror for remote task assets
//!
//! A thin command-line surface over the worksync library.
//!
//! ## Usage
//! ```bash
//! # Point the tool at your roots and API
//! worksync config --workspace ~/work --remote /mnt/remote --api-url http://localhost:3200
//!
//! # Link a remote task into the workspace
//! worksync link T1 proj/T1
//!
//! # Pull remote content for a folder
//! worksync sync proj/T1
//!
//! # Capture and upload a snapshot
//! worksync snapshot T1 --kind source -m "tweaked lighting"
//!
//! # Roll back to a prior snapshot
//! worksync rollback T1 <commit-id>
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write as _};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use worksync::{
    ConfirmGate, HttpSnapshotTransport, JsonSettingsStore, MediaFiles, OperationOutcome,
    SettingsStore, SnapshotAuthor, SnapshotKind, SnapshotSubmission, SyncOrchestrator,
    SyncOrchestratorBuilder,
};

const DEFAULT_API_URL: &str = "http://localhost:3200";

/// Worksync CLI - sync, snapshot and roll back remote task content
#[derive(Parser)]
#[command(name = "worksync")]
#[command(version)]
#[command(about = "Workspace mirror for remote versioned task assets")]
struct Cli {
    /// Settings file path
    #[arg(short, long, global = true, default_value = "worksync.json")]
    settings: PathBuf,

    /// Answer yes to every confirmation prompt
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or update the configured roots and API URL
    Config {
        /// Workspace root directory
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Remote source root directory
        #[arg(long)]
        remote: Option<PathBuf>,

        /// Remote API base URL
        #[arg(long)]
        api_url: Option<String>,
    },

    /// Pull remote content for a workspace-relative path
    Sync {
        /// Path relative to the workspace root
        path: PathBuf,
    },

    /// Link a remote task to a workspace folder
    Link {
        /// Task identifier
        task: String,

        /// Path relative to the workspace root
        path: PathBuf,
    },

    /// Capture and upload a snapshot of a linked task
    #[command(alias = "snap")]
    Snapshot {
        /// Task identifier
        task: String,

        /// Content tree to capture
        #[arg(long, value_enum, default_value = "source")]
        kind: KindArg,

        /// Commit message
        #[arg(short, long)]
        message: String,

        /// Author display name
        #[arg(long)]
        username: Option<String>,

        /// Author identifier
        #[arg(long)]
        user_id: Option<String>,

        /// Thumbnail file to attach (deleted after upload)
        #[arg(long)]
        thumbnail: Option<PathBuf>,

        /// Preview file to attach (deleted after upload)
        #[arg(long)]
        preview: Option<PathBuf>,

        /// Skip packing the linked directory
        #[arg(long)]
        bypass_zip: bool,

        /// Ask the server to skip media post-processing
        #[arg(long)]
        bypass_processing: bool,
    },

    /// Roll a task back to a prior snapshot
    Rollback {
        /// Task identifier
        task: String,

        /// Snapshot commit id
        commit: String,
    },

    /// Remove a task's workspace folder and its link
    Unlink {
        /// Task identifier
        task: String,

        /// Path relative to the workspace root
        path: PathBuf,
    },

    /// Delete a snapshot record on the remote service
    Delete {
        /// Task identifier
        task: String,

        /// Snapshot commit id
        commit: String,
    },

    /// List a task's snapshots
    #[command(alias = "ls")]
    List {
        /// Task identifier
        task: String,
    },

    /// Show all task links
    Links,

    /// Show a task's raw record from the remote service
    Task {
        /// Task identifier
        task: String,
    },

    /// Create a new task asset on the remote service
    CreateAsset {
        /// Asset name
        name: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Source,
    Exports,
}

impl From<KindArg> for SnapshotKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Source => SnapshotKind::Source,
            KindArg::Exports => SnapshotKind::Exports,
        }
    }
}

/// Terminal confirmation gate; `--yes` turns it into a pass-through
struct TerminalConfirm {
    assume_yes: bool,
}

impl ConfirmGate for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{} [y/N] ", prompt.yellow());
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim(), "y" | "Y" | "yes")
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "worksync=debug"
    } else {
        "worksync=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let store = Arc::new(JsonSettingsStore::new(&cli.settings));

    // Config and Links only touch the settings file
    match &cli.command {
        Commands::Config {
            workspace,
            remote,
            api_url,
        } => return handle_config(&store, workspace, remote, api_url),
        Commands::Links => {
            let settings = store.load()?;
            if settings.linked_tasks.is_empty() {
                println!("no linked tasks");
            }
            for (task, path) in &settings.linked_tasks {
                println!("{}  {}", task.cyan(), path.display());
            }
            return Ok(());
        }
        _ => {}
    }

    let base_url = store
        .load()?
        .api_base_url
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let api = Arc::new(HttpSnapshotTransport::new(&base_url)?);

    // Transport-only passthroughs
    match &cli.command {
        Commands::List { task } => {
            use worksync::SnapshotApi as _;
            for snapshot in api.list_snapshots(task)? {
                println!(
                    "{}  {:7}  {}  {}",
                    snapshot.commit_id.cyan(),
                    snapshot.kind.to_string().magenta(),
                    snapshot.created_at.format("%Y-%m-%d %H:%M"),
                    snapshot.message
                );
            }
            return Ok(());
        }
        Commands::Task { task } => {
            println!("{}", serde_json::to_string_pretty(&api.get_task(task)?)?);
            return Ok(());
        }
        Commands::CreateAsset { name } => {
            println!(
                "{}",
                serde_json::to_string_pretty(&api.create_asset(name)?)?
            );
            return Ok(());
        }
        _ => {}
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .expect("valid progress template"),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    let sink_spinner = spinner.clone();

    let orchestrator = SyncOrchestratorBuilder::new()
        .progress_sink(Arc::new(move |label: &str| {
            sink_spinner.set_message(label.to_string());
        }))
        .confirm_gate(Arc::new(TerminalConfirm { assume_yes: cli.yes }))
        .build(api, store);

    let started = Instant::now();
    let outcome = dispatch(&cli.command, &orchestrator);
    spinner.finish_and_clear();
    report(outcome, started)
}

fn dispatch(command: &Commands, orchestrator: &SyncOrchestrator) -> OperationOutcome {
    match command {
        Commands::Sync { path } => orchestrator.sync_from_remote(path),
        Commands::Link { task, path } => orchestrator.link_to_workspace(task, path),
        Commands::Snapshot {
            task,
            kind,
            message,
            username,
            user_id,
            thumbnail,
            preview,
            bypass_zip,
            bypass_processing,
        } => {
            let author = match (username, user_id) {
                (Some(username), Some(user_id)) => Some(SnapshotAuthor {
                    username: username.clone(),
                    user_id: user_id.clone(),
                }),
                _ => None,
            };
            let submission = SnapshotSubmission {
                kind: (*kind).into(),
                message: message.clone(),
                author,
                media: MediaFiles {
                    thumbnail: thumbnail.clone(),
                    preview: preview.clone(),
                },
                bypass_zip: *bypass_zip,
                bypass_processing: *bypass_processing,
            };
            orchestrator.snapshot(task, submission)
        }
        Commands::Rollback { task, commit } => orchestrator.rollback_snapshot(task, commit),
        Commands::Unlink { task, path } => orchestrator.unlink_from_workspace(task, path),
        Commands::Delete { task, commit } => orchestrator.delete_snapshot(task, commit),
        // Remaining commands are handled before the orchestrator is built
        _ => unreachable!("command handled earlier"),
    }
}

fn handle_config(
    store: &Arc<JsonSettingsStore>,
    workspace: &Option<PathBuf>,
    remote: &Option<PathBuf>,
    api_url: &Option<String>,
) -> anyhow::Result<()> {
    let mut settings = store.load()?;
    let mut changed = false;

    if let Some(path) = workspace {
        settings.workspace_path = Some(path.clone());
        changed = true;
    }
    if let Some(path) = remote {
        settings.remote_path = Some(path.clone());
        changed = true;
    }
    if let Some(url) = api_url {
        settings.api_base_url = Some(url.clone());
        changed = true;
    }
    if changed {
        store.save(&settings)?;
        println!("{}", "settings updated".green());
    }

    let show = |label: &str, value: Option<String>| {
        println!(
            "{:10} {}",
            label.bold(),
            value.unwrap_or_else(|| "(unset)".dimmed().to_string())
        );
    };
    show(
        "workspace",
        settings.workspace_path.map(|p| p.display().to_string()),
    );
    show(
        "remote",
        settings.remote_path.map(|p| p.display().to_string()),
    );
    show("api-url", settings.api_base_url);
    Ok(())
}

fn report(outcome: OperationOutcome, started: Instant) -> anyhow::Result<()> {
    let elapsed = humantime::format_duration(Duration::from_millis(
        started.elapsed().as_millis() as u64,
    ));

    if outcome.success {
        println!("{} done in {}", "✓".green().bold(), elapsed);
        if let Some(snapshot) = outcome.snapshot {
            println!(
                "  created snapshot {} ({})",
                snapshot.commit_id.cyan(),
                snapshot.kind
            );
        }
        return Ok(());
    }
    if outcome.cancelled {
        println!("{}", "cancelled".yellow());
        return Ok(());
    }
    let message = outcome.error.unwrap_or_else(|| "unknown failure".into());
    if outcome.partial {
        // The remote record changed; make that impossible to miss.
        eprintln!(
            "{} {}",
            "partial:".yellow().bold(),
            format!("{message} (remote state was updated; local mirror may be stale)").yellow()
        );
        std::process::exit(2);
    }
    eprintln!("{} {}", "failed:".red().bold(), message);
    std::process::exit(1);
}
