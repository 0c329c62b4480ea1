use anyhow::{bail, Context, Result};
use autokeypad::config::{ConfigStore, MacroConfig};
use autokeypad::driver::{platform_driver, InputDriver, LogDriver};
use autokeypad::global_hotkey::DEFAULT_TOGGLE_HOTKEY;
use autokeypad::notifier::{ChannelNotifier, StatusEvent};
use autokeypad::token::parse_token;
use autokeypad::{DebouncedToggle, HotkeyListener, Scheduler};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "akp", version, about = "Replay a ten-row key/mouse macro on a hotkey")]
struct Cli {
    /// Macro file to use instead of ~/.keyboardSupport.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Wait for the toggle hotkey and play the macro (default)
    Run {
        /// Toggle hotkey, e.g. "shift+2" or "ctrl+alt+f8"
        #[arg(long, default_value = DEFAULT_TOGGLE_HOTKEY)]
        hotkey: String,

        /// Log presses instead of injecting them
        #[arg(long)]
        dry_run: bool,

        /// Start playing immediately
        #[arg(long)]
        start: bool,
    },
    /// Print the current macro
    Show,
    /// Set one row of the macro
    SetStep {
        /// Row number
        #[arg(value_parser = clap::value_parser!(u8).range(1..=10))]
        row: u8,
        /// Key token, e.g. "a", "enter", "f5", "mouse.left"
        token: String,
        /// Hold duration in milliseconds (0-60000)
        #[arg(default_value_t = 0)]
        ms: i64,
    },
    /// Set how many times the macro repeats (0 = until stopped)
    SetRepeat { count: i64 },
    /// Blank one row, or every row when no row is given
    Clear {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=10))]
        row: Option<u8>,
    },
    /// Show what a token resolves to
    Parse { token: String },
    /// Print the macro file and backup locations
    Paths,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = match &cli.config {
        Some(path) => ConfigStore::for_primary(path),
        None => ConfigStore::at_home().context("Failed to locate the macro file")?,
    };

    match cli.command.unwrap_or(Command::Run {
        hotkey: DEFAULT_TOGGLE_HOTKEY.to_string(),
        dry_run: false,
        start: false,
    }) {
        Command::Run {
            hotkey,
            dry_run,
            start,
        } => run(store, &hotkey, dry_run, start).await,
        Command::Show => {
            print_config(&store.load());
            Ok(())
        }
        Command::SetStep { row, token, ms } => edit(store, |config| {
            config.set_step(usize::from(row) - 1, token, ms);
        }),
        Command::SetRepeat { count } => edit(store, |config| config.repeat_count = count),
        Command::Clear { row } => edit(store, |config| match row {
            Some(row) => {
                config.set_step(usize::from(row) - 1, "", 0);
            }
            None => config.steps = Default::default(),
        }),
        Command::Parse { token } => {
            match parse_token(&token) {
                Some(action) => println!("{} -> {}", token.cyan(), action.to_string().green()),
                None => println!("{} -> {}", token.cyan(), "no action".yellow()),
            }
            Ok(())
        }
        Command::Paths => {
            println!("primary: {}", store.primary_path().display());
            println!("backup:  {}", store.backup_path().display());
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "autokeypad=debug,akp=debug"
    } else {
        "autokeypad=info,akp=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(store: ConfigStore, hotkey: &str, dry_run: bool, start: bool) -> Result<()> {
    let driver: Arc<dyn InputDriver> = if dry_run {
        Arc::new(LogDriver)
    } else {
        Arc::from(platform_driver())
    };
    let (notifier, mut status) = ChannelNotifier::new();
    let scheduler = Scheduler::from_store(store, driver, Arc::new(notifier));
    print_config(&scheduler.config());

    let mut listener = HotkeyListener::new().context("Failed to initialise global hotkeys")?;
    listener
        .register(hotkey)
        .with_context(|| format!("Failed to register toggle hotkey '{}'", hotkey))?;
    let toggle = Arc::new(DebouncedToggle::new(scheduler.clone()));
    let hotkey_task = listener
        .spawn(toggle)
        .with_context(|| format!("Failed to listen for toggle hotkey '{}'", hotkey))?;

    let status_task = tokio::spawn(async move {
        while let Some(event) = status.recv().await {
            print_status(&event);
        }
    });

    println!(
        "🔥 Press {} to start/stop, Ctrl+C to quit",
        hotkey.bold().yellow()
    );
    if start {
        scheduler.start();
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    listener.shutdown();
    let stopping = scheduler.clone();
    tokio::task::spawn_blocking(move || stopping.shutdown())
        .await
        .context("Playback shutdown task failed")?;
    if let Err(e) = hotkey_task.await {
        warn!("Hotkey listener task failed: {}", e);
    }
    status_task.abort();
    Ok(())
}

fn edit(store: ConfigStore, f: impl FnOnce(&mut MacroConfig)) -> Result<()> {
    let (notifier, mut status) = ChannelNotifier::new();
    let scheduler = Scheduler::from_store(store, Arc::new(LogDriver), Arc::new(notifier));
    scheduler.edit(f);

    while let Ok(event) = status.try_recv() {
        if let StatusEvent::SaveFailed(reason) = event {
            bail!("{}", reason);
        }
    }
    print_config(&scheduler.config());
    Ok(())
}

fn print_status(event: &StatusEvent) {
    let text = event.to_string();
    match event {
        StatusEvent::Running { .. } => println!("▶️  {}", text.green().bold()),
        StatusEvent::Stopped => println!("⏸️  {}", text.yellow().bold()),
        StatusEvent::StillStopping => println!("⏳ {}", text.yellow()),
        StatusEvent::SaveFailed(_) => println!("⚠️  {}", text.red()),
    }
}

fn print_config(config: &MacroConfig) {
    let repeat = match config.repeat_count {
        0 => "infinite".to_string(),
        n => n.to_string(),
    };
    println!("{} {}", "Repeat:".bold(), repeat);
    for (i, step) in config.steps.iter().enumerate() {
        let resolved = if step.is_blank() {
            "-".dimmed().to_string()
        } else {
            match step.action() {
                Some(action) => action.to_string().green().to_string(),
                None => "no action".yellow().to_string(),
            }
        };
        println!(
            "{:>2}. {:<12} {:>6}ms  {}",
            i + 1,
            step.token,
            step.hold_ms,
            resolved
        );
    }
}
