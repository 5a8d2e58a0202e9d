//! wledify - paint your WLED lights with the colors of what you're playing
//!
//! A terminal app that:
//! - Logs in to Spotify with PKCE (no client secret, no backend)
//! - Polls "now playing" and extracts a palette from the album artwork
//! - Sends the dominant color to a WLED device on the local network
//! - Shows a live microphone spectrum that can drive the lights too

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use wledify_core::{paths, AppConfig};

mod commands;
mod tui;

/// wledify - Spotify album colors on WLED
#[derive(Parser)]
#[command(name = "wledify")]
#[command(about = "Sync the colors of what you're playing on Spotify to a WLED light", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to ~/.wledify/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the terminal UI
    Run,

    /// Log in to Spotify without the terminal UI
    Login,

    /// Forget the stored Spotify token
    Logout,

    /// Show or set the WLED device address
    Device {
        /// New address, e.g. 192.168.1.50
        ip: Option<String>,
    },

    /// Send the current album's dominant color once
    Send {
        /// Device address to use (saved for next time)
        #[arg(long)]
        ip: Option<String>,
    },

    /// Show login and device status
    Status,
}

/// Restore terminal state - called on panic or unexpected exit
fn restore_terminal() {
    use crossterm::{
        execute,
        terminal::{disable_raw_mode, LeaveAlternateScreen},
    };
    let _ = disable_raw_mode();
    let _ = execute!(std::io::stdout(), LeaveAlternateScreen);
}

fn init_logging() {
    let log_dir = paths::logs_dir();
    std::fs::create_dir_all(&log_dir).ok();

    #[cfg(unix)]
    let null_device = "/dev/null";
    #[cfg(windows)]
    let null_device = "NUL";

    let log_file = match std::fs::File::create(log_dir.join("wledify.log"))
        .or_else(|_| std::fs::File::create(null_device))
    {
        Ok(file) => file,
        // Nowhere to write; run without logging
        Err(_) => return,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to restore terminal state
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        restore_terminal();
        original_hook(panic_info);
    }));

    // Log to a file; stdout belongs to the TUI
    init_logging();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    tracing::info!(configured = config.is_configured(), "wledify starting");

    match cli.command {
        Some(Commands::Login) => commands::login(config).await?,
        Some(Commands::Logout) => commands::logout(config)?,
        Some(Commands::Device { ip }) => commands::device(ip.as_deref())?,
        Some(Commands::Send { ip }) => commands::send(config, ip.as_deref()).await?,
        Some(Commands::Status) => commands::status(&config, cli.config.as_deref())?,
        Some(Commands::Run) | None => {
            let mut app = tui::App::new(config)?;
            app.run().await?;
        }
    }

    Ok(())
}
