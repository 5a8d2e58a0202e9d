//! Headless subcommands

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};

use wledify_core::storage::SharedStore;
use wledify_core::sync::{AlertLevel, Services};
use wledify_core::{
    paths, AppConfig, AuthFlow, DeviceTarget, FileStore, SyncOrchestrator, TokenStore,
};

fn open_storage() -> Result<SharedStore> {
    Ok(Arc::new(
        FileStore::open_default().context("Failed to open local storage")?,
    ))
}

fn orchestrator(config: AppConfig) -> Result<SyncOrchestrator> {
    let services = Services::production(&config)?;
    SyncOrchestrator::new(config, open_storage()?, services)
}

/// Print queued alerts; errors go to stderr
fn print_alerts(sync: &mut SyncOrchestrator) -> bool {
    let mut failed = false;
    for alert in sync.take_alerts() {
        match alert.level {
            AlertLevel::Info => println!("{}", alert.message),
            AlertLevel::Error => {
                failed = true;
                eprintln!("{}", alert.message);
            }
        }
    }
    failed
}

pub async fn login(config: AppConfig) -> Result<()> {
    if !config.is_configured() {
        bail!(
            "No Spotify client id. Set spotify.client_id in {} or WLEDIFY_CLIENT_ID.",
            paths::config_file().display()
        );
    }

    let mut sync = orchestrator(config)?;
    let url = sync.begin_login()?;
    sync.listen_for_callback()?;

    println!("Opening Spotify login in your browser.");
    println!("If nothing opens, visit:");
    println!();
    println!("  {}", url);
    println!();
    if let Err(e) = webbrowser::open(url.as_str()) {
        tracing::warn!("Failed to open browser: {}", e);
    }
    println!("Waiting for Spotify...");

    sync.settle().await;
    let failed = print_alerts(&mut sync);
    if failed || !sync.is_authenticated() {
        bail!("Login failed");
    }
    Ok(())
}

pub fn logout(config: AppConfig) -> Result<()> {
    let storage = open_storage()?;
    TokenStore::load(storage.clone()).clear()?;
    AuthFlow::new(config.spotify, storage).reset()?;
    println!("Logged out.");
    Ok(())
}

pub fn device(ip: Option<&str>) -> Result<()> {
    let storage = open_storage()?;
    match ip {
        Some(ip) => {
            let target = DeviceTarget::new(ip);
            target.save(&storage)?;
            if target.is_empty() {
                println!("WLED IP cleared.");
            } else {
                println!("WLED IP set to {}.", target.ip());
            }
        }
        None => {
            let target = DeviceTarget::load(&storage);
            if target.is_empty() {
                println!("WLED IP not set.");
            } else {
                println!("{}", target.ip());
            }
        }
    }
    Ok(())
}

pub async fn send(config: AppConfig, ip: Option<&str>) -> Result<()> {
    let mut sync = orchestrator(config)?;
    if let Some(ip) = ip {
        sync.set_device_ip(ip)?;
    }

    sync.start(Instant::now());
    if !sync.is_authenticated() {
        bail!("Not logged in. Run `wledify login` first.");
    }

    sync.request_refresh();
    sync.settle().await;
    print_alerts(&mut sync);

    let status = sync.status();
    if let Some(error) = &status.poll_error {
        bail!("{}", error);
    }
    println!("Now playing: {}", status.track_line());
    if let Some(state) = &status.playback {
        println!("  {} - {}", state.artists(), state.album_name);
    }
    match status.palette.palette() {
        Some(palette) => {
            let hexes: Vec<&str> = palette.swatches().iter().map(|s| s.hex.as_str()).collect();
            println!("Palette: {}", hexes.join(" "));
        }
        None => {
            if let Some(message) = status.palette.message() {
                println!("{}", message);
            }
        }
    }

    sync.send_current_color();
    sync.settle().await;
    if let Some(message) = &sync.status().wled_message {
        println!("{}", message);
    }
    Ok(())
}

pub fn status(config: &AppConfig, config_path: Option<&Path>) -> Result<()> {
    let storage = open_storage()?;
    let tokens = TokenStore::load(storage.clone());
    let device = DeviceTarget::load(&storage);

    let config_file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(paths::config_file);
    println!("Config:   {}", config_file.display());
    println!(
        "Client:   {}",
        if config.is_configured() {
            "configured"
        } else {
            "missing (set spotify.client_id)"
        }
    );

    match tokens.token().filter(|_| tokens.is_valid()) {
        Some(token) => {
            let expires = Local
                .timestamp_millis_opt(token.expires_at_ms)
                .single()
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("Spotify:  logged in (token expires {})", expires);
        }
        None => println!("Spotify:  not logged in"),
    }

    if device.is_empty() {
        println!("WLED:     not set");
    } else {
        println!("WLED:     {}", device.ip());
    }
    Ok(())
}
