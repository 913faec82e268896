//! `georeport`: terminal dashboard for a GeoReport server.
//!
//! # Usage
//!
//! ```
//! georeport --url http://localhost:8080 --user ana@example.com --password secret
//! georeport --config ~/.config/georeport/config.toml
//! ```
//!
//! Logs go to a file (`--log-file`, default `georeport.log` in the system
//! temp directory) so they never tear the UI.

mod app;
mod client;
mod stream;
mod ui;

use std::{fs::File, io, path::PathBuf, sync::Mutex, time::Duration};

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use client::{ApiClient, ApiConfig};
use crossterm::{
  event::{self, Event},
  execute,
  terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use georeport_core::realtime::{SubscriptionHandle, SubscriptionManager};
use ratatui::{Terminal, backend::CrosstermBackend};
use serde::Deserialize;
use stream::SseOpener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "georeport", about = "Terminal dashboard for GeoReport")]
struct Args {
  /// Path to a TOML config file (url, username, password).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the GeoReport server (default: http://localhost:8080).
  #[arg(long, env = "GEOREPORT_URL")]
  url: Option<String>,

  /// Account email.
  #[arg(long, env = "GEOREPORT_USER")]
  user: Option<String>,

  /// Account password (plaintext).
  #[arg(long, env = "GEOREPORT_PASSWORD")]
  password: Option<String>,

  /// Where to write logs.
  #[arg(long, value_name = "FILE")]
  log_file: Option<PathBuf>,
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:      String,
  #[serde(default)]
  username: String,
  #[serde(default)]
  password: String,
}

fn non_empty(s: &str) -> Option<String> { (!s.is_empty()).then(|| s.to_string()) }

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  let log_path = args
    .log_file
    .clone()
    .unwrap_or_else(|| std::env::temp_dir().join("georeport.log"));
  let log_file = File::create(&log_path)
    .with_context(|| format!("creating log file {}", log_path.display()))?;
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_ansi(false)
    .with_writer(Mutex::new(log_file))
    .init();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags and env override the config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url: args
      .url
      .or_else(|| non_empty(&file_cfg.url))
      .unwrap_or_else(|| "http://localhost:8080".to_string()),
    username: args.user.or_else(|| non_empty(&file_cfg.username)).unwrap_or_default(),
    password: args
      .password
      .or_else(|| non_empty(&file_cfg.password))
      .unwrap_or_default(),
  };

  let client = ApiClient::new(api_config)?;
  let subscriptions = SubscriptionManager::new(SseOpener::new(client.clone()));
  let mut app = App::new(client);

  // Log in before touching the terminal so bad credentials print plainly.
  app.load_all().await?;
  tracing::info!(user = %app.client.username(), "dashboard started");
  let mut channel = app.me.as_ref().map(|me| subscriptions.acquire(me.id));

  enable_raw_mode().context("enabling raw mode")?;
  let mut stdout = io::stdout();
  execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
  let backend = CrosstermBackend::new(stdout);
  let mut terminal = Terminal::new(backend).context("creating terminal")?;

  let run_result = run_event_loop(&mut terminal, &mut app, channel.as_mut()).await;

  disable_raw_mode().ok();
  execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
  terminal.show_cursor().ok();

  drop(channel);
  if let Err(e) = app.client.logout().await {
    tracing::warn!(error = %e, "logout failed");
  }

  run_result
}

// ─── Event loop ───────────────────────────────────────────────────────────────

async fn run_event_loop(
  terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
  app: &mut App,
  mut channel: Option<&mut SubscriptionHandle<SseOpener>>,
) -> Result<()> {
  loop {
    if let Some(handle) = channel.as_deref_mut() {
      while let Some(event) = handle.try_recv() {
        app.on_notification_event(event);
      }
    }
    app.expire_toasts(std::time::Instant::now());

    terminal.draw(|f| ui::draw(f, app)).context("drawing frame")?;

    // Poll for an event, yielding control to tokio while waiting.
    let maybe_event = tokio::task::block_in_place(|| {
      if event::poll(Duration::from_millis(50))? {
        Ok::<_, io::Error>(Some(event::read()?))
      } else {
        Ok(None)
      }
    })?;

    if let Some(Event::Key(key)) = maybe_event
      && !app.handle_key(key).await?
    {
      break;
    }
  }

  Ok(())
}
