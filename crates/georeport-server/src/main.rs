//! georeport-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) plus
//! `GEOREPORT_*` environment variables, opens an in-process SQLite store, and
//! serves the JSON API over HTTP.
//!
//! # First run
//!
//! A fresh database has no users. Create the first account, then start the
//! server normally:
//!
//! ```
//! cargo run -p georeport-server -- --bootstrap-admin admin@example.com
//! ```

use std::{
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use georeport_core::{entity::UserFields, store::GeoStore};
use georeport_server::{AppState, ServerConfig};
use georeport_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "GeoReport API server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,

  /// Create the first user with this email and exit. Refused once any user
  /// exists.
  #[arg(long, value_name = "EMAIL")]
  bootstrap_admin: Option<String>,

  /// Set the password of an existing user and exit.
  #[arg(long, value_name = "EMAIL")]
  set_password: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    println!("{}", hash_password(&read_password()?)?);
    return Ok(());
  }

  let settings = config::Config::builder()
    .set_default("host", "127.0.0.1")?
    .set_default("port", 8080)?
    .set_default("store_path", "~/.local/share/georeport/georeport.db")?
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("GEOREPORT"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent() {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if let Some(email) = cli.bootstrap_admin {
    return bootstrap_admin(&store, &email).await;
  }
  if let Some(email) = cli.set_password {
    let user = store
      .find_user_by_email(&email)
      .await?
      .with_context(|| format!("no user with email {email}"))?;
    let hash = hash_password(&read_password()?)?;
    store.set_password_hash(user.id, hash).await?;
    tracing::info!(%email, "password updated");
    return Ok(());
  }
  if !store.has_users().await? {
    tracing::warn!("no users exist yet; run with --bootstrap-admin <EMAIL>");
  }

  let app = georeport_server::router(AppState::new(Arc::new(store), server_cfg.clone()));
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .await
    .context("server error")?;

  Ok(())
}

async fn bootstrap_admin(store: &SqliteStore, email: &str) -> anyhow::Result<()> {
  if store.has_users().await? {
    anyhow::bail!("users already exist; bootstrap is only for an empty database");
  }
  let password = read_password()?;
  let user = store
    .insert(
      UserFields {
        email:    email.to_string(),
        nombre:   "Administrador".to_string(),
        apellido: None,
        telefono: None,
        role_id:  None,
      },
      None,
    )
    .await
    .context("failed to create user")?;
  store.set_password_hash(user.id, hash_password(&password)?).await?;
  tracing::info!(id = %user.id, %email, "created first user");
  Ok(())
}

fn hash_password(password: &str) -> anyhow::Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string(),
  )
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  let password = line.trim_end_matches(['\n', '\r']).to_string();
  if password.is_empty() {
    anyhow::bail!("password must not be empty");
  }
  Ok(password)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
