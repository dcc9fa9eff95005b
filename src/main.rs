mod api;
mod app;
mod auth;
mod bus;
mod cache;
mod commands;
mod config;
mod event;
mod legacy;
mod optimistic;
mod preload;
mod query;
mod services;
mod settings;
mod store;
mod ui;

#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::api::{ProfileUpdate, Registration, ReqwestTransport};
use crate::config::Config;
use crate::services::Services;
use crate::store::{keys, KeyValueStore, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "shimy")]
#[command(about = "A terminal movie discovery client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shimy/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
  /// Sign in; the password is read from SHIMY_PASSWORD
  Login { email: String },
  /// Create an account; the password is read from SHIMY_PASSWORD
  Register {
    email: String,
    username: String,
    #[arg(long, default_value = "")]
    first_name: String,
    #[arg(long, default_value = "")]
    last_name: String,
  },
  /// Forget the stored session
  Logout,
  /// Show the signed-in account
  Whoami,
  /// Update profile fields; omitted fields are left unchanged
  Profile {
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    bio: Option<String>,
  },
  /// Change the password: current from SHIMY_PASSWORD, new from SHIMY_NEW_PASSWORD
  Passwd,
  /// Permanently delete the signed-in account
  DeleteAccount {
    /// Required; nothing is deleted without it
    #[arg(long)]
    yes: bool,
  },
  /// Show saved preferences
  Settings,
  /// Manage locally stored data
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Drop the landing-page snapshot so the next start warms up again
  Clear,
}

/// Log to a daily file in the data directory; the terminal belongs to the UI.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = Config::data_dir()?.join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let file_appender = tracing_appender::rolling::daily(&log_dir, "shimy.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
  let filter = EnvFilter::try_from_env("SHIMY_LOG").unwrap_or_else(|_| EnvFilter::new("shimy=info"));
  tracing_subscriber::fmt()
    .with_writer(non_blocking)
    .with_env_filter(filter)
    .with_ansi(false)
    .init();
  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging()?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open()?);
  let transport = Arc::new(ReqwestTransport::new()?);
  let services = Arc::new(Services::init(config, store, transport)?);

  match args.command {
    None => {
      let mut app = app::App::new(services);
      app.run().await
    }
    Some(command) => {
      let result = run_command(&services, command).await;
      services.dispose();
      result
    }
  }
}

async fn run_command(services: &Services, command: CliCommand) -> Result<()> {
  match command {
    CliCommand::Login { email } => {
      let password = Config::get_password()?;
      let user = services
        .auth
        .login(&email, &password)
        .await
        .map_err(|e| eyre!("Sign-in failed: {}", e))?;
      println!("Signed in as {} <{}>", user.username, user.email);
    }
    CliCommand::Register {
      email,
      username,
      first_name,
      last_name,
    } => {
      let password = Config::get_password()?;
      let registration = Registration {
        email,
        username,
        confirm_password: password.clone(),
        password,
        first_name,
        last_name,
      };
      let user = services
        .auth
        .register(&registration)
        .await
        .map_err(|e| eyre!("Registration failed: {}", e))?;
      println!("Registered and signed in as {}", user.username);
    }
    CliCommand::Logout => {
      if services.session.is_authenticated() {
        services.auth.logout();
        println!("Signed out");
      } else {
        println!("Not signed in");
      }
    }
    CliCommand::Whoami => {
      if !services.auth.refresh().await {
        println!("Not signed in");
        return Ok(());
      }
      let (profile, stats) = tokio::try_join!(services.movies.profile(), services.movies.stats())
        .map_err(|e| eyre!("Could not load profile: {}", e))?;
      println!("{} <{}>", profile.username, profile.email);
      let name = format!("{} {}", profile.first_name, profile.last_name);
      if !name.trim().is_empty() {
        println!("  name:         {}", name.trim());
      }
      println!("  favorites:    {}", stats.favorites_count);
      println!("  watchlist:    {}", stats.watchlist_count);
      println!("  ratings:      {}", stats.ratings_count);
      println!("  member since: {}", stats.member_since);
    }
    CliCommand::Profile {
      first_name,
      last_name,
      bio,
    } => {
      let update = ProfileUpdate {
        first_name,
        last_name,
        bio,
      };
      let profile = services
        .auth
        .update_profile(update)
        .await
        .map_err(|e| eyre!("Profile update failed: {}", e))?;
      println!("Updated profile for {}", profile.username);
    }
    CliCommand::Passwd => {
      let current = Config::get_password()?;
      let new = std::env::var("SHIMY_NEW_PASSWORD")
        .map_err(|_| eyre!("Set SHIMY_NEW_PASSWORD to the new password."))?;
      services
        .auth
        .change_password(&current, &new)
        .await
        .map_err(|e| eyre!("Password change failed: {}", e))?;
      println!("Password changed");
    }
    CliCommand::DeleteAccount { yes } => {
      if !yes {
        return Err(eyre!("Refusing to delete the account without --yes"));
      }
      services
        .auth
        .delete_account()
        .await
        .map_err(|e| eyre!("Account deletion failed: {}", e))?;
      println!("Account deleted");
    }
    CliCommand::Settings => {
      let settings = services.settings.get();
      println!("notifications:  {}", settings.notifications);
      println!("email updates:  {}", settings.email_updates);
      println!("autoplay:       {}", settings.auto_play);
      println!("language:       {}", settings.language.label());
      println!("theme:          {}", settings.theme);
      println!("video quality:  {}", settings.quality);
    }
    CliCommand::Cache {
      action: CacheAction::Clear,
    } => {
      services.store.remove(keys::PRELOAD_SNAPSHOT)?;
      services.store.remove(keys::LAST_PRELOAD)?;
      println!("Cleared the landing-page snapshot");
    }
  }
  Ok(())
}
