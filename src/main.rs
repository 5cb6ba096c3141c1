use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hackpost::backup::BackupManager;
use hackpost::cache::{CacheStorage, FileStorage, NoopStorage};
use hackpost::config::Config;
use hackpost::hackmd::{Credential, HackmdClient};
use hackpost::posts::{NormalizeOptions, PipelineOptions, PostPipeline};
use hackpost::{logging, server};

#[derive(Parser, Debug)]
#[command(name = "hackpost")]
#[command(about = "Serve HackMD notes as blog posts through a local cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/hackpost/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the HTTP server (default)
  Serve {
    /// Address to listen on, overriding server.bind
    #[arg(short, long)]
    bind: Option<SocketAddr>,
  },
  /// Print all posts
  List,
  /// Print one post by slug
  Get { slug: String },
  /// Drop the cache and rebuild it from upstream
  Refresh,
  /// Manage cache file backups
  Backup {
    #[command(subcommand)]
    command: BackupCommand,
  },
}

#[derive(Subcommand, Debug)]
enum BackupCommand {
  /// List backup files
  List {
    /// Only backups of this file
    #[arg(short, long)]
    filename: Option<String>,
  },
  /// Back up a file from the cache directory
  Create { file: String },
  /// Copy a backup over its original file
  Restore { backup: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log);

  let command = args.command.unwrap_or(Command::Serve { bind: None });

  if let Command::Backup { command } = command {
    return run_backup(&config, command);
  }

  let credential = Config::get_api_token().map(Credential::new);
  if credential.is_none() {
    tracing::warn!("no API token set (HACKPOST_API_TOKEN or HACKMD_API_KEY), calling upstream anonymously");
  }
  let client = HackmdClient::new(&config.upstream, credential)?;

  if config.cache.enabled {
    let mut storage =
      FileStorage::new(config.cache.cache_path()?).with_corrupt_policy(config.cache.on_corrupt);
    if config.cache.backups {
      storage = storage.with_backups(backup_manager(&config)?);
    }
    run(&config, command, client, storage).await
  } else {
    tracing::info!("cache disabled, every request goes upstream");
    run(&config, command, client, NoopStorage).await
  }
}

async fn run<S: CacheStorage + 'static>(
  config: &Config,
  command: Command,
  client: HackmdClient,
  storage: S,
) -> Result<()> {
  let options = PipelineOptions {
    normalize: NormalizeOptions {
      excerpt_length: config.posts.excerpt_length,
    },
    fetch_details: config.upstream.fetch_details,
    detail_concurrency: config.upstream.detail_concurrency,
  };
  let pipeline = PostPipeline::new(client, storage).with_options(options);

  match command {
    Command::Serve { bind } => {
      let backups = if config.cache.enabled {
        Some(backup_manager(config)?)
      } else {
        None
      };
      let state = server::AppState {
        pipeline: Arc::new(pipeline),
        backups,
      };
      server::serve(bind.unwrap_or(config.server.bind), server::router(state)).await?;
    }
    Command::List => print_json(&pipeline.list().await?.data)?,
    Command::Get { slug } => print_json(&pipeline.get_by_slug(&slug).await?.data)?,
    Command::Refresh => print_json(&pipeline.refresh().await?.data)?,
    Command::Backup { command } => run_backup(config, command)?,
  }

  Ok(())
}

fn run_backup(config: &Config, command: BackupCommand) -> Result<()> {
  let backups = backup_manager(config)?;
  match command {
    BackupCommand::List { filename } => print_json(&backups.list_backups(filename.as_deref())?)?,
    BackupCommand::Create { file } => println!("{}", backups.create_backup(&file)?.display()),
    BackupCommand::Restore { backup } => println!("{}", backups.restore_backup(&backup)?.display()),
  }
  Ok(())
}

/// Backups live beside the cache file unless cache.backup_dir says otherwise.
fn backup_manager(config: &Config) -> Result<BackupManager> {
  let cache_path = config.cache.cache_path()?;
  let base_dir = cache_path
    .parent()
    .map(Path::to_path_buf)
    .ok_or_else(|| eyre!("cache path has no parent directory: {}", cache_path.display()))?;
  Ok(
    BackupManager::new(base_dir, config.cache.backup_dir()?)
      .with_max_backups(config.cache.max_backups),
  )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
