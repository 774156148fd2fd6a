mod account;
mod activity;
mod cli;
mod config;
mod forms;
mod storage;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::cell::RefCell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "guildpass",
    about = "Local account and profile manager for the guild site (simulated accounts, not real authentication)"
)]
pub struct Args {
    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "GUILDPASS_STORAGE", help = "Storage file path")]
    pub storage: Option<PathBuf>,

    #[arg(long, help = "Keep all data in memory for this run")]
    pub ephemeral: bool,

    #[arg(long, help = "Activity log directory")]
    pub activity_dir: Option<PathBuf>,

    #[arg(long, help = "Debug output (print resolved settings)")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sign in; any name of 3+ characters and password of 6+ characters is accepted
    Login {
        /// Username or email (defaults to the remembered username)
        identifier: Option<String>,
        /// Prompted for when omitted
        password: Option<String>,
        #[arg(long, help = "Remember the username for next time")]
        remember: bool,
    },
    /// Create an account, replacing any stored one
    Register {
        username: String,
        email: String,
        password: String,
        confirm_password: String,
    },
    /// Show the current profile
    #[command(alias = "profile")]
    Whoami,
    /// Edit the current profile
    Edit {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, help = "Image URL (jpg, jpeg, png, gif, webp)")]
        avatar: Option<String>,
        #[arg(long, conflicts_with = "avatar", help = "Upload a local image as avatar")]
        avatar_file: Option<PathBuf>,
    },
    /// Sign out and forget the remembered username
    Logout {
        #[arg(long, help = "Skip the confirmation prompt")]
        yes: bool,
    },
    /// Print the username remembered for the login prompt
    Remembered,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: failed to load config: {}", e);
            config::Config::default()
        })
    };

    // CLI overrides
    if let Some(path) = &args.storage {
        cfg.storage.path = Some(path.clone());
    }
    if let Some(dir) = &args.activity_dir {
        cfg.activity.dir = Some(dir.clone());
    }

    if let Err(errors) = cfg.validate() {
        for error in &errors {
            eprintln!("Config error {}", error);
        }
        return Err(anyhow::anyhow!(
            "Invalid configuration ({} error(s))",
            errors.len()
        ));
    }

    let storage = if args.ephemeral {
        storage::Storage::Memory(storage::MemoryStorage::new())
    } else {
        storage::Storage::File(storage::FileStorage::open(&cfg.storage.resolve_path())?)
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    let activity = if cfg.activity.is_enabled() && !args.ephemeral {
        let path = cfg
            .activity
            .resolve_dir()
            .join(format!("{}.jsonl", session_id));
        activity::ActivityLog::new(&path, &session_id)?
    } else {
        activity::ActivityLog::disabled(&session_id)
    };

    if args.debug {
        eprintln!("[DEBUG] Session: {}", session_id);
        if args.ephemeral {
            eprintln!("[DEBUG] Storage: <memory>");
        } else {
            eprintln!("[DEBUG] Storage: {}", cfg.storage.resolve_path().display());
        }
        if activity.is_enabled() {
            eprintln!("[DEBUG] Activity log: {}", activity.path.display());
        } else {
            eprintln!("[DEBUG] Activity log: disabled");
        }
        eprintln!("[DEBUG] Avatar service: {}", cfg.avatar.service_url);
        eprintln!("[DEBUG] Upload limit: {} bytes", cfg.upload.max_bytes);
    }

    let store = account::AccountStore::open(storage, account::StoreOptions::from_config(&cfg));

    let command = args.command.clone();
    let ctx = cli::Context {
        args,
        config: cfg,
        store: RefCell::new(store),
        activity: RefCell::new(activity),
        pending_avatar: RefCell::new(None),
    };

    if let Some(command) = command {
        cli::run_once(&ctx, command)
    } else {
        cli::run_repl(ctx)
    }
}
