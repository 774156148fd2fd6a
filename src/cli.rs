use crate::account::avatar::read_avatar_file;
use crate::account::AccountStore;
use crate::activity::ActivityLog;
use crate::config::{self, Config};
use crate::forms::{EditProfileForm, LoginForm, ProfileView, RegisterForm};
use crate::storage::Storage;
use crate::{Args, Command};
use anyhow::Result;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub struct Context {
    pub args: Args,
    pub config: Config,
    pub store: RefCell<AccountStore<Storage>>,
    pub activity: RefCell<ActivityLog>,
    /// Uploaded photo waiting for the next /edit
    pub pending_avatar: RefCell<Option<String>>,
}

/// A shell line parsed with the same subcommands as the binary
#[derive(Parser)]
#[command(no_binary_name = true, disable_help_subcommand = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Command,
}

pub fn run_once(ctx: &Context, command: Command) -> Result<()> {
    execute(ctx, command)
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history = history_path(&ctx);
    if let Some(path) = &history {
        rl.load_history(path).ok();
    }

    println!("guildpass - type /help for commands, /exit to quit");
    print_status(&ctx);

    loop {
        match rl.readline(">>> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                // Keep passwords out of the history file
                let name = line.trim_start_matches('/');
                if !name.starts_with("login") && !name.starts_with("register") {
                    rl.add_history_entry(line)?;
                }

                if handle_command(&ctx, line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        rl.save_history(path).ok();
    }

    Ok(())
}

fn history_path(ctx: &Context) -> Option<PathBuf> {
    if ctx.args.ephemeral {
        return None;
    }
    config::home_dir().map(|dir| dir.join("history.txt"))
}

/// Returns true when the shell should exit
fn handle_command(ctx: &Context, line: &str) -> bool {
    let line = line.strip_prefix('/').unwrap_or(line);
    let words = match shell_words::split(line) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("Error: {}", e);
            return false;
        }
    };
    let Some(name) = words.first() else {
        return false;
    };

    match name.as_str() {
        "exit" | "quit" => return true,
        "help" => print_help(),
        "session" => {
            let activity = ctx.activity.borrow();
            println!("Session: {}", activity.session_id());
            if activity.is_enabled() {
                println!("Activity log: {}", activity.path.display());
            }
        }
        "avatar" => match words.get(1) {
            Some(path) => {
                if let Err(e) = stage_avatar(ctx, Path::new(path)) {
                    eprintln!("Error: {}", e);
                }
            }
            None => println!("Usage: /avatar <file>"),
        },
        _ => match ShellLine::try_parse_from(&words) {
            Ok(parsed) => {
                if let Err(e) = execute(ctx, parsed.command) {
                    eprintln!("Error: {}", e);
                }
            }
            Err(e) => {
                e.print().ok();
            }
        },
    }
    false
}

fn print_help() {
    println!("Account:");
    println!("  /login [name] [password] [--remember]  - sign in");
    println!("  /register <name> <email> <password> <confirm>");
    println!("  /profile                               - show profile");
    println!("  /edit [--username U] [--email E] [--avatar URL] [--avatar-file F]");
    println!("  /avatar <file>                         - pick a photo for the next /edit");
    println!("  /logout [--yes]                        - sign out");
    println!("  /remembered                            - show remembered username");
    println!("Other:");
    println!("  /session                               - show session info");
    println!("  /help                                  - show commands");
    println!("  /exit                                  - quit");
}

fn print_status(ctx: &Context) {
    let store = ctx.store.borrow();
    if store.is_signed_in() {
        println!("Signed in as {}", store.current().username);
    } else {
        println!("Not signed in");
    }
}

fn execute(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Login {
            identifier,
            password,
            remember,
        } => login(ctx, identifier, password, remember),
        Command::Register {
            username,
            email,
            password,
            confirm_password,
        } => {
            let form = RegisterForm {
                username,
                email,
                password,
                confirm_password,
            };
            let record = form.submit(&mut *ctx.store.borrow_mut())?;
            record_event(ctx, |log| log.register(&record));
            println!("Registration successful! Log in with: login {}", record.username);
            Ok(())
        }
        Command::Whoami => {
            let record = ctx.store.borrow().load_current();
            println!("{}", ProfileView::from(&record));
            if record.is_guest() {
                println!("(guest profile)");
            }
            Ok(())
        }
        Command::Edit {
            username,
            email,
            avatar,
            avatar_file,
        } => edit(ctx, username, email, avatar, avatar_file),
        Command::Logout { yes } => {
            if !yes && !confirm("Are you sure you want to log out?") {
                println!("Logout cancelled");
                return Ok(());
            }
            let username = ctx.store.borrow().current().username.clone();
            ctx.store.borrow_mut().remove()?;
            ctx.pending_avatar.borrow_mut().take();
            record_event(ctx, |log| log.logout(&username));
            println!("Logged out");
            Ok(())
        }
        Command::Remembered => {
            match ctx.store.borrow().remembered_username() {
                Some(name) => println!("{}", name),
                None => println!("(none)"),
            }
            Ok(())
        }
    }
}

/// Write an activity event; a failing log never fails the command
fn record_event(ctx: &Context, f: impl FnOnce(&mut ActivityLog) -> Result<()>) {
    if let Err(e) = f(&mut ctx.activity.borrow_mut()) {
        eprintln!("Warning: failed to write activity log: {}", e);
    }
}

fn login(
    ctx: &Context,
    identifier: Option<String>,
    password: Option<String>,
    remember: bool,
) -> Result<()> {
    let prefill = LoginForm::prefilled(&*ctx.store.borrow());
    // The remembered name keeps its "remember me" tick when reused
    let remember = remember || (identifier.is_none() && prefill.remember_me);

    let identifier = match identifier {
        Some(identifier) => identifier,
        None => prompt("Username or email", Some(&prefill.identifier))?,
    };
    let password = match password {
        Some(password) => password,
        None => prompt("Password", None)?,
    };

    let form = LoginForm {
        identifier,
        password,
        remember_me: remember,
    };
    let record = form.submit(&mut *ctx.store.borrow_mut())?;
    record_event(ctx, |log| log.login(&record, remember));
    println!("Login successful! Welcome, {}.", record.username);
    Ok(())
}

fn edit(
    ctx: &Context,
    username: Option<String>,
    email: Option<String>,
    avatar: Option<String>,
    avatar_file: Option<PathBuf>,
) -> Result<()> {
    let mut form = EditProfileForm::prefilled(ctx.store.borrow().current());
    if let Some(username) = username {
        form = form.with_username(username);
    }
    if let Some(email) = email {
        form = form.with_email(email);
    }

    let staged = ctx.pending_avatar.borrow().clone();
    if let Some(path) = avatar_file {
        form = form.with_avatar(read_avatar_file(&path, &ctx.config.upload)?);
    } else if let Some(avatar) = avatar {
        form = form.with_avatar(avatar);
    } else if let Some(staged) = &staged {
        form = form.with_avatar(staged.clone());
    }

    let record = form.submit(&mut *ctx.store.borrow_mut())?;
    ctx.pending_avatar.borrow_mut().take();
    record_event(ctx, |log| log.profile_update(&record));
    println!("Profile updated.");
    println!("{}", ProfileView::from(&record));
    Ok(())
}

fn stage_avatar(ctx: &Context, path: &Path) -> Result<()> {
    let data_url = read_avatar_file(path, &ctx.config.upload)?;
    let bytes = data_url.len();
    *ctx.pending_avatar.borrow_mut() = Some(data_url);
    record_event(ctx, |log| log.avatar_selected(path, bytes));
    println!("Photo selected. Run /edit to save it to your profile.");
    Ok(())
}

fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default.filter(|d| !d.is_empty()) {
        Some(default) => print!("{} [{}]: ", label, default),
        None => print!("{}: ", label),
    }
    io::stdout().flush().ok();

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim_end_matches(['\r', '\n']);

    match default {
        Some(default) if input.is_empty() => Ok(default.to_string()),
        _ => Ok(input.to_string()),
    }
}

fn confirm(question: &str) -> bool {
    print!("{} [y/N]: ", question);
    io::stdout().flush().ok();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_ok() {
        let input = input.trim().to_lowercase();
        input == "y" || input == "yes"
    } else {
        false
    }
}
