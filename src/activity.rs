use crate::account::UserRecord;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only JSONL log of account events for one CLI session.
/// Passwords never reach this file.
pub struct ActivityLog {
    pub path: PathBuf,
    session_id: String,
    file: Option<File>,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    session_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl ActivityLog {
    pub fn new(path: &Path, session_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            session_id: session_id.to_string(),
            file: Some(file),
        })
    }

    /// A log that records nothing (activity logging turned off)
    pub fn disabled(session_id: &str) -> Self {
        Self {
            path: PathBuf::new(),
            session_id: session_id.to_string(),
            file: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let event = Event {
            ts: Utc::now(),
            session_id: &self.session_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    pub fn login(&mut self, record: &UserRecord, remembered: bool) -> Result<()> {
        self.log(
            "login",
            serde_json::json!({
                "username": record.username,
                "email": record.email,
                "remembered": remembered,
            }),
        )
    }

    pub fn register(&mut self, record: &UserRecord) -> Result<()> {
        self.log(
            "register",
            serde_json::json!({
                "username": record.username,
                "email": record.email,
            }),
        )
    }

    /// Inline avatars are summarized rather than copied into the log
    pub fn profile_update(&mut self, record: &UserRecord) -> Result<()> {
        let avatar = if record.avatar.starts_with("data:") {
            format!("<inline image, {} bytes>", record.avatar.len())
        } else {
            record.avatar.clone()
        };
        self.log(
            "profile_update",
            serde_json::json!({
                "username": record.username,
                "email": record.email,
                "avatar": avatar,
            }),
        )
    }

    pub fn avatar_selected(&mut self, path: &Path, bytes: usize) -> Result<()> {
        self.log(
            "avatar_selected",
            serde_json::json!({
                "path": path,
                "data_url_bytes": bytes,
            }),
        )
    }

    pub fn logout(&mut self, username: &str) -> Result<()> {
        self.log("logout", serde_json::json!({ "username": username }))
    }
}
