use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Directory holding user-level state (~/.guildpass)
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".guildpass"))
}

/// Where the key-value store lives
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StorageConfig {
    /// Defaults to ~/.guildpass/storage.json
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            home_dir()
                .unwrap_or_else(|| PathBuf::from(".guildpass"))
                .join("storage.json")
        })
    }
}

/// Activity log settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ActivityConfig {
    /// Unset means enabled
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Defaults to ~/.guildpass/activity
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl ActivityConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn resolve_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            home_dir()
                .unwrap_or_else(|| PathBuf::from(".guildpass"))
                .join("activity")
        })
    }
}

/// Parameters of the generated-avatar service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AvatarConfig {
    #[serde(default = "default_service_url")]
    pub service_url: String,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_avatar_size")]
    pub size: u32,
    #[serde(default = "default_guest_avatar")]
    pub guest_avatar: String,
}

fn default_service_url() -> String {
    "https://ui-avatars.com/api/".to_string()
}
fn default_background() -> String {
    "CC0000".to_string()
}
fn default_color() -> String {
    "fff".to_string()
}
fn default_avatar_size() -> u32 {
    200
}
fn default_guest_avatar() -> String {
    "default-avatar.png".to_string()
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            background: default_background(),
            color: default_color(),
            size: default_avatar_size(),
            guest_avatar: default_guest_avatar(),
        }
    }
}

/// Limits for avatar file uploads
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

fn default_max_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
    ]
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            allowed_types: default_allowed_types(),
        }
    }
}

/// Profile defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfileConfig {
    /// chrono format string for join dates (day/month/year, no padding)
    #[serde(default = "default_join_date_format")]
    pub join_date_format: String,
    /// Domain appended when logging in with a bare username
    #[serde(default = "default_email_domain")]
    pub default_email_domain: String,
}

fn default_join_date_format() -> String {
    "%-d/%-m/%Y".to_string()
}
fn default_email_domain() -> String {
    "game.com".to_string()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            join_date_format: default_join_date_format(),
            default_email_domain: default_email_domain(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub avatar: AvatarConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
}

/// One config file as written: every key optional, so a layer only
/// overrides what it actually sets
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigLayer {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub avatar: AvatarLayer,
    #[serde(default)]
    pub upload: UploadLayer,
    #[serde(default)]
    pub profile: ProfileLayer,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AvatarLayer {
    pub service_url: Option<String>,
    pub background: Option<String>,
    pub color: Option<String>,
    pub size: Option<u32>,
    pub guest_avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UploadLayer {
    pub max_bytes: Option<u64>,
    pub allowed_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProfileLayer {
    pub join_date_format: Option<String>,
    pub default_email_domain: Option<String>,
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.guildpass/config.local.toml) > project (.guildpass/config.toml) > user (~/.guildpass/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = home_dir() {
            let user_config = dir.join("config.toml");
            if user_config.exists() {
                config.merge(Self::read_layer(&user_config)?);
            }
        }

        let project_config = Path::new(".guildpass").join("config.toml");
        if project_config.exists() {
            config.merge(Self::read_layer(&project_config)?);
        }

        // Should be gitignored
        let local_config = Path::new(".guildpass").join("config.local.toml");
        if local_config.exists() {
            config.merge(Self::read_layer(&local_config)?);
        }

        Ok(config)
    }

    /// Load configuration from a specific path over the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge(Self::read_layer(path)?);
        Ok(config)
    }

    /// Parse a single config file without filling in defaults
    pub fn read_layer(path: &Path) -> Result<ConfigLayer> {
        let content = std::fs::read_to_string(path)?;
        let layer: ConfigLayer = toml::from_str(&content)?;
        Ok(layer)
    }

    /// Merge a layer into this config (the layer takes priority).
    /// Only keys the layer sets are overridden.
    pub fn merge(&mut self, layer: ConfigLayer) {
        override_with(&mut self.storage.path, layer.storage.path.map(Some));
        override_with(&mut self.activity.dir, layer.activity.dir.map(Some));
        override_with(&mut self.activity.enabled, layer.activity.enabled.map(Some));

        let avatar = layer.avatar;
        override_with(&mut self.avatar.service_url, avatar.service_url);
        override_with(&mut self.avatar.background, avatar.background);
        override_with(&mut self.avatar.color, avatar.color);
        override_with(&mut self.avatar.size, avatar.size);
        override_with(&mut self.avatar.guest_avatar, avatar.guest_avatar);

        override_with(&mut self.upload.max_bytes, layer.upload.max_bytes);
        override_with(&mut self.upload.allowed_types, layer.upload.allowed_types);

        override_with(
            &mut self.profile.join_date_format,
            layer.profile.join_date_format,
        );
        override_with(
            &mut self.profile.default_email_domain,
            layer.profile.default_email_domain,
        );
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if url::Url::parse(&self.avatar.service_url).is_err() {
            errors.push(ConfigError {
                field: "avatar.service_url".to_string(),
                message: format!("Invalid URL '{}'", self.avatar.service_url),
            });
        }

        if self.avatar.size == 0 {
            errors.push(ConfigError {
                field: "avatar.size".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.upload.max_bytes == 0 {
            errors.push(ConfigError {
                field: "upload.max_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        for (i, mime) in self.upload.allowed_types.iter().enumerate() {
            if !mime.starts_with("image/") {
                errors.push(ConfigError {
                    field: format!("upload.allowed_types[{}]", i),
                    message: format!("Not an image MIME type '{}'", mime),
                });
            }
        }

        if self.profile.join_date_format.trim().is_empty() {
            errors.push(ConfigError {
                field: "profile.join_date_format".to_string(),
                message: "Must not be empty".to_string(),
            });
        }

        if self.profile.default_email_domain.contains('@')
            || !self.profile.default_email_domain.contains('.')
        {
            errors.push(ConfigError {
                field: "profile.default_email_domain".to_string(),
                message: format!(
                    "Invalid domain '{}'",
                    self.profile.default_email_domain
                ),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_site() {
        let config = Config::default();
        assert_eq!(config.avatar.service_url, "https://ui-avatars.com/api/");
        assert_eq!(config.avatar.background, "CC0000");
        assert_eq!(config.avatar.color, "fff");
        assert_eq!(config.avatar.size, 200);
        assert_eq!(config.upload.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.upload.allowed_types.len(), 4);
        assert_eq!(config.profile.default_email_domain, "game.com");
        assert!(config.activity.is_enabled());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[avatar]
size = 64

[storage]
path = "/tmp/store.json"
"#,
        )
        .unwrap();
        assert_eq!(config.avatar.size, 64);
        assert_eq!(config.avatar.background, "CC0000");
        assert_eq!(config.storage.resolve_path(), PathBuf::from("/tmp/store.json"));
        assert_eq!(config.upload.max_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[profile]\ndefault_email_domain = \"guild.example\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.profile.default_email_domain, "guild.example");
        assert_eq!(config.profile.join_date_format, "%-d/%-m/%Y");
    }

    fn layer(toml_text: &str) -> ConfigLayer {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn test_merge_keeps_paths_unless_set() {
        let mut base = Config::default();
        base.merge(layer("[storage]\npath = \"/a/storage.json\"\n"));

        base.merge(layer("[avatar]\nsize = 96\n"));
        assert_eq!(base.storage.path, Some(PathBuf::from("/a/storage.json")));
        assert_eq!(base.avatar.size, 96);

        base.merge(layer(
            "[storage]\npath = \"/b/storage.json\"\n\n[activity]\nenabled = false\n",
        ));
        assert_eq!(base.storage.path, Some(PathBuf::from("/b/storage.json")));
        assert!(!base.activity.is_enabled());

        base.merge(ConfigLayer::default());
        assert!(!base.activity.is_enabled());
        assert_eq!(base.avatar.size, 96);
    }

    #[test]
    fn test_layers_merge_per_key() {
        let dir = TempDir::new().unwrap();
        let user = dir.path().join("user.toml");
        let project = dir.path().join("project.toml");
        std::fs::write(&user, "[avatar]\nsize = 64\ncolor = \"000\"\n").unwrap();
        std::fs::write(
            &project,
            "[avatar]\ncolor = \"111\"\n\n[profile]\ndefault_email_domain = \"guild.example\"\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.merge(Config::read_layer(&user).unwrap());
        config.merge(Config::read_layer(&project).unwrap());

        assert_eq!(config.avatar.size, 64);
        assert_eq!(config.avatar.color, "111");
        assert_eq!(config.avatar.background, "CC0000");
        assert_eq!(config.profile.default_email_domain, "guild.example");
        assert_eq!(config.profile.join_date_format, "%-d/%-m/%Y");
        assert_eq!(config.upload.max_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_validate_reports_each_field() {
        let mut config = Config::default();
        config.avatar.size = 0;
        config.upload.max_bytes = 0;
        config.upload.allowed_types.push("text/plain".to_string());
        config.avatar.service_url = "not a url".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.field == "avatar.size"));
        assert!(errors.iter().any(|e| e.field == "upload.max_bytes"));
        assert!(errors.iter().any(|e| e.field == "upload.allowed_types[4]"));
        assert!(errors.iter().any(|e| e.field == "avatar.service_url"));
    }

    #[test]
    fn test_validate_email_domain() {
        let mut config = Config::default();
        config.profile.default_email_domain = "user@host".to_string();
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Invalid domain"));
    }
}
