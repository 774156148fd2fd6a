//! The account store: the single simulated user record kept in local storage.
//!
//! There is exactly one record under [`USER_DATA_KEY`]. When it is absent a
//! guest record is synthesized on demand and never written back. Logging in
//! does not look anything up: it overwrites the stored record with one built
//! from the submitted identifier.

pub mod avatar;
pub mod validation;

use crate::config::{Config, ProfileConfig};
use crate::storage::{KeyValueStore, REMEMBER_USERNAME_KEY, USER_DATA_KEY};
use avatar::AvatarService;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validation::ValidationError;

pub const ROLE_MEMBER: &str = "Member";
pub const ROLE_GUEST: &str = "Guest";
pub const GUEST_USERNAME: &str = "Guest";
pub const GUEST_EMAIL: &str = "guest@example.com";

/// The persisted account profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub username: String,
    pub email: String,
    pub avatar: String,
    pub role: String,
    pub join_date: String,
    /// Stored in plaintext, registration path only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UserRecord {
    pub fn is_guest(&self) -> bool {
        self.role == ROLE_GUEST
    }
}

/// Field-level changes submitted from the profile editor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub email: Option<String>,
    /// Empty means keep the current avatar
    pub avatar: Option<String>,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[cfg(test)]
impl AccountError {
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            AccountError::Validation(e) => Some(e),
            _ => None,
        }
    }
}

/// Settings the store needs from configuration
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub avatars: AvatarService,
    pub profile: ProfileConfig,
    /// Source of "today" for join dates
    pub today: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            avatars: AvatarService::default(),
            profile: ProfileConfig::default(),
            today: local_today,
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            avatars: AvatarService::new(config.avatar.clone()),
            profile: config.profile.clone(),
            today: local_today,
        }
    }

    fn join_date(&self) -> String {
        (self.today)()
            .format(&self.profile.join_date_format)
            .to_string()
    }

    /// Default record shown when nobody is signed in. Never persisted.
    pub fn guest_record(&self) -> UserRecord {
        UserRecord {
            username: GUEST_USERNAME.to_string(),
            email: GUEST_EMAIL.to_string(),
            avatar: self.avatars.guest().to_string(),
            role: ROLE_GUEST.to_string(),
            join_date: self.join_date(),
            password: None,
        }
    }
}

/// Stored record, if present and parseable
fn read_record<S: KeyValueStore>(storage: &S) -> Option<UserRecord> {
    storage
        .get(USER_DATA_KEY)
        .and_then(|json| serde_json::from_str(&json).ok())
}

/// Owns the storage handle and the in-memory current record
pub struct AccountStore<S: KeyValueStore> {
    storage: S,
    options: StoreOptions,
    current: UserRecord,
}

impl<S: KeyValueStore> AccountStore<S> {
    /// Open the store and load the current record
    pub fn open(storage: S, options: StoreOptions) -> Self {
        let current = read_record(&storage).unwrap_or_else(|| options.guest_record());
        Self {
            storage,
            options,
            current,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Read the persisted record, or the guest record if there is none.
    /// An unparseable record is treated as absent.
    pub fn load_current(&self) -> UserRecord {
        read_record(&self.storage).unwrap_or_else(|| self.options.guest_record())
    }

    pub fn current(&self) -> &UserRecord {
        &self.current
    }

    /// True only when a readable record is stored
    pub fn is_signed_in(&self) -> bool {
        read_record(&self.storage).is_some()
    }

    fn persist(&mut self, record: UserRecord) -> Result<UserRecord, AccountError> {
        let json = serde_json::to_string(&record).map_err(anyhow::Error::from)?;
        self.storage.set(USER_DATA_KEY, &json)?;
        self.current = record.clone();
        Ok(record)
    }

    /// Build a fresh member record and overwrite whatever is stored.
    /// Callers validate the fields first.
    pub fn create(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, AccountError> {
        let record = UserRecord {
            username: username.to_string(),
            email: email.to_string(),
            avatar: self.options.avatars.default_for(username),
            role: ROLE_MEMBER.to_string(),
            join_date: self.options.join_date(),
            password: Some(password.to_string()),
        };
        self.persist(record)
    }

    /// Simulated login: any identifier/password pair meeting the length
    /// rules replaces the stored record. Nothing is checked against it.
    pub fn login_upsert(
        &mut self,
        username_or_email: &str,
        password: &str,
    ) -> Result<UserRecord, AccountError> {
        validation::validate_login(username_or_email, password)?;

        let email = if username_or_email.contains('@') {
            username_or_email.to_string()
        } else {
            format!(
                "{}@{}",
                username_or_email, self.options.profile.default_email_domain
            )
        };

        let record = UserRecord {
            username: username_or_email.to_string(),
            email,
            avatar: self.options.avatars.default_for(username_or_email),
            role: ROLE_MEMBER.to_string(),
            join_date: self.options.join_date(),
            password: None,
        };
        self.persist(record)
    }

    /// Validate the supplied fields, then merge them into the current record
    /// and persist it. Role, join date and password are left untouched.
    pub fn update(&mut self, patch: ProfilePatch) -> Result<UserRecord, AccountError> {
        if let Some(username) = &patch.username {
            validation::validate_username(username)?;
        }
        if let Some(email) = &patch.email {
            validation::validate_email(email)?;
        }
        let avatar = patch.avatar.filter(|a| !a.is_empty());
        if let Some(avatar) = &avatar {
            validation::validate_avatar(avatar)?;
        }

        let mut record = self.current.clone();
        if let Some(username) = patch.username {
            record.username = username;
        }
        if let Some(email) = patch.email {
            record.email = email;
        }
        if let Some(avatar) = avatar {
            record.avatar = avatar;
        }
        self.persist(record)
    }

    /// Log out: drop the record and the remembered username
    pub fn remove(&mut self) -> Result<(), AccountError> {
        self.storage.remove(USER_DATA_KEY)?;
        self.storage.remove(REMEMBER_USERNAME_KEY)?;
        self.current = self.options.guest_record();
        Ok(())
    }

    pub fn remember_username(&mut self, name: &str) -> Result<(), AccountError> {
        self.storage.set(REMEMBER_USERNAME_KEY, name)?;
        Ok(())
    }

    pub fn forget_username(&mut self) -> Result<(), AccountError> {
        self.storage.remove(REMEMBER_USERNAME_KEY)?;
        Ok(())
    }

    pub fn remembered_username(&self) -> Option<String> {
        self.storage.get(REMEMBER_USERNAME_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::validation::Field;
    use super::*;
    use crate::storage::{FileStorage, MemoryStorage};

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    fn store() -> AccountStore<MemoryStorage> {
        let options = StoreOptions {
            today: fixed_today,
            ..StoreOptions::default()
        };
        AccountStore::open(MemoryStorage::new(), options)
    }

    fn stored_json(store: &AccountStore<MemoryStorage>) -> Option<String> {
        store.storage().get(USER_DATA_KEY)
    }

    #[test]
    fn test_empty_store_yields_guest_without_writing() {
        let store = store();
        let record = store.load_current();
        assert_eq!(record.role, "Guest");
        assert_eq!(record.username, "Guest");
        assert_eq!(record.email, "guest@example.com");
        assert_eq!(record.avatar, "default-avatar.png");
        assert_eq!(record.join_date, "7/3/2024");
        assert!(record.is_guest());
        assert!(store.storage().get(USER_DATA_KEY).is_none());
        assert!(!store.is_signed_in());
    }

    #[test]
    fn test_create_then_load() {
        let mut store = store();
        store.create("Alice", "a@x.com", "secret1").unwrap();

        let record = store.load_current();
        assert_eq!(record.role, "Member");
        assert_eq!(record.email, "a@x.com");
        assert!(record.avatar.contains("name=Alice"));
        assert_eq!(record.password.as_deref(), Some("secret1"));
        assert_eq!(record.join_date, "7/3/2024");
        assert_eq!(store.current(), &record);
        assert!(store.is_signed_in());
    }

    #[test]
    fn test_record_json_shape() {
        let mut store = store();
        store.create("Alice", "a@x.com", "secret1").unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&stored_json(&store).unwrap()).unwrap();
        assert_eq!(value["joinDate"], "7/3/2024");
        assert_eq!(value["password"], "secret1");

        store.login_upsert("bob", "pw123456").unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&stored_json(&store).unwrap()).unwrap();
        assert!(value.get("password").is_none());
    }

    #[test]
    fn test_create_twice_is_full_overwrite() {
        let mut store = store();
        store.create("Alice", "a@x.com", "secret1").unwrap();
        let first = stored_json(&store).unwrap();

        store
            .update(ProfilePatch {
                avatar: Some("https://site.com/pic.png".to_string()),
                ..ProfilePatch::default()
            })
            .unwrap();

        store.create("Alice", "a@x.com", "secret1").unwrap();
        assert_eq!(stored_json(&store).unwrap(), first);
    }

    #[test]
    fn test_login_defaults_email() {
        let mut store = store();
        let record = store.login_upsert("bob", "pw123456").unwrap();
        assert_eq!(record.email, "bob@game.com");
        assert_eq!(record.role, "Member");
        assert!(record.password.is_none());

        let record = store.login_upsert("bob@mail.net", "pw123456").unwrap();
        assert_eq!(record.email, "bob@mail.net");
        assert_eq!(record.username, "bob@mail.net");
    }

    #[test]
    fn test_login_overwrites_registered_record() {
        let mut store = store();
        store.create("Alice", "a@x.com", "secret1").unwrap();

        // Not a credential check: a different password still "logs in"
        let record = store.login_upsert("Alice", "another1").unwrap();
        assert_eq!(record.email, "Alice@game.com");
        assert!(store.load_current().password.is_none());
    }

    #[test]
    fn test_login_too_short_leaves_storage_alone() {
        let mut store = store();
        store.create("Alice", "a@x.com", "secret1").unwrap();
        let before = stored_json(&store);

        let err = store.login_upsert("bo", "pw123456").unwrap_err();
        assert_eq!(
            err.as_validation(),
            Some(&ValidationError::TooShort {
                field: Field::Username,
                min: 3
            })
        );
        assert_eq!(stored_json(&store), before);

        let err = store.login_upsert("bob", "12345").unwrap_err();
        assert!(matches!(
            err.as_validation(),
            Some(ValidationError::TooShort {
                field: Field::Password,
                ..
            })
        ));
        assert_eq!(stored_json(&store), before);
    }

    #[test]
    fn test_update_invalid_email_keeps_username() {
        let mut store = store();
        store.create("Alice", "a@x.com", "secret1").unwrap();

        let err = store
            .update(ProfilePatch {
                username: Some("Alicia".to_string()),
                email: Some("not-an-email".to_string()),
                avatar: None,
            })
            .unwrap_err();
        assert_eq!(err.as_validation(), Some(&ValidationError::InvalidEmail));
        assert_eq!(store.load_current().username, "Alice");
        assert_eq!(store.current().username, "Alice");
    }

    #[test]
    fn test_update_avatar_rules() {
        let mut store = store();
        store.create("Alice", "a@x.com", "secret1").unwrap();

        let record = store
            .update(ProfilePatch {
                avatar: Some("https://site.com/pic.png".to_string()),
                ..ProfilePatch::default()
            })
            .unwrap();
        assert_eq!(record.avatar, "https://site.com/pic.png");

        let err = store
            .update(ProfilePatch {
                avatar: Some("https://site.com/pic.txt".to_string()),
                ..ProfilePatch::default()
            })
            .unwrap_err();
        assert_eq!(err.as_validation(), Some(&ValidationError::InvalidAvatar));
        assert_eq!(store.load_current().avatar, "https://site.com/pic.png");

        let record = store
            .update(ProfilePatch {
                avatar: Some("data:image/png;base64,AAAA".to_string()),
                ..ProfilePatch::default()
            })
            .unwrap();
        assert_eq!(record.avatar, "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_update_empty_avatar_keeps_current() {
        let mut store = store();
        let created = store.create("Alice", "a@x.com", "secret1").unwrap();

        let record = store
            .update(ProfilePatch {
                avatar: Some(String::new()),
                ..ProfilePatch::default()
            })
            .unwrap();
        assert_eq!(record.avatar, created.avatar);
    }

    #[test]
    fn test_update_preserves_write_once_fields() {
        let mut store = store();
        store.create("Alice", "a@x.com", "secret1").unwrap();

        let record = store
            .update(ProfilePatch {
                username: Some("Alicia".to_string()),
                email: Some("alicia@x.com".to_string()),
                avatar: None,
            })
            .unwrap();
        assert_eq!(record.username, "Alicia");
        assert_eq!(record.email, "alicia@x.com");
        assert_eq!(record.role, "Member");
        assert_eq!(record.join_date, "7/3/2024");
        assert_eq!(record.password.as_deref(), Some("secret1"));
        // Avatar is not regenerated from the new name
        assert!(record.avatar.contains("name=Alice&"));
        assert_eq!(store.load_current(), record);
    }

    #[test]
    fn test_update_username_rules() {
        let mut store = store();
        store.create("Alice", "a@x.com", "secret1").unwrap();

        let err = store
            .update(ProfilePatch {
                username: Some(String::new()),
                ..ProfilePatch::default()
            })
            .unwrap_err();
        assert_eq!(
            err.as_validation(),
            Some(&ValidationError::MissingField(Field::Username))
        );

        let err = store
            .update(ProfilePatch {
                username: Some("Al".to_string()),
                ..ProfilePatch::default()
            })
            .unwrap_err();
        assert!(matches!(
            err.as_validation(),
            Some(ValidationError::TooShort { .. })
        ));
    }

    #[test]
    fn test_remove_clears_both_keys() {
        let mut store = store();
        store.create("Alice", "a@x.com", "secret1").unwrap();
        store.remember_username("Alice").unwrap();

        store.remove().unwrap();
        assert!(store.storage().get(USER_DATA_KEY).is_none());
        assert!(store.remembered_username().is_none());
        assert_eq!(store.load_current().role, "Guest");
        assert!(store.current().is_guest());
    }

    #[test]
    fn test_remembered_username_is_independent() {
        let mut store = store();
        store.remember_username("carol").unwrap();
        assert_eq!(store.remembered_username().as_deref(), Some("carol"));
        assert!(!store.is_signed_in());
        assert!(store.load_current().is_guest());

        store.forget_username().unwrap();
        assert!(store.remembered_username().is_none());
    }

    #[test]
    fn test_corrupt_record_reads_as_guest() {
        let mut storage = MemoryStorage::new();
        storage.set(USER_DATA_KEY, "{broken").unwrap();
        let store = AccountStore::open(storage, StoreOptions::default());
        assert!(store.load_current().is_guest());
        assert!(store.current().is_guest());
        assert!(!store.is_signed_in());
    }

    #[test]
    fn test_failed_write_leaves_state_untouched() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let storage = FileStorage::open(&blocker.join("storage.json")).unwrap();
        let mut store = AccountStore::open(storage, StoreOptions::default());
        assert!(store.create("Alice", "a@x.com", "secret1").is_err());
        assert!(store.login_upsert("bob", "pw123456").is_err());

        assert!(!store.is_signed_in());
        assert!(store.load_current().is_guest());
        assert!(store.current().is_guest());
        assert!(store.storage().get(USER_DATA_KEY).is_none());
    }

    #[test]
    fn test_open_loads_existing_record() {
        let mut first = store();
        first.create("Alice", "a@x.com", "secret1").unwrap();
        let storage = first.storage().clone();

        let second = AccountStore::open(storage, StoreOptions::default());
        assert_eq!(second.current().username, "Alice");
    }

    #[test]
    fn test_custom_email_domain() {
        let options = StoreOptions {
            profile: ProfileConfig {
                default_email_domain: "guild.example".to_string(),
                ..ProfileConfig::default()
            },
            today: fixed_today,
            ..StoreOptions::default()
        };
        let mut store = AccountStore::open(MemoryStorage::new(), options);
        let record = store.login_upsert("dave", "pw123456").unwrap();
        assert_eq!(record.email, "dave@guild.example");
    }
}
