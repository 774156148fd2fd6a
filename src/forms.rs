//! Login, registration and profile-edit flows.
//!
//! Each form holds raw field values as typed by the user, trims them the
//! way the site's forms did, validates, and then calls the account store.

use crate::account::validation::{self, Field, ValidationError};
use crate::account::{AccountError, AccountStore, ProfilePatch, UserRecord, ROLE_MEMBER};
use crate::storage::KeyValueStore;

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub identifier: String,
    pub password: String,
    pub remember_me: bool,
}

impl LoginForm {
    /// Pre-fill from the remembered username, if any
    pub fn prefilled<S: KeyValueStore>(store: &AccountStore<S>) -> Self {
        match store.remembered_username() {
            Some(name) => Self {
                identifier: name,
                password: String::new(),
                remember_me: true,
            },
            None => Self::default(),
        }
    }

    pub fn submit<S: KeyValueStore>(
        &self,
        store: &mut AccountStore<S>,
    ) -> Result<UserRecord, AccountError> {
        let identifier = self.identifier.trim();
        let record = store.login_upsert(identifier, &self.password)?;

        if self.remember_me {
            store.remember_username(identifier)?;
        } else {
            store.forget_username()?;
        }
        Ok(record)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn submit<S: KeyValueStore>(
        &self,
        store: &mut AccountStore<S>,
    ) -> Result<UserRecord, AccountError> {
        let username = self.username.trim();
        let email = self.email.trim();
        validation::validate_registration(username, email, &self.password, &self.confirm_password)?;
        store.create(username, email, &self.password)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EditProfileForm {
    pub username: String,
    pub email: String,
    pub avatar: String,
}

impl EditProfileForm {
    /// Start from the record being edited
    pub fn prefilled(record: &UserRecord) -> Self {
        Self {
            username: record.username.clone(),
            email: record.email.clone(),
            avatar: record.avatar.clone(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = avatar.into();
        self
    }

    /// Username and email are both required here even though the store
    /// accepts partial patches. An avatar equal to the current one is not
    /// re-validated, so generated service URLs survive an edit.
    pub fn submit<S: KeyValueStore>(
        &self,
        store: &mut AccountStore<S>,
    ) -> Result<UserRecord, AccountError> {
        let username = self.username.trim();
        let email = self.email.trim();
        if username.is_empty() {
            return Err(ValidationError::MissingField(Field::Username).into());
        }
        if email.is_empty() {
            return Err(ValidationError::MissingField(Field::Email).into());
        }

        let avatar = self.avatar.trim();
        let avatar = (avatar != store.current().avatar).then(|| avatar.to_string());

        store.update(ProfilePatch {
            username: Some(username.to_string()),
            email: Some(email.to_string()),
            avatar,
        })
    }
}

/// What the profile card shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileView {
    pub username: String,
    pub email: String,
    pub role: String,
    pub join_date: String,
    pub avatar: String,
}

impl From<&UserRecord> for ProfileView {
    fn from(record: &UserRecord) -> Self {
        let role = if record.role.is_empty() {
            ROLE_MEMBER.to_string()
        } else {
            record.role.clone()
        };
        Self {
            username: record.username.clone(),
            email: record.email.clone(),
            role,
            join_date: record.join_date.clone(),
            avatar: record.avatar.clone(),
        }
    }
}

impl std::fmt::Display for ProfileView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let avatar = if validation::is_inline_image(&self.avatar) {
            format!("<uploaded image, {} bytes>", self.avatar.len())
        } else {
            self.avatar.clone()
        };
        writeln!(f, "Username:  {}", self.username)?;
        writeln!(f, "Email:     {}", self.email)?;
        writeln!(f, "Role:      {}", self.role)?;
        writeln!(f, "Joined:    {}", self.join_date)?;
        write!(f, "Avatar:    {}", avatar)
    }
}
