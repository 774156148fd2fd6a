//! Field validation shared by the login, registration and profile-edit flows.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use thiserror::Error;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Extensions accepted for avatar URLs (compared lowercase)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Prefix of an inline avatar produced by a file upload
pub const INLINE_IMAGE_PREFIX: &str = "data:image";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Form field a validation error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    Email,
    Password,
    ConfirmPassword,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Username => "username",
            Field::Email => "email",
            Field::Password => "password",
            Field::ConfirmPassword => "password confirmation",
        };
        f.write_str(name)
    }
}

/// User-facing, recoverable input errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(Field),

    #[error("{field} must be at least {min} characters")]
    TooShort { field: Field, min: usize },

    #[error("email address is not valid")]
    InvalidEmail,

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("avatar must be an image URL (jpg, jpeg, png, gif, webp) or an uploaded file")]
    InvalidAvatar,

    #[error("file is too large ({size} bytes), maximum is {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("unsupported file type '{0}', use JPG, PNG, GIF or WebP")]
    UnsupportedFileType(String),
}

/// Permissive `x@y.z` check; no TLD rules.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Avatar produced by an upload; bypasses URL parsing entirely.
pub fn is_inline_image(value: &str) -> bool {
    value.starts_with(INLINE_IMAGE_PREFIX)
}

/// Absolute URL whose last path segment ends in a known image extension.
/// Query and fragment are stripped before the extension is taken.
pub fn is_valid_image_url(value: &str) -> bool {
    if url::Url::parse(value).is_err() {
        return false;
    }

    let last_segment = value.rsplit('/').next().unwrap_or("");
    let without_query = last_segment.split('?').next().unwrap_or("");
    let without_fragment = without_query.split('#').next().unwrap_or("");
    let extension = without_fragment
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_lowercase();

    IMAGE_EXTENSIONS.contains(&extension.as_str())
}

/// Length in UTF-16 code units, the way the browser counts string length
fn char_len(s: &str) -> usize {
    s.encode_utf16().count()
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::MissingField(Field::Username));
    }
    if char_len(username) < MIN_USERNAME_LEN {
        return Err(ValidationError::TooShort {
            field: Field::Username,
            min: MIN_USERNAME_LEN,
        });
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::MissingField(Field::Email));
    }
    if !is_valid_email(email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingField(Field::Password));
    }
    if char_len(password) < MIN_PASSWORD_LEN {
        return Err(ValidationError::TooShort {
            field: Field::Password,
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Non-empty avatar values only; an empty value means "keep the current one".
pub fn validate_avatar(avatar: &str) -> Result<(), ValidationError> {
    if is_inline_image(avatar) || is_valid_image_url(avatar) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAvatar)
    }
}

/// Login accepts a username or an email as identifier.
pub fn validate_login(identifier: &str, password: &str) -> Result<(), ValidationError> {
    if identifier.is_empty() {
        return Err(ValidationError::MissingField(Field::Username));
    }
    if password.is_empty() {
        return Err(ValidationError::MissingField(Field::Password));
    }
    validate_username(identifier)?;
    validate_password(password)
}

/// Registration checks, in the order the form reports them.
pub fn validate_registration(
    username: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> Result<(), ValidationError> {
    let required = [
        (username, Field::Username),
        (email, Field::Email),
        (password, Field::Password),
        (confirm_password, Field::ConfirmPassword),
    ];
    if let Some((_, field)) = required.iter().find(|(value, _)| value.is_empty()) {
        return Err(ValidationError::MissingField(*field));
    }

    validate_username(username)?;
    validate_email(email)?;
    validate_password(password)?;
    if password != confirm_password {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}
