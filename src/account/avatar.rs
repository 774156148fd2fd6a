//! Avatar URLs and uploaded avatar files.

use super::validation::ValidationError;
use super::AccountError;
use crate::config::{AvatarConfig, UploadConfig};
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::Path;

/// Characters left alone by JavaScript's `encodeURIComponent`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Builds avatar-service URLs. No network access happens here.
#[derive(Debug, Clone)]
pub struct AvatarService {
    config: AvatarConfig,
}

impl Default for AvatarService {
    fn default() -> Self {
        Self::new(AvatarConfig::default())
    }
}

impl AvatarService {
    pub fn new(config: AvatarConfig) -> Self {
        Self { config }
    }

    /// Generated avatar for a username; deterministic in the username.
    pub fn default_for(&self, username: &str) -> String {
        format!(
            "{}?name={}&background={}&color={}&size={}",
            self.config.service_url,
            encode_uri_component(username),
            self.config.background,
            self.config.color,
            self.config.size
        )
    }

    /// Avatar shown for the synthesized guest record
    pub fn guest(&self) -> &str {
        &self.config.guest_avatar
    }
}

/// Read a local image into a `data:` URL suitable for [`super::ProfilePatch::avatar`].
///
/// Size is checked before type. The MIME type is inferred from the file name.
pub fn read_avatar_file(path: &Path, upload: &UploadConfig) -> Result<String, AccountError> {
    let size = std::fs::metadata(path)?.len();
    if size > upload.max_bytes {
        return Err(ValidationError::FileTooLarge {
            size,
            max: upload.max_bytes,
        }
        .into());
    }

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mime = mime.essence_str();
    if !upload.allowed_types.iter().any(|t| t == mime) {
        return Err(ValidationError::UnsupportedFileType(mime.to_string()).into());
    }

    let bytes = std::fs::read(path)?;
    let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime, payload))
}
