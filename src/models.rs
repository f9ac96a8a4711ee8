//! Data models for Google Drive API responses and report entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DriveError;

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Raw entry from the files.list endpoint, before it is classified as a
/// folder or a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trashed: Option<bool>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }

    pub fn is_trashed(&self) -> bool {
        self.trashed.unwrap_or(false)
    }
}

/// A student folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

impl From<DriveItem> for Folder {
    fn from(item: DriveItem) -> Self {
        Self {
            id: item.id,
            name: item.name,
        }
    }
}

/// One submitted file inside a student folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub modified_time: DateTime<Utc>,
    pub mime_type: String,
}

impl TryFrom<DriveItem> for FileRecord {
    type Error = DriveError;

    fn try_from(item: DriveItem) -> Result<Self, Self::Error> {
        let modified_time = item.modified_time.ok_or_else(|| {
            DriveError::MalformedResponse(format!("file {} has no modifiedTime", item.id))
        })?;

        Ok(Self {
            id: item.id,
            name: item.name,
            modified_time,
            mime_type: item.mime_type.unwrap_or_default(),
        })
    }
}

/// Format a timestamp the way reports show it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<DriveItem>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// Service account credentials from JSON file.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

/// OAuth client registration as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

pub(crate) fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

pub(crate) fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Wrapper matching the console's `client_secrets.json` layout.
#[derive(Debug, Deserialize)]
pub struct ClientSecretsFile {
    #[serde(alias = "web")]
    pub installed: ClientSecrets,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_expires_in() -> u64 {
    3600
}
