//! Google Drive API client for listing student folders and submissions.

use reqwest::Client;
use tracing::debug;

use crate::auth::Authenticator;
use crate::error::{DriveError, Result};
use crate::lister::DriveLister;
use crate::models::{
    ApiErrorResponse, DriveItem, FileListResponse, FileRecord, Folder, FOLDER_MIME_TYPE,
};

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Largest page size files.list accepts.
const PAGE_SIZE: &str = "1000";

const FOLDER_FIELDS: &str = "nextPageToken, files(id, name, mimeType, trashed)";
const FILE_FIELDS: &str = "nextPageToken, files(id, name, modifiedTime, mimeType, trashed)";

/// Client for read-only Drive listings.
pub struct DriveClient {
    auth: Authenticator,
    http: Client,
    base_url: String,
}

impl DriveClient {
    /// Create a client talking to the public Drive API.
    pub fn new(auth: Authenticator) -> Self {
        Self::with_base_url(auth, DRIVE_API_BASE)
    }

    /// Create a client against another endpoint, such as a mock server.
    pub fn with_base_url(auth: Authenticator, base_url: impl Into<String>) -> Self {
        Self {
            auth,
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// List the immediate subfolders of `parent_id`.
    pub async fn list_child_folders(&self, parent_id: &str) -> Result<Vec<Folder>> {
        let items = self
            .query_files(&child_folder_query(parent_id), FOLDER_FIELDS)
            .await?;

        let folders: Vec<Folder> = items
            .into_iter()
            .filter(|item| item.is_folder() && !item.is_trashed())
            .map(Folder::from)
            .collect();

        debug!(parent_id, count = folders.len(), "listed child folders");
        Ok(folders)
    }

    /// List the files directly inside `folder_id`.
    pub async fn list_files(&self, folder_id: &str) -> Result<Vec<FileRecord>> {
        let items = self
            .query_files(&file_query(folder_id), FILE_FIELDS)
            .await?;

        let files = items
            .into_iter()
            .filter(|item| !item.is_folder() && !item.is_trashed())
            .map(FileRecord::try_from)
            .collect::<Result<Vec<_>>>()?;

        debug!(folder_id, count = files.len(), "listed files");
        Ok(files)
    }

    /// Query files using Google Drive query syntax, following every page.
    pub async fn query_files(&self, query: &str, fields: &str) -> Result<Vec<DriveItem>> {
        let token = self.auth.get_access_token().await?;
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/files", self.base_url))
                .bearer_auth(&token)
                .query(&[
                    ("q", query),
                    ("fields", fields),
                    ("pageSize", PAGE_SIZE),
                    ("includeItemsFromAllDrives", "true"),
                    ("supportsAllDrives", "true"),
                ]);

            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            debug!(query, page_token = page_token.as_deref(), "files.list");
            let response = request.send().await?;
            let status = response.status();

            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                return Err(api_error(status.as_u16(), error_body));
            }

            let list_response: FileListResponse = response.json().await?;
            all_items.extend(list_response.files);

            match list_response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_items)
    }
}

impl DriveLister for DriveClient {
    async fn list_child_folders(&self, parent_id: &str) -> Result<Vec<Folder>> {
        DriveClient::list_child_folders(self, parent_id).await
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<FileRecord>> {
        DriveClient::list_files(self, folder_id).await
    }
}

fn api_error(status: u16, body: String) -> DriveError {
    match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(api_error) => DriveError::from_status(api_error.error.code, api_error.error.message),
        Err(_) => DriveError::from_status(status, body),
    }
}

/// Query selecting the non-trashed folders directly under `parent_id`.
pub fn child_folder_query(parent_id: &str) -> String {
    format!(
        "'{}' in parents and mimeType = '{}' and trashed = false",
        escape_query_value(parent_id),
        FOLDER_MIME_TYPE
    )
}

/// Query selecting the non-trashed, non-folder items directly under `folder_id`.
pub fn file_query(folder_id: &str) -> String {
    format!(
        "'{}' in parents and mimeType != '{}' and trashed = false",
        escape_query_value(folder_id),
        FOLDER_MIME_TYPE
    )
}

fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
