//! Error types for the submission_report crate.

use thiserror::Error;

/// Errors that can occur while building a submission report.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Access denied or folder not found ({status}): {message}")]
    AccessError { status: u16, message: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Unexpected API response: {0}")]
    MalformedResponse(String),

    #[error("Invalid URL or ID: {0}")]
    InvalidUrlOrId(String),

    #[error("JWT encoding error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshError(String),

    #[error("Spreadsheet export failed: {0}")]
    SpreadsheetError(#[from] rust_xlsxwriter::XlsxError),
}

impl DriveError {
    /// Classify a failed Drive API response by status code.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => DriveError::AuthenticationError(message),
            403 | 404 => DriveError::AccessError { status, message },
            _ => DriveError::ApiError { status, message },
        }
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
