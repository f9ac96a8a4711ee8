//! submission_report - Reports student submissions stored in Google Drive.
//!
//! Each subfolder of a class folder is treated as one student. This library
//! provides functionality to:
//! - Authenticate as a user (OAuth with a cached token), a service account,
//!   or with a pre-issued token
//! - List student folders and the files inside them
//! - Aggregate the listings into per-student or per-file rows
//! - Export the rows as an `.xlsx` workbook
//!
//! # Example
//!
//! ```no_run
//! use submission_report::{aggregate, to_spreadsheet_bytes, Authenticator, DriveClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let auth = Authenticator::from_service_account_file("service-account.json")?;
//!     let client = DriveClient::new(auth);
//!
//!     let folders = client.list_child_folders("class-folder-id").await?;
//!     let rows = aggregate(&folders, &client).await?;
//!     std::fs::write("submission_report.xlsx", to_spreadsheet_bytes(&rows)?)?;
//!
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod auth;
pub mod client;
pub mod consent;
pub mod credential_store;
pub mod error;
pub mod export;
pub mod lister;
pub mod models;
pub mod render;
pub mod url_parser;

// Re-exports for convenience
pub use aggregate::{aggregate, FileDetail, StudentSummary, Submission};
pub use auth::Authenticator;
pub use client::DriveClient;
pub use consent::{AuthorizationCode, ConsentMode};
pub use credential_store::{CredentialStore, FileCredentialStore, TokenState};
pub use error::{DriveError, Result};
pub use export::{to_spreadsheet_bytes, ReportRow};
pub use lister::DriveLister;
pub use models::{FileRecord, Folder};
pub use url_parser::extract_folder_id;
