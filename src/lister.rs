//! The listing operations aggregation depends on.

use crate::error::Result;
use crate::models::{FileRecord, Folder};

/// Lists student folders and their files.
///
/// [`DriveClient`](crate::client::DriveClient) implements this against the
/// Drive API; tests substitute in-memory fakes.
#[allow(async_fn_in_trait)]
pub trait DriveLister {
    /// Immediate, non-trashed child folders of `parent_id`.
    async fn list_child_folders(&self, parent_id: &str) -> Result<Vec<Folder>>;

    /// Non-folder, non-trashed items directly inside `folder_id`.
    async fn list_files(&self, folder_id: &str) -> Result<Vec<FileRecord>>;
}
