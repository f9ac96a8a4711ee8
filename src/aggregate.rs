//! Turns folder and file listings into report rows.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::lister::DriveLister;
use crate::models::{FileRecord, Folder};

/// A student folder with the files found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub folder: Folder,
    pub files: Vec<FileRecord>,
}

impl Submission {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Latest modification time among the files, if there are any.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.files.iter().map(|f| f.modified_time).max()
    }
}

/// One row per student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentSummary {
    pub student: String,
    pub files_submitted: usize,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One row per submitted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDetail {
    pub student: String,
    pub file_name: String,
    pub last_modified: DateTime<Utc>,
    pub mime_type: String,
    pub total_submissions: usize,
}

/// List the files of every folder, one request per folder, in folder order.
pub async fn collect_submissions<L: DriveLister>(
    folders: &[Folder],
    lister: &L,
) -> Result<Vec<Submission>> {
    let mut submissions = Vec::with_capacity(folders.len());
    for folder in folders {
        let files = lister.list_files(&folder.id).await?;
        submissions.push(Submission {
            folder: folder.clone(),
            files,
        });
    }
    Ok(submissions)
}

pub fn summarize(submissions: &[Submission]) -> Vec<StudentSummary> {
    submissions
        .iter()
        .map(|s| StudentSummary {
            student: s.folder.name.clone(),
            files_submitted: s.file_count(),
            last_modified: s.last_modified(),
        })
        .collect()
}

/// Flatten submissions into per-file rows. Students without files
/// contribute no rows.
pub fn detail_rows(submissions: &[Submission]) -> Vec<FileDetail> {
    submissions
        .iter()
        .flat_map(|s| {
            let total = s.file_count();
            s.files.iter().map(move |f| FileDetail {
                student: s.folder.name.clone(),
                file_name: f.name.clone(),
                last_modified: f.modified_time,
                mime_type: f.mime_type.clone(),
                total_submissions: total,
            })
        })
        .collect()
}

/// Build the per-student summary for `folders`.
///
/// Rows follow the order of `folders`. An empty folder list yields no rows.
pub async fn aggregate<L: DriveLister>(
    folders: &[Folder],
    lister: &L,
) -> Result<Vec<StudentSummary>> {
    let submissions = collect_submissions(folders, lister).await?;
    Ok(summarize(&submissions))
}
