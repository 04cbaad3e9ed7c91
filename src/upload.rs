use std::collections::HashSet;

use crate::models::UploadedFile;

/// Uploaded files split over the two tables on the upload page.
#[derive(Debug, Clone, Default)]
pub struct UploadTables {
    pub ready: Vec<UploadedFile>,
    pub not_ready: Vec<UploadedFile>,
}

impl UploadTables {
    pub fn partition(rows: Vec<UploadedFile>) -> Self {
        let (ready, not_ready) = rows.into_iter().partition(|row| row.ready);
        UploadTables { ready, not_ready }
    }

    /// The page keeps polling at a fixed delay until every file has been
    /// processed.
    pub fn poll_again(&self) -> bool {
        !self.not_ready.is_empty()
    }

    pub fn row_ids(&self) -> Vec<String> {
        self.ready
            .iter()
            .chain(self.not_ready.iter())
            .map(row_id)
            .collect()
    }
}

/// Stable DOM id for a row. Processing state is part of the id, so a
/// file that becomes ready shows up as a new row in the other table.
pub fn row_id(file: &UploadedFile) -> String {
    if file.ready {
        format!("uploaded-file-ready-{}", file.id)
    } else {
        format!("uploaded-file-not-ready-{}", file.id)
    }
}

/// Difference between the rows currently in the page and a fresh poll
/// result: rows to append per table, and row ids to drop.
#[derive(Debug, Clone, Default)]
pub struct TableSync {
    pub add_ready: Vec<UploadedFile>,
    pub add_not_ready: Vec<UploadedFile>,
    pub remove: Vec<String>,
}

pub fn sync_tables(existing_row_ids: &[String], fresh: &UploadTables) -> TableSync {
    let keep: HashSet<String> = fresh.row_ids().into_iter().collect();
    let existing: HashSet<&str> = existing_row_ids.iter().map(String::as_str).collect();

    TableSync {
        add_ready: fresh
            .ready
            .iter()
            .filter(|row| !existing.contains(row_id(row).as_str()))
            .cloned()
            .collect(),
        add_not_ready: fresh
            .not_ready
            .iter()
            .filter(|row| !existing.contains(row_id(row).as_str()))
            .cloned()
            .collect(),
        remove: existing_row_ids
            .iter()
            .filter(|id| !keep.contains(*id))
            .cloned()
            .collect(),
    }
}
