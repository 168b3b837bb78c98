//! Plain-data projection of the whole tracker state.
//!
//! A [`Snapshot`] is what gets persisted: folder settings, files with
//! their full stat history, and project definitions. Aggregates are not
//! stored; they are rebuilt when a tree is restored.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::node::RecordingPolicy;
use crate::stat::{StatPeriod, StatTotals};
use crate::tree::{normalize_path, VaultTree};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub folders: Vec<FolderRecord>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub goal: u64,
    #[serde(default)]
    pub goal_for_files: u64,
    #[serde(default)]
    pub goal_for_folders: u64,
    #[serde(default)]
    pub policy: RecordingPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub goal: u64,
    #[serde(default)]
    pub word_count: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub stats: Vec<StatPeriod>,
}

/// Membership rule of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    FileIndex,
    Folder,
    Tag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    /// Index file path, folder path, or tag, depending on the type.
    pub index: String,
}

impl VaultTree {
    /// Project the tree into plain data. Projects are left empty.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let folders = self
            .folders()
            .map(|f| FolderRecord {
                path: f.path.clone(),
                title: f.title.clone(),
                goal: f.goal,
                goal_for_files: f.goal_for_files,
                goal_for_folders: f.goal_for_folders,
                policy: f.policy,
            })
            .collect();
        let files = self
            .files()
            .map(|f| FileRecord {
                path: f.path.clone(),
                title: f.title.clone(),
                goal: f.goal,
                word_count: f.word_count,
                tags: f.tags.clone(),
                stats: f.stats.clone(),
            })
            .collect();
        Snapshot {
            folders,
            files,
            projects: Vec::new(),
        }
    }

    /// Rebuild a tree from a snapshot. Word counts are re-aggregated and all
    /// stat totals recomputed from the stored periods. Records whose path
    /// clashes with an earlier record are skipped with a warning.
    #[must_use]
    pub fn from_snapshot(
        root_name: impl Into<String>,
        snapshot: &Snapshot,
        record_everything: bool,
    ) -> Self {
        let mut tree = VaultTree::new(root_name);

        for record in &snapshot.folders {
            let path = normalize_path(&record.path);
            let id = match tree.ensure_folder(&path) {
                Ok((id, _)) => id,
                Err(e) => {
                    warn!(path = %record.path, error = %e, "skipping folder record");
                    continue;
                }
            };
            if let Some(folder) = tree.folder_mut(id) {
                folder.title.clone_from(&record.title);
                folder.goal = record.goal;
                folder.goal_for_files = record.goal_for_files;
                folder.goal_for_folders = record.goal_for_folders;
                folder.policy = record.policy;
            }
        }

        for record in &snapshot.files {
            let path = normalize_path(&record.path);
            if path.is_empty() || tree.file_id(&path).is_some() {
                warn!(path = %record.path, "skipping duplicate or empty file record");
                continue;
            }
            let id = match tree.insert_file(&path, record.word_count) {
                Ok((id, _, _)) => id,
                Err(e) => {
                    warn!(path = %record.path, error = %e, "skipping file record");
                    continue;
                }
            };
            if let Some(file) = tree.file_mut(id) {
                file.title.clone_from(&record.title);
                file.goal = record.goal;
                file.tags.clone_from(&record.tags);
                file.stats.clone_from(&record.stats);
                file.totals = StatTotals::from_periods(&file.stats);
            }
        }

        let folder_ids: Vec<_> = tree.folders().map(|f| f.id).collect();
        for id in folder_ids {
            let totals = tree.recalculate_stats(id, record_everything);
            if let Some(folder) = tree.folder_mut(id) {
                folder.totals = totals;
            }
        }
        tree
    }
}
