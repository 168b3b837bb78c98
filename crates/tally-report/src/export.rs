//! Export projections of the tracker state.
//!
//! [`FolderProjection`] mirrors the tree with goals, progress and stats
//! resolved for display. [`StatRecord`] flattens every stat period into one
//! row with RFC 3339 timestamps. The `*_report` helpers turn both into
//! [`Report`]s for the formatter.

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use tally_core::link::LinkResolver;
use tally_core::node::{NodeId, RecordingPolicy};
use tally_core::snapshot::{FileRecord, FolderRecord, Snapshot};
use tally_core::stat::{Millis, StatPeriod, StatTotals};
use tally_core::tree::VaultTree;

use crate::formatter::Report;
use crate::project::ProjectManager;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileProjection {
    pub path: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub word_count: u64,
    /// Explicit goal; 0 means unset.
    #[serde(default)]
    pub goal: u64,
    /// Own goal or the nearest ancestor's goal for files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_goal: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub totals: StatTotals,
    #[serde(default)]
    pub stats: Vec<StatPeriod>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderProjection {
    pub path: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub word_count: u64,
    #[serde(default)]
    pub goal: u64,
    #[serde(default)]
    pub goal_for_files: u64,
    #[serde(default)]
    pub goal_for_folders: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_goal: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    pub policy: RecordingPolicy,
    /// Whether stats are recorded here after policy resolution.
    pub recording: bool,
    pub totals: StatTotals,
    #[serde(default)]
    pub folders: Vec<FolderProjection>,
    #[serde(default)]
    pub files: Vec<FileProjection>,
}

fn progress(words: u64, goal: Option<u64>) -> Option<f64> {
    goal.filter(|g| *g > 0).map(|g| words as f64 / g as f64)
}

impl FileProjection {
    #[must_use]
    pub fn build(tree: &VaultTree, id: NodeId) -> Option<Self> {
        let file = tree.file(id)?;
        let effective_goal = tree.file_goal(id);
        Some(Self {
            path: file.path.clone(),
            name: file.name.clone(),
            title: file.title.clone(),
            word_count: file.word_count,
            goal: file.goal,
            effective_goal,
            progress: progress(file.word_count, effective_goal),
            tags: file.tags.clone(),
            totals: file.totals,
            stats: file.stats.clone(),
        })
    }
}

impl FolderProjection {
    /// Project the folder `id` and everything below it.
    #[must_use]
    pub fn build(tree: &VaultTree, id: NodeId, record_everything: bool) -> Option<Self> {
        let folder = tree.folder(id)?;
        let effective_goal = tree.folder_goal(id);
        Some(Self {
            path: folder.path.clone(),
            name: folder.name.clone(),
            title: folder.title.clone(),
            word_count: folder.word_count,
            goal: folder.goal,
            goal_for_files: folder.goal_for_files,
            goal_for_folders: folder.goal_for_folders,
            effective_goal,
            progress: progress(folder.word_count, effective_goal),
            policy: folder.policy,
            recording: tree.is_recording(id, record_everything),
            totals: folder.totals,
            folders: folder
                .folders
                .iter()
                .filter_map(|child| Self::build(tree, *child, record_everything))
                .collect(),
            files: folder
                .files
                .iter()
                .filter_map(|child| FileProjection::build(tree, *child))
                .collect(),
        })
    }

    /// Project the whole tree from the root.
    #[must_use]
    pub fn from_tree(tree: &VaultTree, record_everything: bool) -> Self {
        match Self::build(tree, tree.root(), record_everything) {
            Some(projection) => projection,
            None => unreachable!("the root folder always exists"),
        }
    }

    /// Folders of this subtree, depth first, parents before children.
    pub fn walk(&self) -> Vec<&FolderProjection> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(folder) = stack.pop() {
            out.push(folder);
            stack.extend(folder.folders.iter().rev());
        }
        out
    }

    /// The persisted form of this subtree, ordered by path. Projects are
    /// left empty.
    #[must_use]
    pub fn to_snapshot(&self) -> Snapshot {
        let mut folders = Vec::new();
        let mut files = Vec::new();
        for folder in self.walk() {
            folders.push(FolderRecord {
                path: folder.path.clone(),
                title: folder.title.clone(),
                goal: folder.goal,
                goal_for_files: folder.goal_for_files,
                goal_for_folders: folder.goal_for_folders,
                policy: folder.policy,
            });
            files.extend(folder.files.iter().map(|f| FileRecord {
                path: f.path.clone(),
                title: f.title.clone(),
                goal: f.goal,
                word_count: f.word_count,
                tags: f.tags.clone(),
                stats: f.stats.clone(),
            }));
        }
        folders.sort_by(|a, b| a.path.cmp(&b.path));
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Snapshot {
            folders,
            files,
            projects: Vec::new(),
        }
    }
}

/// RFC 3339 rendering of epoch milliseconds, in UTC.
#[must_use]
pub fn rfc3339(ms: Millis) -> String {
    DateTime::from_timestamp_millis(ms).map_or_else(
        || ms.to_string(),
        |t| t.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

/// One stat period of one file, flattened for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub path: String,
    pub title: String,
    pub start: String,
    pub end: String,
    pub start_words: u64,
    pub end_words: u64,
    pub words_added: u64,
    pub words_deleted: u64,
    pub words_imported: u64,
    pub words_exported: u64,
    pub writing_seconds: i64,
    pub wpm: f64,
}

impl StatRecord {
    #[must_use]
    pub fn new(path: &str, title: &str, period: &StatPeriod) -> Self {
        Self {
            path: path.to_string(),
            title: title.to_string(),
            start: rfc3339(period.start_time),
            end: rfc3339(period.end_time),
            start_words: period.start_words,
            end_words: period.end_words,
            words_added: period.words_added,
            words_deleted: period.words_deleted,
            words_imported: period.words_imported,
            words_exported: period.words_exported,
            writing_seconds: period.writing_time / 1000,
            wpm: period.wpm(),
        }
    }
}

/// Every stat period ending at or after `since`, in chronological order.
/// Periods starting together keep path order.
#[must_use]
pub fn stat_records(tree: &VaultTree, since: Option<Millis>) -> Vec<StatRecord> {
    let mut timed: Vec<(Millis, StatRecord)> = tree
        .files()
        .flat_map(|file| {
            file.stats
                .iter()
                .filter(move |p| since.map_or(true, |s| p.end_time >= s))
                .map(move |p| (p.start_time, StatRecord::new(&file.path, file.display_title(), p)))
        })
        .collect();
    timed.sort_by_key(|(start, _)| *start);
    timed.into_iter().map(|(_, record)| record).collect()
}

fn rounded(value: f64) -> Value {
    json!((value * 10.0).round() / 10.0)
}

fn percent(progress: Option<f64>) -> Value {
    progress.map_or(Value::Null, |p| json!(format!("{:.0}%", p * 100.0)))
}

fn totals_cells(totals: &StatTotals) -> Vec<Value> {
    vec![
        json!(totals.words_added),
        json!(totals.words_deleted),
        json!(totals.words_imported),
        json!(totals.words_exported),
        json!(totals.writing_time / 60_000),
        rounded(totals.wpm_active()),
    ]
}

const TREE_COLUMNS: [&str; 10] = [
    "path",
    "words",
    "goal",
    "progress",
    "added",
    "deleted",
    "imported",
    "exported",
    "writing_min",
    "wpm",
];

/// One row per folder and file of a projection, depth first.
#[must_use]
pub fn tree_report(projection: &FolderProjection) -> Report {
    let mut report = Report::new(&TREE_COLUMNS);
    for folder in projection.walk() {
        let path = if folder.path.is_empty() {
            format!("{}/", folder.name)
        } else {
            format!("{}/", folder.path)
        };
        let mut row = vec![
            json!(path),
            json!(folder.word_count),
            json!(folder.effective_goal),
            percent(folder.progress),
        ];
        row.extend(totals_cells(&folder.totals));
        report.push(row);

        for file in &folder.files {
            let mut row = vec![
                json!(file.path),
                json!(file.word_count),
                json!(file.effective_goal),
                percent(file.progress),
            ];
            row.extend(totals_cells(&file.totals));
            report.push(row);
        }
    }
    report
}

/// One row per stat record.
#[must_use]
pub fn stats_report(records: &[StatRecord]) -> Report {
    let mut report = Report::new(&[
        "path",
        "start",
        "end",
        "start_words",
        "end_words",
        "added",
        "deleted",
        "imported",
        "exported",
        "writing_s",
        "wpm",
    ]);
    for r in records {
        report.push(vec![
            json!(r.path),
            json!(r.start),
            json!(r.end),
            json!(r.start_words),
            json!(r.end_words),
            json!(r.words_added),
            json!(r.words_deleted),
            json!(r.words_imported),
            json!(r.words_exported),
            json!(r.writing_seconds),
            rounded(r.wpm),
        ]);
    }
    report
}

/// One row per project with its current membership and word total.
#[must_use]
pub fn projects_report(
    projects: &mut ProjectManager,
    tree: &VaultTree,
    links: &dyn LinkResolver,
) -> Report {
    projects.update_all(tree, links);
    let mut report = Report::new(&["name", "type", "index", "files", "words"]);
    for project in projects.iter() {
        let record = project.to_record(tree);
        report.push(vec![
            json!(record.name),
            serde_json::to_value(record.project_type).unwrap_or(Value::Null),
            json!(record.index),
            json!(project.files().len()),
            json!(project.total_words(tree)),
        ]);
    }
    report
}
