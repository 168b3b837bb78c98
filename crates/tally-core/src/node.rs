//! File and folder nodes of the vault tree.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::stat::{StatPeriod, StatTotals};

/// Stable identity of a tree node.
///
/// Ids are never reused within one tree, so an id held across a rename or
/// delete either resolves to the same node or to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether detailed statistics are recorded for a folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingPolicy {
    On,
    Off,
    #[default]
    Inherit,
}

impl std::str::FromStr for RecordingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" => Ok(Self::On),
            "off" | "false" | "no" => Ok(Self::Off),
            "inherit" => Ok(Self::Inherit),
            other => Err(format!(
                "unknown recording policy '{other}': expected on, off, or inherit"
            )),
        }
    }
}

impl fmt::Display for RecordingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Inherit => "inherit",
        };
        f.write_str(s)
    }
}

/// Which goal slot a goal value applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalScope {
    /// The goal of a file, or of a folder itself.
    Own,
    /// Default goal for files below a folder.
    Files,
    /// Default goal for folders below a folder.
    Folders,
}

/// One tracked document.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub id: NodeId,
    /// Vault-relative path with `/` separators.
    pub path: String,
    pub name: String,
    pub title: Option<String>,
    pub word_count: u64,
    /// Explicit word goal; 0 means unset.
    pub goal: u64,
    pub tags: Vec<String>,
    pub stats: Vec<StatPeriod>,
    pub totals: StatTotals,
    pub parent: NodeId,
}

impl FileNode {
    /// Title override, falling back to the display name.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn current_period(&self) -> Option<&StatPeriod> {
        self.stats.last()
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = normalize_tag(tag);
        self.tags.iter().any(|t| normalize_tag(t) == wanted)
    }
}

/// A folder: owns child files and folders and aggregates their counts.
#[derive(Debug, Clone)]
pub struct FolderNode {
    pub id: NodeId,
    /// Vault-relative path; the root folder has an empty path.
    pub path: String,
    pub name: String,
    pub title: Option<String>,
    pub word_count: u64,
    pub goal_for_files: u64,
    pub goal_for_folders: u64,
    /// Goal for this folder itself; 0 means unset.
    pub goal: u64,
    pub policy: RecordingPolicy,
    pub files: Vec<NodeId>,
    pub folders: Vec<NodeId>,
    pub totals: StatTotals,
    pub parent: Option<NodeId>,
}

impl FolderNode {
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A slot in the tree arena.
#[derive(Debug, Clone)]
pub enum Node {
    File(FileNode),
    Folder(FolderNode),
}

impl Node {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Node::File(f) => &f.path,
            Node::Folder(f) => &f.path,
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Node::File(f) => Some(f.parent),
            Node::Folder(f) => f.parent,
        }
    }

    #[must_use]
    pub fn word_count(&self) -> u64 {
        match self {
            Node::File(f) => f.word_count,
            Node::Folder(f) => f.word_count,
        }
    }
}

/// Lowercased tag without a leading `#`.
#[must_use]
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

/// Display name for a vault path: the last segment, without a `.md` suffix.
#[must_use]
pub fn display_name(path: &str) -> String {
    let last = path.rsplit('/').next().unwrap_or(path);
    last.strip_suffix(".md").unwrap_or(last).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_policy_parses_and_displays() {
        assert_eq!("ON".parse::<RecordingPolicy>(), Ok(RecordingPolicy::On));
        assert_eq!("inherit".parse::<RecordingPolicy>(), Ok(RecordingPolicy::Inherit));
        assert!("sometimes".parse::<RecordingPolicy>().is_err());
        assert_eq!(RecordingPolicy::Off.to_string(), "off");
        assert_eq!(RecordingPolicy::default(), RecordingPolicy::Inherit);
    }

    #[test]
    fn recording_policy_serializes_lowercase() {
        let json = serde_json::to_string(&RecordingPolicy::On).expect("serialize");
        assert_eq!(json, "\"on\"");
    }

    #[test]
    fn display_name_strips_folders_and_extension() {
        assert_eq!(display_name("Book/Part 1/Chapter.md"), "Chapter");
        assert_eq!(display_name("notes.txt"), "notes.txt");
        assert_eq!(display_name("Book"), "Book");
    }

    #[test]
    fn tags_compare_without_hash_or_case() {
        assert_eq!(normalize_tag("#Draft"), "draft");
        assert_eq!(normalize_tag(" draft "), "draft");
    }
}
