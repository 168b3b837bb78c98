//! The vault tree: an arena of file and folder nodes addressed by [`NodeId`].
//!
//! Folders list their children by id and every node stores its parent id,
//! so ownership is a strict tree. Aggregates are maintained incrementally:
//!
//! - folder word counts always equal the sum of their descendant files,
//!   whatever the recording policy,
//! - folder [`StatTotals`] only receive stat deltas while the folder
//!   resolves to recording.
//!
//! Structural changes (moves, deletes) recompute the totals of the affected
//! ancestor chains with [`VaultTree::recalculate_stats`].

use std::collections::BTreeMap;

use crate::error::TreeError;
use crate::node::{display_name, FileNode, FolderNode, Node, NodeId, RecordingPolicy};
use crate::stat::{StatDelta, StatTotals};

/// A word-count change on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordChange {
    pub id: NodeId,
    pub old: u64,
    pub new: u64,
}

/// A node removed from the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub id: NodeId,
    pub is_file: bool,
    pub path: String,
}

/// Everything a move changed, for event emission.
#[derive(Debug, Clone, Default)]
pub struct MoveOutcome {
    /// Folders created to hold the new path.
    pub created: Vec<NodeId>,
    /// Each moved node with its old and new path.
    pub renamed: Vec<(NodeId, String, String)>,
    pub word_changes: Vec<WordChange>,
    pub old_parent: Option<NodeId>,
    pub new_parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct VaultTree {
    nodes: Vec<Option<Node>>,
    files: BTreeMap<String, NodeId>,
    folders: BTreeMap<String, NodeId>,
    root: NodeId,
}

/// Parent folder path of a vault path (`""` for top-level entries).
#[must_use]
pub fn parent_path(path: &str) -> &str {
    path.rfind('/').map_or("", |i| &path[..i])
}

/// Normalise a vault path: `/` separators, no leading, trailing or doubled `/`.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn new_folder(id: NodeId, path: String, name: String, parent: Option<NodeId>) -> FolderNode {
    FolderNode {
        id,
        path,
        name,
        title: None,
        word_count: 0,
        goal_for_files: 0,
        goal_for_folders: 0,
        goal: 0,
        policy: RecordingPolicy::Inherit,
        files: Vec::new(),
        folders: Vec::new(),
        totals: StatTotals::default(),
        parent,
    }
}

impl VaultTree {
    /// An empty tree holding only the root folder.
    #[must_use]
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = NodeId(0);
        let mut folders = BTreeMap::new();
        folders.insert(String::new(), root);
        Self {
            nodes: vec![Some(Node::Folder(new_folder(
                root,
                String::new(),
                root_name.into(),
                None,
            )))],
            files: BTreeMap::new(),
            folders,
            root,
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn root_folder(&self) -> &FolderNode {
        match self.nodes.first() {
            Some(Some(Node::Folder(folder))) => folder,
            _ => unreachable!("slot 0 always holds the root folder"),
        }
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn file(&self, id: NodeId) -> Option<&FileNode> {
        match self.node(id)? {
            Node::File(file) => Some(file),
            Node::Folder(_) => None,
        }
    }

    #[must_use]
    pub fn folder(&self, id: NodeId) -> Option<&FolderNode> {
        match self.node(id)? {
            Node::Folder(folder) => Some(folder),
            Node::File(_) => None,
        }
    }

    pub(crate) fn file_mut(&mut self, id: NodeId) -> Option<&mut FileNode> {
        match self.nodes.get_mut(id.0 as usize)?.as_mut()? {
            Node::File(file) => Some(file),
            Node::Folder(_) => None,
        }
    }

    pub(crate) fn folder_mut(&mut self, id: NodeId) -> Option<&mut FolderNode> {
        match self.nodes.get_mut(id.0 as usize)?.as_mut()? {
            Node::Folder(folder) => Some(folder),
            Node::File(_) => None,
        }
    }

    #[must_use]
    pub fn file_id(&self, path: &str) -> Option<NodeId> {
        self.files.get(path).copied()
    }

    #[must_use]
    pub fn folder_id(&self, path: &str) -> Option<NodeId> {
        self.folders.get(path).copied()
    }

    /// Resolve a path to a file or folder.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        self.file_id(path).or_else(|| self.folder_id(path))
    }

    /// All files, ordered by path.
    pub fn files(&self) -> impl Iterator<Item = &FileNode> + '_ {
        self.files.values().filter_map(|id| self.file(*id))
    }

    /// All folders including the root, ordered by path.
    pub fn folders(&self) -> impl Iterator<Item = &FolderNode> + '_ {
        self.folders.values().filter_map(|id| self.folder(*id))
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    /// Ancestor folders of a node, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = &FolderNode> + '_ {
        let mut next = self.node(id).and_then(Node::parent);
        std::iter::from_fn(move || {
            let folder = self.folder(next?)?;
            next = folder.parent;
            Some(folder)
        })
    }

    /// The policy a folder actually follows: its own, or the nearest
    /// explicit ancestor policy. A chain of `Inherit` up to the root
    /// resolves to `Off`.
    #[must_use]
    pub fn resolved_policy(&self, folder: NodeId) -> RecordingPolicy {
        let mut current = self.folder(folder);
        while let Some(f) = current {
            match f.policy {
                RecordingPolicy::On => return RecordingPolicy::On,
                RecordingPolicy::Off => return RecordingPolicy::Off,
                RecordingPolicy::Inherit => current = f.parent.and_then(|p| self.folder(p)),
            }
        }
        RecordingPolicy::Off
    }

    /// Whether stats are recorded in `folder`.
    #[must_use]
    pub fn is_recording(&self, folder: NodeId, record_everything: bool) -> bool {
        record_everything || self.resolved_policy(folder) == RecordingPolicy::On
    }

    /// Whether every folder from `from` up to and including `to` records.
    fn records_through(&self, from: NodeId, to: NodeId, record_everything: bool) -> bool {
        let mut current = Some(from);
        while let Some(id) = current {
            if !self.is_recording(id, record_everything) {
                return false;
            }
            if id == to {
                return true;
            }
            current = self.folder(id).and_then(|f| f.parent);
        }
        false
    }

    /// A file's goal, or the nearest ancestor's goal for files.
    #[must_use]
    pub fn file_goal(&self, id: NodeId) -> Option<u64> {
        let file = self.file(id)?;
        if file.goal > 0 {
            return Some(file.goal);
        }
        self.ancestors(id)
            .map(|f| f.goal_for_files)
            .find(|g| *g > 0)
    }

    /// A folder's own goal, or the nearest ancestor's goal for folders.
    #[must_use]
    pub fn folder_goal(&self, id: NodeId) -> Option<u64> {
        let folder = self.folder(id)?;
        if folder.goal > 0 {
            return Some(folder.goal);
        }
        self.ancestors(id)
            .map(|f| f.goal_for_folders)
            .find(|g| *g > 0)
    }

    /// Ids of every file below `folder`, depth first.
    #[must_use]
    pub fn descendant_files(&self, folder: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![folder];
        while let Some(id) = stack.pop() {
            if let Some(f) = self.folder(id) {
                out.extend(f.files.iter().copied());
                stack.extend(f.folders.iter().rev().copied());
            }
        }
        out
    }

    /// Recompute a folder's totals from the stat periods of its descendant
    /// files. Only files whose whole folder chain up to `folder` records
    /// contribute, matching what incremental propagation would deliver.
    #[must_use]
    pub fn recalculate_stats(&self, folder: NodeId, record_everything: bool) -> StatTotals {
        let mut totals = StatTotals::default();
        if !self.is_recording(folder, record_everything) {
            return totals;
        }
        for id in self.descendant_files(folder) {
            let Some(file) = self.file(id) else { continue };
            if self.records_through(file.parent, folder, record_everything) {
                totals.merge(&StatTotals::from_periods(&file.stats));
            }
        }
        totals
    }

    /// Replace the totals of `start` and every ancestor with recomputed ones.
    pub(crate) fn refresh_totals(&mut self, start: NodeId, record_everything: bool) {
        let mut current = Some(start);
        while let Some(id) = current {
            let totals = self.recalculate_stats(id, record_everything);
            let Some(folder) = self.folder_mut(id) else { break };
            folder.totals = totals;
            current = folder.parent;
        }
    }

    fn alloc(&mut self, node: impl FnOnce(NodeId) -> Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node(id)));
        id
    }

    /// Find or create the folder at `path`, creating missing ancestors.
    /// Returns the folder id and the ids of folders created, outermost first.
    pub(crate) fn ensure_folder(&mut self, path: &str) -> Result<(NodeId, Vec<NodeId>), TreeError> {
        if let Some(id) = self.folder_id(path) {
            return Ok((id, Vec::new()));
        }

        let segments: Vec<&str> = path.split('/').collect();
        let mut prefix = String::new();
        for segment in &segments {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            if self.files.contains_key(&prefix) {
                return Err(TreeError::NotAFolder(prefix));
            }
        }

        let mut parent = self.root;
        let mut created = Vec::new();
        prefix.clear();
        for segment in segments {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            if let Some(id) = self.folder_id(&prefix) {
                parent = id;
                continue;
            }
            let folder_path = prefix.clone();
            let name = segment.to_string();
            let id = self.alloc(|id| Node::Folder(new_folder(id, folder_path, name, Some(parent))));
            self.folders.insert(prefix.clone(), id);
            if let Some(p) = self.folder_mut(parent) {
                p.folders.push(id);
            }
            created.push(id);
            parent = id;
        }
        Ok((parent, created))
    }

    /// Add a file with a known word count. An already tracked file is
    /// returned unchanged.
    pub(crate) fn insert_file(
        &mut self,
        path: &str,
        word_count: u64,
    ) -> Result<(NodeId, Vec<NodeId>, Vec<WordChange>), TreeError> {
        if let Some(id) = self.file_id(path) {
            return Ok((id, Vec::new(), Vec::new()));
        }
        if self.folders.contains_key(path) {
            return Err(TreeError::NotAFile(path.to_string()));
        }
        let (parent, created) = self.ensure_folder(parent_path(path))?;
        let file_path = path.to_string();
        let id = self.alloc(|id| {
            Node::File(FileNode {
                id,
                name: display_name(&file_path),
                path: file_path,
                title: None,
                word_count,
                goal: 0,
                tags: Vec::new(),
                stats: Vec::new(),
                totals: StatTotals::default(),
                parent,
            })
        });
        self.files.insert(path.to_string(), id);
        if let Some(p) = self.folder_mut(parent) {
            p.files.push(id);
        }
        let changes = self.adjust_chain(parent, 0, word_count);
        Ok((id, created, changes))
    }

    /// Subtract `remove` and add `add` to the word count of `start` and all
    /// of its ancestors.
    fn adjust_chain(&mut self, start: NodeId, remove: u64, add: u64) -> Vec<WordChange> {
        let mut changes = Vec::new();
        if remove == add {
            return changes;
        }
        let mut current = Some(start);
        while let Some(id) = current {
            let Some(folder) = self.folder_mut(id) else { break };
            let old = folder.word_count;
            folder.word_count = old.saturating_sub(remove) + add;
            changes.push(WordChange {
                id,
                old,
                new: folder.word_count,
            });
            current = folder.parent;
        }
        changes
    }

    /// Set a file's word count and carry the difference to every ancestor.
    /// The file's own change comes first in the returned list.
    pub(crate) fn set_word_count(&mut self, id: NodeId, new: u64) -> Vec<WordChange> {
        let Some(file) = self.file_mut(id) else {
            return Vec::new();
        };
        let old = file.word_count;
        if old == new {
            return Vec::new();
        }
        file.word_count = new;
        let parent = file.parent;
        let mut changes = vec![WordChange { id, old, new }];
        changes.extend(self.adjust_chain(parent, old, new));
        changes
    }

    /// Apply a stat delta to a file and to each ancestor while it records.
    /// Returns the number of nodes that received the delta.
    pub(crate) fn propagate_delta(
        &mut self,
        id: NodeId,
        delta: &StatDelta,
        record_everything: bool,
    ) -> usize {
        let Some(file) = self.file_mut(id) else {
            return 0;
        };
        file.totals.apply(delta);
        let mut touched = 1;
        let mut current = Some(file.parent);
        while let Some(folder_id) = current {
            if !self.is_recording(folder_id, record_everything) {
                break;
            }
            let Some(folder) = self.folder_mut(folder_id) else { break };
            folder.totals.apply(delta);
            touched += 1;
            current = folder.parent;
        }
        touched
    }

    /// Detach and drop a file. Its words leave every ancestor.
    pub(crate) fn remove_file(&mut self, id: NodeId) -> Option<(FileNode, Vec<WordChange>)> {
        self.file(id)?;
        let Some(Node::File(file)) = self.nodes.get_mut(id.0 as usize).and_then(Option::take)
        else {
            return None;
        };
        self.files.remove(&file.path);
        if let Some(parent) = self.folder_mut(file.parent) {
            parent.files.retain(|f| *f != id);
        }
        let changes = self.adjust_chain(file.parent, file.word_count, 0);
        Some((file, changes))
    }

    /// Detach and drop a folder with its whole subtree.
    pub(crate) fn remove_folder(
        &mut self,
        id: NodeId,
    ) -> Result<(Vec<Removed>, Vec<WordChange>, Option<NodeId>), TreeError> {
        if id == self.root {
            return Err(TreeError::RootImmutable);
        }
        let Some(folder) = self.folder(id) else {
            return Ok((Vec::new(), Vec::new(), None));
        };
        let parent = folder.parent;
        let words = folder.word_count;
        let subtree = self.subtree(id);

        let mut changes = Vec::new();
        if let Some(parent) = parent {
            if let Some(p) = self.folder_mut(parent) {
                p.folders.retain(|f| *f != id);
            }
            changes = self.adjust_chain(parent, words, 0);
        }

        let mut removed = Vec::with_capacity(subtree.len());
        for node_id in subtree {
            let Some(node) = self.nodes.get_mut(node_id.0 as usize).and_then(Option::take) else {
                continue;
            };
            let is_file = matches!(node, Node::File(_));
            let path = node.path().to_string();
            if is_file {
                self.files.remove(&path);
            } else {
                self.folders.remove(&path);
            }
            removed.push(Removed {
                id: node_id,
                is_file,
                path,
            });
        }
        Ok((removed, changes, parent))
    }

    /// A folder and all its descendants, parents before children.
    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(f) = self.folder(current) {
                out.extend(f.files.iter().copied());
                stack.extend(f.folders.iter().rev().copied());
            }
        }
        out
    }

    fn check_target_free(&self, from: &str, to: &str) -> Result<(), TreeError> {
        if self.files.contains_key(to) || self.folders.contains_key(to) {
            return Err(TreeError::PathConflict {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    /// Move a file to a new path, re-parenting it when its folder changes.
    pub(crate) fn move_file(&mut self, id: NodeId, new_path: &str) -> Result<MoveOutcome, TreeError> {
        let Some(file) = self.file(id) else {
            return Ok(MoveOutcome::default());
        };
        let old_path = file.path.clone();
        if old_path == new_path {
            return Ok(MoveOutcome::default());
        }
        self.check_target_free(&old_path, new_path)?;
        let old_parent = file.parent;
        let words = file.word_count;

        let (new_parent, created) = self.ensure_folder(parent_path(new_path))?;
        let mut word_changes = Vec::new();
        if new_parent != old_parent {
            if let Some(p) = self.folder_mut(old_parent) {
                p.files.retain(|f| *f != id);
            }
            word_changes.extend(self.adjust_chain(old_parent, words, 0));
            if let Some(p) = self.folder_mut(new_parent) {
                p.files.push(id);
            }
            word_changes.extend(self.adjust_chain(new_parent, 0, words));
        }

        if let Some(file) = self.file_mut(id) {
            file.path = new_path.to_string();
            file.name = display_name(new_path);
            file.parent = new_parent;
        }
        self.files.remove(&old_path);
        self.files.insert(new_path.to_string(), id);

        Ok(MoveOutcome {
            created,
            renamed: vec![(id, old_path, new_path.to_string())],
            word_changes,
            old_parent: Some(old_parent),
            new_parent: Some(new_parent),
        })
    }

    /// Move a folder and its whole subtree to a new path.
    pub(crate) fn move_folder(
        &mut self,
        id: NodeId,
        new_path: &str,
    ) -> Result<MoveOutcome, TreeError> {
        if id == self.root || new_path.is_empty() {
            return Err(TreeError::RootImmutable);
        }
        let Some(folder) = self.folder(id) else {
            return Ok(MoveOutcome::default());
        };
        let old_path = folder.path.clone();
        if old_path == new_path {
            return Ok(MoveOutcome::default());
        }
        if new_path.starts_with(&format!("{old_path}/")) {
            return Err(TreeError::MoveIntoSelf {
                from: old_path,
                to: new_path.to_string(),
            });
        }
        self.check_target_free(&old_path, new_path)?;
        let old_parent = folder.parent.unwrap_or(self.root);
        let words = folder.word_count;

        let (new_parent, created) = self.ensure_folder(parent_path(new_path))?;
        let mut word_changes = Vec::new();
        if new_parent != old_parent {
            if let Some(p) = self.folder_mut(old_parent) {
                p.folders.retain(|f| *f != id);
            }
            word_changes.extend(self.adjust_chain(old_parent, words, 0));
            if let Some(p) = self.folder_mut(new_parent) {
                p.folders.push(id);
            }
            word_changes.extend(self.adjust_chain(new_parent, 0, words));
        }
        if let Some(folder) = self.folder_mut(id) {
            folder.parent = Some(new_parent);
            folder.name = display_name(new_path);
        }

        let mut renamed = Vec::new();
        for node_id in self.subtree(id) {
            let Some(node) = self.nodes.get_mut(node_id.0 as usize).and_then(Option::as_mut) else {
                continue;
            };
            let (path, is_file) = match node {
                Node::File(f) => (&mut f.path, true),
                Node::Folder(f) => (&mut f.path, false),
            };
            let old = std::mem::take(path);
            *path = format!("{new_path}{}", &old[old_path.len()..]);
            let new = path.clone();
            let map = if is_file {
                &mut self.files
            } else {
                &mut self.folders
            };
            map.remove(&old);
            map.insert(new.clone(), node_id);
            renamed.push((node_id, old, new));
        }

        Ok(MoveOutcome {
            created,
            renamed,
            word_changes,
            old_parent: Some(old_parent),
            new_parent: Some(new_parent),
        })
    }
}
