//! The stats engine: drives stat periods and keeps the tree consistent.
//!
//! All mutation goes through [`StatsEngine`], which owns the tree, the
//! "last active file" pointer used for session windowing, the recount
//! queue and the event dispatcher. Every operation runs to completion
//! before returning; observers are notified synchronously.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{TallyError, TreeError};
use crate::events::{EntityKind, EventDispatcher, TallyEvent};
use crate::node::{FileNode, GoalScope, Node, NodeId, RecordingPolicy};
use crate::queue::{DrainReport, UpdateQueue};
use crate::settings::Settings;
use crate::snapshot::Snapshot;
use crate::stat::{Millis, StatDelta, StatPeriod};
use crate::tree::{normalize_path, MoveOutcome, VaultTree, WordChange};

type Clock = Box<dyn Fn() -> Millis>;

fn system_clock() -> Millis {
    chrono::Utc::now().timestamp_millis()
}

/// How an incoming observation is attributed to the file's periods.
enum PeriodChoice {
    /// No period yet: seed one that imports the existing words.
    Seed,
    /// Extend the current period, crediting this much writing time.
    Extend(Millis),
    /// Open a new period starting from the previous end count.
    Open(u64),
}

pub struct StatsEngine {
    tree: VaultTree,
    settings: Settings,
    last_active: Option<NodeId>,
    queue: UpdateQueue,
    events: EventDispatcher,
    clock: Clock,
}

impl std::fmt::Debug for StatsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsEngine")
            .field("files", &self.tree.file_count())
            .field("folders", &self.tree.folder_count())
            .field("last_active", &self.last_active)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl StatsEngine {
    #[must_use]
    pub fn new(root_name: impl Into<String>, settings: Settings) -> Self {
        Self::with_tree(VaultTree::new(root_name), settings)
    }

    #[must_use]
    pub fn with_tree(tree: VaultTree, settings: Settings) -> Self {
        Self {
            tree,
            settings,
            last_active: None,
            queue: UpdateQueue::new(),
            events: EventDispatcher::new(),
            clock: Box::new(system_clock),
        }
    }

    /// Restore an engine from persisted state.
    #[must_use]
    pub fn from_snapshot(
        root_name: impl Into<String>,
        settings: Settings,
        snapshot: &Snapshot,
    ) -> Self {
        let tree = VaultTree::from_snapshot(root_name, snapshot, settings.record_everything);
        info!(
            files = tree.file_count(),
            folders = tree.folder_count(),
            "restored tree from snapshot"
        );
        Self::with_tree(tree, settings)
    }

    /// Replace the clock used to timestamp structural events and queued
    /// recounts.
    pub fn set_clock(&mut self, clock: impl Fn() -> Millis + 'static) {
        self.clock = Box::new(clock);
    }

    #[must_use]
    pub fn now(&self) -> Millis {
        (self.clock)()
    }

    #[must_use]
    pub fn tree(&self) -> &VaultTree {
        &self.tree
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn last_active(&self) -> Option<NodeId> {
        self.last_active
    }

    #[must_use]
    pub fn queue(&self) -> &UpdateQueue {
        &self.queue
    }

    pub fn events_mut(&mut self) -> &mut EventDispatcher {
        &mut self.events
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.tree.snapshot()
    }

    fn emit_words(&mut self, changes: &[WordChange], at: Millis) {
        for change in changes {
            self.events.emit(&TallyEvent::WordsChanged {
                id: change.id,
                old: change.old,
                new: change.new,
                at,
            });
        }
    }

    fn emit_created(&mut self, id: NodeId) {
        let Some(node) = self.tree.node(id) else { return };
        let kind = match node {
            Node::File(_) => EntityKind::File,
            Node::Folder(_) => EntityKind::Folder,
        };
        let event = TallyEvent::Created {
            id,
            kind,
            path: node.path().to_string(),
        };
        self.events.emit(&event);
    }

    /// Track a folder, creating missing ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotAFolder`] if a segment of the path is a file.
    pub fn add_folder(&mut self, path: &str) -> Result<NodeId, TallyError> {
        let path = normalize_path(path);
        let (id, created) = self.tree.ensure_folder(&path)?;
        for folder in created {
            self.emit_created(folder);
        }
        Ok(id)
    }

    /// Track a file that already holds `word_count` words.
    ///
    /// The count is aggregated into every ancestor but no stat period is
    /// recorded: the words count as imported once the file is first edited.
    /// An already tracked file is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotAFile`] if the path is a folder, or
    /// [`TreeError::NotAFolder`] if a parent segment is a file.
    pub fn add_file(&mut self, path: &str, word_count: u64) -> Result<NodeId, TallyError> {
        let path = normalize_path(path);
        if let Some(id) = self.tree.file_id(&path) {
            return Ok(id);
        }
        let (id, created, changes) = self.tree.insert_file(&path, word_count)?;
        debug!(%path, %id, word_count, "tracking file");
        for folder in created {
            self.emit_created(folder);
        }
        self.emit_created(id);
        let now = self.now();
        self.emit_words(&changes, now);
        Ok(id)
    }

    /// Apply a freshly counted word total to a file.
    ///
    /// The count reaches every ancestor regardless of recording policy;
    /// stat periods are then updated through [`StatsEngine::update_stats`].
    /// Returns the stat delta recorded, if any.
    pub fn update_word_count(
        &mut self,
        id: NodeId,
        update_time: Millis,
        new_count: u64,
    ) -> Option<StatDelta> {
        let Some(file) = self.tree.file(id) else {
            warn!(%id, "word count update for untracked file ignored");
            return None;
        };
        let old_count = file.word_count;
        let changes = self.tree.set_word_count(id, new_count);
        self.emit_words(&changes, update_time);
        self.update_stats(id, update_time, old_count, new_count)
    }

    /// Apply a word count that changed while the file was not being watched.
    ///
    /// Unlike [`StatsEngine::update_word_count`], the difference is recorded
    /// as imported or exported words rather than typing.
    pub fn reconcile_word_count(
        &mut self,
        id: NodeId,
        update_time: Millis,
        new_count: u64,
    ) -> Option<StatDelta> {
        let Some(file) = self.tree.file(id) else {
            warn!(%id, "reconcile for untracked file ignored");
            return None;
        };
        if file.word_count == new_count {
            return None;
        }
        let changes = self.tree.set_word_count(id, new_count);
        self.emit_words(&changes, update_time);
        self.update_stats(id, update_time, new_count, new_count)
    }

    /// Record an `old_count -> new_count` observation into the file's stat
    /// periods and propagate the resulting delta.
    ///
    /// Nothing is recorded while the file's folder does not record. The
    /// current period is extended only when this file was the last one
    /// updated and `update_time` is still inside the period's window;
    /// otherwise a new period opens at the previous period's end count.
    pub fn update_stats(
        &mut self,
        id: NodeId,
        update_time: Millis,
        old_count: u64,
        new_count: u64,
    ) -> Option<StatDelta> {
        let record_everything = self.settings.record_everything;
        let parent = self.tree.file(id)?.parent;
        if !self.tree.is_recording(parent, record_everything) {
            debug!(%id, "folder not recording, stats skipped");
            return None;
        }

        let was_last_active = self.last_active == Some(id);
        let timeout = self.settings.writing_timeout_ms();
        let choice = match self.tree.file(id)?.current_period() {
            None => PeriodChoice::Seed,
            Some(current)
                if was_last_active
                    && update_time < self.settings.window_end(current.start_time) =>
            {
                let gap = update_time - current.end_time;
                PeriodChoice::Extend(if gap > timeout { 0 } else { gap })
            }
            Some(current) => PeriodChoice::Open(current.end_words),
        };

        let file = self.tree.file_mut(id)?;
        let (mut delta, writing_time) = match choice {
            PeriodChoice::Seed => {
                let mut period = StatPeriod::new(update_time, 0);
                let mut delta = StatDelta::opened(update_time);
                delta.merge(&period.update(update_time, old_count, old_count, 0, true));
                file.stats.push(period);
                (delta, 0)
            }
            PeriodChoice::Extend(writing_time) => (StatDelta::default(), writing_time),
            PeriodChoice::Open(start_words) => {
                file.stats.push(StatPeriod::new(update_time, start_words));
                (StatDelta::opened(update_time), 0)
            }
        };
        let period = file.stats.last_mut()?;
        delta.merge(&period.update(update_time, old_count, new_count, writing_time, false));

        self.last_active = Some(id);
        let touched = self.tree.propagate_delta(id, &delta, record_everything);
        debug!(%id, touched, added = delta.words_added, deleted = delta.words_deleted, "stats updated");
        Some(delta)
    }

    /// Rename or move a file or folder. Ids, stats and history follow the
    /// node; word counts move between ancestor chains.
    ///
    /// An untracked `old_path` is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PathConflict`] if `new_path` is already tracked,
    /// leaving the tree untouched.
    pub fn rename(&mut self, old_path: &str, new_path: &str) -> Result<(), TallyError> {
        let old = normalize_path(old_path);
        let new = normalize_path(new_path);
        let Some(id) = self.tree.lookup(&old) else {
            warn!(path = %old, "rename of untracked path ignored");
            return Ok(());
        };
        let outcome: MoveOutcome = if self.tree.file(id).is_some() {
            self.tree.move_file(id, &new)?
        } else {
            self.tree.move_folder(id, &new)?
        };
        info!(from = %old, to = %new, "renamed");

        for folder in &outcome.created {
            self.emit_created(*folder);
        }
        for (node, old_path, new_path) in &outcome.renamed {
            self.events.emit(&TallyEvent::Renamed {
                id: *node,
                old_path: old_path.clone(),
                new_path: new_path.clone(),
            });
        }
        let now = self.now();
        self.emit_words(&outcome.word_changes, now);

        if outcome.old_parent != outcome.new_parent {
            let record_everything = self.settings.record_everything;
            for parent in [outcome.old_parent, outcome.new_parent].into_iter().flatten() {
                self.tree.refresh_totals(parent, record_everything);
            }
        }
        Ok(())
    }

    /// Stop tracking a file or a folder with everything below it.
    ///
    /// An untracked path is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::RootImmutable`] for the vault root.
    pub fn delete(&mut self, path: &str) -> Result<(), TallyError> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(TreeError::RootImmutable.into());
        }
        let now = self.now();
        let record_everything = self.settings.record_everything;

        if let Some(id) = self.tree.file_id(&path) {
            let Some((file, changes)) = self.tree.remove_file(id) else {
                return Ok(());
            };
            self.forget(id);
            self.events.emit(&TallyEvent::Deleted {
                id,
                kind: EntityKind::File,
                path: file.path,
            });
            self.emit_words(&changes, now);
            self.tree.refresh_totals(file.parent, record_everything);
            info!(%path, "file deleted");
            return Ok(());
        }

        let Some(id) = self.tree.folder_id(&path) else {
            warn!(%path, "delete of untracked path ignored");
            return Ok(());
        };
        let (removed, changes, parent) = self.tree.remove_folder(id)?;
        for node in &removed {
            self.forget(node.id);
            let kind = if node.is_file {
                EntityKind::File
            } else {
                EntityKind::Folder
            };
            self.events.emit(&TallyEvent::Deleted {
                id: node.id,
                kind,
                path: node.path.clone(),
            });
        }
        self.emit_words(&changes, now);
        if let Some(parent) = parent {
            self.tree.refresh_totals(parent, record_everything);
        }
        info!(%path, removed = removed.len(), "folder deleted");
        Ok(())
    }

    fn forget(&mut self, id: NodeId) {
        self.queue.remove(id);
        if self.last_active == Some(id) {
            self.last_active = None;
        }
    }

    /// Set or clear the title override of a file or folder.
    /// Returns false if the node is untracked or the title is unchanged.
    pub fn set_title(&mut self, id: NodeId, title: Option<String>) -> bool {
        let is_file = self.tree.file(id).is_some();
        let slot = if is_file {
            self.tree.file_mut(id).map(|f| &mut f.title)
        } else {
            self.tree.folder_mut(id).map(|f| &mut f.title)
        };
        let Some(slot) = slot else {
            warn!(%id, "title for untracked node ignored");
            return false;
        };
        if *slot == title {
            return false;
        }
        let old = std::mem::replace(slot, title.clone());
        self.events.emit(&TallyEvent::TitleSet { id, old, new: title });
        true
    }

    /// Set one of a node's goals; 0 clears it. Files only have
    /// [`GoalScope::Own`].
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotAFolder`] when a folder-only scope is set on a
    /// file.
    pub fn set_goal(&mut self, id: NodeId, scope: GoalScope, goal: u64) -> Result<bool, TallyError> {
        if let Some(file) = self.tree.file(id) {
            if scope != GoalScope::Own {
                return Err(TreeError::NotAFolder(file.path.clone()).into());
            }
        }
        let slot = if self.tree.file(id).is_some() {
            self.tree.file_mut(id).map(|f| &mut f.goal)
        } else {
            self.tree.folder_mut(id).map(|f| match scope {
                GoalScope::Own => &mut f.goal,
                GoalScope::Files => &mut f.goal_for_files,
                GoalScope::Folders => &mut f.goal_for_folders,
            })
        };
        let Some(slot) = slot else {
            warn!(%id, "goal for untracked node ignored");
            return Ok(false);
        };
        if *slot == goal {
            return Ok(false);
        }
        let old = std::mem::replace(slot, goal);
        self.events.emit(&TallyEvent::GoalSet {
            id,
            scope,
            old,
            new: goal,
        });
        Ok(true)
    }

    /// Set a folder's recording policy. Existing totals are kept; only
    /// future activity follows the new policy.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotAFolder`] if `id` is a file.
    pub fn set_policy(&mut self, id: NodeId, policy: RecordingPolicy) -> Result<bool, TallyError> {
        if let Some(file) = self.tree.file(id) {
            return Err(TreeError::NotAFolder(file.path.clone()).into());
        }
        let Some(folder) = self.tree.folder_mut(id) else {
            warn!(%id, "policy for untracked folder ignored");
            return Ok(false);
        };
        if folder.policy == policy {
            return Ok(false);
        }
        let old = std::mem::replace(&mut folder.policy, policy);
        self.events.emit(&TallyEvent::RecordingPolicySet { id, old, new: policy });
        Ok(true)
    }

    /// Replace a file's tags.
    pub fn set_tags(&mut self, id: NodeId, tags: Vec<String>) -> bool {
        match self.tree.file_mut(id) {
            Some(file) => {
                file.tags = tags;
                true
            }
            None => {
                warn!(%id, "tags for untracked file ignored");
                false
            }
        }
    }

    /// Queue a file for recounting. Returns false if it was already queued
    /// or is not a tracked file.
    pub fn enqueue(&mut self, id: NodeId) -> bool {
        if self.tree.file(id).is_none() {
            return false;
        }
        self.queue.push(id)
    }

    /// Recount queued files, oldest first, until the queue is empty or
    /// `budget` has elapsed. `count` produces the current word count of a
    /// file; a failure skips that file.
    pub fn drain_queue(
        &mut self,
        budget: Duration,
        mut count: impl FnMut(&FileNode) -> Result<u64, TallyError>,
    ) -> DrainReport {
        let started = Instant::now();
        let mut report = DrainReport::default();
        while !self.queue.is_empty() {
            if started.elapsed() >= budget {
                report.deferred = true;
                break;
            }
            let Some(id) = self.queue.pop() else { break };
            let Some(file) = self.tree.file(id) else {
                debug!(%id, "queued file no longer tracked");
                report.skipped += 1;
                continue;
            };
            match count(file) {
                Ok(words) => {
                    let now = self.now();
                    self.update_word_count(id, now, words);
                    report.processed += 1;
                }
                Err(e) => {
                    warn!(path = %file.path, error = %e, "recount failed");
                    report.failed += 1;
                }
            }
        }
        report.remaining = self.queue.len();
        if report.deferred {
            debug!(remaining = report.remaining, "queue drain deferred to next tick");
        }
        report
    }
}
