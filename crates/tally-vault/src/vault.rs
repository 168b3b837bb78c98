//! A tracked vault directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use tally_core::error::TallyError;
use tally_core::frontmatter::{FrontMatter, Overrides};
use tally_core::node::{GoalScope, NodeId};
use tally_core::queue::DrainReport;
use tally_core::settings::Settings;
use tally_core::snapshot::{ProjectRecord, Snapshot};
use tally_core::tree::VaultTree;
use tally_core::words::{SimpleWordCounter, WordCounter};
use tally_core::StatsEngine;

use crate::store::{config_path, StateStore};
use crate::watcher::{is_note, vault_relative, VaultEvent};

/// What a full scan changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
}

/// The notes under one directory, the engine tracking them, and the store
/// persisting it.
pub struct Vault {
    root: PathBuf,
    engine: StatsEngine,
    projects: Vec<ProjectRecord>,
    store: StateStore,
    counter: Box<dyn WordCounter>,
    diagnostics: Vec<String>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("root", &self.root)
            .field("engine", &self.engine)
            .field("projects", &self.projects.len())
            .finish_non_exhaustive()
    }
}

fn root_name(root: &Path) -> String {
    root.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("vault")
        .to_string()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|s| s.starts_with('.'))
}

impl Vault {
    /// Open the vault at `root`, loading `.tally/config.toml` and the saved
    /// state. Unreadable parts of the state are dropped and reported by
    /// [`Vault::diagnostics`].
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Vault`] if `root` is not a directory, or the
    /// settings error if the configuration is invalid.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, TallyError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(TallyError::Vault(format!(
                "'{}' is not a directory",
                root.display()
            )));
        }
        let settings = Settings::load(&config_path(&root))?;
        let store = StateStore::for_vault(&root);
        let loaded = store.load()?;
        let engine = StatsEngine::from_snapshot(root_name(&root), settings, &loaded.snapshot);
        info!(
            root = %root.display(),
            files = engine.tree().file_count(),
            projects = loaded.snapshot.projects.len(),
            "vault opened"
        );
        Ok(Self {
            root,
            engine,
            projects: loaded.snapshot.projects,
            store,
            counter: Box::new(SimpleWordCounter),
            diagnostics: loaded.diagnostics,
        })
    }

    /// A vault with no saved state.
    #[must_use]
    pub fn with_settings(root: impl Into<PathBuf>, settings: Settings) -> Self {
        let root = root.into();
        Self {
            engine: StatsEngine::new(root_name(&root), settings),
            store: StateStore::for_vault(&root),
            root,
            projects: Vec::new(),
            counter: Box::new(SimpleWordCounter),
            diagnostics: Vec::new(),
        }
    }

    /// Replace the word counter used for every note.
    pub fn set_counter(&mut self, counter: impl WordCounter + 'static) {
        self.counter = Box::new(counter);
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn engine(&self) -> &StatsEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut StatsEngine {
        &mut self.engine
    }

    #[must_use]
    pub fn tree(&self) -> &VaultTree {
        self.engine.tree()
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        self.engine.settings()
    }

    #[must_use]
    pub fn projects(&self) -> &[ProjectRecord] {
        &self.projects
    }

    pub fn set_projects(&mut self, projects: Vec<ProjectRecord>) {
        self.projects = projects;
    }

    /// Problems found while loading the saved state.
    #[must_use]
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Current text of a note.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Io`] if the note cannot be read.
    pub fn read_text(&self, path: &str) -> Result<String, TallyError> {
        Ok(fs::read_to_string(self.root.join(path))?)
    }

    fn read_note(&self, path: &str) -> Result<(u64, Overrides), TallyError> {
        let text = self.read_text(path)?;
        Ok((
            self.counter.count_words(&text),
            read_overrides(path, &text, self.engine.settings()),
        ))
    }

    /// Bring the tree in line with the notes on disk.
    ///
    /// New notes are tracked with their current count, changed counts are
    /// reconciled as imported or exported words, and notes or folders that
    /// disappeared are dropped. Front matter overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns an error only if dropping a vanished entry fails.
    pub fn scan(&mut self) -> Result<ScanReport, TallyError> {
        let mut report = ScanReport::default();
        let mut seen = HashSet::new();
        let now = self.engine.now();
        let excluded = self.engine.settings().excluded.clone();

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                let excluded_top = e.depth() == 1
                    && e.file_name().to_str().is_some_and(|n| excluded.iter().any(|x| x == n));
                e.depth() == 0 || !(is_hidden(e) || excluded_top)
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "cannot walk vault entry");
                    report.failed += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(path) = vault_relative(&self.root, entry.path(), &excluded) else {
                continue;
            };
            if !is_note(&path) {
                continue;
            }
            seen.insert(path.clone());

            let (count, overrides) = match self.read_note(&path) {
                Ok(note) => note,
                Err(e) => {
                    warn!(%path, error = %e, "cannot read note");
                    report.failed += 1;
                    continue;
                }
            };
            let id = match self.engine.tree().file_id(&path) {
                Some(id) => {
                    let known = self.engine.tree().file(id).map(|f| f.word_count);
                    if known == Some(count) {
                        report.unchanged += 1;
                    } else {
                        self.engine.reconcile_word_count(id, now, count);
                        report.updated += 1;
                    }
                    id
                }
                None => match self.engine.add_file(&path, count) {
                    Ok(id) => {
                        report.added += 1;
                        id
                    }
                    Err(e) => {
                        warn!(%path, error = %e, "cannot track note");
                        report.failed += 1;
                        continue;
                    }
                },
            };
            self.apply_overrides(id, overrides);
        }

        let vanished: Vec<String> = self
            .engine
            .tree()
            .files()
            .filter(|f| !seen.contains(&f.path))
            .map(|f| f.path.clone())
            .collect();
        for path in vanished {
            self.engine.delete(&path)?;
            report.removed += 1;
        }
        let empty_folders: Vec<String> = self
            .engine
            .tree()
            .folders()
            .filter(|f| !f.is_root() && !self.root.join(&f.path).is_dir())
            .map(|f| f.path.clone())
            .collect();
        for path in empty_folders {
            if self.engine.tree().folder_id(&path).is_some() {
                self.engine.delete(&path)?;
            }
        }

        info!(
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            failed = report.failed,
            "scan complete"
        );
        Ok(report)
    }

    /// Front matter wins over titles and goals set by hand only when it
    /// names them. Tags always follow the front matter.
    fn apply_overrides(&mut self, id: NodeId, overrides: Overrides) {
        if let Some(title) = overrides.title {
            self.engine.set_title(id, Some(title));
        }
        if let Some(goal) = overrides.goal {
            if let Err(e) = self.engine.set_goal(id, GoalScope::Own, goal) {
                warn!(%id, error = %e, "cannot apply goal from front matter");
            }
        }
        let changed = self
            .engine
            .tree()
            .file(id)
            .is_some_and(|f| f.tags != overrides.tags);
        if changed {
            self.engine.set_tags(id, overrides.tags);
        }
    }

    /// Apply one watcher event. Content changes are queued for recounting;
    /// renames and deletions take effect immediately.
    ///
    /// # Errors
    ///
    /// Returns tree errors such as a rename onto a tracked path.
    pub fn apply_event(&mut self, event: VaultEvent) -> Result<(), TallyError> {
        match event {
            VaultEvent::Changed(path) => {
                if !is_note(&path) {
                    return Ok(());
                }
                let id = match self.engine.tree().file_id(&path) {
                    Some(id) => id,
                    // Text already in a note seen for the first time is imported, not typed.
                    None => match self.read_note(&path) {
                        Ok((count, overrides)) => {
                            let id = self.engine.add_file(&path, count)?;
                            self.apply_overrides(id, overrides);
                            id
                        }
                        Err(e) => {
                            debug!(%path, error = %e, "new note not readable yet");
                            self.engine.add_file(&path, 0)?
                        }
                    },
                };
                if self.engine.enqueue(id) {
                    debug!(%path, "recount queued");
                }
            }
            VaultEvent::Removed(path) => {
                if self.engine.tree().lookup(&path).is_none() {
                    debug!(%path, "removal of untracked path");
                    return Ok(());
                }
                self.engine.delete(&path)?;
            }
            VaultEvent::Renamed { from, to } => {
                let tracked = self.engine.tree().lookup(&from);
                let was_file = self.engine.tree().file_id(&from).is_some();
                match tracked {
                    Some(_) if was_file && !is_note(&to) => self.engine.delete(&from)?,
                    Some(_) => {
                        self.engine.rename(&from, &to)?;
                        if let Some(id) = self.engine.tree().file_id(&to) {
                            self.engine.enqueue(id);
                        }
                    }
                    None => return self.apply_event(VaultEvent::Changed(to)),
                }
            }
        }
        Ok(())
    }

    /// Recount queued notes within the configured batch budget.
    pub fn process_queue(&mut self) -> DrainReport {
        let budget = Duration::from_millis(self.engine.settings().batch_budget_ms);
        let settings = self.engine.settings().clone();
        let root = &self.root;
        let counter = &self.counter;
        let mut overrides = Vec::new();

        let report = self.engine.drain_queue(budget, |file| {
            let text = fs::read_to_string(root.join(&file.path))?;
            overrides.push((file.id, read_overrides(&file.path, &text, &settings)));
            Ok(counter.count_words(&text))
        });

        for (id, o) in overrides {
            self.apply_overrides(id, o);
        }
        report
    }

    /// The full state, including project definitions.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = self.engine.snapshot();
        snapshot.projects.clone_from(&self.projects);
        snapshot
    }

    /// Persist the state to `.tally/state.json`.
    ///
    /// # Errors
    ///
    /// Returns the store's I/O or serialization error.
    pub fn save(&self) -> Result<(), TallyError> {
        self.store.save(&self.snapshot())
    }
}

fn read_overrides(path: &str, text: &str, settings: &Settings) -> Overrides {
    match FrontMatter::parse(text) {
        Ok(front_matter) => front_matter.overrides(settings),
        Err(e) => {
            warn!(%path, error = %e, "ignoring malformed front matter");
            Overrides::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    use tally_core::node::RecordingPolicy;
    use tally_core::snapshot::ProjectType;

    fn write(root: &Path, path: &str, text: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, text).unwrap();
    }

    /// A vault that records everywhere through an `On` root policy.
    fn vault(root: &Path) -> Vault {
        let mut vault = Vault::with_settings(root, Settings::default());
        vault.engine_mut().set_clock(|| 1_000_000);
        let root_id = vault.tree().root();
        vault
            .engine_mut()
            .set_policy(root_id, RecordingPolicy::On)
            .unwrap();
        vault
    }

    fn words(vault: &Vault, path: &str) -> u64 {
        let tree = vault.tree();
        tree.node(tree.lookup(path).unwrap()).unwrap().word_count()
    }

    #[test]
    fn scan_tracks_notes_and_skips_hidden_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Book/ch1.md", "one two three");
        write(dir.path(), "Book/ch2.md", "four five");
        write(dir.path(), "inbox.md", "six");
        write(dir.path(), "Book/cover.png", "binary");
        write(dir.path(), ".obsidian/workspace.md", "hidden words here");
        write(dir.path(), "Templates/daily.md", "template words");

        let settings = Settings {
            excluded: vec!["Templates".to_string()],
            ..Settings::default()
        };
        let mut vault = Vault::with_settings(dir.path(), settings);
        let report = vault.scan().unwrap();

        assert_eq!(report.added, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(vault.tree().file_count(), 3);
        assert_eq!(words(&vault, "Book"), 5);
        assert_eq!(vault.tree().root_folder().word_count, 6);
        assert_eq!(vault.tree().root_folder().totals.period_count, 0, "scan records no periods");
    }

    #[test]
    fn rescan_reconciles_offline_edits_and_deletions() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "one two");
        write(dir.path(), "Old/b.md", "three");
        let mut vault = vault(dir.path());
        vault.scan().unwrap();

        write(dir.path(), "a.md", "one two three four");
        fs::remove_dir_all(dir.path().join("Old")).unwrap();
        let report = vault.scan().unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(vault.tree().folder_id("Old"), None);
        let a = vault.tree().file(vault.tree().file_id("a.md").unwrap()).unwrap();
        assert_eq!(a.word_count, 4);
        assert_eq!(a.totals.words_imported, 4);
        assert_eq!(a.totals.words_added, 0);

        let again = vault.scan().unwrap();
        assert_eq!(again.unchanged, 1);
        assert_eq!(again.updated, 0);
    }

    #[test]
    fn front_matter_sets_title_goal_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "ch1.md",
            "---\ntitle: Opening\nword-goal: 2000\ntags: [Draft]\n---\nOnly four words here.",
        );
        let mut vault = vault(dir.path());
        vault.scan().unwrap();

        let id = vault.tree().file_id("ch1.md").unwrap();
        let file = vault.tree().file(id).unwrap();
        assert_eq!(file.word_count, 4);
        assert_eq!(file.display_title(), "Opening");
        assert_eq!(vault.tree().file_goal(id), Some(2000));
        assert_eq!(file.tags, vec!["draft"]);
    }

    #[test]
    fn watched_note_imports_existing_text_then_counts_typing() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = vault(dir.path());
        let clock = Rc::new(Cell::new(0));
        let shared = Rc::clone(&clock);
        vault.engine_mut().set_clock(move || shared.get());

        write(dir.path(), "new.md", "a b c");
        vault.apply_event(VaultEvent::Changed("new.md".to_string())).unwrap();
        let report = vault.process_queue();
        assert_eq!(report.processed, 1);

        clock.set(10_000);
        write(dir.path(), "new.md", "a b c d e f");
        vault.apply_event(VaultEvent::Changed("new.md".to_string())).unwrap();
        vault.process_queue();

        let file = vault.tree().file(vault.tree().file_id("new.md").unwrap()).unwrap();
        assert_eq!(file.word_count, 6);
        assert_eq!(file.stats.len(), 1);
        assert_eq!(file.stats[0].words_imported, 3);
        assert_eq!(file.stats[0].words_added, 3);
        assert_eq!(file.stats[0].writing_time, 10_000);
        assert!(file.stats[0].is_consistent());
    }

    #[test]
    fn pasted_note_first_seen_by_watcher_is_imported() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = vault(dir.path());
        write(
            dir.path(),
            "pasted.md",
            "---
title: Clipping
---
one two three four five six seven eight nine ten",
        );

        vault.apply_event(VaultEvent::Changed("pasted.md".to_string())).unwrap();
        let report = vault.process_queue();
        assert_eq!(report.processed, 1);

        let file = vault.tree().file(vault.tree().file_id("pasted.md").unwrap()).unwrap();
        assert_eq!(file.word_count, 10);
        assert_eq!(file.display_title(), "Clipping");
        assert_eq!(file.totals.words_imported, 10);
        assert_eq!(file.totals.words_added, 0);
        assert_eq!(vault.tree().root_folder().totals.words_added, 0);
    }

    #[test]
    fn default_settings_record_nothing_without_a_policy() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "one two");
        let mut vault = Vault::with_settings(dir.path(), Settings::default());
        vault.engine_mut().set_clock(|| 1_000_000);
        vault.scan().unwrap();

        write(dir.path(), "a.md", "one two three four");
        vault.apply_event(VaultEvent::Changed("a.md".to_string())).unwrap();
        vault.process_queue();

        let a = vault.tree().file(vault.tree().file_id("a.md").unwrap()).unwrap();
        assert_eq!(a.word_count, 4);
        assert!(a.stats.is_empty());
        assert_eq!(vault.tree().root_folder().totals.period_count, 0);
    }

    #[test]
    fn rename_and_remove_events_follow_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Drafts/a.md", "one two");
        let mut vault = vault(dir.path());
        vault.scan().unwrap();
        let id = vault.tree().file_id("Drafts/a.md").unwrap();

        fs::create_dir_all(dir.path().join("Book")).unwrap();
        fs::rename(dir.path().join("Drafts/a.md"), dir.path().join("Book/a.md")).unwrap();
        vault
            .apply_event(VaultEvent::Renamed {
                from: "Drafts/a.md".to_string(),
                to: "Book/a.md".to_string(),
            })
            .unwrap();
        assert_eq!(vault.tree().file_id("Book/a.md"), Some(id));
        assert_eq!(words(&vault, "Book"), 2);
        assert_eq!(words(&vault, "Drafts"), 0);

        vault.apply_event(VaultEvent::Removed("Book".to_string())).unwrap();
        assert_eq!(vault.tree().file_count(), 0);
        vault.apply_event(VaultEvent::Removed("never.md".to_string())).unwrap();

        vault
            .apply_event(VaultEvent::Renamed {
                from: "outside.md".to_string(),
                to: "inside.md".to_string(),
            })
            .unwrap();
        assert!(vault.tree().file_id("inside.md").is_some());
    }

    #[test]
    fn renaming_a_note_away_from_markdown_untracks_it() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "one");
        let mut vault = vault(dir.path());
        vault.scan().unwrap();

        vault
            .apply_event(VaultEvent::Renamed {
                from: "a.md".to_string(),
                to: "a.txt".to_string(),
            })
            .unwrap();
        assert_eq!(vault.tree().file_count(), 0);
    }

    #[test]
    fn unreadable_queued_note_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = vault(dir.path());
        vault.apply_event(VaultEvent::Changed("ghost.md".to_string())).unwrap();

        let report = vault.process_queue();
        assert_eq!(report.failed, 1);
        assert_eq!(report.processed, 0);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Book/ch1.md", "one two three");
        let mut vault = vault(dir.path());
        vault.scan().unwrap();
        let id = vault.tree().file_id("Book/ch1.md").unwrap();
        vault.engine_mut().update_word_count(id, 2_000_000, 5);
        vault.set_projects(vec![ProjectRecord {
            name: "Book".to_string(),
            project_type: ProjectType::Folder,
            index: "Book".to_string(),
        }]);
        vault.save().unwrap();

        let reopened = Vault::open(dir.path()).unwrap();
        assert!(reopened.diagnostics().is_empty());
        assert_eq!(reopened.projects().len(), 1);
        let file = reopened
            .tree()
            .file(reopened.tree().file_id("Book/ch1.md").unwrap())
            .unwrap();
        assert_eq!(file.word_count, 5);
        assert_eq!(file.stats.len(), 1);
        assert_eq!(reopened.tree().root_folder().totals.words_imported, 3);
        assert_eq!(reopened.tree().root_folder().totals.words_added, 2);
    }

    #[test]
    fn open_rejects_missing_directory_and_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Vault::open(dir.path().join("nope")).is_err());

        write(dir.path(), ".tally/config.toml", "stat_period_minutes = 0\n");
        assert!(matches!(Vault::open(dir.path()), Err(TallyError::Config(_))));
    }
}
