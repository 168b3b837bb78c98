//! File system watcher feeding vault changes to the tracker.
//!
//! Uses the `notify` crate for cross-platform file system events
//! (FSEvents on macOS, inotify on Linux, ReadDirectoryChanges on Windows).
//! Paths are reported relative to the vault root with `/` separators.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use tally_core::error::TallyError;
use tally_core::tree::normalize_path;

/// Events emitted by the vault watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    /// A markdown file was created or modified.
    Changed(String),
    /// A file or folder was deleted.
    Removed(String),
    /// A file or folder was moved within the vault.
    Renamed { from: String, to: String },
}

/// Whether a vault-relative path names a markdown note.
#[must_use]
pub fn is_note(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md"))
}

/// Vault-relative path of `path`, or `None` when it lies outside the vault
/// or inside a hidden or excluded folder.
pub(crate) fn vault_relative(root: &Path, path: &Path, excluded: &[String]) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut components = relative.components().peekable();
    let first = components.peek()?.as_os_str().to_str()?;
    if excluded.iter().any(|e| e == first) {
        return None;
    }
    // Hidden folders (.tally, .obsidian, .git) and hidden files are skipped.
    if relative
        .components()
        .any(|c| c.as_os_str().to_str().is_some_and(|s| s.starts_with('.')))
    {
        return None;
    }
    let normalized = normalize_path(relative.to_str()?);
    (!normalized.is_empty()).then_some(normalized)
}

fn translate(event: &Event, root: &Path, excluded: &[String]) -> Vec<VaultEvent> {
    let relative = |p: &PathBuf| vault_relative(root, p, excluded);
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            match (relative(&event.paths[0]), relative(&event.paths[1])) {
                (Some(from), Some(to)) => vec![VaultEvent::Renamed { from, to }],
                // Moved out of view: gone. Moved into view: new.
                (Some(from), None) => vec![VaultEvent::Removed(from)],
                (None, Some(to)) if is_note(&to) => vec![VaultEvent::Changed(to)],
                _ => Vec::new(),
            }
        }
        // Without paired paths, the old name no longer exists on disk and
        // the new one does.
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .filter_map(|p| {
                let path = relative(p)?;
                if p.exists() {
                    is_note(&path).then_some(VaultEvent::Changed(path))
                } else {
                    Some(VaultEvent::Removed(path))
                }
            })
            .collect(),
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .iter()
            .filter_map(relative)
            .filter(|p| is_note(p))
            .map(VaultEvent::Changed)
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .filter_map(relative)
            .map(VaultEvent::Removed)
            .collect(),
        _ => Vec::new(),
    }
}

/// Watches a vault directory for file changes and emits events.
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::Receiver<VaultEvent>,
}

impl VaultWatcher {
    /// Start watching a vault directory. Top-level folders named in
    /// `excluded` are ignored, as are hidden files and folders.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Io`] if the watcher cannot be created.
    pub fn start(vault_root: &Path, excluded: &[String]) -> Result<Self, TallyError> {
        let (tx, rx) = mpsc::channel();

        // Events carry absolute, canonical paths on some platforms.
        let root = vault_root
            .canonicalize()
            .unwrap_or_else(|_| vault_root.to_path_buf());
        let excluded = excluded.to_vec();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    for vault_event in translate(&event, &root, &excluded) {
                        debug!(?vault_event, "vault change");
                        if tx.send(vault_event).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "watch error"),
            }
        })
        .map_err(|e| TallyError::Io(std::io::Error::other(e)))?;

        watcher
            .watch(vault_root, RecursiveMode::Recursive)
            .map_err(|e| TallyError::Io(std::io::Error::other(e)))?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }

    /// Receive the next event, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<VaultEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Receive the next event without blocking.
    pub fn try_recv(&self) -> Option<VaultEvent> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::fs;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from("/vault").join(p));
        }
        event
    }

    fn translated(kind: EventKind, paths: &[&str]) -> Vec<VaultEvent> {
        translate(&event(kind, paths), Path::new("/vault"), &["Templates".to_string()])
    }

    #[test]
    fn relative_paths_skip_hidden_and_excluded() {
        let root = Path::new("/vault");
        let excluded = vec!["Templates".to_string()];
        let rel = |p: &str| vault_relative(root, &root.join(p), &excluded);

        assert_eq!(rel("Book/ch1.md").as_deref(), Some("Book/ch1.md"));
        assert_eq!(rel(".tally/state.json"), None);
        assert_eq!(rel("Book/.hidden.md"), None);
        assert_eq!(rel("Templates/daily.md"), None);
        assert_eq!(vault_relative(root, Path::new("/elsewhere/a.md"), &excluded), None);
    }

    #[test]
    fn content_changes_only_for_notes() {
        let changed = translated(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["a.md", "b.png"],
        );
        assert_eq!(changed, vec![VaultEvent::Changed("a.md".to_string())]);

        let created = translated(EventKind::Create(CreateKind::File), &["Templates/x.md"]);
        assert!(created.is_empty());
    }

    #[test]
    fn removals_include_folders() {
        let removed = translated(EventKind::Remove(RemoveKind::Any), &["Book", "Book/a.md"]);
        assert_eq!(
            removed,
            vec![
                VaultEvent::Removed("Book".to_string()),
                VaultEvent::Removed("Book/a.md".to_string()),
            ]
        );
    }

    #[test]
    fn paired_renames_become_one_event() {
        let renamed = translated(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["Drafts/a.md", "Book/a.md"],
        );
        assert_eq!(
            renamed,
            vec![VaultEvent::Renamed {
                from: "Drafts/a.md".to_string(),
                to: "Book/a.md".to_string(),
            }]
        );

        let into_templates = translated(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["a.md", "Templates/a.md"],
        );
        assert_eq!(into_templates, vec![VaultEvent::Removed("a.md".to_string())]);
    }

    #[test]
    fn note_extension_is_case_insensitive() {
        assert!(is_note("a.md"));
        assert!(is_note("Book/A.MD"));
        assert!(!is_note("Book"));
        assert!(!is_note("a.markdown.txt"));
    }

    #[test]
    fn watcher_detects_new_note() {
        let dir = tempfile::tempdir().unwrap();
        let vault_root = dir.path();
        fs::create_dir_all(vault_root.join(".tally")).unwrap();
        fs::create_dir_all(vault_root.join("Book")).unwrap();

        let watcher = VaultWatcher::start(vault_root, &[]).unwrap();

        fs::write(vault_root.join("Book").join("ch1.md"), "Some words").unwrap();

        let event = watcher.recv_timeout(Duration::from_secs(2));
        match event {
            Some(VaultEvent::Changed(path)) => assert_eq!(path, "Book/ch1.md"),
            other => panic!("Expected Changed event, got {other:?}"),
        }
    }

    #[test]
    fn watcher_ignores_state_directory() {
        let dir = tempfile::tempdir().unwrap();
        let vault_root = dir.path();
        fs::create_dir_all(vault_root.join(".tally")).unwrap();

        let watcher = VaultWatcher::start(vault_root, &[]).unwrap();

        fs::write(vault_root.join(".tally").join("notes.md"), "hidden").unwrap();
        fs::write(vault_root.join("plain.txt"), "plain text").unwrap();

        let event = watcher.recv_timeout(Duration::from_millis(500));
        assert!(event.is_none(), "unexpected event {event:?}");
    }
}
