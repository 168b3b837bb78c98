//! Projects: named, dynamically computed sets of files used for reporting.
//!
//! Membership is derived from the tree every time it is asked for and is
//! never persisted. Only the name, kind and index value are stored, as a
//! [`ProjectRecord`].

use tracing::warn;

use tally_core::error::ProjectError;
use tally_core::link::LinkResolver;
use tally_core::node::{normalize_tag, NodeId};
use tally_core::snapshot::{ProjectRecord, ProjectType};
use tally_core::tree::{normalize_path, VaultTree};

/// Membership rule of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectKind {
    /// Files linked from an index note. `None` while the note is not
    /// tracked; it is picked up again if it reappears at its last path.
    FileIndex(Option<NodeId>),
    /// Files below a folder path. The empty path is the whole vault.
    Folder(String),
    /// Files carrying a tag.
    Tag(String),
}

#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    kind: ProjectKind,
    /// Last known path of a file index, kept for persistence if the index
    /// note disappears.
    index_path: String,
    files: Vec<NodeId>,
}

fn checked_name(name: String) -> Result<String, ProjectError> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(ProjectError::EmptyName);
    }
    Ok(name)
}

impl Project {
    fn new(name: String, kind: ProjectKind, index_path: String) -> Self {
        Self {
            name,
            kind,
            index_path,
            files: Vec::new(),
        }
    }

    /// A project over the notes linked from `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::MissingIndexFile`] if `index` is not a tracked
    /// file, or [`ProjectError::EmptyName`].
    pub fn file_index(
        name: impl Into<String>,
        tree: &VaultTree,
        index: &str,
    ) -> Result<Self, ProjectError> {
        let name = checked_name(name.into())?;
        let path = normalize_path(index);
        let Some(id) = tree.file_id(&path) else {
            return Err(ProjectError::MissingIndexFile {
                name,
                index: index.to_string(),
            });
        };
        Ok(Self::new(name, ProjectKind::FileIndex(Some(id)), path))
    }

    /// A project over every file below `folder`. A trailing `/` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::EmptyName`].
    pub fn folder(name: impl Into<String>, folder: &str) -> Result<Self, ProjectError> {
        let name = checked_name(name.into())?;
        let path = normalize_path(folder);
        Ok(Self::new(name, ProjectKind::Folder(path.clone()), path))
    }

    /// A project over every file tagged `tag`, ignoring case and a leading `#`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::EmptyName`].
    pub fn tag(name: impl Into<String>, tag: &str) -> Result<Self, ProjectError> {
        let name = checked_name(name.into())?;
        let tag = normalize_tag(tag);
        Ok(Self::new(name, ProjectKind::Tag(tag.clone()), tag))
    }

    /// Rebuild a project from its stored form.
    ///
    /// Unlike [`Project::file_index`], an index note that is not tracked
    /// right now is kept as a dangling index with no members, so the
    /// definition survives the note being moved away and back.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::EmptyName`].
    pub fn from_record(record: &ProjectRecord, tree: &VaultTree) -> Result<Self, ProjectError> {
        match record.project_type {
            ProjectType::FileIndex => {
                let name = checked_name(record.name.clone())?;
                let path = normalize_path(&record.index);
                let id = tree.file_id(&path);
                if id.is_none() {
                    warn!(project = %name, index = %path, "index note not tracked, project kept empty");
                }
                Ok(Self::new(name, ProjectKind::FileIndex(id), path))
            }
            ProjectType::Folder => Self::folder(record.name.clone(), &record.index),
            ProjectType::Tag => Self::tag(record.name.clone(), &record.index),
        }
    }

    #[must_use]
    pub fn to_record(&self, tree: &VaultTree) -> ProjectRecord {
        let project_type = match self.kind {
            ProjectKind::FileIndex(_) => ProjectType::FileIndex,
            ProjectKind::Folder(_) => ProjectType::Folder,
            ProjectKind::Tag(_) => ProjectType::Tag,
        };
        ProjectRecord {
            name: self.name.clone(),
            project_type,
            index: self.index(tree),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> &ProjectKind {
        &self.kind
    }

    /// The index value: the index note's current path, the folder, or the tag.
    #[must_use]
    pub fn index(&self, tree: &VaultTree) -> String {
        match &self.kind {
            ProjectKind::FileIndex(id) => id
                .and_then(|id| tree.file(id))
                .map_or_else(|| self.index_path.clone(), |f| f.path.clone()),
            ProjectKind::Folder(path) | ProjectKind::Tag(path) => path.clone(),
        }
    }

    /// The index note, if it is tracked: by id while that id is alive,
    /// otherwise at the last known index path.
    fn resolve_index(&self, tree: &VaultTree) -> Option<NodeId> {
        let ProjectKind::FileIndex(id) = self.kind else {
            return None;
        };
        id.filter(|id| tree.file(*id).is_some())
            .or_else(|| tree.file_id(&self.index_path))
    }

    /// Membership as of the last [`Project::update_files`].
    #[must_use]
    pub fn files(&self) -> &[NodeId] {
        &self.files
    }

    /// Compute the current membership from the tree.
    #[must_use]
    pub fn compute_files(&self, tree: &VaultTree, links: &dyn LinkResolver) -> Vec<NodeId> {
        match &self.kind {
            ProjectKind::FileIndex(_) => match self.resolve_index(tree) {
                Some(index) => links.outbound_links(tree, index),
                None => {
                    warn!(project = %self.name, index = %self.index_path, "index note is not tracked");
                    Vec::new()
                }
            },
            ProjectKind::Folder(folder) if folder.is_empty() => tree.files().map(|f| f.id).collect(),
            ProjectKind::Folder(folder) => {
                let prefix = format!("{folder}/");
                tree.files()
                    .filter(|f| f.path.starts_with(&prefix))
                    .map(|f| f.id)
                    .collect()
            }
            ProjectKind::Tag(tag) => tree
                .files()
                .filter(|f| f.has_tag(tag))
                .map(|f| f.id)
                .collect(),
        }
    }

    /// Recompute membership, store it, and return the files that were
    /// members before but are not anymore.
    pub fn update_files(&mut self, tree: &VaultTree, links: &dyn LinkResolver) -> Vec<NodeId> {
        if let ProjectKind::FileIndex(_) = self.kind {
            if let Some(file) = self.resolve_index(tree).and_then(|id| tree.file(id)) {
                self.kind = ProjectKind::FileIndex(Some(file.id));
                self.index_path.clone_from(&file.path);
            }
        }
        let current = self.compute_files(tree, links);
        let removed = self
            .files
            .iter()
            .copied()
            .filter(|id| !current.contains(id))
            .collect();
        self.files = current;
        removed
    }

    /// Sum of the current word counts of the members.
    #[must_use]
    pub fn total_words(&self, tree: &VaultTree) -> u64 {
        self.files
            .iter()
            .filter_map(|id| tree.file(*id))
            .map(|f| f.word_count)
            .sum()
    }
}

/// Registry of projects with unique names, in creation order.
#[derive(Debug, Clone, Default)]
pub struct ProjectManager {
    projects: Vec<Project>,
}

impl ProjectManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the registry from stored records. Records with an empty or
    /// duplicate name are skipped and described in the returned
    /// diagnostics. A file-index project whose note is gone is kept.
    #[must_use]
    pub fn from_records(records: &[ProjectRecord], tree: &VaultTree) -> (Self, Vec<String>) {
        let mut manager = Self::new();
        let mut diagnostics = Vec::new();
        for record in records {
            let result = Project::from_record(record, tree).and_then(|p| manager.create(p));
            if let Err(e) = result {
                warn!(project = %record.name, error = %e, "skipping stored project");
                diagnostics.push(e.to_string());
            }
        }
        (manager, diagnostics)
    }

    #[must_use]
    pub fn records(&self, tree: &VaultTree) -> Vec<ProjectRecord> {
        self.projects.iter().map(|p| p.to_record(tree)).collect()
    }

    /// Register a project.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::DuplicateName`] if the name is taken.
    pub fn create(&mut self, project: Project) -> Result<(), ProjectError> {
        if self.get(project.name()).is_some() {
            return Err(ProjectError::DuplicateName(project.name));
        }
        self.projects.push(project);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ProjectError::NotFound`], [`ProjectError::DuplicateName`] or
    /// [`ProjectError::EmptyName`].
    pub fn rename(&mut self, name: &str, new_name: &str) -> Result<(), ProjectError> {
        let new_name = checked_name(new_name.to_string())?;
        if new_name != name && self.get(&new_name).is_some() {
            return Err(ProjectError::DuplicateName(new_name));
        }
        let project = self
            .get_mut(name)
            .ok_or_else(|| ProjectError::NotFound(name.to_string()))?;
        project.name = new_name;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ProjectError::NotFound`].
    pub fn delete(&mut self, name: &str) -> Result<Project, ProjectError> {
        let index = self
            .projects
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| ProjectError::NotFound(name.to_string()))?;
        Ok(self.projects.remove(index))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Project> {
        self.projects.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Recompute every project's membership. Returns, per project, the
    /// files that left it.
    pub fn update_all(
        &mut self,
        tree: &VaultTree,
        links: &dyn LinkResolver,
    ) -> Vec<(String, Vec<NodeId>)> {
        self.projects
            .iter_mut()
            .map(|p| (p.name.clone(), p.update_files(tree, links)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use tally_core::{Settings, StatsEngine};

    #[derive(Default)]
    struct MapLinks(HashMap<NodeId, Vec<NodeId>>);

    impl LinkResolver for MapLinks {
        fn outbound_links(&self, _tree: &VaultTree, file: NodeId) -> Vec<NodeId> {
            self.0.get(&file).cloned().unwrap_or_default()
        }
    }

    fn engine(files: &[(&str, u64)]) -> StatsEngine {
        let mut engine = StatsEngine::new("vault", Settings::default());
        for (path, words) in files {
            engine.add_file(path, *words).unwrap();
        }
        engine
    }

    fn id(engine: &StatsEngine, path: &str) -> NodeId {
        engine.tree().file_id(path).unwrap()
    }

    #[test]
    fn folder_project_drops_deleted_member() {
        let mut engine = engine(&[
            ("Book/a.md", 100),
            ("Book/b.md", 200),
            ("Book/Part/c.md", 300),
            ("Bookkeeping/x.md", 7),
        ]);
        let links = MapLinks::default();
        let mut project = Project::folder("Book", "Book/").unwrap();
        project.update_files(engine.tree(), &links);
        assert_eq!(project.files().len(), 3);
        assert_eq!(project.total_words(engine.tree()), 600);

        let b = id(&engine, "Book/b.md");
        engine.delete("Book/b.md").unwrap();
        let removed = project.update_files(engine.tree(), &links);

        assert_eq!(removed, vec![b]);
        assert_eq!(project.total_words(engine.tree()), 400);
    }

    #[test]
    fn empty_folder_index_is_whole_vault() {
        let engine = engine(&[("a.md", 1), ("B/c.md", 2)]);
        let project = Project::folder("All", "/").unwrap();
        let files = project.compute_files(engine.tree(), &MapLinks::default());
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn tag_project_matches_case_insensitively() {
        let mut engine = engine(&[("a.md", 10), ("b.md", 20), ("c.md", 30)]);
        let a = id(&engine, "a.md");
        let b = id(&engine, "b.md");
        engine.set_tags(a, vec!["draft".to_string()]);
        engine.set_tags(b, vec!["Draft".to_string(), "final".to_string()]);

        let mut project = Project::tag("Drafts", "#DRAFT").unwrap();
        project.update_files(engine.tree(), &MapLinks::default());

        assert_eq!(project.files(), &[a, b]);
        assert_eq!(project.total_words(engine.tree()), 30);
        assert_eq!(project.index(engine.tree()), "draft");
    }

    #[test]
    fn file_index_project_follows_links_and_renames() {
        let mut engine = engine(&[("Novel.md", 5), ("ch1.md", 100), ("ch2.md", 50)]);
        let index = id(&engine, "Novel.md");
        let ch1 = id(&engine, "ch1.md");
        let ch2 = id(&engine, "ch2.md");
        let mut links = MapLinks::default();
        links.0.insert(index, vec![ch1, ch2]);

        let mut project = Project::file_index("Novel", engine.tree(), "Novel.md").unwrap();
        project.update_files(engine.tree(), &links);
        assert_eq!(project.total_words(engine.tree()), 150);

        engine.rename("Novel.md", "Index/Novel.md").unwrap();
        links.0.insert(index, vec![ch2]);
        let removed = project.update_files(engine.tree(), &links);

        assert_eq!(removed, vec![ch1]);
        let record = project.to_record(engine.tree());
        assert_eq!(record.index, "Index/Novel.md");
        assert_eq!(record.project_type, ProjectType::FileIndex);
    }

    #[test]
    fn file_index_requires_tracked_index() {
        let engine = engine(&[("a.md", 1)]);
        let err = Project::file_index("Ghost", engine.tree(), "missing.md").unwrap_err();
        assert_eq!(
            err,
            ProjectError::MissingIndexFile {
                name: "Ghost".to_string(),
                index: "missing.md".to_string(),
            }
        );
        assert_eq!(Project::folder("  ", "a").unwrap_err(), ProjectError::EmptyName);
    }

    #[test]
    fn deleted_index_empties_membership_but_keeps_record() {
        let mut engine = engine(&[("Index.md", 1), ("a.md", 10)]);
        let index = id(&engine, "Index.md");
        let a = id(&engine, "a.md");
        let mut links = MapLinks::default();
        links.0.insert(index, vec![a]);
        let mut project = Project::file_index("P", engine.tree(), "Index.md").unwrap();
        project.update_files(engine.tree(), &links);

        engine.delete("Index.md").unwrap();
        let removed = project.update_files(engine.tree(), &links);

        assert_eq!(removed, vec![a]);
        assert_eq!(project.to_record(engine.tree()).index, "Index.md");
    }

    #[test]
    fn index_project_survives_reload_while_its_note_is_gone() {
        let mut engine = engine(&[("Index.md", 1), ("a.md", 10)]);
        let mut manager = ProjectManager::new();
        manager
            .create(Project::file_index("P", engine.tree(), "Index.md").unwrap())
            .unwrap();
        engine.delete("Index.md").unwrap();

        let records = manager.records(engine.tree());
        let (mut reloaded, diagnostics) = ProjectManager::from_records(&records, engine.tree());
        assert!(diagnostics.is_empty());
        assert_eq!(reloaded.records(engine.tree()), records);
        assert_eq!(
            reloaded.get("P").unwrap().kind(),
            &ProjectKind::FileIndex(None)
        );
        let links = MapLinks::default();
        reloaded.update_all(engine.tree(), &links);
        assert!(reloaded.get("P").unwrap().files().is_empty());

        let index = engine.add_file("Index.md", 1).unwrap();
        let a = id(&engine, "a.md");
        let mut links = MapLinks::default();
        links.0.insert(index, vec![a]);
        let project = reloaded.get_mut("P").unwrap();
        project.update_files(engine.tree(), &links);
        assert_eq!(project.files(), &[a]);
        assert_eq!(project.kind(), &ProjectKind::FileIndex(Some(index)));
    }

    #[test]
    fn manager_enforces_unique_names() {
        let mut manager = ProjectManager::new();
        manager.create(Project::folder("Book", "Book").unwrap()).unwrap();
        manager.create(Project::tag("Drafts", "draft").unwrap()).unwrap();

        assert_eq!(
            manager.create(Project::folder("Book", "Other").unwrap()),
            Err(ProjectError::DuplicateName("Book".to_string()))
        );
        assert_eq!(
            manager.rename("Book", "Drafts"),
            Err(ProjectError::DuplicateName("Drafts".to_string()))
        );
        assert_eq!(
            manager.rename("Nope", "X"),
            Err(ProjectError::NotFound("Nope".to_string()))
        );

        manager.rename("Book", "Novel").unwrap();
        assert!(manager.get("Novel").is_some());
        assert!(manager.get("Book").is_none());
        manager.delete("Drafts").unwrap();
        assert_eq!(manager.len(), 1);
        assert!(manager.delete("Drafts").is_err());
    }

    #[test]
    fn manager_round_trips_records_and_skips_duplicates() {
        let engine = engine(&[("Index.md", 1), ("Book/a.md", 10)]);
        let records = vec![
            ProjectRecord {
                name: "Book".to_string(),
                project_type: ProjectType::Folder,
                index: "Book".to_string(),
            },
            ProjectRecord {
                name: "Index".to_string(),
                project_type: ProjectType::FileIndex,
                index: "Index.md".to_string(),
            },
            ProjectRecord {
                name: "Lost".to_string(),
                project_type: ProjectType::FileIndex,
                index: "gone.md".to_string(),
            },
            ProjectRecord {
                name: "Book".to_string(),
                project_type: ProjectType::Tag,
                index: "dup".to_string(),
            },
        ];

        let (mut manager, diagnostics) = ProjectManager::from_records(&records, engine.tree());

        assert_eq!(manager.len(), 3);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].contains("Book"));
        assert_eq!(manager.records(engine.tree()), records[..3].to_vec());

        let removed = manager.update_all(engine.tree(), &MapLinks::default());
        assert_eq!(removed.len(), 3);
        assert!(removed.iter().all(|(_, files)| files.is_empty()));
        assert_eq!(manager.get("Book").unwrap().total_words(engine.tree()), 10);
    }

    proptest! {
        #[test]
        fn removed_members_are_exactly_those_that_left(
            before in prop::collection::vec(any::<bool>(), 8),
            after in prop::collection::vec(any::<bool>(), 8),
        ) {
            let paths: Vec<String> = (0..8).map(|i| format!("f{i}.md")).collect();
            let mut engine = StatsEngine::new("vault", Settings::default());
            let ids: Vec<NodeId> = paths.iter().map(|p| engine.add_file(p, 1).unwrap()).collect();
            for (i, tagged) in before.iter().enumerate() {
                if *tagged {
                    engine.set_tags(ids[i], vec!["t".to_string()]);
                }
            }
            let links = MapLinks::default();
            let mut project = Project::tag("T", "t").unwrap();
            project.update_files(engine.tree(), &links);

            for (i, tagged) in after.iter().enumerate() {
                let tags = if *tagged { vec!["t".to_string()] } else { Vec::new() };
                engine.set_tags(ids[i], tags);
            }
            let removed = project.update_files(engine.tree(), &links);

            let expected: Vec<NodeId> = (0..8)
                .filter(|i| before[*i] && !after[*i])
                .map(|i| ids[i])
                .collect();
            prop_assert_eq!(removed, expected);
            prop_assert_eq!(project.files().len(), after.iter().filter(|t| **t).count());
        }
    }
}
