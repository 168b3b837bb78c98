//! # tally-core
//!
//! Word-count statistics engine for a vault of markdown notes.
//!
//! This crate holds everything that does not touch the filesystem:
//! - [`StatPeriod`], [`StatDelta`], [`StatTotals`]: per-session accounting of
//!   added, deleted, imported and exported words
//! - [`VaultTree`]: the arena of [`FileNode`]s and [`FolderNode`]s with
//!   incrementally aggregated word counts and totals
//! - [`StatsEngine`]: session windowing, the update protocol, structural
//!   changes and the recount queue
//! - [`EventDispatcher`] and [`TallyEvent`]: typed change notifications
//! - [`Settings`]: tracker configuration
//! - Front matter ([`frontmatter`]), links ([`link`]) and word counting
//!   ([`words`])
//! - [`Snapshot`]: the persisted form of the whole tree
//! - Error hierarchy ([`TallyError`], [`TreeError`], [`ProjectError`])

pub mod engine;
pub mod error;
pub mod events;
pub mod frontmatter;
pub mod link;
pub mod node;
pub mod queue;
pub mod settings;
pub mod snapshot;
pub mod stat;
pub mod tree;
pub mod words;

pub use engine::StatsEngine;
pub use error::{ProjectError, Result, TallyError, TreeError};
pub use events::{EntityKind, EventDispatcher, EventKind, SubscriptionId, TallyEvent};
pub use frontmatter::{FrontMatter, Overrides};
pub use link::{Link, LinkKind, LinkResolver};
pub use node::{FileNode, FolderNode, GoalScope, Node, NodeId, RecordingPolicy};
pub use queue::{DrainReport, UpdateQueue};
pub use settings::Settings;
pub use snapshot::{FileRecord, FolderRecord, ProjectRecord, ProjectType, Snapshot};
pub use stat::{Millis, StatDelta, StatPeriod, StatTotals};
pub use tree::{normalize_path, parent_path, VaultTree};
pub use words::{SimpleWordCounter, WordCounter};
