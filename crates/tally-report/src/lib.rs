//! tally-report: Projects, export projections, and report formatting.
//!
//! Projects group files by folder, tag, or the links of an index note and
//! are recomputed from the tree on demand. Exports turn the tree into
//! nested projections or flat per-period records, and the formatter
//! renders them as JSON, tables, markdown, or CSV.

pub mod export;
pub mod formatter;
pub mod project;

pub use export::{
    projects_report, rfc3339, stat_records, stats_report, tree_report, FileProjection,
    FolderProjection, StatRecord,
};
pub use formatter::{format_report, OutputFormat, Report};
pub use project::{Project, ProjectKind, ProjectManager};
