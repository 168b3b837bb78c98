//! Link resolution backed by the notes on disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use tally_core::link::{resolve_links, LinkResolver};
use tally_core::node::NodeId;
use tally_core::tree::VaultTree;

/// Reads a note from the vault directory and resolves its links against
/// the tree.
#[derive(Debug, Clone)]
pub struct VaultLinkResolver {
    root: PathBuf,
}

impl VaultLinkResolver {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl LinkResolver for VaultLinkResolver {
    fn outbound_links(&self, tree: &VaultTree, file: NodeId) -> Vec<NodeId> {
        let Some(node) = tree.file(file) else {
            return Vec::new();
        };
        match fs::read_to_string(self.root.join(&node.path)) {
            Ok(text) => resolve_links(tree, &node.path, &text),
            Err(e) => {
                warn!(path = %node.path, error = %e, "cannot read note for links");
                Vec::new()
            }
        }
    }
}
