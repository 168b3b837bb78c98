//! Outbound links between notes.
//!
//! Two link syntaxes are recognised in a note's body:
//!
//! - wiki links: `[[target]]`, `[[target|alias]]`, `[[target#heading]]`,
//!   and embeds `![[target]]`,
//! - markdown links to notes: `[text](path/to/note.md)`, percent-encoded or
//!   wrapped in `<...>`.
//!
//! Links inside front matter and fenced code blocks are ignored. Targets are
//! resolved against the tracked files of a [`VaultTree`].

use crate::frontmatter;
use crate::node::NodeId;
use crate::tree::{parent_path, VaultTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Wiki,
    Markdown,
}

/// A link as written in a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub kind: LinkKind,
    /// Link target without heading or block reference.
    pub target: String,
    pub alias: Option<String>,
}

/// Produces the files a note links to.
pub trait LinkResolver {
    /// Tracked files linked from `file`, in order of first appearance,
    /// without duplicates.
    fn outbound_links(&self, tree: &VaultTree, file: NodeId) -> Vec<NodeId>;
}

/// Extract every link from a note's text.
#[must_use]
pub fn extract_links(text: &str) -> Vec<Link> {
    let mut links = Vec::new();
    let mut in_fence = false;
    for line in frontmatter::body(text).lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            scan_line(line, &mut links);
        }
    }
    links
}

fn scan_line(line: &str, links: &mut Vec<Link>) {
    let mut rest = line;
    while !rest.is_empty() {
        let wiki = rest.find("[[");
        let markdown = rest.find("](");
        let next = match (wiki, markdown) {
            (Some(w), Some(m)) if w <= m => Some((w, LinkKind::Wiki)),
            (Some(w), None) => Some((w, LinkKind::Wiki)),
            (_, Some(m)) => Some((m, LinkKind::Markdown)),
            (None, None) => None,
        };
        let Some((at, kind)) = next else { break };
        let consumed = match kind {
            LinkKind::Wiki => wiki_link(&rest[at + 2..], links),
            LinkKind::Markdown => markdown_link(&rest[at + 2..], links),
        };
        rest = &rest[at + 2 + consumed..];
    }
}

/// Parse `target|alias]]`. Returns how many bytes were consumed.
fn wiki_link(after_open: &str, links: &mut Vec<Link>) -> usize {
    let Some(close) = after_open.find("]]") else {
        return after_open.len();
    };
    let inner = &after_open[..close];
    let (target, alias) = match inner.split_once('|') {
        Some((target, alias)) => (target, Some(alias.trim().to_string())),
        None => (inner, None),
    };
    let target = strip_fragment(target);
    if !target.is_empty() {
        links.push(Link {
            kind: LinkKind::Wiki,
            target: target.to_string(),
            alias: alias.filter(|a| !a.is_empty()),
        });
    }
    close + 2
}

/// Parse `destination)` following `[text]`. External URLs are skipped.
fn markdown_link(after_open: &str, links: &mut Vec<Link>) -> usize {
    let Some(close) = after_open.find(')') else {
        return after_open.len();
    };
    let raw = after_open[..close].trim();
    let destination = match raw.strip_prefix('<') {
        Some(inner) => inner.split('>').next().unwrap_or(inner),
        None => raw.split_whitespace().next().unwrap_or(raw),
    };
    if !destination.contains("://") && !destination.starts_with("mailto:") {
        let decoded = urlencoding::decode(destination)
            .map_or_else(|_| destination.to_string(), |d| d.into_owned());
        let target = strip_fragment(&decoded);
        if !target.is_empty() {
            links.push(Link {
                kind: LinkKind::Markdown,
                target: target.to_string(),
                alias: None,
            });
        }
    }
    close + 1
}

fn strip_fragment(target: &str) -> &str {
    let end = target.find(['#', '^']).unwrap_or(target.len());
    target[..end].trim()
}

/// Join a relative link onto a folder path, honouring `.` and `..`.
/// Returns `None` if the link climbs above the vault root.
fn join_relative(folder: &str, relative: &str) -> Option<String> {
    let mut segments: Vec<&str> = folder.split('/').filter(|s| !s.is_empty()).collect();
    for segment in relative.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }
    Some(segments.join("/"))
}

fn with_note_extension(target: &str) -> String {
    if target.to_ascii_lowercase().ends_with(".md") {
        target.to_string()
    } else {
        format!("{target}.md")
    }
}

/// Resolve a link target written in the note at `from` to a tracked file.
///
/// The target is tried relative to the note's folder, then from the vault
/// root; failing both, any file whose path ends with the target matches,
/// the shortest such path winning.
#[must_use]
pub fn resolve_target(tree: &VaultTree, from: &str, target: &str) -> Option<NodeId> {
    let target = with_note_extension(target);
    let folder = parent_path(from);

    let exact = [join_relative(folder, &target), join_relative("", &target)];
    for candidate in exact.iter().flatten() {
        if let Some(id) = tree.file_id(candidate) {
            return Some(id);
        }
    }

    let bare = target.trim_start_matches("./").trim_start_matches('/');
    let suffix = format!("/{bare}");
    tree.files()
        .filter(|f| f.path.ends_with(&suffix) || f.path == bare)
        .min_by(|a, b| a.path.len().cmp(&b.path.len()).then_with(|| a.path.cmp(&b.path)))
        .map(|f| f.id)
}

/// Resolve every link in `text`, written in the note at `from`.
#[must_use]
pub fn resolve_links(tree: &VaultTree, from: &str, text: &str) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = Vec::new();
    for link in extract_links(text) {
        if let Some(id) = resolve_target(tree, from, &link.target) {
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(text: &str) -> Vec<String> {
        extract_links(text).into_iter().map(|l| l.target).collect()
    }

    fn tree() -> VaultTree {
        let mut tree = VaultTree::new("vault");
        for path in [
            "Novel.md",
            "Novel/Part 1/Chapter 1.md",
            "Novel/Part 1/Chapter 2.md",
            "Notes/Chapter 1.md",
            "Chapter 1.md",
        ] {
            tree.insert_file(path, 0).unwrap();
        }
        tree
    }

    #[test]
    fn extracts_wiki_links_with_alias_and_heading() {
        let links = extract_links("See [[Chapter 1|the start]] and ![[Map#North]] and [[ ]].");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target, "Chapter 1");
        assert_eq!(links[0].alias.as_deref(), Some("the start"));
        assert_eq!(links[1].target, "Map");
        assert_eq!(links[1].kind, LinkKind::Wiki);
    }

    #[test]
    fn extracts_markdown_note_links_only() {
        let text = "[one](Part%201/Chapter%201.md) [two](<Part 1/Chapter 2.md> \"t\") \
                    [web](https://example.com/a.md) [mail](mailto:a@b.c) [sec](#heading)";
        assert_eq!(
            targets(text),
            vec!["Part 1/Chapter 1.md", "Part 1/Chapter 2.md"]
        );
    }

    #[test]
    fn ignores_front_matter_and_code_fences() {
        let text = "---\nup: \"[[Hidden]]\"\n---\nText [[Shown]]\n```\n[[Code]]\n```\n[[After]]";
        assert_eq!(targets(text), vec!["Shown", "After"]);
    }

    #[test]
    fn unterminated_links_are_ignored() {
        assert!(extract_links("[[never closed").is_empty());
        assert!(extract_links("[x](open").is_empty());
    }

    #[test]
    fn relative_path_wins_over_vault_path() {
        let tree = tree();
        let local = tree.file_id("Novel/Part 1/Chapter 2.md").unwrap();
        let from = "Novel/Part 1/Chapter 1.md";
        assert_eq!(resolve_target(&tree, from, "Chapter 2"), Some(local));

        let root_ch1 = tree.file_id("Chapter 1.md").unwrap();
        assert_eq!(resolve_target(&tree, "Novel.md", "Chapter 1"), Some(root_ch1));
    }

    #[test]
    fn relative_markdown_paths_climb_folders() {
        let tree = tree();
        let novel = tree.file_id("Novel.md").unwrap();
        assert_eq!(
            resolve_target(&tree, "Novel/Part 1/Chapter 1.md", "../../Novel.md"),
            Some(novel)
        );
        assert_eq!(resolve_target(&tree, "Novel.md", "../../x.md"), None);
    }

    #[test]
    fn bare_names_fall_back_to_shortest_suffix_match() {
        let tree = tree();
        let ch2 = tree.file_id("Novel/Part 1/Chapter 2.md").unwrap();
        assert_eq!(resolve_target(&tree, "Notes/Chapter 1.md", "Chapter 2"), Some(ch2));
        assert_eq!(resolve_target(&tree, "Novel.md", "Missing"), None);
    }

    #[test]
    fn resolved_links_are_deduplicated_in_order() {
        let tree = tree();
        let text = "[[Novel/Part 1/Chapter 2]] [[Chapter 1]] [[Novel/Part 1/Chapter 2|again]] [[Nope]]";
        let ids = resolve_links(&tree, "Novel.md", text);
        assert_eq!(
            ids,
            vec![
                tree.file_id("Novel/Part 1/Chapter 2.md").unwrap(),
                tree.file_id("Chapter 1.md").unwrap(),
            ]
        );
    }
}
