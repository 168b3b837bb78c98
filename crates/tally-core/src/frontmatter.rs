//! YAML front matter reading.
//!
//! Notes may start with a `---` delimited YAML block:
//! ```markdown
//! ---
//! title: "Chapter One"
//! word-goal: 3000
//! tags: [draft, part-1]
//! ---
//!
//! It was a dark and stormy night.
//! ```
//!
//! Only a few keys matter to the tracker (title, goal, tags) and their names
//! are configurable, so the block is kept as a loose YAML mapping.

use serde_yaml::{Mapping, Value};

use crate::error::TallyError;
use crate::node::normalize_tag;
use crate::settings::Settings;

/// Split a note into its raw front matter YAML and the body after it.
///
/// Returns `None` when the note has no front matter block.
#[must_use]
pub fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let after_open = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;

    // Empty block: the closing delimiter follows immediately.
    if let Some(rest) = after_open.strip_prefix("---") {
        return Some(("", strip_line_end(rest)));
    }

    let close = after_open.find("\n---")?;
    let yaml = &after_open[..close];
    let rest = &after_open[close + 4..];
    Some((yaml.trim_end_matches('\r'), strip_line_end(rest)))
}

fn strip_line_end(rest: &str) -> &str {
    let rest = rest.strip_prefix('\r').unwrap_or(rest);
    rest.strip_prefix('\n').unwrap_or(rest)
}

/// The body of a note with any front matter removed.
#[must_use]
pub fn body(content: &str) -> &str {
    split_frontmatter(content).map_or(content, |(_, body)| body)
}

/// Parsed front matter of one note.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    fields: Mapping,
}

/// The tracker-relevant values read from front matter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub title: Option<String>,
    pub goal: Option<u64>,
    pub tags: Vec<String>,
}

impl FrontMatter {
    /// Parse the front matter of `content`. A note without front matter, or
    /// with an empty block, yields an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Parse`] if the block is not a YAML mapping.
    pub fn parse(content: &str) -> Result<Self, TallyError> {
        let Some((yaml, _)) = split_frontmatter(content) else {
            return Ok(Self::default());
        };
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value =
            serde_yaml::from_str(yaml).map_err(|e| TallyError::Parse(e.to_string()))?;
        match value {
            Value::Mapping(fields) => Ok(Self { fields }),
            Value::Null => Ok(Self::default()),
            _ => Err(TallyError::Parse(
                "front matter must be a mapping".to_string(),
            )),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw value of a key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A non-empty string value. Numbers are rendered as text.
    #[must_use]
    pub fn string(&self, key: &str) -> Option<String> {
        let text = match self.field(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    /// A non-negative integer, given either as a number or a numeric string
    /// (`3000`, `"3,000"`).
    #[must_use]
    pub fn number(&self, key: &str) -> Option<u64> {
        match self.field(key)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().replace([',', '_'], "").parse().ok(),
            _ => None,
        }
    }

    /// Tags as a list, given either as a YAML sequence or a string separated
    /// by commas or whitespace. Tags are normalised.
    #[must_use]
    pub fn tags(&self, key: &str) -> Vec<String> {
        let raw: Vec<String> = match self.field(key) {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) => s
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        let mut tags: Vec<String> = raw
            .iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty())
            .collect();
        tags.dedup();
        tags
    }

    /// Title, goal and tags under the keys configured in `settings`.
    #[must_use]
    pub fn overrides(&self, settings: &Settings) -> Overrides {
        Overrides {
            title: self.string(&settings.title_key),
            goal: self.number(&settings.goal_key),
            tags: self.tags(&settings.tags_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE: &str = "---\ntitle: \"Chapter One\"\nword-goal: 3000\ntags: [Draft, '#part-1']\n---\n\nIt was night.\n";

    #[test]
    fn split_extracts_yaml_and_body() {
        let (yaml, body) = split_frontmatter(NOTE).unwrap();
        assert!(yaml.contains("word-goal: 3000"));
        assert_eq!(body, "\nIt was night.\n");
    }

    #[test]
    fn notes_without_front_matter_are_all_body() {
        assert!(split_frontmatter("Just text.\n---\n").is_none());
        assert!(split_frontmatter("---\nunterminated: true\n").is_none());
        assert_eq!(body("Just text."), "Just text.");
    }

    #[test]
    fn empty_block_is_allowed() {
        let (yaml, body) = split_frontmatter("---\n---\nHello").unwrap();
        assert_eq!(yaml, "");
        assert_eq!(body, "Hello");
        assert!(FrontMatter::parse("---\n---\nHello").unwrap().is_empty());
    }

    #[test]
    fn crlf_line_endings() {
        let note = "---\r\ntitle: Win\r\n---\r\nBody";
        let fm = FrontMatter::parse(note).unwrap();
        assert_eq!(fm.string("title").as_deref(), Some("Win"));
        assert_eq!(body(note), "Body");
    }

    #[test]
    fn overrides_use_configured_keys() {
        let fm = FrontMatter::parse(NOTE).unwrap();
        let overrides = fm.overrides(&Settings::default());

        assert_eq!(overrides.title.as_deref(), Some("Chapter One"));
        assert_eq!(overrides.goal, Some(3000));
        assert_eq!(overrides.tags, vec!["draft", "part-1"]);

        let custom = Settings {
            goal_key: "target".to_string(),
            ..Settings::default()
        };
        assert_eq!(fm.overrides(&custom).goal, None);
    }

    #[test]
    fn loose_value_shapes() {
        let fm = FrontMatter::parse("---\ngoal: \"2,500\"\ntags: one, two three\ntitle: \"  \"\n---\n")
            .unwrap();
        assert_eq!(fm.number("goal"), Some(2_500));
        assert_eq!(fm.tags("tags"), vec!["one", "two", "three"]);
        assert_eq!(fm.string("title"), None);
        assert_eq!(fm.number("missing"), None);
    }

    #[test]
    fn non_mapping_front_matter_is_rejected() {
        assert!(FrontMatter::parse("---\n- a\n- b\n---\n").is_err());
        assert!(FrontMatter::parse("---\ntitle: [unclosed\n---\n").is_err());
    }
}
