//! Tracker settings, read from `.tally/config.toml`.
//!
//! Every key is optional; missing keys take their defaults:
//!
//! ```toml
//! stat_period_minutes = 15
//! writing_timeout_seconds = 120
//! record_everything = false
//! batch_budget_ms = 500
//! title_key = "title"
//! goal_key = "word-goal"
//! tags_key = "tags"
//! excluded = ["templates"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TallyError;
use crate::stat::Millis;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Length of the fixed window a stat period may span.
    pub stat_period_minutes: u32,
    /// Gaps longer than this between edits do not count as writing time.
    pub writing_timeout_seconds: u32,
    /// Record statistics everywhere, ignoring folder recording policies.
    /// Off by default: a folder records only when its policy resolves to on.
    pub record_everything: bool,
    /// Wall-clock budget for one queue drain.
    pub batch_budget_ms: u64,
    /// Front-matter key overriding a file's title.
    pub title_key: String,
    /// Front-matter key overriding a file's word goal.
    pub goal_key: String,
    /// Front-matter key listing a file's tags.
    pub tags_key: String,
    /// Top-level folder names never scanned.
    pub excluded: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stat_period_minutes: 15,
            writing_timeout_seconds: 120,
            record_everything: false,
            batch_budget_ms: 500,
            title_key: "title".to_string(),
            goal_key: "word-goal".to_string(),
            tags_key: "tags".to_string(),
            excluded: Vec::new(),
        }
    }
}

impl Settings {
    /// Parse and validate settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Config`] if the TOML is malformed or a value is
    /// out of range.
    pub fn from_toml_str(text: &str) -> Result<Self, TallyError> {
        let settings: Settings =
            toml::from_str(text).map_err(|e| TallyError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file, using defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Io`] if the file exists but cannot be read, and
    /// [`TallyError::Config`] if its contents are invalid.
    pub fn load(path: &Path) -> Result<Self, TallyError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Config`] naming the offending key.
    pub fn validate(&self) -> Result<(), TallyError> {
        if self.stat_period_minutes == 0 {
            return Err(TallyError::Config(
                "stat_period_minutes must be at least 1".to_string(),
            ));
        }
        if self.batch_budget_ms == 0 {
            return Err(TallyError::Config(
                "batch_budget_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn stat_period_ms(&self) -> Millis {
        Millis::from(self.stat_period_minutes) * 60_000
    }

    #[must_use]
    pub fn writing_timeout_ms(&self) -> Millis {
        Millis::from(self.writing_timeout_seconds) * 1_000
    }

    /// End of the fixed window containing `start`.
    #[must_use]
    pub fn window_end(&self, start: Millis) -> Millis {
        let window = self.stat_period_ms();
        start.div_euclid(window) * window + window
    }
}
