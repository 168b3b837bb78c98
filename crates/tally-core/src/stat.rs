//! Stat periods: bounded windows of one file's editing activity.
//!
//! A [`StatPeriod`] records how a file's word count moved during one
//! writing session. Word movement is split into four buckets:
//!
//! - **added** / **deleted**: words typed or removed while the file was
//!   being tracked,
//! - **imported** / **exported**: words that appeared or vanished outside
//!   of tracked editing (pre-existing text, external edits).
//!
//! Core invariant, held after every [`StatPeriod::update`]:
//! `end_words == start_words + added - deleted + imported - exported`.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// A single time-windowed accumulation record for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatPeriod {
    pub start_time: Millis,
    pub end_time: Millis,
    pub start_words: u64,
    pub end_words: u64,
    #[serde(default)]
    pub words_added: u64,
    #[serde(default)]
    pub words_deleted: u64,
    #[serde(default)]
    pub words_imported: u64,
    #[serde(default)]
    pub words_exported: u64,
    /// Accumulated active writing time in milliseconds.
    #[serde(default)]
    pub writing_time: Millis,
}

/// Changes produced by one [`StatPeriod::update`], ready to be applied to
/// running totals further up the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatDelta {
    /// Set when the update opened a new period.
    pub opened_at: Option<Millis>,
    /// End time of the period after the update. Always propagated.
    pub end_time: Millis,
    pub duration: Millis,
    pub words_added: u64,
    pub words_deleted: u64,
    pub words_imported: u64,
    pub words_exported: u64,
    pub writing_time: Millis,
}

impl StatDelta {
    /// A delta announcing a freshly opened period.
    #[must_use]
    pub fn opened(at: Millis) -> Self {
        Self {
            opened_at: Some(at),
            end_time: at,
            ..Self::default()
        }
    }

    /// True when no counter moved. The end time may still have advanced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.opened_at.is_none()
            && self.duration == 0
            && self.words_added == 0
            && self.words_deleted == 0
            && self.words_imported == 0
            && self.words_exported == 0
            && self.writing_time == 0
    }

    /// Fold a later delta for the same period into this one.
    pub fn merge(&mut self, later: &StatDelta) {
        self.opened_at = self.opened_at.or(later.opened_at);
        self.end_time = self.end_time.max(later.end_time);
        self.duration += later.duration;
        self.words_added += later.words_added;
        self.words_deleted += later.words_deleted;
        self.words_imported += later.words_imported;
        self.words_exported += later.words_exported;
        self.writing_time += later.writing_time;
    }
}

impl StatPeriod {
    /// Open an empty period at `start_time` with `start_words` already present.
    #[must_use]
    pub fn new(start_time: Millis, start_words: u64) -> Self {
        Self {
            start_time,
            end_time: start_time,
            start_words,
            end_words: start_words,
            words_added: 0,
            words_deleted: 0,
            words_imported: 0,
            words_exported: 0,
            writing_time: 0,
        }
    }

    /// Record a word-count observation into this period.
    ///
    /// `old_count` is the count the owning file last knew and `new_count`
    /// the freshly observed one. With `is_first` set, the whole difference
    /// to the period's running count is treated as imported text. Otherwise
    /// any drift between `old_count` and the running count is reconciled as
    /// imported/exported before `old_count -> new_count` is split into
    /// added/deleted words.
    ///
    /// An `update_time` earlier than the period's end is clamped to the end,
    /// and `writing_time` is clamped to the elapsed time, so
    /// `start_time <= end_time` and `writing_time <= duration` always hold.
    pub fn update(
        &mut self,
        update_time: Millis,
        old_count: u64,
        new_count: u64,
        writing_time: Millis,
        is_first: bool,
    ) -> StatDelta {
        let update_time = if update_time < self.end_time {
            debug!(
                update_time,
                end_time = self.end_time,
                "out-of-order update clamped to period end"
            );
            self.end_time
        } else {
            update_time
        };

        let elapsed = update_time - self.end_time;
        let mut delta = StatDelta {
            end_time: update_time,
            duration: elapsed,
            writing_time: writing_time.clamp(0, elapsed),
            ..StatDelta::default()
        };

        if is_first {
            self.reconcile(new_count, &mut delta);
        } else {
            self.reconcile(old_count, &mut delta);
            if new_count > old_count {
                delta.words_added = new_count - old_count;
            } else {
                delta.words_deleted = old_count - new_count;
            }
        }

        self.words_added += delta.words_added;
        self.words_deleted += delta.words_deleted;
        self.end_words = new_count;
        self.end_time = update_time;
        self.writing_time += delta.writing_time;

        delta
    }

    /// Classify the gap between the running count and `actual` as
    /// imported or exported words.
    fn reconcile(&mut self, actual: u64, delta: &mut StatDelta) {
        if actual > self.end_words {
            delta.words_imported = actual - self.end_words;
            self.words_imported += delta.words_imported;
        } else if actual < self.end_words {
            delta.words_exported = self.end_words - actual;
            self.words_exported += delta.words_exported;
        }
        self.end_words = actual;
    }

    #[must_use]
    pub fn duration(&self) -> Millis {
        self.end_time - self.start_time
    }

    /// Net change in words over the period.
    #[must_use]
    pub fn net_words(&self) -> i64 {
        self.words_added as i64 + self.words_imported as i64
            - self.words_deleted as i64
            - self.words_exported as i64
    }

    /// Net words per minute over the whole period.
    #[must_use]
    pub fn wpm(&self) -> f64 {
        per_minute(self.net_words(), self.duration())
    }

    /// Net words per minute of active writing.
    #[must_use]
    pub fn wpm_active(&self) -> f64 {
        per_minute(self.net_words(), self.writing_time)
    }

    /// Whether the word-count identity holds for this period.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.end_words as i128
            == self.start_words as i128 + self.words_added as i128 - self.words_deleted as i128
                + self.words_imported as i128
                - self.words_exported as i128
            && self.end_time >= self.start_time
            && self.writing_time <= self.duration()
    }
}

/// Running totals over many stat periods, kept on files and folders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatTotals {
    pub start_time: Option<Millis>,
    pub end_time: Option<Millis>,
    pub duration: Millis,
    pub words_added: u64,
    pub words_deleted: u64,
    pub words_imported: u64,
    pub words_exported: u64,
    pub writing_time: Millis,
    pub period_count: u64,
}

impl StatTotals {
    /// Apply an incremental delta.
    pub fn apply(&mut self, delta: &StatDelta) {
        if let Some(opened) = delta.opened_at {
            self.period_count += 1;
            self.start_time = Some(self.start_time.map_or(opened, |s| s.min(opened)));
        } else if self.start_time.is_none() {
            self.start_time = Some(delta.end_time - delta.duration);
        }
        self.end_time = Some(self.end_time.map_or(delta.end_time, |e| e.max(delta.end_time)));
        self.duration += delta.duration;
        self.words_added += delta.words_added;
        self.words_deleted += delta.words_deleted;
        self.words_imported += delta.words_imported;
        self.words_exported += delta.words_exported;
        self.writing_time += delta.writing_time;
    }

    /// Recompute totals from scratch over a set of periods.
    #[must_use]
    pub fn from_periods<'a>(periods: impl IntoIterator<Item = &'a StatPeriod>) -> Self {
        let mut totals = Self::default();
        for period in periods {
            totals.add_period(period);
        }
        totals
    }

    fn add_period(&mut self, period: &StatPeriod) {
        self.start_time = Some(
            self.start_time
                .map_or(period.start_time, |s| s.min(period.start_time)),
        );
        self.end_time = Some(self.end_time.map_or(period.end_time, |e| e.max(period.end_time)));
        self.duration += period.duration();
        self.words_added += period.words_added;
        self.words_deleted += period.words_deleted;
        self.words_imported += period.words_imported;
        self.words_exported += period.words_exported;
        self.writing_time += period.writing_time;
        self.period_count += 1;
    }

    /// Combine another set of totals into this one.
    pub fn merge(&mut self, other: &StatTotals) {
        self.start_time = match (self.start_time, other.start_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.end_time = match (self.end_time, other.end_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.duration += other.duration;
        self.words_added += other.words_added;
        self.words_deleted += other.words_deleted;
        self.words_imported += other.words_imported;
        self.words_exported += other.words_exported;
        self.writing_time += other.writing_time;
        self.period_count += other.period_count;
    }

    #[must_use]
    pub fn net_words(&self) -> i64 {
        self.words_added as i64 + self.words_imported as i64
            - self.words_deleted as i64
            - self.words_exported as i64
    }

    #[must_use]
    pub fn wpm(&self) -> f64 {
        per_minute(self.net_words(), self.duration)
    }

    #[must_use]
    pub fn wpm_active(&self) -> f64 {
        per_minute(self.net_words(), self.writing_time)
    }
}

fn per_minute(words: i64, millis: Millis) -> f64 {
    if millis <= 0 {
        return 0.0;
    }
    words as f64 / (millis as f64 / MILLIS_PER_MINUTE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_observation_imports_existing_words() {
        let mut period = StatPeriod::new(1_000, 0);
        let delta = period.update(1_000, 250, 250, 0, true);

        assert_eq!(period.words_imported, 250);
        assert_eq!(period.words_added, 0);
        assert_eq!(period.start_words, 0);
        assert_eq!(period.end_words, 250);
        assert_eq!(delta.words_imported, 250);
        assert!(period.is_consistent());
    }

    #[test]
    fn typing_counts_as_added_and_deleted() {
        let mut period = StatPeriod::new(0, 50);
        period.update(1_000, 50, 80, 1_000, false);
        let delta = period.update(2_000, 80, 60, 1_000, false);

        assert_eq!(period.words_added, 30);
        assert_eq!(period.words_deleted, 20);
        assert_eq!(period.words_imported, 0);
        assert_eq!(period.words_exported, 0);
        assert_eq!(delta.words_deleted, 20);
        assert_eq!(delta.words_added, 0);
        assert!(period.is_consistent());
    }

    #[test]
    fn drift_above_running_count_is_imported() {
        let mut period = StatPeriod::new(0, 100);
        // The file knew 130 words, but the period last saw 100.
        let delta = period.update(500, 130, 140, 0, false);

        assert_eq!(delta.words_imported, 30);
        assert_eq!(delta.words_added, 10);
        assert_eq!(period.end_words, 140);
        assert!(period.is_consistent());
    }

    #[test]
    fn drift_below_running_count_is_exported() {
        let mut period = StatPeriod::new(0, 100);
        let delta = period.update(500, 40, 45, 0, false);

        assert_eq!(delta.words_exported, 60);
        assert_eq!(delta.words_added, 5);
        assert_eq!(period.net_words(), -55);
        assert!(period.is_consistent());
    }

    #[test]
    fn unchanged_count_moves_no_words() {
        let mut period = StatPeriod::new(0, 10);
        let delta = period.update(0, 10, 10, 0, false);

        assert!(delta.is_empty());
        assert_eq!(delta.end_time, 0);
        assert_eq!(period.words_added + period.words_deleted, 0);
    }

    #[test]
    fn out_of_order_update_is_clamped() {
        let mut period = StatPeriod::new(10_000, 0);
        period.update(20_000, 0, 5, 10_000, false);
        let delta = period.update(15_000, 5, 8, 3_000, false);

        assert_eq!(period.end_time, 20_000);
        assert_eq!(delta.duration, 0);
        assert_eq!(delta.writing_time, 0);
        assert_eq!(period.words_added, 8);
        assert!(period.is_consistent());
    }

    #[test]
    fn writing_time_never_exceeds_elapsed_time() {
        let mut period = StatPeriod::new(0, 0);
        let delta = period.update(1_000, 0, 3, 5_000, false);
        assert_eq!(delta.writing_time, 1_000);
        assert_eq!(period.writing_time, 1_000);
    }

    #[test]
    fn rates_use_duration_and_writing_time() {
        let mut period = StatPeriod::new(0, 0);
        period.update(120_000, 0, 100, 60_000, false);

        assert!((period.wpm() - 50.0).abs() < f64::EPSILON);
        assert!((period.wpm_active() - 100.0).abs() < f64::EPSILON);
        assert_eq!(StatPeriod::new(0, 0).wpm(), 0.0);
    }

    #[test]
    fn delta_merge_keeps_opening_and_sums_counters() {
        let mut delta = StatDelta::opened(100);
        delta.merge(&StatDelta {
            end_time: 400,
            duration: 300,
            words_added: 7,
            writing_time: 300,
            ..StatDelta::default()
        });

        assert_eq!(delta.opened_at, Some(100));
        assert_eq!(delta.end_time, 400);
        assert_eq!(delta.words_added, 7);
        assert!(!delta.is_empty());
    }

    #[test]
    fn incremental_totals_match_recalculated_totals() {
        let mut periods = Vec::new();
        let mut totals = StatTotals::default();

        let mut first = StatPeriod::new(0, 0);
        let mut delta = StatDelta::opened(0);
        delta.merge(&first.update(0, 20, 20, 0, true));
        delta.merge(&first.update(5_000, 20, 35, 5_000, false));
        totals.apply(&delta);
        totals.apply(&first.update(9_000, 35, 30, 4_000, false));
        periods.push(first);

        let mut second = StatPeriod::new(1_000_000, 30);
        let mut delta = StatDelta::opened(1_000_000);
        delta.merge(&second.update(1_000_000, 30, 42, 0, false));
        totals.apply(&delta);
        periods.push(second);

        assert_eq!(totals, StatTotals::from_periods(&periods));
        assert_eq!(totals.period_count, 2);
        assert_eq!(totals.start_time, Some(0));
        assert_eq!(totals.end_time, Some(1_000_000));
    }

    #[test]
    fn totals_merge_combines_bounds() {
        let a = StatTotals::from_periods(&[StatPeriod::new(50, 0)]);
        let b = StatTotals::from_periods(&[StatPeriod::new(10, 0), StatPeriod::new(90, 0)]);
        let mut merged = a;
        merged.merge(&b);

        assert_eq!(merged.start_time, Some(10));
        assert_eq!(merged.end_time, Some(90));
        assert_eq!(merged.period_count, 3);
    }

    proptest! {
        #[test]
        fn period_stays_consistent_under_any_updates(
            start_words in 0u64..10_000,
            steps in prop::collection::vec((0i64..100_000, 0u64..10_000, 0u64..10_000, 0i64..100_000, any::<bool>()), 1..40),
        ) {
            let mut period = StatPeriod::new(0, start_words);
            let mut now = 0;
            for (advance, old, new, writing, first) in steps {
                now += advance;
                period.update(now, old, new, writing, first);
                prop_assert!(period.is_consistent());
                prop_assert_eq!(period.end_words, new);
            }
        }
    }
}
