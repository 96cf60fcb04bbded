use crate::exercise::{ExerciseConfig, ExerciseKind};
use crate::store::ProgressStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::VecDeque;

pub const XP_PER_LEVEL: u32 = 1000;
/// Base XP for a completed mnemonic session, regardless of its length.
pub const MNEMONIC_BASE_XP: u32 = 500;
pub const XP_SCORE_MULTIPLIER: f64 = 1.5;
/// Weight, in tenths, kept by the previous mastery value on every update.
pub const MASTERY_DECAY_TENTHS: u32 = 7;
pub const HISTORY_CAP: usize = 20;
/// How many results the dashboard lists.
pub const RECENT_RESULTS: usize = 6;
/// First level with the expert rank.
pub const EXPERT_LEVEL: u32 = 5;

/// What a finished session reports back to the shell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionOutcome {
    pub score: u8,
    pub feedback: String,
    pub transcript: Option<String>,
    pub valid_words: Vec<String>,
    pub invalid_words: Vec<String>,
}

/// One completed attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseResult {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ExerciseKind,
    pub date: DateTime<Utc>,
    pub score: u8,
    pub xp_earned: u32,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default)]
    pub valid_words: Vec<String>,
    #[serde(default)]
    pub invalid_words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub xp: u32,
    pub level: u32,
    pub sessions_count: u32,
    pub best_score: u8,
    pub category_mastery: BTreeMap<ExerciseKind, u8>,
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            xp: 0,
            level: 1,
            sessions_count: 0,
            best_score: 0,
            category_mastery: ExerciseKind::ALL.into_iter().map(|k| (k, 0)).collect(),
        }
    }
}

pub fn level_for_xp(xp: u32) -> u32 {
    xp / XP_PER_LEVEL + 1
}

/// `round(current * 0.7 + score * 0.3)`, computed in tenths so ties round up exactly.
pub fn updated_mastery(current: u8, score: u8) -> u8 {
    let tenths = u32::from(current) * MASTERY_DECAY_TENTHS
        + u32::from(score) * (10 - MASTERY_DECAY_TENTHS);
    ((tenths + 5) / 10).min(100) as u8
}

/// XP earned for a score on the given exercise.
pub fn xp_for(config: &ExerciseConfig, score: u8) -> u32 {
    let base = if config.kind.is_mnemonic() {
        MNEMONIC_BASE_XP
    } else {
        config.default_time
    };
    (f64::from(base) * f64::from(score) / 100.0 * XP_SCORE_MULTIPLIER).round() as u32
}

impl UserStats {
    pub fn mastery(&self, kind: ExerciseKind) -> u8 {
        self.category_mastery.get(&kind).copied().unwrap_or(0)
    }

    /// Folds one completed session into the profile.
    pub fn apply(&mut self, kind: ExerciseKind, score: u8, xp_earned: u32) {
        self.xp = self.xp.saturating_add(xp_earned);
        self.level = level_for_xp(self.xp);
        self.sessions_count += 1;
        self.best_score = self.best_score.max(score);
        let mastery = updated_mastery(self.mastery(kind), score);
        self.category_mastery.insert(kind, mastery);
    }

    pub fn xp_into_level(&self) -> u32 {
        self.xp % XP_PER_LEVEL
    }

    pub fn level_progress_percent(&self) -> f64 {
        f64::from(self.xp_into_level()) / f64::from(XP_PER_LEVEL) * 100.0
    }

    pub fn rank(&self) -> &'static str {
        if self.level < EXPERT_LEVEL { "Novizio" } else { "Esperto" }
    }
}

/// Most-recent-first list of results that never grows past its cap.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultHistory {
    entries: VecDeque<ExerciseResult>,
    cap: usize,
}

impl Default for ResultHistory {
    fn default() -> Self {
        Self::with_cap(HISTORY_CAP)
    }
}

impl ResultHistory {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Builds a history from a stored list, already most-recent-first.
    pub fn from_entries(entries: Vec<ExerciseResult>, cap: usize) -> Self {
        let mut entries: VecDeque<_> = entries.into();
        entries.truncate(cap);
        Self { entries, cap }
    }

    pub fn push(&mut self, result: ExerciseResult) {
        self.entries.push_front(result);
        self.entries.truncate(self.cap);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExerciseResult> {
        self.entries.iter()
    }

    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ExerciseResult> {
        self.entries.iter().take(count)
    }

    pub fn to_vec(&self) -> Vec<ExerciseResult> {
        self.entries.iter().cloned().collect()
    }
}

fn new_result_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

/// The user's persisted progress: cumulative stats plus capped history.
///
/// Every recorded completion is written through to the store immediately.
pub struct Progress<S: ProgressStore> {
    store: S,
    pub stats: UserStats,
    pub history: ResultHistory,
}

impl<S: ProgressStore> Progress<S> {
    pub fn load(store: S) -> Result<Self> {
        let (stats, results) = store.load().context("Failed to load saved progress")?;
        tracing::debug!(
            "Loaded progress: level {}, {} xp, {} stored results",
            stats.level,
            stats.xp,
            results.len()
        );
        Ok(Self {
            store,
            stats,
            history: ResultHistory::from_entries(results, HISTORY_CAP),
        })
    }

    pub fn record(
        &mut self,
        config: &ExerciseConfig,
        outcome: SessionOutcome,
    ) -> Result<ExerciseResult> {
        self.record_at(config, outcome, Utc::now())
    }

    pub fn record_at(
        &mut self,
        config: &ExerciseConfig,
        outcome: SessionOutcome,
        date: DateTime<Utc>,
    ) -> Result<ExerciseResult> {
        let xp_earned = xp_for(config, outcome.score);
        let result = ExerciseResult {
            id: new_result_id(),
            kind: config.kind,
            date,
            score: outcome.score,
            xp_earned,
            details: outcome.feedback,
            transcript: outcome.transcript,
            valid_words: outcome.valid_words,
            invalid_words: outcome.invalid_words,
        };

        self.stats.apply(config.kind, result.score, xp_earned);
        self.history.push(result.clone());
        tracing::info!(
            "Recorded {} with score {} (+{} xp, level {})",
            config.kind,
            result.score,
            xp_earned,
            self.stats.level
        );

        self.save()?;
        Ok(result)
    }

    pub fn save(&self) -> Result<()> {
        self.store
            .save(&self.stats, &self.history.to_vec())
            .context("Failed to save progress")
    }

    /// Wipes stats and history, persisting the empty state.
    pub fn reset(&mut self) -> Result<()> {
        self.stats = UserStats::default();
        self.history = ResultHistory::default();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::find;
    use crate::store::MemoryStore;

    fn outcome(score: u8) -> SessionOutcome {
        SessionOutcome {
            score,
            feedback: "Bene".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_level_is_derived_from_total_xp() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(999), 1);
        assert_eq!(level_for_xp(1000), 2);
        assert_eq!(level_for_xp(2500), 3);
    }

    #[test]
    fn test_mastery_is_exponentially_weighted() {
        assert_eq!(updated_mastery(0, 100), 30);
        assert_eq!(updated_mastery(30, 100), 51);
        assert_eq!(updated_mastery(50, 50), 50);
        assert_eq!(updated_mastery(100, 0), 70);
        // 28.5 rounds up
        assert_eq!(updated_mastery(0, 95), 29);
    }

    #[test]
    fn test_mastery_stays_in_range_for_any_valid_scores() {
        for current in [0u8, 1, 49, 50, 99, 100] {
            for score in [0u8, 1, 50, 99, 100] {
                let m = updated_mastery(current, score);
                assert!(m <= 100);
                assert!(m >= current.min(score) && m <= current.max(score));
            }
        }
    }

    #[test]
    fn test_xp_uses_default_time_for_fluency_and_flat_base_for_mnemonics() {
        // 60s * 0.8 * 1.5
        assert_eq!(xp_for(find(ExerciseKind::Phonemic), 80), 72);
        // 500 * 0.95 * 1.5 = 712.5
        assert_eq!(xp_for(find(ExerciseKind::MnemonicLoci), 95), 713);
        assert_eq!(xp_for(find(ExerciseKind::Shadowing), 0), 0);
    }

    #[test]
    fn test_history_evicts_oldest_first() {
        let mut history = ResultHistory::with_cap(3);
        for i in 0..5u8 {
            let result = ExerciseResult {
                id: format!("r{i}"),
                kind: ExerciseKind::Semantic,
                date: Utc::now(),
                score: i,
                xp_earned: 0,
                details: String::new(),
                transcript: None,
                valid_words: vec![],
                invalid_words: vec![],
            };
            history.push(result);
            assert!(history.len() <= 3);
        }
        let ids: Vec<_> = history.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r4", "r3", "r2"]);
    }

    #[test]
    fn test_record_updates_stats_and_persists_immediately() {
        let store = MemoryStore::default();
        let mut progress = Progress::load(store.clone()).unwrap();

        let result = progress
            .record(find(ExerciseKind::MnemonicNames), outcome(95))
            .unwrap();

        assert_eq!(result.xp_earned, 713);
        assert_eq!(result.id.len(), 9);
        assert_eq!(progress.stats.xp, 713);
        assert_eq!(progress.stats.level, 1);
        assert_eq!(progress.stats.sessions_count, 1);
        assert_eq!(progress.stats.best_score, 95);
        assert_eq!(progress.stats.mastery(ExerciseKind::MnemonicNames), 29);

        let (saved_stats, saved_results) = store.load().unwrap();
        assert_eq!(saved_stats, progress.stats);
        assert_eq!(saved_results.len(), 1);
        assert_eq!(saved_results[0].id, result.id);
    }

    #[test]
    fn test_level_invariant_holds_across_many_sessions() {
        let mut progress = Progress::load(MemoryStore::default()).unwrap();
        for score in [100u8, 90, 80, 70, 100, 100, 60, 100] {
            progress
                .record(find(ExerciseKind::Shadowing), outcome(score))
                .unwrap();
            assert_eq!(progress.stats.level, progress.stats.xp / 1000 + 1);
        }
        assert_eq!(progress.stats.sessions_count, 8);
        assert_eq!(progress.stats.best_score, 100);
        assert!(progress.stats.level >= 2);
    }

    #[test]
    fn test_best_score_never_decreases() {
        let mut stats = UserStats::default();
        stats.apply(ExerciseKind::Phonemic, 88, 10);
        stats.apply(ExerciseKind::Phonemic, 12, 10);
        assert_eq!(stats.best_score, 88);
    }

    #[test]
    fn test_level_progress_tracks_remainder() {
        let stats = UserStats {
            xp: 2250,
            level: 3,
            ..Default::default()
        };
        assert_eq!(stats.xp_into_level(), 250);
        assert!((stats.level_progress_percent() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rank_turns_expert_at_level_five() {
        let mut stats = UserStats::default();
        assert_eq!(stats.rank(), "Novizio");
        stats.level = 4;
        assert_eq!(stats.rank(), "Novizio");
        stats.level = EXPERT_LEVEL;
        assert_eq!(stats.rank(), "Esperto");
    }

    #[test]
    fn test_reset_persists_initial_state() {
        let store = MemoryStore::default();
        let mut progress = Progress::load(store.clone()).unwrap();
        progress
            .record(find(ExerciseKind::Synonyms), outcome(70))
            .unwrap();

        progress.reset().unwrap();

        let (stats, results) = store.load().unwrap();
        assert_eq!(stats, UserStats::default());
        assert!(results.is_empty());
    }
}
