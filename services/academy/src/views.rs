//! Plain-text renderings of the catalog, the dashboard and session results.

use mindflow_core::exercise::{ExerciseConfig, ModuleKind, exercises_for, find};
use mindflow_core::stats::{RECENT_RESULTS, ResultHistory, UserStats, XP_PER_LEVEL};
use mindflow_core::tutor::Evaluation;
use std::fmt::Write;

const BAR_WIDTH: usize = 20;

fn module_title(module: ModuleKind) -> &'static str {
    match module {
        ModuleKind::Fluency => "Fluenza verbale",
        ModuleKind::Mnemonics => "Mnemotecniche",
    }
}

fn progress_bar(percent: f64) -> String {
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

fn exercise_line(config: &ExerciseConfig, stats: &UserStats) -> String {
    let mut line = format!(
        "  {} {:<28} {:>3}% mastery  {}",
        config.icon,
        config.title,
        stats.mastery(config.kind),
        config.kind.as_str().to_lowercase()
    );
    if let Some(level) = config.min_level {
        let _ = write!(line, "  (livello {level}+)");
    }
    line
}

pub fn catalog(stats: &UserStats) -> String {
    let mut out = String::new();
    for module in [ModuleKind::Fluency, ModuleKind::Mnemonics] {
        let _ = writeln!(out, "{}", module_title(module));
        for config in exercises_for(module) {
            let _ = writeln!(out, "{}", exercise_line(config, stats));
            let _ = writeln!(out, "      {} ({}s)", config.description, config.default_time);
        }
        out.push('\n');
    }
    out.push_str("Avvia con `mindflow fluency <esercizio>` o `mindflow mnemonic <esercizio>`.\n");
    out
}

pub fn dashboard(stats: &UserStats, history: &ResultHistory) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "LVL {}  Rank: {}", stats.level, stats.rank());
    let _ = writeln!(
        out,
        "Progressi livello {} {} / {XP_PER_LEVEL} XP",
        progress_bar(stats.level_progress_percent()),
        stats.xp_into_level()
    );
    let _ = writeln!(out, "XP totali: {}", stats.xp);
    let _ = writeln!(out, "Sessioni completate: {}", stats.sessions_count);
    let _ = writeln!(out, "Miglior punteggio: {}%", stats.best_score);

    if history.is_empty() {
        return out;
    }
    let _ = writeln!(out, "\nAttività recenti");
    for result in history.recent(RECENT_RESULTS) {
        let config = find(result.kind);
        let _ = writeln!(
            out,
            "  {} {:<28} {:>3}%  +{} XP  {}",
            config.icon,
            config.title,
            result.score,
            result.xp_earned,
            result.date.format("%d/%m/%Y")
        );
    }
    out
}

pub fn evaluation(evaluation: &Evaluation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Punteggio: {}%", evaluation.score);
    let _ = writeln!(out, "{}", evaluation.feedback);
    if !evaluation.valid_words.is_empty() {
        let _ = writeln!(out, "Valide: {}", evaluation.valid_words.join(", "));
    }
    if !evaluation.invalid_words.is_empty() {
        let _ = writeln!(out, "Non valide: {}", evaluation.invalid_words.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindflow_core::exercise::ExerciseKind;
    use mindflow_core::stats::ExerciseResult;

    fn result(n: u8) -> ExerciseResult {
        ExerciseResult {
            id: format!("id{n}"),
            kind: ExerciseKind::Periphrasis,
            date: Default::default(),
            score: n,
            xp_earned: u32::from(n),
            details: String::new(),
            transcript: None,
            valid_words: vec![],
            invalid_words: vec![],
        }
    }

    #[test]
    fn test_catalog_lists_every_exercise() {
        let text = catalog(&UserStats::default());
        for kind in ExerciseKind::ALL {
            assert!(text.contains(find(kind).title), "{kind} missing");
        }
        assert!(text.contains("Mnemotecniche"));
    }

    #[test]
    fn test_dashboard_shows_only_recent_results() {
        let mut history = ResultHistory::default();
        for n in 1..=8 {
            history.push(result(n * 10));
        }
        let stats = UserStats {
            xp: 1250,
            level: 2,
            ..Default::default()
        };

        let text = dashboard(&stats, &history);

        assert!(text.contains("LVL 2"));
        assert!(text.contains("250 / 1000 XP"));
        assert!(text.contains("+80 XP"), "newest result is shown");
        assert!(!text.contains("+20 XP"), "seventh newest is not");
    }

    #[test]
    fn test_progress_bar_is_bounded() {
        assert_eq!(progress_bar(0.0), format!("[{}]", ".".repeat(BAR_WIDTH)));
        assert_eq!(progress_bar(250.0), format!("[{}]", "#".repeat(BAR_WIDTH)));
    }
}
