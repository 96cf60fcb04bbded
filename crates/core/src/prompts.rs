use std::collections::HashMap;

pub const EXERCISE_SETUP: &str = "exercise_setup";
pub const EVALUATE_EXERCISE: &str = "evaluate_exercise";
pub const TUTOR_TURN: &str = "tutor_turn";
pub const TUTOR_SYSTEM: &str = "tutor_system";
pub const THEORY_EXPLANATION: &str = "theory_explanation";
pub const COACH_SYSTEM: &str = "coach_system";

const DEFAULTS: [(&str, &str); 6] = [
    (
        EXERCISE_SETUP,
        r#"Genera un setup per l'esercizio di fluenza verbale {kind}.
Rispondi in italiano con un campo "prompt" che contiene la consegna da mostrare all'utente
(per esempio la lettera, la categoria o la scena da descrivere) e, se l'esercizio lo richiede,
un campo "constraints" con i vincoli da rispettare (per esempio le parole vietate)."#,
    ),
    (
        EVALUATE_EXERCISE,
        r#"Valuta l'esercizio {kind}.
Prompt: {prompt}.
{constraints}
Input trascritto dell'utente: {transcript}

Assegna un punteggio da 0 a 100, un feedback breve e motivante, e classifica le parole
pronunciate in "validWords" (rispettano consegna e vincoli) e "invalidWords" (ripetizioni,
fuori tema, violazioni dei vincoli). Se l'input è vuoto il punteggio è 0."#,
    ),
    (
        TUTOR_TURN,
        "Esercizio: {kind}, Fase: {phase}, Input: {utterance}, Storia: {history}",
    ),
    (
        TUTOR_SYSTEM,
        r#"Sei il tutor di MindFlow Academy e guidi l'utente in una sessione parlata di mnemotecnica.
Scegli tu le fasi della sessione: restituisci in "nextPhase" un'etichetta per la fase successiva,
in "text" la battuta da pronunciare (breve, adatta alla sintesi vocale), in "feedback" un giudizio
sulla risposta dell'utente e imposta "isComplete" a true solo quando l'addestramento è concluso."#,
    ),
    (
        THEORY_EXPLANATION,
        "Spiega questo metodo di apprendimento in modo professionale: {theory}",
    ),
    (COACH_SYSTEM, "Sei un coach esperto in neuroscienze."),
];

/// Prompt templates with `{placeholder}` slots.
///
/// Built-in templates can be replaced one by one, keyed by name.
#[derive(Debug, Clone)]
pub struct PromptBook {
    templates: HashMap<String, String>,
}

impl Default for PromptBook {
    fn default() -> Self {
        Self {
            templates: DEFAULTS
                .iter()
                .map(|(key, template)| (key.to_string(), template.to_string()))
                .collect(),
        }
    }
}

impl PromptBook {
    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        let mut book = Self::default();
        for (key, template) in overrides {
            if !book.templates.contains_key(&key) {
                tracing::warn!("Ignoring unknown prompt template '{}'", key);
                continue;
            }
            tracing::debug!("Using custom prompt template '{}'", key);
            book.templates.insert(key, template);
        }
        book
    }

    pub fn template(&self, key: &str) -> &str {
        self.templates.get(key).map(String::as_str).unwrap_or_default()
    }

    /// Fills `{name}` slots of the template `key`. Unknown slots are left as-is.
    pub fn render(&self, key: &str, values: &[(&str, &str)]) -> String {
        values
            .iter()
            .fold(self.template(key).to_string(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_every_occurrence() {
        let book = PromptBook::default();
        let rendered = book.render(
            TUTOR_TURN,
            &[
                ("kind", "MNEMONIC_LOCI"),
                ("phase", "INTRO"),
                ("utterance", ""),
                ("history", ""),
            ],
        );
        assert_eq!(
            rendered,
            "Esercizio: MNEMONIC_LOCI, Fase: INTRO, Input: , Storia: "
        );
    }

    #[test]
    fn test_overrides_replace_only_known_templates() {
        let mut overrides = HashMap::new();
        overrides.insert(COACH_SYSTEM.to_string(), "Sei un allenatore.".to_string());
        overrides.insert("typo_template".to_string(), "ignored".to_string());

        let book = PromptBook::with_overrides(overrides);

        assert_eq!(book.template(COACH_SYSTEM), "Sei un allenatore.");
        assert_eq!(book.template("typo_template"), "");
        assert!(book.template(EXERCISE_SETUP).contains("{kind}"));
    }
}
