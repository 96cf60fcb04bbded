use crate::{
    Command, CommandSender,
    exercise::ExerciseConfig,
    stats::SessionOutcome,
    tutor::{Evaluation, ExerciseSetup, Tutor},
};
use anyhow::{Context, Result, bail};

pub const MIN_DURATION_SECS: u32 = 15;
pub const MAX_DURATION_SECS: u32 = 180;
pub const DURATION_STEP_SECS: u32 = 15;

const SETUP_FAILED_ALERT: &str = "Errore nel caricamento. Riprova.";
const EVALUATION_FAILED_ALERT: &str =
    "Errore nell'analisi. Assicurati di aver parlato durante la sessione.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluencyState {
    Loading,
    Preparing,
    Running,
    Evaluating,
    Result,
    /// Aborted or failed to load. Control is back at the catalog.
    Closed,
}

/// One timed fluency exercise, from setup request to displayed result.
pub struct FluencySession {
    pub config: &'static ExerciseConfig,
    pub state: FluencyState,
    pub setup: Option<ExerciseSetup>,
    /// Length chosen for the session, in seconds.
    pub session_duration: u32,
    pub time_left: u32,
    /// Everything recognised since `start`.
    pub transcript: String,
    pub evaluation: Option<Evaluation>,
    pub listening: bool,
}

impl FluencySession {
    pub fn new(config: &'static ExerciseConfig) -> Self {
        Self {
            config,
            state: FluencyState::Loading,
            setup: None,
            session_duration: config.default_time,
            time_left: config.default_time,
            transcript: String::new(),
            evaluation: None,
            listening: false,
        }
    }

    /// Whether `secs` is a selectable session length.
    pub fn is_valid_duration(secs: u32) -> bool {
        (MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&secs) && secs % DURATION_STEP_SECS == 0
    }

    /// Requests the exercise prompt. On failure the session closes.
    pub async fn load_setup<T: Tutor + ?Sized>(
        &mut self,
        tutor: &T,
        command_tx: &CommandSender,
    ) -> Result<()> {
        self.state = FluencyState::Loading;
        match tutor.get_exercise_setup(self.config.kind).await {
            Ok(setup) => {
                tracing::info!("Setup for {}: {:?}", self.config.kind, setup);
                let mut text = setup.prompt.clone();
                if let Some(constraints) = &setup.constraints {
                    text.push_str(&format!("\nVincoli: {constraints}"));
                }
                self.setup = Some(setup);
                self.state = FluencyState::Preparing;
                send(command_tx, Command::Display(text)).await
            }
            Err(e) => {
                tracing::error!("Setup error: {:?}", e);
                self.state = FluencyState::Closed;
                send(command_tx, Command::Alert(SETUP_FAILED_ALERT.to_string())).await?;
                send(command_tx, Command::Close).await
            }
        }
    }

    /// Adjusts the session length before starting.
    pub fn set_duration(&mut self, secs: u32) -> Result<()> {
        if self.state != FluencyState::Preparing {
            bail!("Duration can only be changed before starting");
        }
        if !Self::is_valid_duration(secs) {
            bail!(
                "Duration must be between {MIN_DURATION_SECS} and {MAX_DURATION_SECS} seconds in steps of {DURATION_STEP_SECS}"
            );
        }
        self.session_duration = secs;
        self.time_left = secs;
        Ok(())
    }

    /// Clears any previous transcript, starts the countdown and opens the
    /// microphone in continuous mode.
    pub async fn start(&mut self, command_tx: &CommandSender) -> Result<()> {
        if self.state != FluencyState::Preparing {
            bail!("Cannot start from {:?}", self.state);
        }
        self.transcript.clear();
        self.time_left = self.session_duration;
        self.state = FluencyState::Running;
        self.listening = true;
        send(command_tx, Command::StartListening { continuous: true }).await
    }

    /// Replaces the running transcript with the latest recognition result.
    pub fn update_transcript(&mut self, text: impl Into<String>) {
        if self.state == FluencyState::Running {
            self.transcript = text.into();
        }
    }

    /// Appends a newly recognised fragment to the running transcript.
    pub fn append_transcript(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if self.state != FluencyState::Running || fragment.is_empty() {
            return;
        }
        if !self.transcript.is_empty() {
            self.transcript.push(' ');
        }
        self.transcript.push_str(fragment);
    }

    /// The recogniser stopped on its own. Reopen it while time remains.
    pub async fn capture_ended(&mut self, command_tx: &CommandSender) -> Result<()> {
        self.listening = false;
        if self.state == FluencyState::Running && self.time_left > 0 {
            tracing::debug!("Speech capture ended early, restarting");
            self.listening = true;
            send(command_tx, Command::StartListening { continuous: true }).await?;
        }
        Ok(())
    }

    /// One second of countdown. Reaching zero hands the transcript to the tutor.
    pub async fn tick<T: Tutor + ?Sized>(
        &mut self,
        tutor: &T,
        command_tx: &CommandSender,
    ) -> Result<()> {
        if self.state != FluencyState::Running {
            return Ok(());
        }
        self.time_left = self.time_left.saturating_sub(1);
        if self.time_left == 0 {
            tracing::info!("Time is up for {}", self.config.kind);
            self.finish(tutor, command_tx).await?;
        }
        Ok(())
    }

    /// Stops capture and asks the tutor to score the transcript.
    ///
    /// On failure the attempt is discarded and the session goes back to
    /// `Preparing` with the countdown reset to the chosen duration.
    pub async fn finish<T: Tutor + ?Sized>(
        &mut self,
        tutor: &T,
        command_tx: &CommandSender,
    ) -> Result<()> {
        if self.state != FluencyState::Running {
            bail!("Cannot finish from {:?}", self.state);
        }
        self.listening = false;
        send(command_tx, Command::StopListening).await?;
        self.state = FluencyState::Evaluating;

        let setup = self.setup.clone().unwrap_or_default();
        tracing::info!(
            "Evaluating {} ({} chars of transcript)",
            self.config.kind,
            self.transcript.len()
        );

        match tutor
            .evaluate_exercise(self.config.kind, &setup, &self.transcript)
            .await
        {
            Ok(evaluation) => {
                let outcome = SessionOutcome {
                    score: evaluation.score,
                    feedback: evaluation.feedback.clone(),
                    transcript: Some(self.transcript.clone()),
                    valid_words: evaluation.valid_words.clone(),
                    invalid_words: evaluation.invalid_words.clone(),
                };
                self.evaluation = Some(evaluation);
                self.state = FluencyState::Result;
                send(command_tx, Command::SessionFinished(outcome)).await
            }
            Err(e) => {
                tracing::error!("Evaluation error: {:?}", e);
                self.state = FluencyState::Preparing;
                self.time_left = self.session_duration;
                send(
                    command_tx,
                    Command::Alert(EVALUATION_FAILED_ALERT.to_string()),
                )
                .await
            }
        }
    }

    /// From the result screen, fetches a fresh setup for another attempt.
    pub async fn retry<T: Tutor + ?Sized>(
        &mut self,
        tutor: &T,
        command_tx: &CommandSender,
    ) -> Result<()> {
        if self.state != FluencyState::Result {
            bail!("Cannot retry from {:?}", self.state);
        }
        self.evaluation = None;
        self.transcript.clear();
        self.time_left = self.session_duration;
        self.load_setup(tutor, command_tx).await
    }

    /// Leaves the session from any state.
    pub async fn abort(&mut self, command_tx: &CommandSender) -> Result<()> {
        if self.listening {
            self.listening = false;
            send(command_tx, Command::StopListening).await?;
        }
        self.state = FluencyState::Closed;
        send(command_tx, Command::Close).await
    }

    /// Fraction of the chosen duration still left, for progress displays.
    pub fn remaining_fraction(&self) -> f64 {
        if self.session_duration == 0 {
            return 0.0;
        }
        f64::from(self.time_left) / f64::from(self.session_duration)
    }
}

pub(crate) async fn send(command_tx: &CommandSender, command: Command) -> Result<()> {
    command_tx
        .send(command)
        .await
        .context("Failed to send command to runtime")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::{ExerciseKind, find};
    use crate::tutor::MockTutor;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::Receiver<Command>) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    fn tutor_with_setup() -> MockTutor {
        let mut tutor = MockTutor::new();
        tutor.expect_get_exercise_setup().returning(|_| {
            Ok(ExerciseSetup {
                prompt: "Parole che iniziano con F".to_string(),
                constraints: Some("Niente nomi propri".to_string()),
            })
        });
        tutor
    }

    async fn prepared_session(
        tutor: &MockTutor,
        tx: &CommandSender,
    ) -> FluencySession {
        let mut session = FluencySession::new(find(ExerciseKind::Phonemic));
        session.load_setup(tutor, tx).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_setup_moves_to_preparing_and_displays_prompt() {
        let tutor = tutor_with_setup();
        let (tx, mut rx) = mpsc::channel(16);

        let session = prepared_session(&tutor, &tx).await;

        assert_eq!(session.state, FluencyState::Preparing);
        assert_eq!(session.time_left, 60);
        assert_eq!(
            drain(&mut rx),
            vec![Command::Display(
                "Parole che iniziano con F\nVincoli: Niente nomi propri".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_setup_failure_closes_session_with_alert() {
        let mut tutor = MockTutor::new();
        tutor
            .expect_get_exercise_setup()
            .returning(|_| Err(anyhow::anyhow!("network down")))
            .once();
        let (tx, mut rx) = mpsc::channel(16);
        let mut session = FluencySession::new(find(ExerciseKind::Semantic));

        session.load_setup(&tutor, &tx).await.unwrap();

        assert_eq!(session.state, FluencyState::Closed);
        let commands = drain(&mut rx);
        assert!(matches!(commands[0], Command::Alert(_)));
        assert_eq!(commands[1], Command::Close);
    }

    #[tokio::test]
    async fn test_duration_is_bounded_and_stepped() {
        let tutor = tutor_with_setup();
        let (tx, _rx) = mpsc::channel(16);
        let mut session = prepared_session(&tutor, &tx).await;

        assert!(session.set_duration(10).is_err());
        assert!(session.set_duration(195).is_err());
        assert!(session.set_duration(40).is_err());
        session.set_duration(30).unwrap();

        assert_eq!(session.session_duration, 30);
        assert_eq!(session.time_left, 30);
    }

    #[tokio::test]
    async fn test_start_clears_transcript_and_opens_continuous_capture() {
        let tutor = tutor_with_setup();
        let (tx, mut rx) = mpsc::channel(16);
        let mut session = prepared_session(&tutor, &tx).await;
        drain(&mut rx);
        session.transcript = "stale words".to_string();

        session.start(&tx).await.unwrap();

        assert_eq!(session.state, FluencyState::Running);
        assert!(session.transcript.is_empty());
        assert_eq!(
            drain(&mut rx),
            vec![Command::StartListening { continuous: true }]
        );
    }

    #[tokio::test]
    async fn test_exactly_n_ticks_before_evaluation() {
        let mut tutor = tutor_with_setup();
        tutor
            .expect_evaluate_exercise()
            .returning(|_, _, _| {
                Ok(Evaluation {
                    score: 64,
                    feedback: "Buon inizio".to_string(),
                    valid_words: vec!["fiore".to_string()],
                    invalid_words: vec![],
                })
            })
            .once();
        let (tx, mut rx) = mpsc::channel(32);
        let mut session = prepared_session(&tutor, &tx).await;
        session.set_duration(15).unwrap();
        session.start(&tx).await.unwrap();
        session.append_transcript("fiore");

        for _ in 0..14 {
            session.tick(&tutor, &tx).await.unwrap();
            assert_eq!(session.state, FluencyState::Running);
        }
        session.tick(&tutor, &tx).await.unwrap();

        assert_eq!(session.state, FluencyState::Result);
        assert_eq!(session.time_left, 0);
        let finished: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|c| match c {
                Command::SessionFinished(outcome) => Some(outcome),
                _ => None,
            })
            .collect();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].score, 64);
        assert_eq!(finished[0].transcript.as_deref(), Some("fiore"));
    }

    #[tokio::test]
    async fn test_silent_session_still_evaluated_and_failure_resets_to_chosen_duration() {
        let mut tutor = tutor_with_setup();
        tutor
            .expect_evaluate_exercise()
            .withf(|kind, setup, transcript| {
                *kind == ExerciseKind::Phonemic
                    && setup.prompt == "Parole che iniziano con F"
                    && transcript.is_empty()
            })
            .returning(|_, _, _| Err(anyhow::anyhow!("empty transcript")))
            .once();
        let (tx, mut rx) = mpsc::channel(64);
        let mut session = prepared_session(&tutor, &tx).await;
        session.set_duration(30).unwrap();
        session.start(&tx).await.unwrap();
        drain(&mut rx);

        for _ in 0..30 {
            session.tick(&tutor, &tx).await.unwrap();
        }

        assert_eq!(session.state, FluencyState::Preparing);
        assert_eq!(session.time_left, 30, "reset to chosen, not default, duration");
        assert!(session.evaluation.is_none());
        let commands = drain(&mut rx);
        assert_eq!(commands[0], Command::StopListening);
        assert!(matches!(commands[1], Command::Alert(_)));
        assert!(
            !commands
                .iter()
                .any(|c| matches!(c, Command::SessionFinished(_)))
        );
    }

    #[tokio::test]
    async fn test_manual_finish_before_time_runs_out() {
        let mut tutor = tutor_with_setup();
        tutor.expect_evaluate_exercise().returning(|_, _, _| {
            Ok(Evaluation {
                score: 90,
                feedback: "Ottimo".to_string(),
                valid_words: vec![],
                invalid_words: vec![],
            })
        });
        let (tx, _rx) = mpsc::channel(32);
        let mut session = prepared_session(&tutor, &tx).await;
        session.start(&tx).await.unwrap();
        session.tick(&tutor, &tx).await.unwrap();

        session.finish(&tutor, &tx).await.unwrap();

        assert_eq!(session.state, FluencyState::Result);
        assert_eq!(session.time_left, 59);
        assert_eq!(session.evaluation.as_ref().map(|e| e.score), Some(90));
    }

    #[tokio::test]
    async fn test_capture_restarts_only_while_running() {
        let tutor = tutor_with_setup();
        let (tx, mut rx) = mpsc::channel(16);
        let mut session = prepared_session(&tutor, &tx).await;
        drain(&mut rx);

        session.capture_ended(&tx).await.unwrap();
        assert!(drain(&mut rx).is_empty());

        session.start(&tx).await.unwrap();
        drain(&mut rx);
        session.capture_ended(&tx).await.unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![Command::StartListening { continuous: true }]
        );
        assert!(session.listening);
    }

    #[tokio::test]
    async fn test_retry_keeps_chosen_duration_and_reloads_setup() {
        let mut tutor = MockTutor::new();
        tutor
            .expect_get_exercise_setup()
            .returning(|_| {
                Ok(ExerciseSetup {
                    prompt: "Lettera P".to_string(),
                    constraints: None,
                })
            })
            .times(2);
        tutor.expect_evaluate_exercise().returning(|_, _, _| {
            Ok(Evaluation {
                score: 50,
                feedback: String::new(),
                valid_words: vec![],
                invalid_words: vec![],
            })
        });
        let (tx, _rx) = mpsc::channel(32);
        let mut session = FluencySession::new(find(ExerciseKind::Phonemic));
        session.load_setup(&tutor, &tx).await.unwrap();
        session.set_duration(45).unwrap();
        session.start(&tx).await.unwrap();
        session.append_transcript("pane");
        session.finish(&tutor, &tx).await.unwrap();

        session.retry(&tutor, &tx).await.unwrap();

        assert_eq!(session.state, FluencyState::Preparing);
        assert_eq!(session.time_left, 45);
        assert!(session.transcript.is_empty());
        assert!(session.evaluation.is_none());
    }

    #[tokio::test]
    async fn test_abort_stops_capture_and_closes() {
        let tutor = tutor_with_setup();
        let (tx, mut rx) = mpsc::channel(16);
        let mut session = prepared_session(&tutor, &tx).await;
        session.start(&tx).await.unwrap();
        drain(&mut rx);

        session.abort(&tx).await.unwrap();

        assert_eq!(session.state, FluencyState::Closed);
        assert_eq!(drain(&mut rx), vec![Command::StopListening, Command::Close]);
        // Late ticks are ignored once closed.
        session.tick(&tutor, &tx).await.unwrap();
        assert_eq!(session.state, FluencyState::Closed);
    }

    #[test]
    fn test_transcript_only_grows_while_running() {
        let mut session = FluencySession::new(find(ExerciseKind::Synonyms));
        session.append_transcript("ignored");
        assert!(session.transcript.is_empty());

        session.state = FluencyState::Running;
        session.append_transcript("veloce");
        session.append_transcript("  ");
        session.append_transcript("rapido");
        assert_eq!(session.transcript, "veloce rapido");

        session.update_transcript("rapido");
        assert_eq!(session.transcript, "rapido");
    }
}
