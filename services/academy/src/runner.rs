use crate::capture::{Input, LineCapture};
use crate::views;
use anyhow::{Result, bail};
use mindflow_core::exercise::ExerciseConfig;
use mindflow_core::fluency::{FluencySession, FluencyState, MAX_DURATION_SECS, MIN_DURATION_SECS};
use mindflow_core::mnemonic::{MnemonicSession, MnemonicView};
use mindflow_core::stats::Progress;
use mindflow_core::store::ProgressStore;
use mindflow_core::tutor::Tutor;
use mindflow_core::{Command, CommandSender};
use mindflow_native_utils::player::SpeechPlayer;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

const COMMAND_BUFFER: usize = 32;
const TUTOR_SILENT_ALERT: &str = "Il tutor non ha risposto.";
const CAPTURE_UNAVAILABLE_ALERT: &str = "Il riconoscimento vocale non è supportato. L'input è stato chiuso.";

/// What woke a session loop up.
enum Event {
    Tick,
    Input(Input),
    PlaybackDone,
}

/// Executes the side effects sessions ask for: terminal output, speech
/// playback, capture and recording of completed sessions.
pub struct Runtime<S: ProgressStore, R> {
    pub progress: Progress<S>,
    player: SpeechPlayer,
    capture: LineCapture<R>,
    command_tx: CommandSender,
    command_rx: mpsc::Receiver<Command>,
    playback_until: Option<Instant>,
    closed: bool,
}

impl<S: ProgressStore, R: AsyncRead + Unpin> Runtime<S, R> {
    pub fn new(progress: Progress<S>, player: SpeechPlayer, input: R) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        Self {
            progress,
            player,
            capture: LineCapture::new(input),
            command_tx,
            command_rx,
            playback_until: None,
            closed: false,
        }
    }

    fn execute(&mut self, config: &ExerciseConfig, command: Command) {
        match command {
            Command::StartListening { continuous } => {
                if !self.capture.is_open() {
                    tracing::warn!("Capture requested but input is closed");
                } else if continuous {
                    println!("🎤 In ascolto... scrivi le parole, /fine per terminare, /esci per uscire");
                } else {
                    println!("🎤 Tocca a te:");
                }
            }
            Command::StopListening => tracing::debug!("Capture stopped"),
            Command::Display(text) => println!("\n{text}\n"),
            Command::PlaySpeech(audio) => match self.player.play(&audio) {
                Ok(duration) => self.playback_until = Some(Instant::now() + duration),
                Err(e) => {
                    tracing::error!("Audio playback error: {:?}", e);
                    self.playback_until = Some(Instant::now());
                }
            },
            Command::StopSpeech => {
                self.player.stop();
                self.playback_until = None;
            }
            Command::Alert(message) => eprintln!("⚠️  {message}"),
            Command::SessionFinished(outcome) => match self.progress.record(config, outcome) {
                Ok(result) => println!(
                    "+{} XP · livello {} · {} XP totali",
                    result.xp_earned, self.progress.stats.level, self.progress.stats.xp
                ),
                Err(e) => {
                    tracing::error!("Failed to record result: {:?}", e);
                    eprintln!("⚠️  Impossibile salvare i progressi.");
                }
            },
            Command::Close => self.closed = true,
        }
    }

    /// Runs every command the last session call queued.
    fn pump(&mut self, config: &ExerciseConfig) {
        while let Ok(command) = self.command_rx.try_recv() {
            self.execute(config, command);
        }
    }

    async fn next_event(&mut self, ticker: Option<&mut tokio::time::Interval>) -> Event {
        let playback_until = self.playback_until;
        tokio::select! {
            _ = async {
                match ticker {
                    Some(ticker) => ticker.tick().await,
                    None => std::future::pending().await,
                }
            } => Event::Tick,
            input = self.capture.next() => Event::Input(input),
            _ = async {
                match playback_until {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            } => Event::PlaybackDone,
        }
    }

    pub async fn run_fluency<T: Tutor + ?Sized>(
        &mut self,
        tutor: &T,
        config: &'static ExerciseConfig,
    ) -> Result<()> {
        self.closed = false;
        let tx = self.command_tx.clone();
        let mut session = FluencySession::new(config);
        println!("{} {}\n{}", config.icon, config.title, config.description);

        session.load_setup(tutor, &tx).await?;
        self.pump(config);

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.closed {
            match session.state {
                FluencyState::Preparing if !self.capture.is_open() => session.abort(&tx).await?,
                FluencyState::Preparing => {
                    println!(
                        "Durata: {}s. Invio per iniziare, un numero ({MIN_DURATION_SECS}-{MAX_DURATION_SECS}) per cambiarla, /esci per uscire.",
                        session.session_duration
                    );
                    match self.next_event(None).await {
                        Event::Input(Input::Line(line)) if line.is_empty() => {
                            session.start(&tx).await?;
                            ticker.reset();
                        }
                        Event::Input(Input::Line(line)) => match line.parse::<u32>() {
                            Ok(secs) => {
                                if let Err(e) = session.set_duration(secs) {
                                    eprintln!("{e}");
                                }
                            }
                            Err(_) => eprintln!("Durata non valida: {line}"),
                        },
                        Event::Input(Input::Quit) => session.abort(&tx).await?,
                        Event::Input(Input::Closed) => {
                            eprintln!("⚠️  {CAPTURE_UNAVAILABLE_ALERT}");
                            session.abort(&tx).await?;
                        }
                        _ => {}
                    }
                }
                FluencyState::Running => match self.next_event(Some(&mut ticker)).await {
                    Event::Tick => {
                        session.tick(tutor, &tx).await?;
                        if session.state == FluencyState::Running && session.time_left % 10 == 0 {
                            println!("⏱  {}s", session.time_left);
                        }
                    }
                    Event::Input(Input::Line(line)) => session.append_transcript(&line),
                    Event::Input(Input::Finish) => session.finish(tutor, &tx).await?,
                    Event::Input(Input::Quit) => session.abort(&tx).await?,
                    Event::Input(Input::Closed) => {
                        // The countdown keeps running; whatever was typed gets evaluated.
                        eprintln!("⚠️  {CAPTURE_UNAVAILABLE_ALERT}");
                        session.capture_ended(&tx).await?;
                    }
                    _ => {}
                },
                FluencyState::Result => {
                    if let Some(evaluation) = &session.evaluation {
                        println!("{}", views::evaluation(evaluation));
                    }
                    if !self.capture.is_open() {
                        session.abort(&tx).await?;
                        self.pump(config);
                        continue;
                    }
                    println!("Invio per riprovare, /esci per tornare al catalogo.");
                    match self.next_event(None).await {
                        Event::Input(Input::Line(line)) if line.is_empty() => {
                            session.retry(tutor, &tx).await?
                        }
                        Event::Input(Input::Quit | Input::Closed) => session.abort(&tx).await?,
                        _ => {}
                    }
                }
                FluencyState::Closed => break,
                state @ (FluencyState::Loading | FluencyState::Evaluating) => {
                    bail!("Fluency session left waiting in {state:?}")
                }
            }
            self.pump(config);
        }
        Ok(())
    }

    pub async fn run_mnemonic<T: Tutor + ?Sized>(
        &mut self,
        tutor: &T,
        config: &'static ExerciseConfig,
    ) -> Result<()> {
        self.closed = false;
        let tx = self.command_tx.clone();
        let mut session = MnemonicSession::new(config);
        print_theory(config);

        while !self.closed {
            match self.next_event(None).await {
                Event::PlaybackDone => {
                    self.playback_until = None;
                    session.playback_finished(&tx).await?;
                }
                Event::Input(input) => match (session.view, input) {
                    (MnemonicView::Learning, Input::Line(line)) if line.is_empty() => {
                        if !session.start_practice(tutor, &tx).await? {
                            eprintln!("⚠️  {TUTOR_SILENT_ALERT} Invio per riprovare.");
                        }
                    }
                    (MnemonicView::Learning, Input::Theory) => {
                        session.explain_theory(tutor, &tx).await?;
                    }
                    (MnemonicView::Learning, Input::Quit | Input::Closed) => {
                        session.close(&tx).await?;
                    }
                    (MnemonicView::Learning, _) => {
                        println!("Invio per iniziare la pratica, /teoria per la spiegazione, /esci per uscire.");
                    }
                    (MnemonicView::Practicing, Input::Line(line))
                        if line.is_empty() && session.awaiting_opening() =>
                    {
                        if !session.send_response(tutor, &tx).await? {
                            eprintln!("⚠️  {TUTOR_SILENT_ALERT} Invio per riprovare.");
                        }
                    }
                    (MnemonicView::Practicing, Input::Line(line)) if !line.is_empty() => {
                        session.set_utterance(line);
                        if !session.send_response(tutor, &tx).await? {
                            eprintln!("⚠️  {TUTOR_SILENT_ALERT} Riprova.");
                        } else if session.completed {
                            println!("Sessione completata! /esci per tornare alla teoria.");
                        }
                    }
                    (MnemonicView::Practicing, Input::Repeat) => {
                        let text = session.tutor_text.clone();
                        session.speak(tutor, &tx, &text).await?;
                    }
                    (MnemonicView::Practicing, Input::Quit) => {
                        session.abandon(&tx).await?;
                        self.pump(config);
                        print_theory(config);
                    }
                    (MnemonicView::Practicing, Input::Closed) => {
                        eprintln!("⚠️  {CAPTURE_UNAVAILABLE_ALERT}");
                        session.capture_ended();
                        session.close(&tx).await?;
                    }
                    (MnemonicView::Practicing, _) => {
                        println!("Scrivi la tua risposta, /ripeti per riascoltare, /esci per tornare alla teoria.");
                    }
                },
                Event::Tick => {}
            }
            self.pump(config);
        }
        Ok(())
    }
}

fn print_theory(config: &ExerciseConfig) {
    println!("{} {}\n", config.icon, config.title);
    if let Some(theory) = config.theory {
        println!("{theory}\n");
    }
    println!("Invio per iniziare la pratica, /teoria per la spiegazione del tutor, /esci per uscire.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mindflow_core::exercise::{ExerciseKind, find};
    use mindflow_core::mnemonic::DIALOGUE_COMPLETION_SCORE;
    use mindflow_core::store::MemoryStore;
    use mindflow_core::tutor::{Evaluation, ExerciseSetup, TutorReply};
    use std::sync::Mutex;

    /// Answers every call the same way and remembers what it was asked.
    #[derive(Default)]
    struct ScriptedTutor {
        transcripts: Mutex<Vec<String>>,
        turns: Mutex<Vec<(String, String)>>,
        failing_turns: Mutex<u32>,
    }

    #[async_trait]
    impl Tutor for ScriptedTutor {
        async fn get_exercise_setup(&self, _kind: ExerciseKind) -> Result<ExerciseSetup> {
            Ok(ExerciseSetup {
                prompt: "Cibo".to_string(),
                constraints: None,
            })
        }

        async fn evaluate_exercise(
            &self,
            _kind: ExerciseKind,
            _setup: &ExerciseSetup,
            transcript: &str,
        ) -> Result<Evaluation> {
            self.transcripts.lock().unwrap().push(transcript.to_string());
            Ok(Evaluation {
                score: 80,
                feedback: "Bene".to_string(),
                valid_words: transcript.split(' ').map(str::to_string).collect(),
                invalid_words: vec![],
            })
        }

        async fn get_tutor_response(
            &self,
            _kind: ExerciseKind,
            phase: &str,
            utterance: &str,
            _history: &[String],
        ) -> Result<TutorReply> {
            self.turns
                .lock()
                .unwrap()
                .push((phase.to_string(), utterance.to_string()));
            let mut failing = self.failing_turns.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                bail!("tutor unavailable");
            }
            let done = phase != "INTRO";
            Ok(TutorReply {
                text: if done { "Bravo!" } else { "Quanto fa 3?" }.to_string(),
                next_phase: if done { "DONE" } else { "DRILL" }.to_string(),
                is_complete: done,
                feedback: "Preciso".to_string(),
            })
        }

        async fn get_theory_explanation(&self, theory: &str) -> Result<String> {
            Ok(format!("In breve: {}", theory.len()))
        }

        async fn get_speech_data(&self, _text: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn runtime(store: MemoryStore, input: &'static str) -> Runtime<MemoryStore, &'static [u8]> {
        let progress = Progress::load(store).unwrap();
        Runtime::new(progress, SpeechPlayer::open(None).unwrap(), input.as_bytes())
    }

    #[tokio::test]
    async fn test_fluency_run_records_typed_words() {
        let store = MemoryStore::default();
        let tutor = ScriptedTutor::default();
        let mut runtime = runtime(store.clone(), "\nmela pera\nuva\n/fine\n/esci\n");

        runtime
            .run_fluency(&tutor, find(ExerciseKind::Semantic))
            .await
            .unwrap();

        assert_eq!(*tutor.transcripts.lock().unwrap(), vec!["mela pera uva"]);
        let (stats, results) = store.load().unwrap();
        assert_eq!(stats.sessions_count, 1);
        assert_eq!(results[0].score, 80);
        assert_eq!(results[0].transcript.as_deref(), Some("mela pera uva"));
    }

    #[tokio::test]
    async fn test_xp_follows_catalog_time_not_chosen_duration() {
        let store = MemoryStore::default();
        let tutor = ScriptedTutor::default();
        let mut runtime = runtime(store.clone(), "7\n45\n\n/fine\n/esci\n");

        runtime
            .run_fluency(&tutor, find(ExerciseKind::Semantic))
            .await
            .unwrap();

        let (_, results) = store.load().unwrap();
        // 60s catalog time, score 80: round(60 * 0.8 * 1.5)
        assert_eq!(results[0].xp_earned, 72);
    }

    #[tokio::test]
    async fn test_fluency_quits_from_preparing_without_recording() {
        let store = MemoryStore::default();
        let tutor = ScriptedTutor::default();
        let mut runtime = runtime(store.clone(), "/esci\n");

        runtime
            .run_fluency(&tutor, find(ExerciseKind::Phonemic))
            .await
            .unwrap();

        assert!(tutor.transcripts.lock().unwrap().is_empty());
        assert_eq!(store.load().unwrap().0.sessions_count, 0);
    }

    #[tokio::test]
    async fn test_mnemonic_run_records_completion_once() {
        let store = MemoryStore::default();
        let tutor = ScriptedTutor::default();
        let mut runtime = runtime(store.clone(), "\n3\nancora\n/esci\n/esci\n");

        runtime
            .run_mnemonic(&tutor, find(ExerciseKind::MnemonicNumbersPingpong))
            .await
            .unwrap();

        let turns = tutor.turns.lock().unwrap().clone();
        assert_eq!(turns[0], ("INTRO".to_string(), String::new()));
        assert_eq!(turns[1], ("DRILL".to_string(), "3".to_string()));
        let (stats, results) = store.load().unwrap();
        assert_eq!(stats.sessions_count, 1);
        assert_eq!(results[0].score, DIALOGUE_COMPLETION_SCORE);
        assert_eq!(results[0].details, "Preciso");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fluency_returns_when_input_closes_mid_session() {
        let store = MemoryStore::default();
        let tutor = ScriptedTutor::default();
        let mut runtime = runtime(store.clone(), "15\n\nmela\n");

        let finished = tokio::time::timeout(
            Duration::from_secs(60),
            runtime.run_fluency(&tutor, find(ExerciseKind::Semantic)),
        )
        .await;

        assert!(finished.expect("session should end once input is gone").is_ok());
        assert_eq!(*tutor.transcripts.lock().unwrap(), vec!["mela"]);
        assert_eq!(store.load().unwrap().0.sessions_count, 1);
    }

    #[tokio::test]
    async fn test_mnemonic_opening_turn_can_be_retried() {
        let store = MemoryStore::default();
        let tutor = ScriptedTutor {
            failing_turns: Mutex::new(1),
            ..Default::default()
        };
        let mut runtime = runtime(store.clone(), "\n\n3\n/esci\n/esci\n");

        runtime
            .run_mnemonic(&tutor, find(ExerciseKind::MnemonicNumbersPingpong))
            .await
            .unwrap();

        let turns = tutor.turns.lock().unwrap().clone();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0], ("INTRO".to_string(), String::new()));
        assert_eq!(turns[1], ("INTRO".to_string(), String::new()));
        assert_eq!(turns[2], ("DRILL".to_string(), "3".to_string()));
        assert_eq!(store.load().unwrap().0.sessions_count, 1);
    }
}
