use crate::{
    Command, CommandSender,
    exercise::ExerciseConfig,
    fluency::send,
    stats::SessionOutcome,
    tutor::Tutor,
};
use anyhow::Result;

pub const INITIAL_PHASE: &str = "INTRO";
pub const WELCOME_TEXT: &str = "Benvenuto! Sei pronto per iniziare questa sessione interattiva?";

/// Score recorded when the tutor declares a dialogue complete.
///
/// The tutor does not grade the dialogue, so completion is worth a fixed
/// score rather than a judged one.
pub const DIALOGUE_COMPLETION_SCORE: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnemonicView {
    Learning,
    Practicing,
}

/// A guided, multi-turn spoken dialogue that teaches a memory technique.
///
/// The phase is a token owned by the tutor: the session stores whatever the
/// last reply said and sends it back on the next turn, nothing more.
pub struct MnemonicSession {
    pub config: &'static ExerciseConfig,
    pub view: MnemonicView,
    pub phase: String,
    pub tutor_text: String,
    /// The utterance captured for the next turn.
    pub transcript: String,
    /// Both sides of every exchange, oldest first.
    pub history: Vec<String>,
    pub theory_explanation: Option<String>,
    /// A tutor request is in flight.
    pub loading: bool,
    pub listening: bool,
    pub speaking: bool,
    pub completed: bool,
}

impl MnemonicSession {
    pub fn new(config: &'static ExerciseConfig) -> Self {
        Self {
            config,
            view: MnemonicView::Learning,
            phase: INITIAL_PHASE.to_string(),
            tutor_text: WELCOME_TEXT.to_string(),
            transcript: String::new(),
            history: Vec::new(),
            theory_explanation: None,
            loading: false,
            listening: false,
            speaking: false,
            completed: false,
        }
    }

    /// Asks the tutor to narrate the theory of this exercise, then reads it aloud.
    pub async fn explain_theory<T: Tutor + ?Sized>(
        &mut self,
        tutor: &T,
        command_tx: &CommandSender,
    ) -> Result<()> {
        if self.loading {
            return Ok(());
        }
        let Some(theory) = self.config.theory else {
            tracing::warn!("{} has no theory to explain", self.config.kind);
            return Ok(());
        };

        let explanation = match &self.theory_explanation {
            Some(cached) => cached.clone(),
            None => {
                self.loading = true;
                let explanation = tutor.get_theory_explanation(theory).await;
                self.loading = false;
                match explanation {
                    Ok(text) => {
                        self.theory_explanation = Some(text.clone());
                        text
                    }
                    Err(e) => {
                        tracing::error!("Theory explanation error: {:?}", e);
                        return Ok(());
                    }
                }
            }
        };

        send(command_tx, Command::Display(explanation.clone())).await?;
        self.speak(tutor, command_tx, &explanation).await
    }

    /// True until the tutor has answered the opening turn.
    pub fn awaiting_opening(&self) -> bool {
        self.phase == INITIAL_PHASE && self.history.is_empty()
    }

    /// Switches to the dialogue. The first turn is sent automatically.
    ///
    /// Returns `false` when that opening turn got no answer; sending again
    /// with an empty utterance retries it.
    pub async fn start_practice<T: Tutor + ?Sized>(
        &mut self,
        tutor: &T,
        command_tx: &CommandSender,
    ) -> Result<bool> {
        self.stop_audio(command_tx).await?;
        self.view = MnemonicView::Practicing;
        if self.awaiting_opening() {
            return self.send_response(tutor, command_tx).await;
        }
        Ok(true)
    }

    /// Opens the microphone for a single utterance.
    pub async fn start_listening(&mut self, command_tx: &CommandSender) -> Result<()> {
        if self.speaking || self.listening {
            return Ok(());
        }
        self.listening = true;
        send(command_tx, Command::StartListening { continuous: false }).await
    }

    /// The single-shot recogniser produced its result.
    pub fn set_utterance(&mut self, text: impl Into<String>) {
        self.transcript = text.into().trim().to_string();
        self.listening = false;
    }

    pub fn capture_ended(&mut self) {
        self.listening = false;
    }

    /// Whether `send_response` would currently do anything.
    pub fn can_send(&self) -> bool {
        !self.loading && (!self.transcript.is_empty() || self.phase == INITIAL_PHASE)
    }

    /// Sends one turn to the tutor and relays its answer.
    ///
    /// Returns `false` when nothing was sent (empty utterance outside the
    /// opening phase, or a request already in flight).
    pub async fn send_response<T: Tutor + ?Sized>(
        &mut self,
        tutor: &T,
        command_tx: &CommandSender,
    ) -> Result<bool> {
        if !self.can_send() {
            return Ok(false);
        }
        self.loading = true;
        self.stop_audio(command_tx).await?;

        let reply = tutor
            .get_tutor_response(self.config.kind, &self.phase, &self.transcript, &self.history)
            .await;
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Tutor response error: {:?}", e);
                self.loading = false;
                return Ok(false);
            }
        };

        tracing::debug!("Phase {} -> {}", self.phase, reply.next_phase);
        self.tutor_text = reply.text.clone();
        self.phase = reply.next_phase;
        self.history.push(format!("Utente: {}", self.transcript));
        self.history.push(format!("Tutor: {}", reply.text));
        self.transcript.clear();
        send(command_tx, Command::Display(reply.text.clone())).await?;

        self.speak(tutor, command_tx, &reply.text).await?;
        self.loading = false;

        if reply.is_complete && !self.completed {
            self.completed = true;
            tracing::info!("{} dialogue complete", self.config.kind);
            let outcome = SessionOutcome {
                score: DIALOGUE_COMPLETION_SCORE,
                feedback: reply.feedback,
                ..Default::default()
            };
            send(command_tx, Command::SessionFinished(outcome)).await?;
        }
        Ok(true)
    }

    /// Fetches synthesized speech for `text` and hands it to the player.
    /// Missing audio is not an error: the text is already on screen.
    pub async fn speak<T: Tutor + ?Sized>(
        &mut self,
        tutor: &T,
        command_tx: &CommandSender,
        text: &str,
    ) -> Result<()> {
        self.stop_audio(command_tx).await?;
        match tutor.get_speech_data(text).await {
            Ok(Some(audio)) => {
                self.speaking = true;
                send(command_tx, Command::PlaySpeech(audio)).await
            }
            Ok(None) => {
                tracing::debug!("No audio returned for tutor text");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Audio error: {:?}", e);
                Ok(())
            }
        }
    }

    /// Playback ended. While practicing, the microphone reopens for the next turn.
    pub async fn playback_finished(&mut self, command_tx: &CommandSender) -> Result<()> {
        self.speaking = false;
        if self.view == MnemonicView::Practicing && !self.loading && !self.completed {
            self.start_listening(command_tx).await?;
        }
        Ok(())
    }

    async fn stop_audio(&mut self, command_tx: &CommandSender) -> Result<()> {
        if self.speaking {
            self.speaking = false;
            send(command_tx, Command::StopSpeech).await?;
        }
        Ok(())
    }

    /// Drops the dialogue and goes back to the theory.
    pub async fn abandon(&mut self, command_tx: &CommandSender) -> Result<()> {
        self.stop_audio(command_tx).await?;
        if self.listening {
            self.listening = false;
            send(command_tx, Command::StopListening).await?;
        }
        self.view = MnemonicView::Learning;
        self.phase = INITIAL_PHASE.to_string();
        self.history.clear();
        self.transcript.clear();
        self.tutor_text = WELCOME_TEXT.to_string();
        self.completed = false;
        Ok(())
    }

    pub async fn close(&mut self, command_tx: &CommandSender) -> Result<()> {
        self.stop_audio(command_tx).await?;
        if self.listening {
            self.listening = false;
            send(command_tx, Command::StopListening).await?;
        }
        send(command_tx, Command::Close).await
    }
}
