pub mod exercise;
pub mod fluency;
pub mod gemini;
pub mod mnemonic;
pub mod prompts;
pub mod stats;
pub mod store;
pub mod tutor;

use crate::stats::SessionOutcome;

/// Represents commands that the session state machines issue to the runtime.
///
/// Sessions never touch the microphone, the speakers or the terminal
/// themselves. They decide, and the runtime executes the side effects.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Open the microphone. `continuous` keeps recognition running until
    /// explicitly stopped; otherwise a single utterance is captured.
    StartListening { continuous: bool },
    /// Close the microphone.
    StopListening,
    /// Show text from the tutor (setup prompt, dialogue turn, explanation).
    Display(String),
    /// Play base64 encoded PCM16 mono audio at 24kHz.
    PlaySpeech(String),
    /// Stop any audio currently playing.
    StopSpeech,
    /// Blocking, user-facing notice about a recoverable failure.
    Alert(String),
    /// The session completed and produced an outcome to record.
    SessionFinished(SessionOutcome),
    /// The session is over and control returns to the catalog.
    Close,
}

pub type CommandSender = tokio::sync::mpsc::Sender<Command>;
