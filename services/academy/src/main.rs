mod capture;
mod config;
mod prompt_loader;
mod runner;
mod views;

use crate::config::Config;
use crate::runner::Runtime;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mindflow_core::exercise::{ExerciseKind, find};
use mindflow_core::gemini::GeminiTutor;
use mindflow_core::stats::Progress;
use mindflow_core::store::JsonFileStore;
use mindflow_native_utils::player::SpeechPlayer;
use std::io::{BufRead, Write};
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "MindFlow Academy: allenamento vocale di fluenza e mnemotecniche")]
struct Cli {
    /// Gemini API key. Takes precedence over GEMINI_API_KEY and the stored key.
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every exercise with your mastery
    Catalog,
    /// Show level, XP and recent results
    Stats,
    /// Run a timed fluency exercise, e.g. `phonemic`
    Fluency { exercise: ExerciseKind },
    /// Run a guided mnemonic session, e.g. `mnemonic-loci`
    Mnemonic { exercise: ExerciseKind },
    /// Store the Gemini API key in the data directory
    Configure,
    /// Delete all stats and history
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 2. Load Configuration ---
    let mut config = Config::from_env(args.api_key.clone())
        .context("Failed to load application configuration")?;

    // --- 3. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!("Data directory: {}", config.data_dir.display());

    let store = JsonFileStore::new(&config.data_dir);

    match args.command {
        Commands::Catalog => {
            let progress = Progress::load(store)?;
            print!("{}", views::catalog(&progress.stats));
        }
        Commands::Stats => {
            let progress = Progress::load(store)?;
            print!("{}", views::dashboard(&progress.stats, &progress.history));
        }
        Commands::Configure => configure(&config, args.api_key)?,
        Commands::Reset { yes } => {
            if !yes && !confirm("Cancellare statistiche e cronologia? (s/N) ")? {
                println!("Nessuna modifica.");
                return Ok(());
            }
            let mut progress = Progress::load(store)?;
            progress.reset()?;
            println!("Progressi azzerati.");
        }
        Commands::Fluency { exercise } => {
            if exercise.is_mnemonic() {
                bail!("{exercise} is a mnemonic exercise; use `mindflow mnemonic`");
            }
            run_session(&mut config, store, exercise).await?;
        }
        Commands::Mnemonic { exercise } => {
            if !exercise.is_mnemonic() {
                bail!("{exercise} is a fluency exercise; use `mindflow fluency`");
            }
            run_session(&mut config, store, exercise).await?;
        }
    }
    Ok(())
}

async fn run_session(config: &mut Config, store: JsonFileStore, kind: ExerciseKind) -> Result<()> {
    // --- 4. Credentials, Prompts and the AI Client ---
    let api_key = config.take_api_key()?;
    let prompts = prompt_loader::prompt_book(config.prompts_dir.as_deref())
        .context("Failed to load LLM prompts")?;
    let tutor = GeminiTutor::new(api_key, prompts)
        .with_chat_model(config.chat_model.clone())
        .with_tts_model(config.tts_model.clone())
        .with_voice(config.voice.clone());
    tracing::info!("Using {} with voice {}", config.chat_model, config.voice);

    // --- 5. Session Runtime ---
    let progress = Progress::load(store)?;
    let player = SpeechPlayer::open(None).context("Failed to open audio output")?;
    let mut runtime = Runtime::new(progress, player, tokio::io::stdin());
    let exercise = find(kind);

    let session = async {
        if kind.is_mnemonic() {
            runtime.run_mnemonic(&tutor, exercise).await
        } else {
            runtime.run_fluency(&tutor, exercise).await
        }
    };

    tokio::select! {
        result = session => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down...");
        }
    }
    Ok(())
}

fn configure(config: &Config, api_key_flag: Option<String>) -> Result<()> {
    let api_key = match api_key_flag {
        Some(key) => key,
        None => prompt_line("Gemini API key: ")?,
    };
    if api_key.trim().is_empty() {
        bail!("No API key entered");
    }
    let path = config::write_api_key(&config.data_dir, &api_key)?;
    println!("Chiave salvata in {}", path.display());
    Ok(())
}

fn prompt_line(question: &str) -> Result<String> {
    print!("{question}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt_line(question)?;
    Ok(matches!(answer.to_lowercase().as_str(), "s" | "si" | "sì" | "y" | "yes"))
}
