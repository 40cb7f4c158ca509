//! voxchat - talk to an LLM and hear the reply while it is still being written
//!
//! # Usage
//!
//! ```bash
//! # Interactive chat: type `exit` or press Ctrl+C to quit. A reply in
//! # progress is never cut off; Ctrl+C during one quits once it finishes.
//! voxchat --config voxchat.yaml chat
//!
//! # Single question, printed and spoken
//! voxchat ask "今日の天気は？"
//!
//! # Speak a fixed text through the pipeline and print timings
//! voxchat speak "こんにちは。今日もいい天気ですね。"
//!
//! # List the voices offered by the TTS engine
//! voxchat speakers
//! ```

mod session;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use session::ChatSession;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voxchat_backends::{FixedReplyClient, VoicevoxClient};
use voxchat_core::{BotConfig, TurnReport};

/// Voice chat bot with streaming speech output
#[derive(Parser)]
#[command(name = "voxchat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (YAML); built-in defaults when omitted
    #[arg(short, long, global = true, env = "VOXCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat on stdin
    Chat {
        /// Print replies without speaking them
        #[arg(long)]
        text_only: bool,
    },

    /// Ask one question and exit
    Ask {
        question: String,

        /// Print the reply without speaking it
        #[arg(long)]
        text_only: bool,
    },

    /// Speak a fixed text through the pipeline
    Speak {
        text: String,

        /// Characters per simulated stream fragment
        #[arg(long, default_value = "3")]
        fragment_chars: usize,

        /// Delay between fragments in milliseconds
        #[arg(long, default_value = "20")]
        fragment_delay_ms: u64,
    },

    /// List TTS voices
    Speakers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Chat { text_only } => chat(&config, text_only).await,
        Commands::Ask {
            question,
            text_only,
        } => {
            let session = ChatSession::open(&config, text_only).await?;
            let report = session.ask(&question).await?;
            print!("{}", format_reply(&report));
            Ok(())
        }
        Commands::Speak {
            text,
            fragment_chars,
            fragment_delay_ms,
        } => {
            let llm = FixedReplyClient::new(text)
                .with_pacing(fragment_chars, Duration::from_millis(fragment_delay_ms));
            let session = ChatSession::with_llm(&config, Arc::new(llm), false)
                .await?
                .without_history();
            let report = session.ask("").await?;
            print_timings(&report);
            Ok(())
        }
        Commands::Speakers => list_speakers(&config).await,
    }
}

fn init_logging(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<BotConfig> {
    match path {
        Some(path) => {
            let config = BotConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            tracing::info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => {
            tracing::info!("no config file given, using defaults");
            Ok(BotConfig::default())
        }
    }
}

async fn chat(config: &BotConfig, text_only: bool) -> Result<()> {
    let session = ChatSession::open(config, text_only).await?;
    let input = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    chat_loop(&session, input, &mut stdout, ctrl_c()).await
}

/// Resolves on Ctrl+C; never when the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Ctrl+C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Prompt, run a turn, repeat until `exit`, end of input or `interrupt`
///
/// `interrupt` is only checked at the prompt, so an interrupt that arrives
/// during a reply ends the session once that reply has finished.
async fn chat_loop<R, W, I>(
    session: &ChatSession,
    input: R,
    output: &mut W,
    interrupt: I,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    I: Future<Output = ()>,
{
    let mut lines = input.lines();
    tokio::pin!(interrupt);

    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let line = tokio::select! {
            biased;
            _ = &mut interrupt => {
                tracing::info!("interrupted");
                None
            }
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else {
            break;
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" {
            break;
        }

        // A failed turn ends that turn only; the session keeps going.
        match session.ask(question).await {
            Ok(report) => output.write_all(format_reply(&report).as_bytes()).await?,
            Err(e) => eprintln!("error: {:#}", e),
        }
    }

    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}

async fn list_speakers(config: &BotConfig) -> Result<()> {
    let client = VoicevoxClient::new(&config.tts).context("Failed to create TTS client")?;
    let voices = client
        .voices()
        .await
        .with_context(|| format!("Failed to list speakers from {}", config.tts.endpoint))?;

    for voice in voices {
        let marker = if voice.id == config.tts.voice.speaker_id {
            "*"
        } else {
            " "
        };
        println!("{} {:>4}  {}", marker, voice.id, voice.display_name());
    }
    Ok(())
}

fn format_reply(report: &TurnReport) -> String {
    match &report.filler {
        Some(filler) => format!("({})\n{}\n", filler, report.transcript),
        None => format!("{}\n", report.transcript),
    }
}

fn print_timings(report: &TurnReport) {
    let timings = &report.timings;
    println!("segments: {}", report.segments.len());
    for (i, segment) in report.segments.iter().enumerate() {
        println!("  {:>2}: {}", i, segment);
    }
    match timings.time_to_first_segment {
        Some(t) => println!("first segment: {:.3}s", t.as_secs_f64()),
        None => println!("first segment: -"),
    }
    println!("generation:    {:.3}s", timings.generation.as_secs_f64());
    match timings.total_speech {
        Some(t) => println!("speech:        {:.3}s", t.as_secs_f64()),
        None => println!("speech:        -"),
    }
}
