use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use webvoice::acquisition::{ContentRetriever, PageRetriever};
use webvoice::voice::{
    AudioOutput, CpalOutput, ListenFailure, MicrophoneListener, PLAYBACK_SAMPLE_RATE, PcmBuffer,
    SpeechCapture, SpeechSynthesizer, SpeechToText,
};
use webvoice::{Config, GeminiClient, Orchestrator, SessionState, SubmitOutcome, Turn};

/// webvoice - Talk with any web page
#[derive(Parser)]
#[command(name = "webvoice", version, about)]
struct Cli {
    /// Page to analyze right away
    url: Option<String>,

    /// Take spoken questions from the microphone
    #[arg(long, env = "WEBVOICE_VOICE")]
    voice: bool,

    /// Disable speech output (for machines without audio hardware)
    #[arg(long, env = "WEBVOICE_NO_AUDIO")]
    no_audio: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Fetch a page and show what would be used as context
    Fetch {
        /// Page URL
        url: String,
    },
}

/// One line of REPL input
enum Input {
    Line(Option<String>),
    Heard(webvoice::Result<Option<String>>),
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,webvoice=info",
        1 => "info,webvoice=debug",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr so the conversation on stdout stays readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
            Command::Fetch { url } => fetch(&url).await,
        };
    }

    let config = Config::load_with_options(cli.no_audio)?;
    tracing::debug!(?config, "loaded configuration");

    let orchestrator = Orchestrator::from_config(&config)?;

    let mut listener = if cli.voice {
        match SpeechToText::new_whisper(
            config.voice.openai_api_key.clone(),
            config.voice.stt_model.clone(),
        ) {
            Ok(stt) => Some(MicrophoneListener::new(stt)),
            Err(e) => {
                println!("Voice input unavailable ({e}); type your questions instead.");
                None
            }
        }
    } else {
        None
    };

    if let Some(url) = cli.url.as_deref() {
        analyze(&orchestrator, url).await;
    } else {
        println!("Enter a URL to analyze.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt(&orchestrator);

        let listening = listener.is_some() && orchestrator.state() == SessionState::Conversing;
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            heard = hear(&orchestrator, listener.as_mut()), if listening => Input::Heard(heard),
            _ = tokio::signal::ctrl_c() => Input::Interrupted,
        };

        let line = match input {
            Input::Line(Some(line)) => {
                if let Some(listener) = listener.as_mut() {
                    listener.stop();
                }
                line
            }
            Input::Line(None) | Input::Interrupted => break,
            Input::Heard(Ok(Some(text))) => {
                println!("{text}");
                text
            }
            Input::Heard(Ok(None)) => {
                println!();
                continue;
            }
            Input::Heard(Err(e)) => {
                match ListenFailure::classify(&e) {
                    ListenFailure::Disable => {
                        println!("\nMicrophone unavailable ({e}); type your questions instead.");
                        listener = None;
                    }
                    ListenFailure::Retry => {
                        tracing::warn!(error = %e, "transcription failed");
                        println!("\nCould not transcribe that ({e}); still listening.");
                    }
                }
                continue;
            }
        };

        let line = line.trim();
        match line {
            "/quit" | "/exit" => break,
            "/reset" | "/url" => {
                orchestrator.reset();
                println!("Enter a URL to analyze.");
            }
            "/sources" => print_sources(&orchestrator),
            "" => {}
            _ => {
                // Requests are bounded by the Gemini timeout; ctrl-c still quits early
                tokio::select! {
                    () = handle_line(&orchestrator, line) => {}
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    orchestrator.reset();
    Ok(())
}

fn prompt(orchestrator: &Orchestrator) {
    match orchestrator.state() {
        SessionState::Idle => print!("url> "),
        _ => print!("you> "),
    }
    let _ = std::io::stdout().flush();
}

/// Analyze `line` as a URL when idle, otherwise ask it as a question
async fn handle_line(orchestrator: &Orchestrator, line: &str) {
    if orchestrator.state() == SessionState::Idle {
        analyze(orchestrator, line).await;
        return;
    }

    match orchestrator.submit(line).await {
        SubmitOutcome::Replied(turn) => print_turn(&turn),
        SubmitOutcome::Ignored(reason) => tracing::debug!(%reason, "input ignored"),
    }
}

/// Start a conversation about `url` and print the opening turn
async fn analyze(orchestrator: &Orchestrator, url: &str) {
    println!("Analyzing {url}...");
    match orchestrator.start(url).await {
        Ok(Some(turn)) => {
            if orchestrator.snapshot().grounding_active() {
                println!("(page could not be read directly; answering from web search)");
            }
            print_turn(&turn);
        }
        Ok(None) => {}
        Err(e) => println!("Could not analyze that page: {e}"),
    }
}

/// Wait for speech output to finish, then capture one utterance
#[allow(clippy::future_not_send)]
async fn hear(
    orchestrator: &Orchestrator,
    listener: Option<&mut MicrophoneListener>,
) -> webvoice::Result<Option<String>> {
    let Some(listener) = listener else {
        return std::future::pending().await;
    };

    // Don't transcribe our own voice
    let mut events = orchestrator.playback().subscribe();
    while orchestrator.is_speaking() {
        // Poll on a timeout too: synthesis that yields no audio ends silently
        let next = tokio::time::timeout(Duration::from_millis(250), events.recv()).await;
        if let Ok(Err(RecvError::Closed)) = next {
            break;
        }
    }

    listener.listen().await
}

fn print_turn(turn: &Turn) {
    println!("\nassistant> {}\n", turn.text);
    if !turn.citations.is_empty() {
        println!("({} sources, /sources to list)", turn.citations.len());
    }
}

fn print_sources(orchestrator: &Orchestrator) {
    let session = orchestrator.snapshot();
    let Some(turn) = session
        .transcript
        .iter()
        .rev()
        .find(|t| !t.citations.is_empty())
    else {
        println!("No sources for this conversation.");
        return;
    };

    for (i, source) in turn.citations.iter().enumerate() {
        println!("  [{}] {} - {}", i + 1, source.label, source.uri);
    }
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), PLAYBACK_SAMPLE_RATE);

    play(PcmBuffer {
        samples,
        sample_rate: PLAYBACK_SAMPLE_RATE,
        channels: 1,
    })
    .await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output via Gemini
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let gemini = GeminiClient::new(&config.gemini)?;

    println!("Synthesizing speech...");
    let pcm = gemini
        .synthesize(text)
        .await?
        .ok_or_else(|| anyhow::anyhow!("TTS returned no audio"))?;
    println!("Got {} bytes of audio data", pcm.len());

    let buffer = PcmBuffer::from_le_bytes(&pcm);
    println!("Playing {} ms of audio...", buffer.duration_ms());
    play(buffer).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Fetch a page and print the extracted context
async fn fetch(url: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let retriever = PageRetriever::new(&config.acquisition)?;

    let acquisition = retriever.acquire(url).await;
    if !acquisition.acquired {
        println!("Could not read {url}; a conversation would fall back to search grounding.");
        return Ok(());
    }

    println!("Title: {}", acquisition.title);
    println!("Characters: {}", acquisition.content.chars().count());
    println!("---");
    let preview: String = acquisition.content.chars().take(500).collect();
    println!("{preview}");

    Ok(())
}

/// Play a buffer on the default device and wait for it to drain
async fn play(buffer: PcmBuffer) -> anyhow::Result<()> {
    let output = CpalOutput::new();
    let done = output.start(buffer)?;

    match done.await {
        Ok(webvoice::voice::DeviceEvent::Completed) => Ok(()),
        Ok(webvoice::voice::DeviceEvent::Failed(reason)) => {
            anyhow::bail!("playback failed: {reason}")
        }
        Err(_) => anyhow::bail!("output device stopped unexpectedly"),
    }
}
