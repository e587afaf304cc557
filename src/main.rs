use std::io::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use mentor_live::voice::{self, AudioBackend, PcmBuffer, level};
use mentor_live::{
    ChatClient, Config, Conversation, CpalBackend, LiveController, LiveEvent, SessionSetup,
    Status, WebSocketConnector,
};

/// Width of the terminal level meter
const METER_WIDTH: usize = 40;

/// Mentor - talk to your AI career mentor
#[derive(Parser)]
#[command(name = "mentor", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start a live voice session (default)
    Voice,
    /// Chat with the mentor in text
    Chat {
        /// Send a single message and exit
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,mentor_live=info",
        1 => "info,mentor_live=debug",
        2 => "debug",
        _ => "trace",
    };

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
    match cli.command.unwrap_or(Command::Voice) {
        Command::Voice => voice_session(Config::load()).await,
        Command::Chat { message } => chat(&Config::load(), message).await,
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
    }
}

/// Run one live voice session until it ends or Ctrl-C
#[allow(clippy::future_not_send)]
async fn voice_session(config: Config) -> anyhow::Result<()> {
    let connector = WebSocketConnector::from_config(&config)?;
    let setup = SessionSetup::from_config(&config);
    tracing::debug!(model = %setup.model, voice = %setup.voice_name, "starting voice session");

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (controller, handle) = LiveController::new(CpalBackend, connector, setup, events_tx);

    handle.connect().await?;

    let ui = async {
        let mut last = Status::Disconnected;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    eprintln!();
                    handle.shutdown().await.ok();
                    break;
                }
                event = events.recv() => match event {
                    Some(LiveEvent::Level(rms)) => {
                        eprint!("\r[{}]", level::meter(rms, METER_WIDTH));
                        std::io::stderr().flush().ok();
                    }
                    Some(LiveEvent::Status(status)) => {
                        eprintln!("\rstatus: {status}");
                        if status == Status::Connected {
                            eprintln!("Speak to your mentor. Press Ctrl-C to end the session.");
                        }
                        last = status;
                        if matches!(status, Status::Disconnected | Status::Error) {
                            handle.shutdown().await.ok();
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        last
    };

    let ((), last) = tokio::join!(controller.run(), ui);

    if last == Status::Error {
        anyhow::bail!("live session failed");
    }
    Ok(())
}

/// Text chat, either one message or an interactive loop
#[allow(clippy::future_not_send)]
async fn chat(config: &Config, message: Option<String>) -> anyhow::Result<()> {
    let client = ChatClient::new(config)?;
    let mut conversation = Conversation::new();

    if let Some(message) = message {
        let reply = conversation.ask(&client, &message).await?;
        println!("{reply}");
        return Ok(());
    }

    println!("Chatting with {}. Empty line or Ctrl-D to quit.\n", client.model());

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        match conversation.ask(&client, line).await {
            Ok(reply) => println!("\nmentor> {reply}\n"),
            Err(e) => eprintln!("\nmentor is unavailable: {e}\n"),
        }
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut input = CpalBackend.open_input(voice::INPUT_SAMPLE_RATE).await?;

    let (tx, mut blocks) = mpsc::unbounded_channel::<Vec<f32>>();
    input.start(
        voice::FRAME_SIZE,
        Box::new(move |block: Vec<f32>| {
            tx.send(block).ok();
        }),
    )?;

    println!("Sample rate: {} Hz", voice::INPUT_SAMPLE_RATE);
    println!("---");

    let deadline = tokio::time::sleep(Duration::from_secs(duration));
    tokio::pin!(deadline);

    let mut count = 0u64;
    loop {
        tokio::select! {
            () = &mut deadline => break,
            block = blocks.recv() => {
                let Some(block) = block else { break };
                count += 1;
                let rms = level::rms(&block);
                println!(
                    "[{count:3}] RMS: {rms:.4} | Peak: {:.4} | [{}]",
                    level::peak(&block),
                    level::meter(rms, METER_WIDTH)
                );
            }
        }
    }

    input.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = voice::OUTPUT_SAMPLE_RATE;
    let mut output = CpalBackend.open_output(sample_rate)?;

    let frequency = 440.0_f32;
    let num_samples = usize::try_from(sample_rate * 2)?;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    let buffer = PcmBuffer {
        samples,
        sample_rate,
    };
    println!("Playing {} samples at {} Hz...", buffer.len(), sample_rate);

    let wait = Duration::from_secs_f64(buffer.duration() + 0.2);
    let now = output.current_time();
    let start = output.schedule(now, buffer);
    tracing::debug!(start, "test tone scheduled");
    tokio::time::sleep(wait).await;
    output.close();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
