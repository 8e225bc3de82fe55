use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use radha_voice::events::{self, Event, SessionId};
use radha_voice::voice::{
    CapturePipeline, CpalInput, CpalOutput, PLAYBACK_SAMPLE_RATE, PlaybackScheduler, SAMPLE_RATE,
    encode_frame, rms, samples_to_wav,
};
use radha_voice::{Config, Daemon};

/// Radha - real-time voice conversations with a live AI model
#[derive(Parser)]
#[command(name = "radha", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Start talking immediately instead of waiting for Enter
    #[arg(long, env = "RADHA_AUTOSTART")]
    start: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the captured audio as a 16-bit WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output through the playback scheduler
    TestSpeaker,
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,radha_voice=info",
        1 => "info,radha_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
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
            Command::TestMic { duration, output } => test_mic(duration, output).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Config => show_config(),
        };
    }

    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");
    tracing::info!(
        model = %config.live.model,
        voice = %config.live.voice,
        block_frames = config.audio.block_frames,
        "starting voice client"
    );

    Daemon::new(config).run(cli.start).await?;
    Ok(())
}

/// Test microphone input through the capture pipeline
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let config = Config::load()?;
    let (events_tx, mut events_rx) = events::channel();
    let mut capture = CapturePipeline::new(Box::new(CpalInput::new()), config.audio.block_frames);

    capture.acquire()?;
    capture.start(SessionId::new(), events_tx)?;

    println!(
        "Sample rate: {SAMPLE_RATE} Hz, {} frames per block",
        config.audio.block_frames
    );
    println!("---");

    let mut recording = Vec::new();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut second = Vec::new();
        let mut blocks = 0;
        while let Ok(event) = events_rx.try_recv() {
            if let Event::CaptureBlock { samples, .. } = event {
                capture.encode_block(&samples);
                second.extend_from_slice(&samples);
                blocks += 1;
            }
        }

        let energy = rms(&second);
        let peak = second.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] blocks: {blocks:2} | RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]",
            i + 1
        );

        recording.extend(second);
    }

    capture.stop();

    println!("\n---");
    println!("{} blocks captured", capture.blocks_encoded());

    if let Some(path) = output {
        let wav = samples_to_wav(&recording, SAMPLE_RATE)?;
        std::fs::write(&path, wav)?;
        println!("Saved recording to {}", path.display());
    }

    println!("If RMS stayed near 0, check that your microphone is connected and unmuted.");
    Ok(())
}

/// Test speaker output: a tone encoded into chunks and scheduled back to back
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let (events_tx, mut events_rx) = events::channel();
    let session = SessionId::new();
    let mut playback = PlaybackScheduler::new(Box::new(CpalOutput::new()));
    playback.begin(session, events_tx)?;

    let frequency = 440.0_f32;
    let chunk_frames = PLAYBACK_SAMPLE_RATE as usize / 10;
    let total_frames = PLAYBACK_SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..total_frames)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    for chunk in samples.chunks(chunk_frames) {
        let encoded = encode_frame(chunk, PLAYBACK_SAMPLE_RATE);
        playback.enqueue(&encoded.data)?;
    }
    println!(
        "Scheduled {} chunks, playback ends at {:.2}s",
        playback.active_count(),
        playback.next_start()
    );

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while playback.active_count() > 0 {
            match events_rx.recv().await {
                Some(Event::PlaybackEnded { buffer, .. }) => {
                    playback.on_ended(buffer);
                }
                Some(_) => {}
                None => break,
            }
        }
    })
    .await;

    playback.close();

    if drained.is_err() {
        anyhow::bail!("playback did not finish; check your output device");
    }

    println!("Done! If you heard the tone, your speakers are working.");
    Ok(())
}

/// Print the resolved configuration with secrets redacted
fn show_config() -> anyhow::Result<()> {
    let config = Config::load()?;
    if let Some(path) = radha_voice::config::file::config_file_path() {
        println!("# config file: {}", path.display());
    }
    println!("{config}");
    Ok(())
}
