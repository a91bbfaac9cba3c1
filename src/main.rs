use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use beacon_tts::metrics::{FileStore, KeyValueStore, UsageMetricsAggregator};
use beacon_tts::tts::{
    AudioFormat, GoogleTtsBackend, Priority, SynthesisOrchestrator, SynthesisRequest,
    SynthesisResponse, VoiceFilter, VoiceGender, VoiceTier, all_fallback_voices, cost_for,
    sort_by_tier,
};
use beacon_tts::{AudioPlaybackController, Config, SpeakerOutput, SystemClock};

/// Beacon TTS - cached, rate-limited speech synthesis
#[derive(Parser)]
#[command(name = "beacon-tts", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize text and play it, or write it to a file
    Speak {
        /// Text (or SSML with --ssml) to speak
        text: String,
        /// Voice name (e.g., "en-US-Neural2-F")
        #[arg(long)]
        voice: Option<String>,
        /// Language code (e.g., "en-US")
        #[arg(short, long)]
        language: Option<String>,
        /// Audio format: MP3, LINEAR16 or OGG_OPUS
        #[arg(short, long)]
        format: Option<AudioFormat>,
        /// Speaking rate (0.25 - 4.0)
        #[arg(long, default_value = "1.0")]
        rate: f64,
        /// Pitch in semitones (-20 - 20)
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        pitch: f64,
        /// Volume gain in dB (-96 - 16)
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        gain: f64,
        /// Treat the text as SSML
        #[arg(long)]
        ssml: bool,
        /// Bypass the audio cache
        #[arg(long)]
        no_cache: bool,
        /// Request priority: low, normal or high
        #[arg(long, default_value = "normal")]
        priority: Priority,
        /// Write audio to this file instead of playing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Estimate the cost of synthesizing text, without calling the backend
    Estimate {
        text: String,
        /// Voice tier: standard, wavenet, neural2, journey or studio
        #[arg(short, long, default_value = "standard")]
        tier: VoiceTier,
    },
    /// List available voices, best tier first
    Voices {
        #[arg(short, long)]
        language: Option<String>,
        #[arg(short, long)]
        tier: Option<VoiceTier>,
        #[arg(short, long)]
        gender: Option<VoiceGender>,
    },
    /// Show persisted usage metrics
    Usage,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,beacon_tts=info",
        1 => "info,beacon_tts=debug",
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

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Speak {
            text,
            voice,
            language,
            format,
            rate,
            pitch,
            gain,
            ssml,
            no_cache,
            priority,
            output,
        } => {
            let config = Config::load()?;
            let options = SpeakOptions {
                voice,
                language,
                format,
                rate,
                pitch,
                gain,
                ssml,
                no_cache,
                priority,
            };
            speak(config, &text, options, output).await
        }
        Command::Estimate { text, tier } => {
            let cost = cost_for(text.chars().count(), tier);
            println!(
                "{} characters at {} tier: ${cost:.5}",
                text.chars().count(),
                tier.as_str()
            );
            Ok(())
        }
        Command::Voices {
            language,
            tier,
            gender,
        } => {
            let filter = VoiceFilter {
                language_code: language,
                tier,
                gender,
            };
            voices(Config::load()?, &filter).await
        }
        Command::Usage => usage(Config::load()?).await,
    }
}

struct SpeakOptions {
    voice: Option<String>,
    language: Option<String>,
    format: Option<AudioFormat>,
    rate: f64,
    pitch: f64,
    gain: f64,
    ssml: bool,
    no_cache: bool,
    priority: Priority,
}

fn store_for(config: &Config) -> Option<Arc<dyn KeyValueStore>> {
    config
        .metrics
        .data_dir
        .as_ref()
        .map(|dir| Arc::new(FileStore::new(dir)) as Arc<dyn KeyValueStore>)
}

fn backend_for(config: &Config) -> anyhow::Result<Arc<GoogleTtsBackend>> {
    let key = config
        .api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("GOOGLE_TTS_API_KEY is not set"))?;
    Ok(Arc::new(GoogleTtsBackend::new(config.endpoint.clone(), key)?))
}

/// Synthesize `text`, then play it or write it out
async fn speak(
    config: Config,
    text: &str,
    options: SpeakOptions,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let backend = backend_for(&config)?;
    let playback = Arc::new(AudioPlaybackController::new(Arc::new(SpeakerOutput::new())));

    let store = store_for(&config);

    let mut builder =
        SynthesisOrchestrator::builder(config, backend).playback(Arc::clone(&playback));
    if let Some(store) = store {
        builder = builder.store(store);
    }
    let orchestrator = builder.build().await?;

    let mut request = orchestrator.request(text);
    if options.language.is_some() || options.voice.is_some() {
        let language = options
            .language
            .unwrap_or_else(|| request.language_code.clone());
        let voice = options.voice.unwrap_or_else(|| request.voice_id.clone());
        request = request.with_voice(language, voice);
    }
    if let Some(format) = options.format {
        request = request.with_format(format);
    }
    let request = request
        .with_speaking_rate(options.rate)
        .with_pitch(options.pitch)
        .with_volume_gain_db(options.gain)
        .with_ssml(options.ssml)
        .with_cache(!options.no_cache)
        .with_priority(options.priority);

    let result = deliver(&orchestrator, &playback, &request, output).await;
    orchestrator.destroy().await;
    let response = result?;

    println!(
        "voice: {} | cached: {} | cost: ${:.5} | took: {:?}",
        response.voice_name, response.cached, response.cost, response.processing_time
    );
    Ok(())
}

/// Write the audio to `output`, or play it and wait for the end
async fn deliver(
    orchestrator: &SynthesisOrchestrator,
    playback: &AudioPlaybackController,
    request: &SynthesisRequest,
    output: Option<PathBuf>,
) -> anyhow::Result<SynthesisResponse> {
    if let Some(path) = output {
        let response = orchestrator.synthesize(request).await?;
        tokio::fs::write(&path, response.audio.bytes()).await?;
        println!(
            "Wrote {} bytes ({:.2}s) to {}",
            response.audio.len(),
            response.metadata.duration_secs,
            path.display()
        );
        return Ok(response);
    }

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let response = orchestrator
        .synthesize_and_play(
            request,
            Some(Box::new(move || {
                let _ = done_tx.send(());
            })),
        )
        .await?;
    println!("Playing {:.2}s of audio...", response.metadata.duration_secs);

    tokio::select! {
        _ = done_rx => {}
        _ = tokio::signal::ctrl_c() => playback.stop(),
    }
    Ok(response)
}

/// List voices from the catalog, or the built-in list without a credential
async fn voices(config: Config, filter: &VoiceFilter) -> anyhow::Result<()> {
    let voices = if config.api_key.is_some() {
        let backend = backend_for(&config)?;
        let orchestrator = SynthesisOrchestrator::builder(config, backend)
            .build()
            .await?;
        let voices = orchestrator.get_all_voices(filter).await?;
        orchestrator.destroy().await;
        voices
    } else {
        tracing::warn!("GOOGLE_TTS_API_KEY is not set, listing built-in voices");
        let mut voices: Vec<_> = all_fallback_voices()
            .into_iter()
            .filter(|v| filter.matches(v))
            .collect();
        sort_by_tier(&mut voices);
        voices
    };

    for voice in &voices {
        println!(
            "{:<28} {:<8} {:<8} {}",
            voice.name,
            voice.tier.as_str(),
            format!("{:?}", voice.gender).to_lowercase(),
            voice.language_codes.join(",")
        );
    }
    println!("{} voices", voices.len());
    Ok(())
}

/// Print persisted usage metrics as JSON
async fn usage(config: Config) -> anyhow::Result<()> {
    let metrics = UsageMetricsAggregator::load(store_for(&config), Arc::new(SystemClock)).await;
    println!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);
    Ok(())
}
