use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rafiq::console::{ConsoleSynthesizer, EchoExecutor, LogDialer, spawn_stdin_reader};
use rafiq::router::UnavailableModel;
use rafiq::voice::{FeedRecognizer, PhraseWakeDetector, WakePhraseMatcher, transcript_feed};
use rafiq::{
    AssistantBuilder, Config, ConfidenceRouter, DeviceProfile, DeviceTier, IntentKind,
    InteractionMode, ResourceGovernor, Utterance,
};

/// Rafiq - Voice assistant core for Egyptian-Arabic speakers
#[derive(Parser)]
#[command(name = "rafiq", version, about)]
struct Cli {
    /// Device tier (low, mid, high, elite); probed when omitted
    #[arg(long, env = "RAFIQ_TIER")]
    tier: Option<DeviceTier>,

    /// Senior mode: simplified prompts and a restricted command set
    #[arg(long)]
    senior: bool,

    /// Privacy mode: nothing leaves the device
    #[arg(long)]
    privacy: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session on stdin/stdout (default)
    Console,
    /// Show the resolved device profile
    Profile,
    /// Show how an utterance would be routed and resolved
    Route {
        /// Utterance text
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,rafiq=info",
        1 => "info,rafiq=debug",
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
    let mode = InteractionMode {
        senior: cli.senior,
        privacy: cli.privacy,
    };
    let config = Config::load_with_options(cli.tier, mode)?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Console) {
        Command::Console => console(config).await,
        Command::Profile => profile(&config),
        Command::Route { text } => route(&config, &text).await,
    }
}

/// Print the device profile as JSON
fn profile(config: &Config) -> anyhow::Result<()> {
    let profile = DeviceProfile::detect(config.tier);
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

/// Route one utterance with no models attached
async fn route(config: &Config, text: &str) -> anyhow::Result<()> {
    let profile = DeviceProfile::detect(config.tier);
    let governor = ResourceGovernor::new(&profile, &config.governor);
    let router = ConfidenceRouter::new(
        Arc::new(UnavailableModel::new("local")),
        Arc::new(UnavailableModel::new("remote")),
        governor.clone(),
        &profile,
        &config.router,
    );

    let utterance = Utterance::detached(text);
    let plan = router.plan(&utterance, config.mode);
    let result = router.resolve(&utterance, config.mode).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "normalized": utterance.normalized,
            "plan": plan,
            "result": result,
        }))?
    );

    governor.shutdown(std::time::Duration::from_secs(1)).await;
    Ok(())
}

/// Interactive session: typed lines stand in for recognized speech
async fn console(config: Config) -> anyhow::Result<()> {
    let matcher = WakePhraseMatcher::new(config.wake_phrases.clone())?;
    let phrases = matcher.phrases().join(" / ");

    let (tx, feed) = transcript_feed(16);

    let wake_feed = Arc::clone(&feed);
    let mut builder = AssistantBuilder::new(config)
        .wake_detector(move |signal| Arc::new(PhraseWakeDetector::new(matcher, wake_feed, signal)))
        .recognizer(Arc::new(FeedRecognizer::new(feed)))
        .synthesizer(Arc::new(ConsoleSynthesizer))
        .dialer(Arc::new(LogDialer));

    for intent in [
        IntentKind::CallContact,
        IntentKind::SendMessage,
        IntentKind::SetAlarm,
        IntentKind::CancelAlarm,
        IntentKind::ReadMissedCalls,
        IntentKind::VolumeUp,
        IntentKind::VolumeDown,
    ] {
        builder = builder.executor(intent, Arc::new(EchoExecutor));
    }

    let assistant = builder.build()?;
    spawn_stdin_reader(tx, assistant.preemptor().clone());
    tracing::info!("rafiq ready - say \"{phrases}\"");
    tracing::info!("during an emergency type /answered, /safe or /cancel; /fall raises a fall");

    assistant.run().await?;
    Ok(())
}
