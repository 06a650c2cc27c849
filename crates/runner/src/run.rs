use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use kanko_player::{AudioGuidePlayer, BridgeProvider, PlaybackState, SpotCue};
use kanko_runner::{RunnerConfig, Session};
use kanko_shared::{Command, Event};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MODEL_TIMEOUT: Duration = Duration::from_secs(30);
const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// `.env.local` wins over `.env`; both live at the workspace root.
fn load_dotenv_from_repo_root() {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
    for name in [".env.local", ".env"] {
        let path = root.join(name);
        if path.exists() {
            if let Err(e) = dotenvy::from_path(&path) {
                eprintln!("Failed to load {}: {e}", path.display());
            }
        }
    }
}

pub async fn run() -> Result<()> {
    load_dotenv_from_repo_root();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "kanko_runner=debug,kanko_viewer=debug,kanko_player=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kanko runner");

    let config = RunnerConfig::from_env().context("invalid configuration")?;
    tracing::info!(model_url = %config.viewer.model_url, "Configuration loaded");

    let mut session = Session::new(&config.viewer);

    let outcome = tokio::select! {
        result = tour(&mut session, &config) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, stopping");
            Ok(())
        }
    };

    session.send(Command::StopTts);
    session.send(Command::StopLipSync);
    tracing::info!("Tour ended");
    outcome
}

async fn tour(session: &mut Session, config: &RunnerConfig) -> Result<()> {
    session.start().await;

    let loaded = session
        .wait_for(MODEL_TIMEOUT, |e| {
            matches!(e, Event::ModelLoaded(_) | Event::ModelError(_))
        })
        .await?;
    let model = match loaded {
        Event::ModelLoaded(model) => model,
        Event::ModelError(err) => anyhow::bail!("model failed to load: {}", err.error),
        other => anyhow::bail!("unexpected event {}", other.tag()),
    };
    tracing::info!(
        motion_groups = ?model.motion_groups,
        expressions = ?model.expressions,
        "Avatar ready"
    );

    let expression = model.expressions.first().map(String::as_str);
    let motion = model.motion_groups.iter().find(|g| g.as_str() != "Idle");
    let cue = SpotCue::new(expression, motion.map(|group| (group.as_str(), 0)));
    let visit = cue.enter(session.bridge().clone());

    session.send(Command::start_tts(
        config.guide_text.clone(),
        config.guide_lang.clone(),
    ));
    let started = session
        .wait_for(STEP_TIMEOUT, |e| {
            matches!(e, Event::TtsStarted(_) | Event::TtsError(_))
        })
        .await?;
    if let Event::TtsStarted(payload) = &started {
        tracing::info!(seconds = payload.estimated_duration, "Narration started");
        let budget = Duration::from_secs(u64::from(payload.estimated_duration)) + STEP_TIMEOUT;
        session
            .wait_for(budget, |e| matches!(e, Event::TtsFinished))
            .await?;
        tracing::info!("Narration finished");
    }

    visit.leave();

    // Audio guide with no playable track: simulated lip-sync for its duration.
    let guide = BridgeProvider::scope(session.bridge().clone(), async {
        AudioGuidePlayer::from_context("", Some(2.0))
    })
    .await?;
    let mut playback = guide.watch();
    guide.play();
    tokio::time::timeout(
        STEP_TIMEOUT,
        playback.wait_for(|s| s.state == PlaybackState::Completed),
    )
    .await
    .context("audio guide did not complete")??;
    tracing::info!(time = %guide.time_label(), "Audio guide finished");

    Ok(())
}
