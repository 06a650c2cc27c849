use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use kanko_player::{ConnectionState, HostBridge, SendOutcome};
use kanko_runner::{Session, SessionError};
use kanko_shared::{Command, Event, ExpressionErrorPayload, MotionPayload};
use kanko_viewer::{ViewerConfig, Viewport};
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

const SETTINGS: &str = r#"{
    "Version": 3,
    "FileReferences": {
        "Moc": "guide.moc3",
        "Motions": {
            "Idle": [{"File": "idle.motion3.json"}],
            "TapBody": [{"File": "tap_01.motion3.json"}, {"File": "tap_02.motion3.json"}]
        },
        "Expressions": [
            {"Name": "f01", "File": "f01.exp3.json"},
            {"Name": "smile", "File": "smile.exp3.json"}
        ]
    },
    "Layout": {"Width": 1000, "Height": 2000}
}"#;

fn settings_file() -> (tempfile::NamedTempFile, String) {
    let mut file = tempfile::Builder::new()
        .suffix(".model3.json")
        .tempfile()
        .expect("tempfile");
    file.write_all(SETTINGS.as_bytes()).expect("write settings");
    let url = Url::from_file_path(file.path())
        .expect("file url")
        .to_string();
    (file, url)
}

fn config(model_url: &str) -> ViewerConfig {
    ViewerConfig {
        model_url: model_url.to_string(),
        motion_clip: Duration::from_millis(50),
        relayout_delay: Duration::from_millis(10),
        fallback_viewport: Viewport::new(375.0, 300.0),
        ..ViewerConfig::default()
    }
}

async fn started(model_url: &str) -> Session {
    let mut session = Session::new(&config(model_url));
    session.start().await;
    session
        .wait_for(WAIT, |e| matches!(e, Event::Ready))
        .await
        .expect("ready");
    session
}

#[tokio::test]
async fn test_startup_reports_ready_then_model() {
    let (_file, url) = settings_file();
    let mut session = started(&url).await;

    let loaded = session
        .wait_for(WAIT, |e| matches!(e, Event::ModelLoaded(_)))
        .await
        .expect("model loaded");
    let Event::ModelLoaded(payload) = loaded else {
        panic!("unexpected event {loaded:?}");
    };
    assert_eq!(payload.model_url, url);
    assert_eq!(payload.motion_groups, vec!["Idle", "TapBody"]);
    assert_eq!(payload.expressions, vec!["f01", "smile"]);
    assert_eq!(session.bridge().connection_state(), ConnectionState::Ready);
    assert_eq!(session.renderer().staged(), vec![url]);
}

#[tokio::test]
async fn test_missing_model_reports_error_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = Url::from_file_path(dir.path().join("absent.model3.json"))
        .expect("file url")
        .to_string();
    let mut session = started(&missing).await;

    let error = session
        .wait_for(WAIT, |e| matches!(e, Event::ModelError(_)))
        .await
        .expect("model error");
    let Event::ModelError(payload) = error else {
        panic!("unexpected event {error:?}");
    };
    assert_eq!(payload.model_url.as_deref(), Some(missing.as_str()));

    let mut observer = session.bridge().observer();
    for _ in 0..50 {
        if observer.connection_state() == ConnectionState::Error {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(observer.connection_state(), ConnectionState::Error);
    assert!(!observer.is_ready());
}

#[tokio::test]
async fn test_motion_and_expression_results() {
    let (_file, url) = settings_file();
    let mut session = started(&url).await;
    session
        .wait_for(WAIT, |e| matches!(e, Event::ModelLoaded(_)))
        .await
        .expect("model loaded");

    assert_eq!(
        session.send(Command::play_motion("TapBody", Some(1), None)),
        SendOutcome::Delivered
    );
    let finished = session
        .wait_for(WAIT, |e| matches!(e, Event::MotionFinished(p) if p.group == "TapBody"))
        .await
        .expect("motion finished");
    assert_eq!(
        finished,
        Event::MotionFinished(MotionPayload {
            group: "TapBody".to_string(),
            index: 1,
        })
    );

    session.send(Command::set_expression("wink"));
    let error = session
        .wait_for(WAIT, |e| matches!(e, Event::ExpressionError(_)))
        .await
        .expect("expression error");
    assert!(matches!(
        error,
        Event::ExpressionError(ExpressionErrorPayload { ref expression_id, .. })
            if expression_id == "wink"
    ));

    session.send(Command::set_expression("smile"));
    let mut applied = None;
    for _ in 0..50 {
        applied = session
            .renderer()
            .staged_model()
            .and_then(|m| m.expression());
        if applied.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(applied.as_deref(), Some("smile"));
}

#[tokio::test]
async fn test_speech_start_and_finish() {
    let (_file, url) = settings_file();
    let mut session = started(&url).await;
    session
        .wait_for(WAIT, |e| matches!(e, Event::ModelLoaded(_)))
        .await
        .expect("model loaded");

    session.send(Command::start_tts("Hello", "en"));
    let started = session
        .wait_for(WAIT, |e| matches!(e, Event::TtsStarted(_)))
        .await
        .expect("tts started");
    let Event::TtsStarted(payload) = started else {
        panic!("unexpected event {started:?}");
    };
    assert_eq!(payload.estimated_duration, 1);

    session
        .wait_for(WAIT, |e| matches!(e, Event::TtsFinished))
        .await
        .expect("tts finished");
}

#[tokio::test]
async fn test_stop_tts_is_silent() {
    let (_file, url) = settings_file();
    let mut session = started(&url).await;
    session
        .wait_for(WAIT, |e| matches!(e, Event::ModelLoaded(_)))
        .await
        .expect("model loaded");

    session.send(Command::start_tts("Hello", "en"));
    session
        .wait_for(WAIT, |e| matches!(e, Event::TtsStarted(_)))
        .await
        .expect("tts started");
    session.send(Command::StopTts);

    let after = session
        .wait_for(Duration::from_millis(1500), |e| {
            matches!(e, Event::TtsFinished | Event::TtsError(_) | Event::LipSyncFinished)
        })
        .await;
    assert!(matches!(after, Err(SessionError::Timeout(_))));
}

#[tokio::test]
async fn test_command_before_attach_is_dropped() {
    let bridge = Arc::new(HostBridge::default());
    assert_eq!(
        bridge.send_command(Command::set_expression("f01")),
        SendOutcome::Dropped
    );
    assert_eq!(bridge.connection_state(), ConnectionState::Loading);
}
