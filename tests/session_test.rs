mod common;

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use agentmark::{
    config::SessionConfig,
    evaluator::{CacheStatus, IntentState},
    generation::{
        EchoGenerator, GenerationError, GenerationKind, GenerationOutput, MockGenerator,
    },
    media::{InMemoryMediaStore, MediaStore},
    render::{marker, AdapterRegistry, Marker},
    Session, SessionContext, SessionEvent,
};
use common::{context, echo_context, PORTFOLIO};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_echo_session_generates_everything_eager() {
    let session = Session::new(echo_context(), PORTFOLIO);
    session.settled().await;

    let evaluator = session.evaluator();
    assert_eq!(
        evaluator
            .entry("3:Summarizer:Balance of {Wallet}")
            .unwrap()
            .value
            .as_deref(),
        Some("Summarizer: Balance of ABC123")
    );
    let image = evaluator.entry("image:4:Painter:a chart of {Wallet}").unwrap();
    assert_eq!(image.status, CacheStatus::Ready);
    let url = image.value.unwrap();
    assert!(url.starts_with("/api/media/image_4_Painter_"));
    assert!(url.ends_with(".png"));

    let rendered = session.render();
    assert!(rendered.contains(&format!("![Generated by Painter]({url})")));
    let speech = marker::decode(&rendered)
        .into_iter()
        .find(|m| matches!(m, Marker::AiSpeech { .. }))
        .unwrap();
    assert!(matches!(speech, Marker::AiSpeech { audio, .. } if audio.ends_with(".mp3")));
    assert_eq!(
        evaluator.intent_state("intent:6:Summarizer:Refresh {Wallet} now"),
        IntentState::Idle
    );
}

#[tokio::test]
async fn test_requests_carry_services_and_binding() {
    let mut generator = MockGenerator::new();
    generator
        .expect_generate()
        .withf(|request| {
            request.external_services.len() == 1
                && request.external_services[0].name == "SolanaMCP"
        })
        .returning(|request| match request.kind {
            GenerationKind::Text => {
                let tool = request
                    .bound_config
                    .as_ref()
                    .and_then(|config| config.capability.as_ref())
                    .map_or("none", |capability| capability.name.as_str());
                Ok(GenerationOutput::Content(format!("tool={tool}")))
            }
            _ => Err(GenerationError::Unsupported(request.kind)),
        });
    let session = Session::new(context(generator), PORTFOLIO);
    session.settled().await;

    let evaluator = session.evaluator();
    assert_eq!(
        evaluator
            .entry("3:Summarizer:Balance of {Wallet}")
            .unwrap()
            .value
            .as_deref(),
        Some("tool=Balance")
    );
    assert_eq!(
        evaluator
            .entry("7:Ghost:inside a code fence")
            .unwrap()
            .value
            .as_deref(),
        Some("tool=none")
    );
    let image = evaluator.entry("image:4:Painter:a chart of {Wallet}").unwrap();
    assert_eq!(image.status, CacheStatus::Failed);
    assert!(session.render().contains("⚠️ Painter: image generation is not supported"));
}

#[tokio::test]
async fn test_undersized_media_is_rejected() {
    let mut generator = MockGenerator::new();
    generator.expect_generate().returning(|request| {
        Ok(match request.kind {
            GenerationKind::Image => {
                GenerationOutput::Media("data:image/png;base64,QUJDREVGR0g=".into())
            }
            _ => GenerationOutput::Content("ok".into()),
        })
    });
    let store = Arc::new(InMemoryMediaStore::default());
    let session = Session::new(
        context(generator).with_media_store(store.clone()),
        PORTFOLIO,
    );
    session.settled().await;

    let image = session
        .evaluator()
        .entry("image:4:Painter:a chart of {Wallet}")
        .unwrap();
    assert_eq!(image.status, CacheStatus::Failed);
    assert!(image.error.unwrap().starts_with("incomplete data"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_snapshot_restores_without_requests() {
    let first = Session::new(echo_context(), PORTFOLIO);
    first.settled().await;
    let snapshot = first.snapshot();
    assert_eq!(snapshot.len(), 4);

    let mut generator = MockGenerator::new();
    generator.expect_generate().never();
    let second = Session::with_previews(context(generator), PORTFOLIO, snapshot);
    second.settled().await;
    assert_eq!(second.render(), first.render());
}

#[tokio::test]
async fn test_latest_override_wins() {
    let context = SessionContext::new(
        Arc::new(EchoGenerator::with_delay(Duration::from_millis(30))),
        SessionConfig::default(),
    );
    let mut session = Session::new(context, PORTFOLIO);
    session.settled().await;

    session.set_variable("define:2:Wallet", "FIRST").unwrap();
    session.set_variable("define:2:Wallet", "SECOND").unwrap();
    assert_eq!(
        session
            .evaluator()
            .entry("3:Summarizer:Balance of {Wallet}")
            .unwrap()
            .status,
        CacheStatus::Pending
    );
    session.settled().await;
    assert_eq!(
        session
            .evaluator()
            .entry("3:Summarizer:Balance of {Wallet}")
            .unwrap()
            .value
            .as_deref(),
        Some("Summarizer: Balance of SECOND")
    );
}

#[tokio::test]
async fn test_event_stream() {
    let mut session = Session::new(echo_context(), PORTFOLIO);
    let events: Vec<SessionEvent> = serde_json::from_str(
        r#"[
            {"type": "setVariable", "key": "define:2:Wallet", "value": "XYZ"},
            {"type": "triggerIntent", "key": "intent:6:Summarizer:Refresh {Wallet} now"}
        ]"#,
    )
    .unwrap();
    for event in events {
        session.apply(event).unwrap();
    }
    session.settled().await;

    let mut registry = AdapterRegistry::plain_text(session.intent_states());
    let rendered = session.render_with(&mut registry);
    assert!(rendered.contains("Wallet: \nWallet address (Wallet): XYZ"));
    assert!(rendered.contains("Summarizer: Balance of XYZ"));
    assert!(rendered.contains("[Refresh]\n\nSummarizer: Refresh XYZ now"));

    session
        .apply(SessionEvent::Edit {
            text: PORTFOLIO.replace("# Portfolio", "# Holdings"),
        })
        .unwrap();
    session.settled().await;
    assert!(session.render().starts_with("# Holdings"));
    assert!(session
        .evaluator()
        .entry("3:Summarizer:Balance of {Wallet}")
        .unwrap()
        .is_ready());
}

#[tokio::test]
async fn test_media_store_serves_stored_payloads() {
    let store = Arc::new(InMemoryMediaStore::default());
    let session = Session::new(
        context(EchoGenerator::default()).with_media_store(store.clone()),
        PORTFOLIO,
    );
    session.settled().await;
    assert_eq!(store.len(), 2);

    let url = session
        .evaluator()
        .entry("speech:5:Narrator:Read the summary")
        .and_then(|entry| entry.value)
        .unwrap();
    let bytes = store.fetch(&url).await.unwrap();
    assert_eq!(bytes.len(), 256);
    assert!(bytes.starts_with(b"Read the summary"));
    assert_eq!(store.get(&url).unwrap().mime_type, "audio/mpeg");
}

#[tokio::test]
async fn test_offline_variable_change_drops_saved_preview() {
    let mut generator = MockGenerator::new();
    generator.expect_generate().never();
    let previews = BTreeMap::from([(
        "3:Summarizer:Balance of {Wallet}".to_string(),
        "old ABC".to_string(),
    )]);
    let mut session = Session::with_previews(
        SessionContext::new(Arc::new(generator), SessionConfig::offline()),
        PORTFOLIO,
        previews,
    );
    assert!(session.render().contains("old ABC"));

    let rescheduled = session.set_variable("define:2:Wallet", "XYZ").unwrap();
    assert_eq!(rescheduled.len(), 2);
    assert_eq!(
        session
            .evaluator()
            .entry("3:Summarizer:Balance of {Wallet}")
            .unwrap()
            .status,
        CacheStatus::Pending
    );
    assert!(!session.render().contains("old ABC"));
    assert!(session.snapshot().is_empty());
}
