mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{FakeClassifier, ScriptedGenerator, StalledGenerator};
use rysen::chat::messages;
use rysen::chat::service::{NewMessage, MODERATION_FALLBACK};
use rysen::chat::{ChatError, UserProfile};
use rysen::llm::LlmError;
use rysen::memory::Theme;

fn message(session_id: &str, text: &str) -> NewMessage {
    NewMessage {
        chat_session_id: session_id.to_string(),
        user_id: "u1".into(),
        sender: "user".into(),
        text: text.into(),
        user_email: Some("u1@example.com".into()),
        profile: UserProfile {
            avatar: "Pio".into(),
            age_range: "1990".into(),
            response_style: "default".into(),
            ..Default::default()
        },
    }
}

fn log(h: &helpers::Harness, session_id: &str) -> Vec<(String, String)> {
    let conn = h.db.lock().unwrap();
    messages::session_messages(&conn, session_id)
        .unwrap()
        .into_iter()
        .map(|m| (m.sender, m.text))
        .collect()
}

#[tokio::test]
async fn structured_reply_is_stored_after_user_message() {
    let generator = Arc::new(ScriptedGenerator::always(
        r#"{"answer": "Be not afraid.", "follow_ups": ["How to trust more?", "Pray with me"]}"#,
    ));
    let h = helpers::harness(generator.clone(), Arc::new(FakeClassifier::themes("fear, trust")));
    let session = h.service.create_session("u1", None).await.unwrap();

    let reply = h.service.send_message(message(&session.id, "I am anxious")).await.unwrap();
    assert_eq!(reply.sender, "ai");
    assert_eq!(reply.text, "Be not afraid.");
    assert_eq!(reply.follow_ups.unwrap(), ["How to trust more?", "Pray with me"]);

    assert_eq!(
        log(&h, &session.id),
        [
            ("user".to_string(), "I am anxious".to_string()),
            ("ai".to_string(), "Be not afraid.".to_string()),
        ]
    );

    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.contains("fear, trust"));
    assert!(prompt.contains("I am anxious"), "context includes the just-stored message");
    assert_eq!(
        h.service.tracker().current_themes("u1").await.unwrap(),
        [Theme::Fear, Theme::Trust]
    );
}

#[tokio::test]
async fn unstructured_reply_is_used_verbatim() {
    let generator = Arc::new(ScriptedGenerator::always("  Peace be with you.  "));
    let h = helpers::harness(generator, Arc::new(FakeClassifier::themes("hope")));
    let session = h.service.create_session("u1", None).await.unwrap();

    let reply = h.service.send_message(message(&session.id, "hello")).await.unwrap();
    assert_eq!(reply.text, "Peace be with you.");
    assert_eq!(reply.follow_ups.unwrap(), Vec::<String>::new());
}

#[tokio::test]
async fn flagged_message_gets_fallback_without_generation() {
    let generator = Arc::new(ScriptedGenerator::always("should not be used"));
    let h = helpers::harness(generator.clone(), Arc::new(FakeClassifier::flagging()));
    let session = h.service.create_session("u1", None).await.unwrap();

    let reply = h.service.send_message(message(&session.id, "something harmful")).await.unwrap();
    assert_eq!(reply.text, MODERATION_FALLBACK);
    assert_eq!(generator.calls(), 0);
    assert!(h.service.tracker().record("u1").await.unwrap().is_none());

    let flagged: i64 = h
        .db
        .lock()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM flagged_responses", [], |r| r.get(0))
        .unwrap();
    assert_eq!(flagged, 1);
}

#[tokio::test]
async fn flag_store_failure_still_returns_fallback() {
    let generator = Arc::new(ScriptedGenerator::always("should not be used"));
    let h = helpers::harness(generator.clone(), Arc::new(FakeClassifier::flagging()));
    let session = h.service.create_session("u1", None).await.unwrap();
    h.db.lock().unwrap().execute_batch("DROP TABLE flagged_responses").unwrap();

    let reply = h.service.send_message(message(&session.id, "something harmful")).await.unwrap();
    assert_eq!(reply.text, MODERATION_FALLBACK);
    assert_eq!(generator.calls(), 0);
    assert_eq!(
        log(&h, &session.id),
        [
            ("user".to_string(), "something harmful".to_string()),
            ("ai".to_string(), MODERATION_FALLBACK.to_string()),
        ]
    );
}

#[tokio::test]
async fn generation_failure_keeps_user_message_only() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Err(LlmError::Api {
        status: 500,
        message: "upstream down".into(),
    })]));
    let h = helpers::harness(generator, Arc::new(FakeClassifier::themes("grief")));
    let session = h.service.create_session("u1", None).await.unwrap();

    let err = h.service.send_message(message(&session.id, "I lost my job")).await.unwrap_err();
    assert!(matches!(err, ChatError::Generation(LlmError::Api { status: 500, .. })));
    assert_eq!(log(&h, &session.id), [("user".to_string(), "I lost my job".to_string())]);
    assert_eq!(
        h.service.tracker().current_themes("u1").await.unwrap(),
        [Theme::Grief],
        "themes were tracked before generation"
    );
}

#[tokio::test(start_paused = true)]
async fn generation_timeout_is_an_error() {
    let h = helpers::harness_with_timeout(
        Arc::new(StalledGenerator),
        Arc::new(FakeClassifier::themes("hope")),
        Duration::from_secs(10),
    );
    let session = h.service.create_session("u1", None).await.unwrap();

    let err = h.service.send_message(message(&session.id, "hello")).await.unwrap_err();
    assert!(matches!(err, ChatError::Generation(LlmError::Timeout(_))));
}

#[tokio::test]
async fn theme_failure_still_yields_a_reply() {
    let generator = Arc::new(ScriptedGenerator::always(r#"{"answer": "God is near.", "follow_ups": []}"#));
    let h = helpers::harness(generator.clone(), Arc::new(FakeClassifier::failing()));
    let session = h.service.create_session("u1", None).await.unwrap();

    let reply = h.service.send_message(message(&session.id, "hello")).await.unwrap();
    assert_eq!(reply.text, "God is near.");
    assert!(!generator.last_prompt().unwrap().contains("exploring themes"));
}

#[tokio::test]
async fn memory_store_failure_still_yields_a_reply() {
    let generator = Arc::new(ScriptedGenerator::always("Peace."));
    let h = helpers::harness(generator.clone(), Arc::new(FakeClassifier::themes("grief")));
    let session = h.service.create_session("u1", None).await.unwrap();
    h.db.lock().unwrap().execute_batch("DROP TABLE pastoral_memory").unwrap();

    let reply = h.service.send_message(message(&session.id, "My father died")).await.unwrap();
    assert_eq!(reply.text, "Peace.");
    assert!(
        generator.last_prompt().unwrap().contains("grief"),
        "freshly extracted themes still shape the prompt"
    );
    assert_eq!(log(&h, &session.id).len(), 2);
}

#[tokio::test]
async fn prayer_uses_tracked_themes() {
    let generator = Arc::new(ScriptedGenerator::always("Lord, grant me peace. Amen."));
    let h = helpers::harness(generator.clone(), Arc::new(FakeClassifier::themes("healing")));
    let session = h.service.create_session("u1", Some("prayer")).await.unwrap();

    let reply = h.service.prayer_message(message(&session.id, "for my sick mother")).await.unwrap();
    assert_eq!(reply.text, "Lord, grant me peace. Amen.");
    assert!(reply.follow_ups.is_none());
    assert!(generator.last_prompt().unwrap().contains("healing"));
}

#[tokio::test]
async fn message_to_unknown_session_fails_before_generation() {
    let generator = Arc::new(ScriptedGenerator::always("unused"));
    let h = helpers::harness(generator.clone(), Arc::new(FakeClassifier::themes("hope")));

    assert!(h.service.send_message(message("no-such-session", "hello")).await.is_err());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn sessions_list_newest_first_and_skip_old_ones() {
    let generator = Arc::new(ScriptedGenerator::always("ok"));
    let h = helpers::harness(generator, Arc::new(FakeClassifier::themes("hope")));

    let old = h.service.create_session("u1", None).await.unwrap();
    h.service.send_message(message(&old.id, "first")).await.unwrap();

    h.clock.advance(chrono::Duration::days(31));
    let recent = h.service.create_session("u1", None).await.unwrap();
    h.service.send_message(message(&recent.id, "second")).await.unwrap();
    h.clock.advance(chrono::Duration::hours(1));
    let newest = h.service.create_session("u1", None).await.unwrap();
    h.service.send_message(message(&newest.id, "third")).await.unwrap();

    let listed: Vec<String> = h
        .service
        .list_sessions("u1")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.session.id)
        .collect();
    assert_eq!(listed, [newest.id, recent.id]);
}

#[tokio::test]
async fn delete_user_data_clears_sessions() {
    let generator = Arc::new(ScriptedGenerator::always("ok"));
    let h = helpers::harness(generator, Arc::new(FakeClassifier::themes("hope")));
    let session = h.service.create_session("u1", None).await.unwrap();
    h.service.send_message(message(&session.id, "hello")).await.unwrap();

    let deleted = h.service.delete_user_data("u1").await.unwrap();
    assert_eq!(deleted.sessions, 1);
    assert_eq!(deleted.messages, 2);
    assert!(matches!(
        h.service.get_session(&session.id, "u1").await,
        Err(ChatError::NotFound(_))
    ));
}
