use rysen::config::LlmConfig;
use rysen::llm::openai::OpenAiClient;
use rysen::llm::{GenerationParams, LlmError, TextClassifier, TextGenerator};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> OpenAiClient {
    let config = LlmConfig {
        api_key: "test-key".into(),
        ..Default::default()
    };
    OpenAiClient::new(&config).with_base_url(server.uri())
}

fn completion(content: &str) -> serde_json::Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

#[tokio::test]
async fn generate_sends_model_system_and_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4-turbo",
            "temperature": 0.7,
            "max_tokens": 600,
            "messages": [
                { "role": "system", "content": "sys" },
                { "role": "user", "content": "Saint: Benedict" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("  **Saint Benedict**  ")))
        .expect(1)
        .mount(&server)
        .await;

    let params = GenerationParams::default()
        .with_model("gpt-4-turbo")
        .with_system("sys")
        .with_temperature(0.7)
        .with_max_tokens(600);
    let text = client(&server).generate("Saint: Benedict", &params).await.unwrap();
    assert_eq!(text, "**Saint Benedict**");
}

#[tokio::test]
async fn api_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let err = client(&server)
        .generate("hi", &GenerationParams::default())
        .await
        .unwrap_err();
    match err {
        LlmError::Api { status, message } => {
            assert_eq!(status, 429);
            assert_eq!(message, "rate limited");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_completion_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = client(&server)
        .generate("hi", &GenerationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::EmptyResponse));
}

#[tokio::test]
async fn classify_returns_raw_labels() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "temperature": 0.0, "max_tokens": 20 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("fear, trust")))
        .mount(&server)
        .await;

    let raw = client(&server)
        .classify("I'm worried about my exam", &["fear", "trust", "hope"])
        .await
        .unwrap();
    assert_eq!(raw, "fear, trust");
}

#[tokio::test]
async fn moderation_reads_flagged_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/moderations"))
        .and(body_partial_json(json!({ "model": "omni-moderation-latest", "input": "bad text" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "flagged": true, "categories": { "violence": true } }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/moderations"))
        .and(body_partial_json(json!({ "input": "kind text" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [{ "flagged": false }] })))
        .mount(&server)
        .await;

    let c = client(&server);
    assert!(c.is_flagged("bad text").await.unwrap());
    assert!(!c.is_flagged("kind text").await.unwrap());
}

#[tokio::test]
async fn undecodable_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/moderations"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client(&server).is_flagged("text").await.unwrap_err();
    assert!(matches!(err, LlmError::Decode(_)), "got {err:?}");
}
