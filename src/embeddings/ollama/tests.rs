use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> OllamaClient {
    let address = server.address();
    let config = OllamaConfig {
        host: address.ip().to_string(),
        port: address.port(),
        embed_model: "nomic-embed-text".to_string(),
        chat_model: "llama3".to_string(),
        ..OllamaConfig::default()
    };
    OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_backoff(Duration::from_millis(1))
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        embed_model: "embed-model".to_string(),
        chat_model: "chat-model".to_string(),
        timeout_secs: 10,
        retry_attempts: 4,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.embed_model(), "embed-model");
    assert_eq!(client.chat_model(), "chat-model");
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, 4);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(0)
        .with_backoff(Duration::from_millis(5));

    assert_eq!(client.retry_attempts, 1);
    assert_eq!(client.backoff, Duration::from_millis(5));
}

#[test]
fn latest_tag_matches_bare_model_name() {
    assert!(model_matches("llama3:latest", "llama3"));
    assert!(model_matches("llama3:8b", "llama3:8b"));
    assert!(!model_matches("llama3:8b", "llama3"));
    assert!(!model_matches("llama3:latest", "llama3:8b"));
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_posts_input_and_reads_first_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "model": "nomic-embed-text",
            "input": "Yo is a local second brain."
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.1, 0.2, 0.3]] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let embedding = client_for(&server)
        .embed("Yo is a local second brain.")
        .expect("embedding succeeds");

    assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_embedding_response_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [] })))
        .mount(&server)
        .await;

    assert!(client_for(&server).embed("anything").is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0]] })))
        .mount(&server)
        .await;

    let embedding = client_for(&server)
        .with_retry_attempts(3)
        .embed("retry me")
        .expect("third attempt succeeds");

    assert_eq!(embedding, vec![1.0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server).with_retry_attempts(3).embed("missing model");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_is_non_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "model": "llama3", "stream": false })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "  Yo keeps your notes.\n", "done": true })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let answer = client_for(&server)
        .generate("What does Yo do?")
        .expect("generation succeeds");

    assert_eq!(answer, "Yo keeps your notes.");
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_requires_both_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "nomic-embed-text:latest", "size": 1 }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.list_models().expect("models listed").len(), 1);
    assert!(client.health_check().is_err());
}
