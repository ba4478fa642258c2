use api_lib::adapters::{portrait::PORTRAIT_FAILED_MESSAGE, GeminiPortraitAdapter};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pet_tales_core::domain::{ImagePayload, PortraitOptions};
use pet_tales_core::ports::{PortError, PortraitService};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "image-model";

fn adapter(server: &MockServer) -> GeminiPortraitAdapter {
    GeminiPortraitAdapter::new(
        reqwest::Client::new(),
        "test-key".to_string(),
        server.uri(),
        MODEL.to_string(),
    )
}

fn photo() -> ImagePayload {
    ImagePayload {
        mime_type: "image/jpeg".to_string(),
        data: vec![0xFF, 0xD8, 0xFF, 0xD9],
    }
}

fn options() -> PortraitOptions {
    PortraitOptions {
        art_style: "Classic Storybook".to_string(),
        age: "Adult".to_string(),
        setting: "Cozy Living Room".to_string(),
        activity: "Napping".to_string(),
        collar_color: "Blue".to_string(),
        magic_moment: "Peace".to_string(),
    }
}

#[tokio::test]
async fn returns_the_generated_image() {
    let server = MockServer::start().await;
    let generated = vec![0x89, b'P', b'N', b'G'];

    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{}:generateContent", MODEL)))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(serde_json::json!({
            "generationConfig": { "responseModalities": ["IMAGE", "TEXT"] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "A portrait of your pet." },
                        { "inlineData": { "mimeType": "image/png", "data": STANDARD.encode(&generated) } }
                    ]
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let portrait = adapter(&server)
        .generate_portrait(&photo(), &options())
        .await
        .unwrap();

    assert_eq!(portrait.mime_type, "image/png");
    assert_eq!(portrait.data, generated);
}

#[tokio::test]
async fn sends_the_photo_and_the_prompt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": "image/jpeg", "data": STANDARD.encode(photo().data) } }
                ]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "inlineData": { "mimeType": "image/png", "data": "AA==" } }] }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    adapter(&server)
        .generate_portrait(&photo(), &options())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let prompt = body["contents"][0]["parts"][1]["text"].as_str().unwrap();
    assert!(prompt.contains("Classic Storybook"));
    assert!(prompt.contains("wearing a blue collar"));
}

#[tokio::test]
async fn server_errors_become_the_portrait_failure_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .generate_portrait(&photo(), &options())
        .await
        .unwrap_err();

    match err {
        PortError::Unexpected(message) => assert_eq!(message, PORTRAIT_FAILED_MESSAGE),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn blocked_answers_without_an_image_fail() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't help with that." }] } }]
        })))
        .mount(&server)
        .await;

    let result = adapter(&server).generate_portrait(&photo(), &options()).await;
    assert!(matches!(result, Err(PortError::Unexpected(_))));
}
