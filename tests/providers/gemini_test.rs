//! Gemini provider wire format tests.

use deskmate::conversation::ConversationTurn;
use deskmate::providers::gemini::{build_request, parse_response, GeminiProvider};
use deskmate::providers::{CompletionRequest, LlmProvider, ProviderError};

use crate::http::serve_once;

fn request(json_output: bool) -> CompletionRequest {
    CompletionRequest {
        history: vec![
            ConversationTurn::user("What's next?"),
            ConversationTurn::model(r#"{"code":1,"output":"Standup at 9"}"#),
        ],
        prompt: "augmented prompt".to_owned(),
        max_output_tokens: 1000,
        json_output,
    }
}

#[test]
fn build_request_appends_prompt_after_history() {
    let req = build_request(&request(true));
    let roles: Vec<&str> = req.contents.iter().map(|c| c.role.as_str()).collect();
    assert_eq!(roles, ["user", "model", "user"]);
    assert_eq!(
        req.contents[2].parts[0].text.as_deref(),
        Some("augmented prompt")
    );
}

#[test]
fn build_request_serializes_generation_config() {
    let body = serde_json::to_value(build_request(&request(true))).expect("serializes");
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 1000);
    assert_eq!(
        body["generationConfig"]["responseMimeType"],
        "application/json"
    );

    let body = serde_json::to_value(build_request(&request(false))).expect("serializes");
    assert!(body["generationConfig"].get("responseMimeType").is_none());
}

#[test]
fn parse_response_concatenates_first_candidate_parts() {
    let body = r#"{
        "candidates": [
            {"content": {"role": "model", "parts": [{"text": "{\"code\":1,"}, {"text": "\"output\":\"Hi\"}"}]},
             "finishReason": "STOP"},
            {"content": {"role": "model", "parts": [{"text": "ignored"}]}}
        ],
        "usageMetadata": {"promptTokenCount": 321, "candidatesTokenCount": 12}
    }"#;
    let resp = parse_response(body).expect("valid body");
    assert_eq!(resp.text, r#"{"code":1,"output":"Hi"}"#);
    assert_eq!(resp.finish_reason.as_deref(), Some("STOP"));
    assert_eq!(resp.usage.input_tokens, 321);
    assert_eq!(resp.usage.output_tokens, 12);
}

#[test]
fn parse_response_without_candidates_is_an_error() {
    let err = parse_response(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)
        .expect_err("no candidates");
    assert!(matches!(err, ProviderError::Parse(_)));
}

#[test]
fn parse_response_rejects_garbage() {
    assert!(matches!(
        parse_response("<html>"),
        Err(ProviderError::Parse(_))
    ));
}

#[test]
fn debug_redacts_api_key() {
    let provider = GeminiProvider::new("gemini-2.0-flash".to_owned(), "AIza-secret".to_owned());
    let debug = format!("{provider:?}");
    assert!(!debug.contains("AIza-secret"));
    assert!(debug.contains("[REDACTED]"));
    assert_eq!(provider.model_id(), "gemini-2.0-flash");
}

#[tokio::test]
async fn complete_posts_to_generate_content_with_key_header() {
    let served = serve_once(
        "200 OK",
        "application/json",
        r#"{"candidates":[{"content":{"parts":[{"text":"{\"code\":1,\"output\":\"ok\"}"}]}}]}"#,
    )
    .await;
    let base = served.url.trim_end_matches('/').to_owned();
    let provider = GeminiProvider::with_base_url(
        "gemini-2.0-flash".to_owned(),
        "test-key".to_owned(),
        base,
    );

    let resp = provider.complete(request(true)).await.expect("completes");
    assert_eq!(resp.text, r#"{"code":1,"output":"ok"}"#);

    let raw = served.request.await.expect("request captured");
    assert!(raw.starts_with("POST /gemini-2.0-flash:generateContent"));
    assert!(raw.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
    assert!(raw.contains("augmented prompt"));
}

#[tokio::test]
async fn complete_maps_error_status() {
    let served = serve_once("429 Too Many Requests", "application/json", r#"{"error":"quota"}"#).await;
    let provider = GeminiProvider::with_base_url(
        "gemini-2.0-flash".to_owned(),
        "test-key".to_owned(),
        served.url.trim_end_matches('/').to_owned(),
    );
    let err = provider.complete(request(false)).await.expect_err("429");
    assert!(matches!(err, ProviderError::HttpStatus { status: 429, .. }));
}
