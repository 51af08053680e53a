use secrecy::SecretString;
use std::fs;
use strava_export::ask::{ask, AgentError, ChatCompletionsAgent};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn agent(mock_server: &MockServer) -> ChatCompletionsAgent {
    ChatCompletionsAgent::new(
        &mock_server.uri(),
        "test-model",
        SecretString::new("sk-test".into()),
        None,
    )
}

fn export(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let csv_path = dir.path().join("activities.csv");
    fs::write(
        &csv_path,
        "name,type,commute,gear_id\nMorning Ride,Ride,True,b123\nLunch Run,Run,False,\n",
    )
    .unwrap();
    csv_path
}

#[tokio::test]
async fn sends_table_and_question_and_returns_answer() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_string_contains("test-model"))
        .and(body_string_contains("The export holds 2 activities, all included below."))
        .and(body_string_contains("Morning Ride,Ride,True,b123"))
        .and(body_string_contains("How many commute rides?"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": " One commute ride. "}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let csv_path = export(&dir);

    let answer = ask(&agent(&mock_server), &csv_path, "How many commute rides?")
        .await
        .unwrap();
    assert_eq!(answer, "One commute ride.");
}

#[tokio::test]
async fn agent_failure_is_reported() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let csv_path = export(&dir);

    let err = ask(&agent(&mock_server), &csv_path, "Which shoes?")
        .await
        .unwrap_err();
    match err {
        AgentError::Agent { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "invalid api key");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_export_never_calls_agent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let err = ask(&agent(&mock_server), &dir.path().join("nope.csv"), "Anything?")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::MissingExport(_)));
}
