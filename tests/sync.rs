use secrecy::SecretString;
use serde_json::{json, Value};
use std::fs;
use strava_export::auth::Session;
use strava_export::csv_sink::{row_count, CsvSink};
use strava_export::state::CheckpointStore;
use strava_export::strava::StravaApi;
use strava_export::{SyncError, Synchronizer};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api(mock_server: &MockServer) -> StravaApi {
    let session = Session::new(reqwest::Client::new(), SecretString::new("tok".into()));
    StravaApi::new(&mock_server.uri(), session)
}

fn activity(id: u64, date: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Ride {id}"),
        "start_date": date,
        "map": {"id": format!("a{id}"), "summary_polyline": "xyz", "resource_state": 2},
        "start_latlng": [51.5, -0.12],
        "commute": id % 2 == 0
    })
}

async fn mount_page(mock_server: &MockServer, page: u32, response: ResponseTemplate, hits: u64) {
    Mock::given(method("GET"))
        .and(path("/athlete/activities"))
        .and(query_param("page", page.to_string()))
        .and(query_param("per_page", "3"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(response)
        .expect(hits)
        .mount(mock_server)
        .await;
}

struct Workspace {
    _dir: TempDir,
    store: CheckpointStore,
    sink: CsvSink,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("activity_metadata.json"));
    let sink = CsvSink::new(dir.path().join("export").join("activities.csv"), true);
    Workspace {
        _dir: dir,
        store,
        sink,
    }
}

#[tokio::test]
async fn first_run_pages_until_empty() {
    let mock_server = MockServer::start().await;
    let page1 = vec![
        activity(3, "2024-01-03T00:00:00Z"),
        activity(2, "2024-01-02T00:00:00Z"),
        activity(1, "2024-01-01T00:00:00Z"),
    ];
    mount_page(&mock_server, 1, ResponseTemplate::new(200).set_body_json(page1), 1).await;
    mount_page(
        &mock_server,
        2,
        ResponseTemplate::new(200).set_body_json(vec![activity(0, "2023-12-31T00:00:00Z")]),
        1,
    )
    .await;
    mount_page(&mock_server, 3, ResponseTemplate::new(200).set_body_json(json!([])), 1).await;

    let ws = workspace();
    let result = Synchronizer::new(api(&mock_server), ws.store.clone(), ws.sink.clone())
        .with_page_size(3)
        .sync()
        .await
        .unwrap();

    assert_eq!(result.new_record_count, 4);
    assert_eq!(result.newest_date.as_deref(), Some("2024-01-03T00:00:00Z"));
    assert!(!result.rate_limited);

    let cp = ws.store.load().unwrap();
    assert_eq!(cp.record_count, 4);
    assert_eq!(cp.last_activity_date.as_deref(), Some("2024-01-03T00:00:00Z"));

    assert_eq!(row_count(ws.sink.path()).unwrap(), 4);
    let text = fs::read_to_string(ws.sink.path()).unwrap();
    assert!(text.contains("\"[51.5, -0.12]\""));
    assert!(text.contains(",a3,xyz,2,"));
    assert!(text.contains(",True,"));
    assert!(text.contains(",False,"));
}

#[tokio::test]
async fn empty_first_page_writes_nothing() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, 1, ResponseTemplate::new(200).set_body_json(json!([])), 1).await;
    mount_page(&mock_server, 2, ResponseTemplate::new(200).set_body_json(json!([])), 0).await;

    let ws = workspace();
    let result = Synchronizer::new(api(&mock_server), ws.store.clone(), ws.sink.clone())
        .with_page_size(3)
        .sync()
        .await
        .unwrap();

    assert_eq!(result.new_record_count, 0);
    assert_eq!(result.total_record_count, 0);
    assert!(!result.rate_limited);
    assert!(!ws.sink.path().exists());
    assert!(!ws.store.path().exists());
}

#[tokio::test]
async fn resumes_from_checkpoint_and_stops_on_seen_activity() {
    let mock_server = MockServer::start().await;
    let page1 = vec![
        activity(3, "2024-01-03T00:00:00Z"),
        activity(2, "2024-01-02T00:00:00Z"),
        activity(1, "2024-01-01T00:00:00Z"),
    ];
    mount_page(&mock_server, 1, ResponseTemplate::new(200).set_body_json(page1), 1).await;
    mount_page(&mock_server, 2, ResponseTemplate::new(200).set_body_json(json!([])), 0).await;

    let ws = workspace();
    ws.store.save(10, Some("2024-01-02T00:00:00Z".into())).unwrap();

    let result = Synchronizer::new(api(&mock_server), ws.store.clone(), ws.sink.clone())
        .with_page_size(3)
        .sync()
        .await
        .unwrap();

    assert_eq!(result.new_record_count, 1);
    assert_eq!(result.total_record_count, 11);

    let cp = ws.store.load().unwrap();
    assert_eq!(cp.record_count, 11);
    assert_eq!(cp.last_activity_date.as_deref(), Some("2024-01-03T00:00:00Z"));
    assert_eq!(row_count(ws.sink.path()).unwrap(), 1);
}

#[tokio::test]
async fn rerun_with_nothing_new_is_idempotent() {
    let mock_server = MockServer::start().await;
    let page1 = vec![
        activity(2, "2024-01-02T00:00:00Z"),
        activity(1, "2024-01-01T00:00:00Z"),
    ];
    mount_page(&mock_server, 1, ResponseTemplate::new(200).set_body_json(page1), 1).await;

    let ws = workspace();
    ws.store.save(2, Some("2024-01-02T00:00:00Z".into())).unwrap();
    let before = fs::read_to_string(ws.store.path()).unwrap();

    let result = Synchronizer::new(api(&mock_server), ws.store.clone(), ws.sink.clone())
        .with_page_size(3)
        .sync()
        .await
        .unwrap();

    assert_eq!(result.new_record_count, 0);
    assert_eq!(result.summary(), "No new activities found.");
    assert_eq!(fs::read_to_string(ws.store.path()).unwrap(), before);
    assert!(!ws.sink.path().exists());
}

#[tokio::test]
async fn rate_limit_on_second_page_keeps_first_page() {
    let mock_server = MockServer::start().await;
    let page1 = vec![
        activity(5, "2024-03-05T00:00:00Z"),
        activity(4, "2024-03-04T00:00:00Z"),
    ];
    mount_page(&mock_server, 1, ResponseTemplate::new(200).set_body_json(page1), 1).await;
    mount_page(
        &mock_server,
        2,
        ResponseTemplate::new(429).set_body_string("Rate Limit Exceeded"),
        1,
    )
    .await;

    let ws = workspace();
    let result = Synchronizer::new(api(&mock_server), ws.store.clone(), ws.sink.clone())
        .with_page_size(3)
        .sync()
        .await
        .unwrap();

    assert!(result.rate_limited);
    assert_eq!(result.new_record_count, 2);
    assert_eq!(
        result.summary(),
        "Saved 2 new activities. Last activity date: 2024-03-05T00:00:00Z"
    );
    assert_eq!(ws.store.load().unwrap().record_count, 2);
    assert_eq!(row_count(ws.sink.path()).unwrap(), 2);
}

#[tokio::test]
async fn rate_limit_on_first_page_is_not_an_error() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, 1, ResponseTemplate::new(429), 1).await;

    let ws = workspace();
    let result = Synchronizer::new(api(&mock_server), ws.store.clone(), ws.sink.clone())
        .with_page_size(3)
        .sync()
        .await
        .unwrap();

    assert!(result.rate_limited);
    assert_eq!(result.new_record_count, 0);
    assert!(!ws.store.path().exists());
}

#[tokio::test]
async fn server_error_aborts_without_checkpoint() {
    let mock_server = MockServer::start().await;
    mount_page(
        &mock_server,
        1,
        ResponseTemplate::new(200).set_body_json(vec![activity(9, "2024-05-01T00:00:00Z")]),
        1,
    )
    .await;
    mount_page(
        &mock_server,
        2,
        ResponseTemplate::new(500).set_body_string("upstream down"),
        1,
    )
    .await;

    let ws = workspace();
    ws.store.save(7, Some("2024-04-01T00:00:00Z".into())).unwrap();

    let err = Synchronizer::new(api(&mock_server), ws.store.clone(), ws.sink.clone())
        .with_page_size(3)
        .sync()
        .await
        .unwrap_err();

    match err {
        SyncError::Fetch { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "upstream down");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let cp = ws.store.load().unwrap();
    assert_eq!(cp.record_count, 7);
    assert_eq!(cp.last_activity_date.as_deref(), Some("2024-04-01T00:00:00Z"));
    assert!(!ws.sink.path().exists());
}

#[tokio::test]
async fn corrupt_checkpoint_stops_before_fetching() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, 1, ResponseTemplate::new(200).set_body_json(json!([])), 0).await;

    let ws = workspace();
    fs::write(ws.store.path(), "record_count=3").unwrap();

    let err = Synchronizer::new(api(&mock_server), ws.store.clone(), ws.sink.clone())
        .with_page_size(3)
        .sync()
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::CorruptCheckpoint { .. }));
}
