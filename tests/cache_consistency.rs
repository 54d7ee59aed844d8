use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fequery::app::{self, AppContext, AppError};
use fequery::cache::{InvalidationRegistry, QueryCache, QueryCacheConfig, QueryKey, QueryStatus};
use fequery::config::{
    CacheSettings, LogFormat, LoggingSettings, Settings, TransportSettings,
};
use fequery::domain::ExampleRecord;
use fequery::mutation::MutationStatus;
use fequery::resource::{ClientError, ResourceClient, SessionClient};
use fequery::transport::{HttpTransport, Transport, TransportError};
use httpmock::MockServer;
use reqwest::Method;
use serde_json::Value;
use tracing::level_filters::LevelFilter;
use url::Url;

fn settings(server: &MockServer) -> Settings {
    Settings {
        transport: TransportSettings {
            location: Url::parse(&server.url("/")).expect("location"),
            development: false,
            dev_override_url: Url::parse("http://localhost:3010").expect("override"),
            api_suffix: "/api".to_string(),
            auth_suffix: "/auth".to_string(),
            timeout: Duration::from_secs(5),
        },
        cache: CacheSettings {
            gc_interval: Duration::from_secs(300),
            gc_sweep_interval: Duration::from_secs(60),
        },
        logging: LoggingSettings {
            level: LevelFilter::WARN,
            format: LogFormat::Compact,
        },
    }
}

#[tokio::test]
async fn list_is_served_from_cache_until_invalidated() {
    let server = MockServer::start_async().await;
    let mut first = server
        .mock_async(|when, then| {
            when.method("GET").path("/api/example");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"[{"name":"Jane","age":25}]"#);
        })
        .await;

    let app = AppContext::from_settings(&settings(&server)).expect("context");
    let list = app.examples_query();
    let records = app::resolve(&list).await.expect("list");
    assert_eq!(*records, vec![ExampleRecord::new("Jane", 25)]);
    first.assert_async().await;

    first.delete_async().await;
    let second = server
        .mock_async(|when, then| {
            when.method("GET").path("/api/example");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"[{"name":"Jane","age":25},{"name":"Abe","age":70}]"#);
        })
        .await;

    // A second subscriber joins the cached, fresh entry without a request.
    let cached = app::resolve(&app.examples_query()).await.expect("cached");
    assert_eq!(*cached, vec![ExampleRecord::new("Jane", 25)]);

    app.cache().invalidate(&QueryKey::new("examples"));
    assert!(list.snapshot().stale);

    let refreshed = app::resolve(&app.examples_query()).await.expect("refreshed");
    assert_eq!(
        *refreshed,
        vec![ExampleRecord::new("Abe", 70), ExampleRecord::new("Jane", 25)]
    );
    second.assert_async().await;
}

#[tokio::test]
async fn writes_invalidate_their_registered_targets() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/api/example/Jane");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"name":"Jane","age":25}"#);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/api/example");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"[{"name":"Jane","age":25}]"#);
        })
        .await;
    let create_mock = server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/api/example")
                .json_body(serde_json::json!({"name": "Abe", "age": 70}));
            then.status(201);
        })
        .await;
    let replace_mock = server
        .mock_async(|when, then| {
            when.method("PUT")
                .path("/api/example/Jane")
                .json_body(serde_json::json!({"name": "Jane", "age": 26}));
            then.status(200);
        })
        .await;

    let app = AppContext::from_settings(&settings(&server)).expect("context");
    let list = app.examples_query();
    let detail = app.example_query(Some("Jane"));
    app::resolve(&list).await.expect("list");
    app::resolve(&detail).await.expect("detail");
    let first_generation = list.snapshot().generation;

    let create = app.create_example();
    create
        .run(ExampleRecord::new("Abe", 70))
        .await
        .expect("create");
    assert_eq!(create.state().status, MutationStatus::Success);
    assert!(list.snapshot().stale);
    assert!(!detail.snapshot().stale);
    create_mock.assert_async().await;

    let refreshed = app.examples_query();
    app::resolve(&refreshed).await.expect("refetch");
    let snapshot = refreshed.snapshot();
    assert!(!snapshot.stale);
    assert!(snapshot.generation > first_generation);

    app.replace_example("Jane")
        .run(ExampleRecord::new("Jane", 26))
        .await
        .expect("replace");
    assert!(list.snapshot().stale);
    assert!(detail.snapshot().stale);
    replace_mock.assert_async().await;
}

#[tokio::test]
async fn failed_create_leaves_cache_untouched() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/api/example");
            then.status(200)
                .header("content-type", "application/json")
                .body("[]");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("POST").path("/api/example");
            then.status(500).body("database unavailable");
        })
        .await;

    let app = AppContext::from_settings(&settings(&server)).expect("context");
    let list = app.examples_query();
    app::resolve(&list).await.expect("list");

    let runner = app.create_example();
    let err = runner
        .run(ExampleRecord::new("Abe", 70))
        .await
        .expect_err("server error");

    assert_eq!(err.status_code(), Some(500));
    let state = runner.state();
    assert_eq!(state.status, MutationStatus::Error);
    assert_eq!(state.error, Some(err));
    assert!(!list.snapshot().stale);
    assert_eq!(list.snapshot().status, QueryStatus::Success);
}

#[tokio::test]
async fn duplicate_name_is_reported_as_conflict() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path("/api/example");
            then.status(409).body("duplicate");
        })
        .await;

    let app = AppContext::from_settings(&settings(&server)).expect("context");
    let err = app
        .create_example()
        .run(ExampleRecord::new("Jane", 25))
        .await
        .expect_err("conflict");

    assert!(matches!(err, ClientError::Conflict { ref name, .. } if name == "Jane"));
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn missing_record_surfaces_status_through_app_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/api/example/Ghost");
            then.status(404).body("no such example");
        })
        .await;

    let app = AppContext::from_settings(&settings(&server)).expect("context");
    let detail = app.example_query(Some("Ghost"));
    let err = app::resolve(&detail).await.expect_err("not found");

    assert!(matches!(err, AppError::Query { .. }));
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(detail.snapshot().status, QueryStatus::Error);
}

/// Reads hit the mock server; writes go to a port nothing listens on.
struct UnreachableWrites {
    reads: HttpTransport,
    writes: HttpTransport,
}

#[async_trait]
impl Transport for UnreachableWrites {
    async fn request(
        &self,
        method: Method,
        path: &[&str],
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        if method == Method::GET {
            self.reads.request(method, path, body).await
        } else {
            self.writes.request(method, path, body).await
        }
    }
}

#[tokio::test]
async fn create_without_response_is_a_network_error_and_keeps_list_fresh() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/api/example");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"[{"name":"Jane","age":25}]"#);
        })
        .await;

    let timeout = Some(Duration::from_secs(2));
    let reads = HttpTransport::new(Url::parse(&server.url("/api")).expect("api"), timeout)
        .expect("reads");
    let writes = HttpTransport::new(Url::parse("http://127.0.0.1:9/api").expect("dead"), timeout)
        .expect("writes");
    let transport: Arc<dyn Transport> = Arc::new(UnreachableWrites { reads, writes });
    let app = AppContext::new(
        ResourceClient::new(Arc::clone(&transport)),
        SessionClient::new(transport),
        QueryCache::from_current(QueryCacheConfig::default()).expect("runtime"),
        Arc::new(InvalidationRegistry::examples()),
    );

    let list = app.examples_query();
    app::resolve(&list).await.expect("list");

    let runner = app.create_example();
    let err = runner
        .run(ExampleRecord::new("Abe", 70))
        .await
        .expect_err("no response");

    assert!(matches!(
        err,
        ClientError::Transport(TransportError::Network { .. })
    ));
    assert_eq!(err.status_code(), None);
    let state = runner.state();
    assert_eq!(state.status, MutationStatus::Error);
    assert_eq!(state.error, Some(err));
    assert!(!list.snapshot().stale);
}
