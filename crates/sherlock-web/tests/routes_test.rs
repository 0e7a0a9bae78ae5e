use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use sherlock_engine::{ContainerEngine, ContainerSpec, EngineError};
use sherlock_web::{RunSettings, ServerConfig, SherlockServer};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

const IMAGE: &str = "sherlock/sherlock:latest";

#[derive(Clone, Copy)]
enum Outcome {
    Output(&'static [u8]),
    ImageNotFound,
    Api(&'static str),
    Timeout,
}

#[derive(Clone)]
struct MockEngine {
    reachable: bool,
    outcome: Outcome,
    runs: Arc<Mutex<Vec<ContainerSpec>>>,
}

impl MockEngine {
    fn new(outcome: Outcome) -> Self {
        Self {
            reachable: true,
            outcome,
            runs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new(Outcome::Output(b""))
        }
    }

    fn runs(&self) -> Vec<ContainerSpec> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        if self.reachable {
            Ok(())
        } else {
            Err(EngineError::api(503, "Cannot connect to the Docker daemon"))
        }
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<Vec<u8>, EngineError> {
        self.runs.lock().unwrap().push(spec.clone());
        match self.outcome {
            Outcome::Output(bytes) => Ok(bytes.to_vec()),
            Outcome::ImageNotFound => Err(EngineError::ImageNotFound {
                image: spec.image.clone(),
            }),
            Outcome::Api(message) => Err(EngineError::api(500, message)),
            Outcome::Timeout => Err(EngineError::Timeout(Duration::from_secs(30))),
        }
    }
}

fn data_dir() -> PathBuf {
    PathBuf::from("/srv/sherlock/data")
}

fn router(engine: &MockEngine) -> Router {
    let settings = RunSettings::new(IMAGE, data_dir());
    let config = ServerConfig::new().with_logging(false);
    SherlockServer::with_config(Arc::new(engine.clone()), settings, config).build_router()
}

fn run_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/run")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_index_serves_html_form() {
    let engine = MockEngine::new(Outcome::Output(b""));
    let response = router(&engine)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/html"));
    let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("<form"));
}

#[tokio::test]
async fn test_health_reports_image_when_engine_up() {
    let engine = MockEngine::new(Outcome::Output(b""));
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(router(&engine), request).await;

    assert_eq!(status, StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body, serde_json::json!({"status": "ok", "image": IMAGE}));
}

#[tokio::test]
async fn test_health_reports_error_payload_with_200() {
    let engine = MockEngine::unreachable();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(router(&engine), request).await;

    assert_eq!(status, StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "error");
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("Cannot connect to the Docker daemon"));
    assert!(body.get("image").is_none());
}

#[tokio::test]
async fn test_run_csv_returns_container_output() {
    let engine = MockEngine::new(Outcome::Output(b"[+] GitHub: https://github.com/alice\n"));
    let (status, body) = send(router(&engine), run_request("username=alice&format=csv")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[+] GitHub: https://github.com/alice\n");

    let runs = engine.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].image, IMAGE);
    assert_eq!(runs[0].args, vec!["alice", "-o", "/data/alice.csv", "--csv"]);
    assert_eq!(runs[0].volumes[0].host_path, data_dir());
    assert_eq!(runs[0].volumes[0].container_path, "/data");
    assert!(runs[0].remove);
}

#[tokio::test]
async fn test_run_sanitizes_separators_for_json() {
    let engine = MockEngine::new(Outcome::Output(b"done"));
    let (status, _) = send(router(&engine), run_request("username=bob%2Fx&format=json")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        engine.runs()[0].args,
        vec!["bob_x", "-o", "/data/bob_x.json", "--json"]
    );
}

#[tokio::test]
async fn test_run_defaults_to_csv_without_format() {
    let engine = MockEngine::new(Outcome::Output(b""));
    let (status, _) = send(router(&engine), run_request("username=carol")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(engine.runs()[0].args[3], "--csv");
}

#[tokio::test]
async fn test_run_unknown_format_falls_back_to_json() {
    let engine = MockEngine::new(Outcome::Output(b""));
    let (status, _) = send(router(&engine), run_request("username=dave&format=xml")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        engine.runs()[0].args,
        vec!["dave", "-o", "/data/dave.json", "--json"]
    );
}

#[tokio::test]
async fn test_run_keeps_shell_metacharacters_in_one_argument() {
    let engine = MockEngine::new(Outcome::Output(b""));
    let (status, _) = send(
        router(&engine),
        run_request("username=eve%3B+touch+%2Ftmp%2Fpwned&format=csv"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let args = &engine.runs()[0].args;
    assert_eq!(args.len(), 4);
    assert_eq!(args[0], "eve; touch _tmp_pwned");
}

#[tokio::test]
async fn test_run_rejects_blank_username_without_starting_container() {
    let engine = MockEngine::new(Outcome::Output(b""));
    for body in ["username=&format=csv", "username=+++&format=json"] {
        let (status, text) = send(router(&engine), run_request(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(text, "Username vide.");
    }
    assert!(engine.runs().is_empty());
}

#[tokio::test]
async fn test_run_missing_username_field_is_rejected() {
    let engine = MockEngine::new(Outcome::Output(b""));
    let (status, _) = send(router(&engine), run_request("format=csv")).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(engine.runs().is_empty());
}

#[tokio::test]
async fn test_run_missing_image_names_image() {
    let engine = MockEngine::new(Outcome::ImageNotFound);
    let (status, body) = send(router(&engine), run_request("username=alice")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains(IMAGE));
    assert!(body.contains("introuvable"));
}

#[tokio::test]
async fn test_run_api_error_returns_explanation() {
    let engine = MockEngine::new(Outcome::Api("driver failed programming external connectivity"));
    let (status, body) = send(router(&engine), run_request("username=alice")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        "Erreur Docker API: driver failed programming external connectivity"
    );
}

#[tokio::test]
async fn test_run_other_engine_error_is_generic() {
    let engine = MockEngine::new(Outcome::Timeout);
    let (status, body) = send(router(&engine), run_request("username=alice")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("Erreur: "));
    assert!(body.contains("timed out"));
}

#[tokio::test]
async fn test_run_output_drops_invalid_utf8() {
    let engine = MockEngine::new(Outcome::Output(b"ok \xff\xfe end"));
    let (status, body) = send(router(&engine), run_request("username=alice")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok  end");
}

#[tokio::test]
async fn test_run_rejects_oversized_body() {
    let engine = MockEngine::new(Outcome::Output(b""));
    let settings = RunSettings::new(IMAGE, data_dir());
    let config = ServerConfig::new().with_logging(false).with_max_body_size(64);
    let app = SherlockServer::with_config(Arc::new(engine.clone()), settings, config).build_router();

    let body = format!("username={}", "a".repeat(512));
    let (status, _) = send(app, run_request(&body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(engine.runs().is_empty());
}
