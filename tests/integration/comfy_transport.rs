//! Integration tests running sweeps through the ComfyUI client against a mock server

use super::test_utils::{config, sweep};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wedge::config::TransportSettings;
use wedge::orchestrator::{Orchestrator, RunOptions, RunStatus};
use wedge::transport::ComfyClient;

fn fast_settings() -> TransportSettings {
    TransportSettings {
        poll_interval_ms: 10,
        request_timeout_secs: 5,
        websocket: false,
        ..TransportSettings::default()
    }
}

fn cfg_sweep_config() -> wedge::config::WedgeConfig {
    config(
        json!({"KSampler": [["seed", 42]]}),
        json!({"KSampler": [["cfg", [4, 8], "explicit"]]}),
    )
}

#[tokio::test]
async fn test_streamed_sweep_records_history_outputs() {
    let mut server = mockito::Server::new_async().await;
    let prompt = server
        .mock("POST", "/prompt")
        .match_body(mockito::Matcher::PartialJson(json!({
            "prompt": {"3": {"inputs": {"seed": 42}}}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"prompt_id": "p-1", "number": 7, "node_errors": {}}"#)
        .expect(2)
        .create_async()
        .await;
    let history = server
        .mock("GET", "/history/p-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "p-1": {
                    "status": {"status_str": "success", "completed": true, "messages": []},
                    "outputs": {"9": {"images": [
                        {"filename": "wedge_00001_.png", "subfolder": "out/images", "type": "output"}
                    ]}}
                }
            })
            .to_string(),
        )
        .expect_at_least(2)
        .create_async()
        .await;

    let client = ComfyClient::new(server.url(), &fast_settings()).unwrap();
    let options = RunOptions {
        stream: true,
        job_timeout: Duration::from_secs(10),
        ..RunOptions::default()
    };
    let mut orchestrator = Orchestrator::new(client, sweep(cfg_sweep_config(), &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    prompt.assert_async().await;
    history.assert_async().await;
    assert_eq!(report.counts().succeeded, 2);
    assert_eq!(report.results[0].job_id.as_deref(), Some("p-1"));
    assert_eq!(
        report.results[1].output.as_deref(),
        Some("out/images/wedge_00001_.png")
    );
}

#[tokio::test]
async fn test_execution_error_in_history_fails_job() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/prompt")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"prompt_id": "p-2", "number": 1, "node_errors": {}}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/history/p-2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "p-2": {
                    "status": {
                        "status_str": "error",
                        "completed": false,
                        "messages": [["execution_error", {
                            "node_type": "KSampler",
                            "exception_message": "Sizes of tensors must match"
                        }]]
                    },
                    "outputs": {}
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = ComfyClient::new(server.url(), &fast_settings()).unwrap();
    let options = RunOptions {
        stream: true,
        limit: Some(1),
        ..RunOptions::default()
    };
    let mut orchestrator = Orchestrator::new(client, sweep(cfg_sweep_config(), &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.results[0].status, RunStatus::Failed);
    assert_eq!(
        report.results[0].error.as_deref(),
        Some("KSampler: Sizes of tensors must match")
    );
}

#[tokio::test]
async fn test_validation_rejection_is_reported_per_job() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/prompt")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "error": {"type": "prompt_outputs_failed_validation", "message": "Prompt outputs failed validation"},
                "node_errors": {"3": {"errors": []}}
            })
            .to_string(),
        )
        .expect(2)
        .create_async()
        .await;

    let client = ComfyClient::new(server.url(), &fast_settings()).unwrap();
    let options = RunOptions::default();
    let mut orchestrator = Orchestrator::new(client, sweep(cfg_sweep_config(), &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.counts().failed, 2);
    let error = report.results[0].error.as_deref().unwrap();
    assert!(error.contains("status 400"), "{}", error);
    assert!(error.contains("node errors on: 3"), "{}", error);
    assert!(!report.unreachable);
}

#[tokio::test]
async fn test_unreachable_server_marks_report() {
    let settings = TransportSettings {
        connect_timeout_secs: 1,
        ..fast_settings()
    };
    let client = ComfyClient::new("http://127.0.0.1:9", &settings).unwrap();
    let options = RunOptions {
        limit: Some(1),
        ..RunOptions::default()
    };
    let mut orchestrator = Orchestrator::new(client, sweep(cfg_sweep_config(), &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.results[0].status, RunStatus::Failed);
    assert!(report.unreachable);
    assert_eq!(report.exit_code(false), 1);
}
