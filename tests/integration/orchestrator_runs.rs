//! Integration tests for the submission orchestrator against a scripted transport

use super::test_utils::{config, steps_by_cfg, sweep, Events, FakeTransport};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wedge::error::{TransportError, WedgeError};
use wedge::orchestrator::{Orchestrator, ResolutionPolicy, RunOptions, RunStatus};
use wedge::progress::{ProgressBus, RunEvent};
use wedge::transport::JobEvent;

fn streaming() -> RunOptions {
    RunOptions {
        stream: true,
        job_timeout: Duration::from_secs(5),
        ..RunOptions::default()
    }
}

fn rejected(status: u16) -> TransportError {
    TransportError::Rejected {
        status,
        message: "prompt invalid".to_string(),
    }
}

#[tokio::test]
async fn test_acknowledged_jobs_succeed_in_order() {
    let transport = FakeTransport::new();
    let options = RunOptions::default();
    let mut orchestrator =
        Orchestrator::new(transport.clone(), sweep(steps_by_cfg(), &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.total, 9);
    assert_eq!(report.planned, 9);
    assert_eq!(report.counts().succeeded, 9);
    assert_eq!(report.exit_code(true), 0);

    let requests = transport.requests();
    assert_eq!(requests.len(), 9);
    assert_eq!(
        requests[0].prompt["9"]["inputs"]["filename_prefix"],
        "out/images/wedge__KSampler-steps-10__KSampler-cfg-3"
    );
    assert_eq!(requests[0].prompt["3"]["inputs"]["steps"], 10);
    assert_eq!(requests[8].prompt["3"]["inputs"]["steps"], 30);
    assert_eq!(requests[8].prompt["3"]["inputs"]["cfg"], 9);
    assert_eq!(requests[1].extra_pnginfo["wedge_iteration"]["index"], 2);
    assert_eq!(requests[1].extra_pnginfo["wedge_iteration"]["of"], 9);
    assert_eq!(
        requests[1].extra_pnginfo["wedge_config"]["filename_prefix"],
        "wedge"
    );
    assert_eq!(report.results[0].job_id.as_deref(), Some("job-1"));
}

#[tokio::test]
async fn test_limit_runs_prefix_of_enumeration() {
    let transport = FakeTransport::new();
    let options = RunOptions {
        limit: Some(4),
        ..RunOptions::default()
    };
    let mut orchestrator =
        Orchestrator::new(transport.clone(), sweep(steps_by_cfg(), &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.total, 9);
    assert_eq!(report.planned, 4);
    assert_eq!(report.results.len(), 4);
    assert!(report
        .results
        .iter()
        .all(|r| r.status == RunStatus::Succeeded));
    let described: Vec<_> = report.results.iter().map(|r| r.combination.as_str()).collect();
    assert_eq!(
        described,
        vec![
            "KSampler.steps=10, KSampler.cfg=3",
            "KSampler.steps=10, KSampler.cfg=6",
            "KSampler.steps=10, KSampler.cfg=9",
            "KSampler.steps=20, KSampler.cfg=3",
        ]
    );
}

#[tokio::test]
async fn test_override_only_run_submits_once() {
    let transport = FakeTransport::new();
    let options = RunOptions::default();
    let cfg = config(json!({"KSampler": [["seed", 12345]]}), json!({}));
    let mut orchestrator = Orchestrator::new(transport.clone(), sweep(cfg, &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].output_name.as_deref(), Some("wedge"));
    let requests = transport.requests();
    assert_eq!(requests[0].prompt["3"]["inputs"]["seed"], 12345);
    assert_eq!(requests[0].prompt["9"]["inputs"]["filename_prefix"], "out/images/wedge");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_counted_apart_from_failure() {
    let transport = FakeTransport::new()
        .events(Events::Hang)
        .events(Events::Script(vec![JobEvent::Completed {
            outputs: vec!["out/images/b_00001_.png".to_string()],
        }]));
    let options = RunOptions {
        limit: Some(2),
        ..streaming()
    };
    let mut orchestrator =
        Orchestrator::new(transport.clone(), sweep(steps_by_cfg(), &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.results[0].status, RunStatus::TimedOut);
    assert_eq!(report.results[1].status, RunStatus::Succeeded);
    assert_eq!(
        report.results[1].output.as_deref(),
        Some("out/images/b_00001_.png")
    );
    let counts = report.counts();
    assert_eq!(counts.timed_out, 1);
    assert_eq!(counts.failed, 0);
    assert_eq!(report.exit_code(false), 0);
    assert_eq!(report.exit_code(true), 1);
}

#[tokio::test]
async fn test_failed_event_and_truncated_stream_fail_the_job() {
    let transport = FakeTransport::new()
        .events(Events::Script(vec![
            JobEvent::Queued,
            JobEvent::Failed {
                message: "CUDA out of memory".to_string(),
            },
        ]))
        .events(Events::Script(vec![JobEvent::Running { value: 1, max: 20 }]));
    let options = RunOptions {
        limit: Some(3),
        ..streaming()
    };
    let mut orchestrator =
        Orchestrator::new(transport.clone(), sweep(steps_by_cfg(), &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.results[0].status, RunStatus::Failed);
    assert_eq!(
        report.results[0].error.as_deref(),
        Some("CUDA out of memory")
    );
    assert_eq!(report.results[1].status, RunStatus::Failed);
    assert_eq!(report.results[2].status, RunStatus::Succeeded);
    assert_eq!(report.counts().failed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_rejections_are_retried_with_backoff() {
    let transport = FakeTransport::new()
        .fail_submit(rejected(500))
        .fail_submit(rejected(500))
        .accept_submit();
    let options = RunOptions {
        limit: Some(1),
        retries: 2,
        retry_backoff: Duration::from_secs(1),
        ..RunOptions::default()
    };
    let mut orchestrator =
        Orchestrator::new(transport.clone(), sweep(steps_by_cfg(), &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(transport.attempts(), 3);
    assert_eq!(report.results[0].status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_exhausted_rejection_fails_and_run_continues() {
    let transport = FakeTransport::new().fail_submit(rejected(400));
    let options = RunOptions {
        limit: Some(3),
        ..RunOptions::default()
    };
    let mut orchestrator =
        Orchestrator::new(transport.clone(), sweep(steps_by_cfg(), &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.results[0].status, RunStatus::Failed);
    assert!(report.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("status 400"));
    assert_eq!(report.counts().succeeded, 2);
    assert_eq!(report.exit_code(false), 0);
    assert_eq!(report.exit_code(true), 1);
}

#[tokio::test]
async fn test_stop_on_first_failure() {
    let transport = FakeTransport::new().fail_submit(rejected(400));
    let options = RunOptions {
        stop_on_first_failure: true,
        ..RunOptions::default()
    };
    let mut orchestrator =
        Orchestrator::new(transport.clone(), sweep(steps_by_cfg(), &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.results.len(), 1);
    assert!(report.aborted.is_some());
    assert_eq!(report.not_attempted(), 8);
    assert_eq!(report.exit_code(false), 1);
}

#[tokio::test]
async fn test_unreachable_server_fails_run() {
    let transport = FakeTransport::new().fail_submit(TransportError::Unreachable {
        url: "http://127.0.0.1:8188".to_string(),
        message: "connection refused".to_string(),
    });
    let options = RunOptions {
        limit: Some(2),
        ..RunOptions::default()
    };
    let mut orchestrator =
        Orchestrator::new(transport.clone(), sweep(steps_by_cfg(), &options), options);

    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert!(report.unreachable);
    assert_eq!(report.exit_code(false), 1);
}

#[tokio::test]
async fn test_unresolved_first_combination_is_fatal_under_any_policy() {
    for policy in [ResolutionPolicy::Abort, ResolutionPolicy::Skip] {
        let transport = FakeTransport::new();
        let options = RunOptions {
            resolution_policy: policy,
            ..RunOptions::default()
        };
        let cfg = config(
            json!({}),
            json!({"KSampler": [["denoise", [0.5, 1.0], "explicit"]]}),
        );
        let mut orchestrator = Orchestrator::new(transport.clone(), sweep(cfg, &options), options);

        let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, WedgeError::Job { index: 1, .. }));
        assert!(err.is_resolution());
        assert_eq!(transport.attempts(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_skips_in_flight_job_and_reports() {
    let transport = FakeTransport::new().accept_submit().events(Events::Hang);
    let options = RunOptions {
        job_timeout: Duration::from_secs(600),
        ..streaming()
    };
    let mut orchestrator =
        Orchestrator::new(transport.clone(), sweep(steps_by_cfg(), &options), options);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        trigger.cancel();
    });

    let report = orchestrator.run(cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].status, RunStatus::Skipped);
    assert_eq!(report.results[0].error.as_deref(), Some("cancelled"));
    assert_eq!(report.not_attempted(), 8);
    assert_eq!(report.exit_code(false), 130);
}

#[tokio::test]
async fn test_cancelled_before_start_submits_nothing() {
    let transport = FakeTransport::new();
    let options = RunOptions::default();
    let mut orchestrator =
        Orchestrator::new(transport.clone(), sweep(steps_by_cfg(), &options), options);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = orchestrator.run(cancel).await.unwrap();

    assert!(report.cancelled);
    assert!(report.results.is_empty());
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn test_progress_events_follow_each_job() {
    let (bus, rx) = ProgressBus::new_pair();
    let transport = FakeTransport::new().events(Events::Script(vec![
        JobEvent::Running { value: 5, max: 20 },
        JobEvent::Completed { outputs: vec![] },
    ]));
    let options = RunOptions {
        limit: Some(2),
        ..streaming()
    };
    let mut orchestrator =
        Orchestrator::new(transport, sweep(steps_by_cfg(), &options), options).with_progress(bus);

    orchestrator.run(CancellationToken::new()).await.unwrap();
    drop(orchestrator);

    let events: Vec<RunEvent> = rx.iter().collect();
    let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        types,
        vec![
            "run_started",
            "job_submitted",
            "job_progress",
            "job_finished",
            "summary",
            "job_submitted",
            "job_finished",
            "summary",
            "run_finished",
        ]
    );
    match &events[7] {
        RunEvent::Summary {
            counts, remaining, ..
        } => {
            assert_eq!(counts.succeeded, 2);
            assert_eq!(*remaining, 0);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_run_is_restartable() {
    let transport = FakeTransport::new();
    let options = RunOptions {
        limit: Some(2),
        ..RunOptions::default()
    };
    let mut orchestrator =
        Orchestrator::new(transport.clone(), sweep(steps_by_cfg(), &options), options);

    let first = orchestrator.run(CancellationToken::new()).await.unwrap();
    let second = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(first.results.len(), 2);
    assert_eq!(second.results.len(), 2);
    assert_eq!(transport.requests().len(), 4);
}
