//! End-to-end tests of fault boundaries wired through the composition root

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use errguard::{install_panic_hook, CaughtFault, ErrorGuard, FaultBoundary};
use errguard_core::config::{Config, ConfigBuilder};
use errguard_core::domain::{BoundaryId, ConsentLevel, ReportStatus};
use errguard_core::ports::MemoryStateStore;
use errguard_recovery::{RecoveryError, RecoveryPhase};
use errguard_report::SubmissionResult;

fn memory_guard(config: Config) -> Arc<ErrorGuard> {
    Arc::new(ErrorGuard::from_parts(config, Arc::new(MemoryStateStore::new()), None).unwrap())
}

fn boundary(guard: &Arc<ErrorGuard>, name: &str) -> FaultBoundary {
    FaultBoundary::new(guard.clone(), BoundaryId::new(name).unwrap())
}

#[tokio::test]
async fn test_panic_becomes_tracked_and_stored_fault() {
    install_panic_hook();
    let guard = memory_guard(Config::default());
    guard.consent().set_level(ConsentLevel::Basic).await.unwrap();
    let checkout = boundary(&guard, "app/checkout").with_component("Checkout");

    let caught = checkout
        .run(|| -> u32 { panic!("cart total overflowed") })
        .await
        .unwrap_err();

    assert_eq!(caught.message, "cart total overflowed");
    assert_eq!(checkout.state().phase, RecoveryPhase::Faulted);
    assert_eq!(caught.outcome.report.additional_context["componentName"], json!("Checkout"));
    assert!(caught.outcome.report.additional_context["panicLocation"]
        .as_str()
        .unwrap()
        .contains("boundary_tests.rs"));

    let CaughtFault {
        error_id, outcome, ..
    } = *caught;
    let submitted = outcome.submission.await.unwrap().unwrap().unwrap();
    assert_eq!(submitted, SubmissionResult::StoredLocally);
    let stored = guard.pipeline().queue().find(error_id).await.unwrap();
    assert_eq!(stored.status, ReportStatus::Pending);
    assert_eq!(guard.monitor().errors()[0].component.as_deref(), Some("Checkout"));
}

#[tokio::test]
async fn test_successful_run_leaves_boundary_healthy() {
    let guard = memory_guard(Config::default());
    let root = boundary(&guard, "root");

    assert_eq!(root.run(|| 2 + 2).await.unwrap(), 4);
    assert_eq!(root.state().phase, RecoveryPhase::Healthy);
    assert!(guard.monitor().errors().is_empty());
}

#[tokio::test]
async fn test_returned_error_is_intercepted() {
    let guard = memory_guard(Config::default());
    let settings = boundary(&guard, "app/settings");

    let caught = settings
        .run_fallible(|| Err::<(), _>("Validation failed: name is required"))
        .await
        .unwrap_err();
    assert_eq!(caught.outcome.tracked.category.as_str(), "user");
    assert_eq!(caught.outcome.propagate_to, BoundaryId::new("app").ok());
}

#[tokio::test]
async fn test_async_panic_is_intercepted() {
    let guard = memory_guard(Config::default());
    let loader = boundary(&guard, "app/loader");

    let caught = loader
        .run_async(async { panic!("loader exploded") })
        .await
        .map(|_: ()| ())
        .unwrap_err();
    assert_eq!(caught.message, "loader exploded");
}

#[tokio::test]
async fn test_isolated_boundary_does_not_propagate() {
    let guard = memory_guard(Config::default());
    let widget = boundary(&guard, "app/sidebar/widget");

    widget.run(|| panic!("first")).await.unwrap_err();
    widget.isolate().await.unwrap();
    let caught = widget.run(|| panic!("second")).await.unwrap_err();

    assert_eq!(widget.state().phase, RecoveryPhase::Isolated);
    assert!(!caught.outcome.decision.unwrap().propagate);
    assert_eq!(caught.outcome.propagate_to, None);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhaust_then_reset_restores() {
    let guard = memory_guard(Config::default());
    let page = boundary(&guard, "app/page");

    page.run(|| panic!("render failed")).await.unwrap_err();
    for attempt in 1..=3 {
        tokio::time::advance(Duration::from_secs(31)).await;
        let state = page.retry().unwrap();
        assert_eq!(state.retry_count, attempt);
        page.run(|| panic!("render failed again")).await.unwrap_err();
    }
    assert_eq!(page.state().phase, RecoveryPhase::Exhausted);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(
        page.retry().unwrap_err(),
        RecoveryError::Exhausted { max_retries: 3 }
    );

    page.reset().await;
    assert_eq!(page.state().phase, RecoveryPhase::Healthy);
    assert_eq!(page.run(|| "rendered").await.unwrap(), "rendered");
}

#[tokio::test(start_paused = true)]
async fn test_manual_retry_refused_during_cooldown() {
    let guard = memory_guard(Config::default());
    let page = boundary(&guard, "app/profile");

    page.run(|| panic!("boom")).await.unwrap_err();
    page.retry().unwrap();
    page.run(|| panic!("boom")).await.unwrap_err();

    assert!(matches!(
        page.retry(),
        Err(RecoveryError::CooldownActive { .. })
    ));
}

#[tokio::test]
async fn test_dropping_boundary_tears_down_controller() {
    let guard = memory_guard(Config::default());
    let caught = {
        let scoped = boundary(&guard, "app/modal");
        let caught = scoped.run(|| panic!("modal failed")).await.unwrap_err();
        assert_eq!(guard.recovery().len(), 1);
        caught
    };
    assert!(guard.recovery().is_empty());
    assert!(caught.outcome.submission.await.unwrap().is_none());
}

#[tokio::test]
async fn test_consent_persists_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new()
        .storage_database_path(dir.path().join("state.db"))
        .build();

    let guard = ErrorGuard::from_config(config.clone()).await.unwrap();
    guard.consent().set_level(ConsentLevel::Detailed).await.unwrap();
    guard.shutdown().await;

    let reopened = ErrorGuard::from_config(config).await.unwrap();
    let status = reopened.consent().get_status().await;
    assert!(status.has_consent);
    assert_eq!(status.level, ConsentLevel::Detailed);
    reopened.shutdown().await;
}

#[tokio::test]
async fn test_full_consent_delivers_sanitized_report() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "reportId": "srv-1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = ConfigBuilder::new()
        .storage_in_memory(true)
        .reporting_endpoint(format!("{}/reports", server.uri()))
        .build();
    let guard = Arc::new(ErrorGuard::from_config(config).await.unwrap());
    guard.consent().set_level(ConsentLevel::Full).await.unwrap();

    let account = boundary(&guard, "app/account");
    let caught = account
        .run(|| panic!("could not email user@example.com"))
        .await
        .unwrap_err();
    let result = caught.outcome.submission.await.unwrap().unwrap().unwrap();
    assert_eq!(
        result,
        SubmissionResult::Delivered {
            report_id: Some("srv-1".to_string())
        }
    );

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("[EMAIL_REDACTED]"));
    assert!(!message.contains("user@example.com"));
    guard.shutdown().await;
}
