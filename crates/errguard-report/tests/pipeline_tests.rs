//! Integration tests for report delivery against a mock reporting endpoint

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use errguard_core::config::ReportingConfig;
use errguard_core::domain::{ConsentLevel, FaultEvent, ReportStatus};
use errguard_core::ports::{IStateStore, MemoryStateStore};
use errguard_privacy::{ConsentManager, Sanitizer};
use errguard_report::{HttpTransport, ReportContext, ReportPipeline, SubmissionResult};

struct Harness {
    consent: Arc<ConsentManager>,
    pipeline: ReportPipeline,
}

async fn harness(server: &MockServer, level: ConsentLevel) -> Harness {
    let store: Arc<dyn IStateStore> = Arc::new(MemoryStateStore::new());
    let consent = Arc::new(ConsentManager::new(store.clone()));
    consent.set_level(level).await.unwrap();

    let config = ReportingConfig {
        endpoint: Some(format!("{}/reports", server.uri())),
        max_retries: 2,
        retry_delay_ms: 1,
        ..ReportingConfig::default()
    };
    let transport = HttpTransport::new(config.request_timeout(), &config.user_agent).unwrap();
    let pipeline = ReportPipeline::new(
        config,
        consent.clone(),
        Arc::new(Sanitizer::default()),
        store,
        Arc::new(MemoryStateStore::new()),
    )
    .with_transport(Arc::new(transport));

    Harness { consent, pipeline }
}

async fn mount_accepting(server: &MockServer, report_id: &str) {
    Mock::given(method("POST"))
        .and(path("/reports"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "reportId": report_id})),
        )
        .mount(server)
        .await;
}

async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.body_json::<Value>().unwrap())
        .collect()
}

#[tokio::test]
async fn test_sensitive_context_redacted_in_transport_and_storage() {
    let server = MockServer::start().await;
    mount_accepting(&server, "r-1").await;
    let h = harness(&server, ConsentLevel::Full).await;

    let fault = FaultEvent::new("Profile save failed")
        .with_context_value("email", json!("user@example.com"))
        .with_context_value("note", json!("login with password=secret123 then save"));
    let record = h.pipeline.generate_report(&fault, &ReportContext::new()).await;
    let id = record.error_id;

    let result = h.pipeline.submit_report(record, None).await.unwrap();
    assert_eq!(
        result,
        SubmissionResult::Delivered {
            report_id: Some("r-1".to_string())
        }
    );

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    let context = &bodies[0]["additionalContext"];
    assert_eq!(context["email"], json!("[EMAIL_REDACTED]"));
    let note = context["note"].as_str().unwrap();
    assert!(note.contains("password=[REDACTED]"));
    assert!(!note.contains("secret123"));
    assert_eq!(bodies[0]["errorId"], json!(id.to_string()));

    let stored = h.pipeline.queue().find(id).await.unwrap();
    assert_eq!(stored.status, ReportStatus::Sent);
    assert_eq!(stored.remote_id.as_deref(), Some("r-1"));
    assert_eq!(
        stored.record.additional_context["email"],
        json!("[EMAIL_REDACTED]")
    );
}

#[tokio::test]
async fn test_delivered_report_is_not_resent() {
    let server = MockServer::start().await;
    mount_accepting(&server, "r-2").await;
    let h = harness(&server, ConsentLevel::Detailed).await;

    let record = h
        .pipeline
        .generate_report(&FaultEvent::new("Boom"), &ReportContext::new())
        .await;
    h.pipeline.submit_report(record.clone(), None).await.unwrap();
    let second = h.pipeline.submit_report(record, None).await.unwrap();

    assert_eq!(second, SubmissionResult::Duplicate);
    assert_eq!(received_bodies(&server).await.len(), 1);
    assert_eq!(h.pipeline.queue().pending().await.len(), 1);
}

#[tokio::test]
async fn test_basic_consent_never_contacts_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let h = harness(&server, ConsentLevel::Basic).await;

    let record = h
        .pipeline
        .generate_report(&FaultEvent::new("Boom"), &ReportContext::new())
        .await;
    let result = h.pipeline.submit_report(record, None).await.unwrap();
    assert_eq!(result, SubmissionResult::StoredLocally);
    assert_eq!(h.pipeline.queue().pending().await.len(), 1);
}

#[tokio::test]
async fn test_failed_delivery_offers_fallback_and_keeps_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    let h = harness(&server, ConsentLevel::Full).await;

    let record = h
        .pipeline
        .generate_report(&FaultEvent::new("Failed to fetch"), &ReportContext::new())
        .await;
    let id = record.error_id;
    let result = h
        .pipeline
        .submit_report(record, Some("Clicked save on my profile"))
        .await
        .unwrap();

    let SubmissionResult::Failed {
        error,
        fallback_url,
    } = &result
    else {
        panic!("expected failure, got {result:?}");
    };
    assert_eq!(error, "Report delivery failed: HTTP 503");
    assert!(fallback_url
        .as_deref()
        .unwrap()
        .starts_with("mailto:support@example.com?"));

    let response = result.to_response();
    assert!(!response.success);
    assert!(response.fallback_url.is_some());

    let failed = h.pipeline.queue().failed().await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_id(), id);
    assert_eq!(
        failed[0].record.user_description.as_deref(),
        Some("Clicked save on my profile")
    );
}

#[tokio::test]
async fn test_retry_failed_delivers_once_endpoint_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_accepting(&server, "r-3").await;
    let h = harness(&server, ConsentLevel::Full).await;

    let record = h
        .pipeline
        .generate_report(&FaultEvent::new("Boom"), &ReportContext::new())
        .await;
    let id = record.error_id;
    let first = h.pipeline.submit_report(record, None).await.unwrap();
    assert!(!first.is_success());

    let summary = h.pipeline.retry_failed().await;
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.delivered, 1);
    assert!(h.pipeline.queue().failed().await.is_empty());
    assert_eq!(
        h.pipeline.queue().find(id).await.unwrap().remote_id.as_deref(),
        Some("r-3")
    );
}

#[tokio::test]
async fn test_revoke_after_failure_purges_queues() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let h = harness(&server, ConsentLevel::Full).await;

    let record = h
        .pipeline
        .generate_report(&FaultEvent::new("Boom"), &ReportContext::new())
        .await;
    h.pipeline.submit_report(record, None).await.unwrap();
    assert_eq!(h.pipeline.queue().failed().await.len(), 1);

    h.consent.revoke().await.unwrap();
    assert!(h.pipeline.queue().pending().await.is_empty());
    assert!(h.pipeline.queue().failed().await.is_empty());
    assert_eq!(h.pipeline.retry_failed().await.attempted, 0);
}
