//! The full proxy workflow against a mock management platform

mod common;

use common::*;
use gatecheck::diagnostics::Step;
use gatecheck::{
    DeployOutcome, FetchError, Harness, HarnessError, ParamKey, SessionError, TransformOutcome,
    VerifyError, Workspace,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_outbound_workflow() {
    let server = mock_platform(proxy_zip(PLAIN_HTTP, false)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(config_for(&server), Workspace::new(dir.path()));

    let proxy = harness.prepare(API_NAME_ID, API_VERSION_ID).await.unwrap();
    assert_eq!(proxy.file_name, PROXY_ZIP);
    assert_eq!(proxy.path, dir.path().join("input").join(PROXY_ZIP));
    assert!(proxy.path.exists());
    assert_eq!(
        harness.params().path(ParamKey::Proxy),
        Some(dir.path().join("input").join(PROXY_ZIP))
    );

    let report = harness
        .test_outbound_processing(&exporting(proxy_zip(OUTBOUND_HTTPS, true)))
        .await
        .unwrap();

    assert!(report.protocol.eq_ignore_ascii_case("https"));
    assert!(dir.path().join("export").join(PROXY_ZIP).exists());
    assert!(dir.path().join("tmp").join("proxy.xml").exists());
    assert!(dir.path().join("tmp").join("mule.jks").exists());
    assert!(!harness.diagnostics().has_failures());
}

#[tokio::test]
async fn test_inbound_workflow() {
    let server = mock_platform(proxy_zip(PLAIN_HTTP, false)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(config_for(&server), Workspace::new(dir.path()));
    harness.prepare(API_NAME_ID, API_VERSION_ID).await.unwrap();

    harness
        .test_inbound_processing(&exporting(proxy_zip(INBOUND_HTTPS, true)))
        .await
        .unwrap();

    // The same artifact has no outbound HTTPS config
    let err = harness
        .test_outbound_processing(&exporting(proxy_zip(INBOUND_HTTPS, true)))
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Verify(_)));
}

#[tokio::test]
async fn test_unknown_api_version_writes_nothing() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(config_for(&server), Workspace::new(dir.path()));

    let err = harness.prepare("1", "2").await.unwrap_err();

    match err {
        HarnessError::Fetch(FetchError::NoSuchApi {
            api_name_id,
            api_version_id,
        }) => {
            assert_eq!(api_name_id, "1");
            assert_eq!(api_version_id, "2");
        }
        other => panic!("expected NoSuchApi, got {other:?}"),
    }
    let input = dir.path().join("input");
    assert!(!input.exists() || std::fs::read_dir(&input).unwrap().next().is_none());
    assert!(harness.proxy().is_none());
    assert_eq!(harness.diagnostics().records(Step::Download).count(), 1);
}

#[tokio::test]
async fn test_rejected_login_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/accounts/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(config_for(&server), Workspace::new(dir.path()));

    let err = harness.prepare(API_NAME_ID, API_VERSION_ID).await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Session(SessionError::Rejected { .. })
    ));
    assert!(harness.diagnostics().has_failures());
}

#[tokio::test]
async fn test_failing_transform_reports_missing_artifact() {
    let server = mock_platform(proxy_zip(PLAIN_HTTP, false)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(config_for(&server), Workspace::new(dir.path()));
    harness.prepare(API_NAME_ID, API_VERSION_ID).await.unwrap();

    let err = harness
        .test_outbound_processing(&failing("keystore not found"))
        .await
        .unwrap_err();

    match &err {
        HarnessError::MissingArtifact { path, outcome } => {
            assert_eq!(path, &dir.path().join("export").join(PROXY_ZIP));
            assert_eq!(
                outcome,
                &TransformOutcome::Failed("keystore not found".to_string())
            );
        }
        other => panic!("expected MissingArtifact, got {other:?}"),
    }
    assert!(err.to_string().contains("Modified zip file should be created"));

    let diagnostics = harness.diagnostics().to_string();
    assert!(diagnostics.contains("failing failed: keystore not found"));
    assert!(!dir.path().join("tmp").exists(), "nothing extracted");
}

#[tokio::test]
async fn test_plain_http_artifact_fails_verification() {
    let server = mock_platform(proxy_zip(PLAIN_HTTP, false)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(config_for(&server), Workspace::new(dir.path()));
    harness.prepare(API_NAME_ID, API_VERSION_ID).await.unwrap();

    // Transform "succeeds" but leaves the proxy on HTTP without a keystore
    let err = harness
        .test_outbound_processing(&exporting(proxy_zip(PLAIN_HTTP, false)))
        .await
        .unwrap_err();

    match err {
        HarnessError::Verify(VerifyError::Failed { failures }) => {
            assert_eq!(failures.len(), 2, "{failures:?}");
            assert!(failures[0].contains("protocol"));
            assert!(failures[1].contains("Keystore"));
        }
        other => panic!("expected verification failure, got {other:?}"),
    }

    let diagnostics = harness.diagnostics().to_string();
    assert!(diagnostics.contains("exporting succeeded"));
    assert!(diagnostics.contains("artifact it produced"));
}

#[tokio::test]
async fn test_prepare_clears_previous_run() {
    let server = mock_platform(proxy_zip(PLAIN_HTTP, false)).await;
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("export").join(PROXY_ZIP);
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, "left over").unwrap();
    std::fs::create_dir_all(dir.path().join("tmp")).unwrap();

    let mut harness = Harness::new(config_for(&server), Workspace::new(dir.path()));
    harness.prepare(API_NAME_ID, API_VERSION_ID).await.unwrap();

    assert!(!stale.exists());
    assert!(!dir.path().join("tmp").exists());

    // A stale export must not stand in for a transform that produced nothing
    let err = harness
        .test_outbound_processing(&failing("no output"))
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::MissingArtifact { .. }));
}

#[tokio::test]
async fn test_live_gateway_deploy_and_teardown() {
    let server = mock_platform(proxy_zip(PLAIN_HTTP, false)).await;
    let dir = tempfile::tempdir().unwrap();
    let apps = dir.path().join("gateway-apps");
    std::fs::create_dir_all(&apps).unwrap();
    std::fs::write(dir.path().join("https-test.zip"), proxy_zip(OUTBOUND_HTTPS, true)).unwrap();
    let gateway = spawn_fake_gateway(apps.clone());

    let config = config_for(&server).live_gateway(&apps);
    let mut harness = Harness::new(config, Workspace::new(dir.path()));
    harness.prepare(API_NAME_ID, API_VERSION_ID).await.unwrap();

    let fixture = harness.deploy_https().await.unwrap();
    assert!(fixture.is_ready(), "{fixture:?}");
    assert!(apps.join("https-test-anchor.txt").exists());

    harness
        .test_outbound_processing(&exporting(proxy_zip(OUTBOUND_HTTPS, true)))
        .await
        .unwrap();
    assert!(apps.join("orders-proxy-anchor.txt").exists());
    assert!(apps.join("orders-proxy").is_dir());

    harness.teardown().await;
    gateway.abort();

    assert!(!apps.join("orders-proxy-anchor.txt").exists());
    assert!(!apps.join("orders-proxy").exists());
    // Only the proxy is undeployed; fixture apps stay for the next test
    assert!(apps.join("https-test").is_dir());
    for sub in ["input", "export", "tmp"] {
        assert!(!dir.path().join(sub).exists());
    }
    assert!(!harness.diagnostics().has_failures());
}

#[tokio::test]
async fn test_unresponsive_gateway_is_recorded_not_fatal() {
    let server = mock_platform(proxy_zip(PLAIN_HTTP, false)).await;
    let dir = tempfile::tempdir().unwrap();
    let apps = dir.path().join("gateway-apps");
    std::fs::create_dir_all(&apps).unwrap();

    let config = config_for(&server)
        .live_gateway(&apps)
        .deploy_timeout(std::time::Duration::from_millis(100))
        .undeploy_timeout(std::time::Duration::from_millis(100));
    let mut harness = Harness::new(config, Workspace::new(dir.path()));
    harness.prepare(API_NAME_ID, API_VERSION_ID).await.unwrap();

    // No gateway watching: deployment times out, verification still runs
    harness
        .test_outbound_processing(&exporting(proxy_zip(OUTBOUND_HTTPS, true)))
        .await
        .unwrap();

    let deploys: Vec<_> = harness.diagnostics().records(Step::Deploy).collect();
    assert_eq!(deploys.len(), 1);
    assert!(!deploys[0].ok);
    assert!(deploys[0].message.contains("orders-proxy-anchor.txt not created"));

    harness.teardown().await;
    assert!(!dir.path().join("export").exists());
}

#[tokio::test]
async fn test_skipped_deploy_when_not_live() {
    let server = mock_platform(proxy_zip(PLAIN_HTTP, false)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(config_for(&server), Workspace::new(dir.path()));

    let start = std::time::Instant::now();
    assert!(matches!(
        harness.deploy_https_for_wsdl().await.unwrap(),
        DeployOutcome::Skipped
    ));
    assert!(start.elapsed() < std::time::Duration::from_secs(1));
    assert!(harness.make_test_request("http://localhost:1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_failing_transform_after_passing_run_is_not_masked() {
    let server = mock_platform(proxy_zip(PLAIN_HTTP, false)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(config_for(&server), Workspace::new(dir.path()));
    harness.prepare(API_NAME_ID, API_VERSION_ID).await.unwrap();

    harness
        .test_outbound_processing(&exporting(proxy_zip(OUTBOUND_HTTPS, true)))
        .await
        .unwrap();
    assert!(dir.path().join("export").join(PROXY_ZIP).exists());

    // The first run's export must not stand in for this one
    let err = harness
        .test_outbound_processing(&failing("boom"))
        .await
        .unwrap_err();

    match err {
        HarnessError::MissingArtifact { outcome, .. } => {
            assert_eq!(outcome, TransformOutcome::Failed("boom".to_string()));
        }
        other => panic!("expected MissingArtifact, got {other:?}"),
    }
}

#[tokio::test]
async fn test_keystore_from_earlier_extraction_is_not_reused() {
    let server = mock_platform(proxy_zip(PLAIN_HTTP, false)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(config_for(&server), Workspace::new(dir.path()));
    harness.prepare(API_NAME_ID, API_VERSION_ID).await.unwrap();

    harness
        .test_outbound_processing(&exporting(proxy_zip(OUTBOUND_HTTPS, true)))
        .await
        .unwrap();
    assert!(dir.path().join("tmp").join("mule.jks").exists());

    let err = harness
        .test_outbound_processing(&exporting(proxy_zip(OUTBOUND_HTTPS, false)))
        .await
        .unwrap_err();

    match err {
        HarnessError::Verify(VerifyError::Failed { failures }) => {
            assert_eq!(failures.len(), 1, "{failures:?}");
            assert!(failures[0].contains("Keystore"));
        }
        other => panic!("expected verification failure, got {other:?}"),
    }
    assert!(!dir.path().join("tmp").join("mule.jks").exists());
}
