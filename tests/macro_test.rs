//! Integration tests using the #[gatecheck::test] macro

use gatecheck::transform::{from_fn, TransformError};
#[allow(unused_imports)] // Used in macro-expanded function signatures
use gatecheck::Harness;
use gatecheck::ParamKey;

/// Test using the #[gatecheck::test] macro
/// The macro automatically:
/// - Builds a Harness from tests/resources/test.properties
/// - Lends it to the test as `harness`
/// - Runs teardown afterwards, pass or fail
#[gatecheck::test]
#[ignore] // Requires the management platform credentials in test.properties
async fn test_macro_outbound_workflow(harness: Harness) {
    let api_name_id = harness
        .config()
        .property("apiNameId")
        .expect("apiNameId in test.properties")
        .to_string();
    let api_version_id = harness
        .config()
        .property("apiVersionId")
        .expect("apiVersionId in test.properties")
        .to_string();

    let proxy = harness
        .prepare(&api_name_id, &api_version_id)
        .await
        .expect("Should download the proxy");
    assert!(proxy.path.exists());

    // Copies the download as-is; a real transform rewrites proxy.xml first
    let passthrough = from_fn(|params| {
        let proxy = params.path(ParamKey::Proxy);
        let export = params.path(ParamKey::Export);
        async move {
            let proxy = proxy.ok_or(TransformError::MissingParam(ParamKey::Proxy))?;
            let export = export.ok_or(TransformError::MissingParam(ParamKey::Export))?;
            let name = proxy
                .file_name()
                .ok_or_else(|| TransformError::Failed("proxy has no file name".into()))?;
            tokio::fs::create_dir_all(&export).await?;
            tokio::fs::copy(&proxy, export.join(name)).await?;
            Ok(())
        }
    });

    harness.deploy_https().await.expect("Should deploy");
    harness
        .test_outbound_processing(&passthrough)
        .await
        .expect("Proxy should use HTTPS outbound");
}

/// Result-returning bodies: an Err fails the test after teardown
#[gatecheck::test]
#[ignore] // Requires the management platform credentials in test.properties
async fn test_macro_with_result(harness: Harness) -> Result<(), gatecheck::HarnessError> {
    harness.prepare_to_connect("apiName", "apiVersionName")?;
    assert!(harness.params().contains(ParamKey::ApiName));
    Ok(())
}

/// Test without harness parameter - should just work as regular async test
#[gatecheck::test]
async fn test_macro_without_harness() {
    // No harness needed - macro just wraps with #[tokio::test]
    let x = 1 + 1;
    assert_eq!(x, 2);
}
