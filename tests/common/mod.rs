//! Shared fixtures: a mock management platform, proxy archives, and a fake
//! gateway that hot-deploys from a directory.

#![allow(dead_code)]

use gatecheck::params::{InputParams, ParamKey};
use gatecheck::transform::{from_fn, Transform, TransformError};
use gatecheck::GatewayConfig;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const TOKEN: &str = "test-token";
pub const API_NAME_ID: &str = "4051";
pub const API_VERSION_ID: &str = "29837";
pub const PROXY_ZIP: &str = "orders-proxy.zip";
pub const GATEWAY_DOWNLOAD_VERSION: &str = "3.7.0";

pub const OUTBOUND_HTTPS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mule xmlns:http="http://www.mulesoft.org/schema/mule/http" xmlns:tls="http://www.mulesoft.org/schema/mule/tls">
    <http:listener-config name="http-lc" host="0.0.0.0" port="8081"/>
    <http:request-config name="http-request-config" protocol="HTTPS" host="${implementation.host}" port="${implementation.port}">
        <tls:context><tls:key-store path="mule.jks" password="keyStorePassword" keyPassword="secret"/></tls:context>
    </http:request-config>
    <flow name="proxy">
        <http:listener config-ref="http-lc" path="/*"/>
        <http:request config-ref="http-request-config" path="/" method="GET"/>
    </flow>
</mule>"#;

pub const INBOUND_HTTPS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mule xmlns:http="http://www.mulesoft.org/schema/mule/http">
    <http:listener-config name="https-lc" protocol="HTTPS" host="0.0.0.0" port="8082"/>
    <flow name="proxy">
        <http:listener config-ref="https-lc" path="/*"/>
        <http:request config-ref="http-request-config" path="/" method="GET"/>
    </flow>
</mule>"#;

/// The descriptor the platform hands out before any transform
pub const PLAIN_HTTP: &str = r#"<mule>
    <http:listener-config name="http-lc" host="0.0.0.0" port="8081"/>
    <http:request-config name="http-request-config" host="${implementation.host}"/>
    <flow name="proxy">
        <http:listener config-ref="http-lc" path="/*"/>
        <http:request config-ref="http-request-config" path="/"/>
    </flow>
</mule>"#;

/// Zip bytes holding `proxy.xml` and, optionally, the keystore
pub fn proxy_zip(descriptor: &str, with_keystore: bool) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    zip.start_file("proxy.xml", options).unwrap();
    zip.write_all(descriptor.as_bytes()).unwrap();
    zip.add_directory("classes/", options).unwrap();
    zip.start_file("classes/config.properties", options).unwrap();
    zip.write_all(b"implementation.host=localhost\n").unwrap();
    if with_keystore {
        zip.start_file("mule.jks", options).unwrap();
        zip.write_all(&[0xfe, 0xed, 0xfe, 0xed]).unwrap();
    }

    zip.finish().unwrap().into_inner()
}

/// A platform serving one proxy under `API_NAME_ID`/`API_VERSION_ID`
pub async fn mock_platform(proxy: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/apiplatform/repository/apis/{}/versions/{}/proxy",
            API_NAME_ID, API_VERSION_ID
        )))
        .and(query_param("gatewayVersion", GATEWAY_DOWNLOAD_VERSION))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "content-disposition",
                    format!("attachment; filename=\"{}\"", PROXY_ZIP).as_str(),
                )
                .set_body_bytes(proxy),
        )
        .mount(&server)
        .await;

    server
}

pub async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/accounts/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "access_token": TOKEN, "token_type": "bearer" })),
        )
        .mount(server)
        .await;
}

/// Config for a mock platform, not live, with short timings
pub fn config_for(server: &MockServer) -> GatewayConfig {
    GatewayConfig::new(server.uri())
        .credentials("tester", "s3cret")
        .login_uri("/accounts/login")
        .download_proxy_uri("/apiplatform/repository/")
        .gateway_version("3.7.0")
        .gateway_download_version(GATEWAY_DOWNLOAD_VERSION)
        .deploy_timeout(Duration::from_secs(5))
        .undeploy_timeout(Duration::from_secs(2))
        .poll_interval(Duration::from_millis(20))
}

/// A transform that writes `archive` as the exported proxy
pub fn exporting(archive: Vec<u8>) -> impl Transform {
    from_fn(move |params: &InputParams| {
        let archive = archive.clone();
        let proxy = params.path(ParamKey::Proxy);
        let export = params.path(ParamKey::Export);
        async move {
            let proxy = proxy.ok_or(TransformError::MissingParam(ParamKey::Proxy))?;
            let export = export.ok_or(TransformError::MissingParam(ParamKey::Export))?;
            let name = proxy
                .file_name()
                .ok_or_else(|| TransformError::Failed("proxy path has no file name".into()))?;
            tokio::fs::create_dir_all(&export).await?;
            tokio::fs::write(export.join(name), archive).await?;
            Ok(())
        }
    })
    .named("exporting")
}

/// A transform that fails without writing anything
pub fn failing(cause: &'static str) -> impl Transform {
    from_fn(move |_: &InputParams| async move { Err(TransformError::Failed(cause.to_string())) })
        .named("failing")
}

/// Watches `apps` like a gateway: `<app>.zip` in, `<app>/` plus
/// `<app>-anchor.txt` out; a removed anchor undeploys `<app>/`.
pub fn spawn_fake_gateway(apps: PathBuf) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut deployed: HashSet<String> = HashSet::new();
        loop {
            if let Ok(entries) = std::fs::read_dir(&apps) {
                for entry in entries.flatten() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if let Some(app) = name.strip_suffix(".zip") {
                        let _ = std::fs::create_dir_all(apps.join(app));
                        let _ = std::fs::remove_file(entry.path());
                        let _ = std::fs::write(apps.join(format!("{}-anchor.txt", app)), "");
                        deployed.insert(app.to_string());
                    }
                }
            }

            deployed.retain(|app| {
                if apps.join(format!("{}-anchor.txt", app)).exists() {
                    return true;
                }
                let _ = std::fs::remove_dir_all(apps.join(app));
                false
            });

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
}
