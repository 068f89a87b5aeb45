//! End-to-end tests of the daemon router with the built-in controllers.

use axum::http::{Method, StatusCode};
use esm_test_utils::daemon::TestServer;
use esm_test_utils::module::TestModule;
use esm_test_utils::tracing_setup::init_test_tracing;
use pretty_assertions::assert_eq;
use serde_json::json;

const MODULE_YML: &str = "\
name: widgets
organization: acme
version: 1.0.0
npm:
  - left-pad
commands:
  build: make
";

#[tokio::test]
async fn test_loading_server_only_answers_status() {
    let server = TestServer::loading();

    let (status, body) = server.get("/esm-status", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"server": "esm", "loaded": false, "version": 1}));

    let (status, body) = server.get("/module-yml", &[]).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "server-loading");
}

#[tokio::test]
async fn test_application_status() {
    let server = TestServer::loaded().await;
    let (status, body) = server.get("/application-status", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert!(body["build"].as_str().unwrap().contains(esm_core::build_info::VERSION));
}

#[tokio::test]
async fn test_unknown_route() {
    let server = TestServer::loaded().await;
    let (status, body) = server.get("/no-such-resource", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "route-not-found");
}

#[tokio::test]
async fn test_module_yml_requires_module_header() {
    let server = TestServer::loaded().await;
    let (status, body) = server.get("/module-yml", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad-request");
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_module_yml_list() {
    let server = TestServer::loaded().await;
    let module = TestModule::with_yaml(MODULE_YML);
    let header = module.header();

    let (status, body) = server.get("/module-yml", &[("module", &header)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "widgets");
    assert_eq!(body["npm"], json!(["left-pad"]));

    let (status, body) = server
        .get("/module-yml", &[("module", &header), ("key", "commands.build")])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"value": "make"}));

    let (status, body) = server
        .get("/module-yml", &[("module", &header), ("key", "npm.0")])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"value": "left-pad"}));
}

#[tokio::test]
async fn test_module_yml_missing_key() {
    let server = TestServer::loaded().await;
    let module = TestModule::with_yaml(MODULE_YML);

    let (status, body) = server
        .get(
            "/module-yml",
            &[("module", &module.header()), ("key", "commands.test")],
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "key-not-found");
    assert_eq!(body["data"], json!({"key": "commands.test"}));
    assert!(body["stack"].as_array().unwrap().len() >= 2);
}

#[tokio::test]
async fn test_module_yml_missing_module() {
    let server = TestServer::loaded().await;
    let module = TestModule::with_yaml(MODULE_YML);
    let absent = module.path().join("nested");

    let (status, body) = server
        .get("/module-yml", &[("module", &absent.display().to_string())])
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "module-not-found");
}

#[tokio::test]
async fn test_module_yml_create_or_update() {
    init_test_tracing();
    let server = TestServer::loaded().await;
    let module = TestModule::with_yaml(MODULE_YML);
    let header = module.header();

    // Warm the cache so the update has to invalidate it.
    server.get("/module-yml", &[("module", &header)]).await;

    let (status, body) = server
        .send(
            Method::PUT,
            "/module-yml/version",
            &[("module", &header)],
            Some(json!({"value": "2.0.0"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"key": "version", "value": "2.0.0"}));

    let (status, body) = server
        .send(
            Method::PUT,
            "/module-yml",
            &[("module", &header)],
            Some(json!({"key": "npm.x", "value": "is-even"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], "npm.x");

    let (_, body) = server.get("/module-yml", &[("module", &header)]).await;
    assert_eq!(body["version"], "2.0.0");
    assert_eq!(body["npm"], json!(["left-pad", "is-even"]));
    assert!(module.read().contains("is-even"));
}

#[tokio::test]
async fn test_module_yml_update_without_key() {
    let server = TestServer::loaded().await;
    let module = TestModule::with_yaml(MODULE_YML);

    let (status, body) = server
        .send(
            Method::PUT,
            "/module-yml",
            &[("module", &module.header())],
            Some(json!({"value": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad-request");
}

#[cfg(unix)]
#[tokio::test]
async fn test_link_create() {
    let server = TestServer::loaded().await;
    let module = TestModule::named("acme", "widgets");
    let project = TestModule::named("acme", "app");

    let (status, body) = server
        .send(
            Method::POST,
            "/link",
            &[],
            Some(json!({"from": module.path(), "to": project.path()})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created"], true);
    let link = std::path::PathBuf::from(body["link"].as_str().unwrap());
    assert!(link.ends_with("es-modules/acme/widgets"));
    assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());

    let (status, body) = server
        .send(
            Method::POST,
            "/link",
            &[],
            Some(json!({"from": module.path(), "to": module.path()})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "link-identical-paths");
}
