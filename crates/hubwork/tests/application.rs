//! Builds an application from an on-disk home and serves it.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use hubwork::prelude::*;
use serde_json::{json, Value};

/// Stamps the attached response with a header.
struct Stamp;

#[async_trait]
impl Task for Stamp {
    fn name(&self) -> &str {
        "stamp"
    }

    async fn apply(&self, _ctx: &ExecContext, request: &mut CanonicalRequest) -> HubResult<()> {
        if let Some(response) = request.response_mut() {
            response
                .headers_mut()
                .insert("x-stamped", http_value("yes"));
        }
        Ok(())
    }
}

fn http_value(value: &'static str) -> reqwest::header::HeaderValue {
    reqwest::header::HeaderValue::from_static(value)
}

/// Answers 418 so a replaced built-in is observable.
struct Teapot;

#[async_trait]
impl Target for Teapot {
    async fn apply(
        &self,
        _ctx: &ExecContext,
        _request: &mut CanonicalRequest,
    ) -> HubResult<Option<CanonicalResponse>> {
        Ok(Some(CanonicalResponse::new(
            reqwest::StatusCode::IM_A_TEAPOT,
        )))
    }
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn home() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("hub.yaml"),
        r#"
apiVersion: v1
specType: Hub
spec:
  applicationName: pantry
  applicationVersion: "0.3.0"
  publicPort: 18431
  apis:
    - name: store
      aggregates:
        items: aggregates/items.yaml
        kettle: aggregates/kettle.yaml
"#,
    );
    write(
        &dir.path().join("aggregates/items.yaml"),
        r#"
apiVersion: v1
specType: Aggregate
spec:
  name: items
  apiName: store
  isPublic: true
  handlers:
    - methods: [GET, POST, PUT, DELETE]
      inbound:
        - name: log-request
          type: request_logger
          config: { logLevel: debug }
      outbound:
        - name: stamp
          type: stamp
      target:
        name: items-store
        type: key_value
        config: { idField: sku }
"#,
    );
    write(
        &dir.path().join("aggregates/kettle.yaml"),
        r#"
apiVersion: v1
specType: Aggregate
spec:
  name: kettle
  apiName: store
  handlers:
    - methods: [GET]
      target:
        name: kettle
        type: noop
"#,
    );
    dir
}

fn build(home: &Path) -> Application {
    Application::builder("pantry-app")
        .home(home)
        .public_port(0)
        .private_port(0)
        .with_task("stamp", |_: &Value| Ok(Arc::new(Stamp) as Arc<dyn Task>))
        .with_target("noop", |_: &Value| Ok(Arc::new(Teapot) as Arc<dyn Target>))
        .build()
        .unwrap()
}

#[test]
fn test_build_compiles_home() {
    let home = home();
    let app = build(home.path());

    assert_eq!(app.name(), "pantry-app");
    assert_eq!(app.hub().application_name(), "pantry");
    assert_eq!(app.hub().application_version(), Some("0.3.0"));
    assert_eq!(app.hub().service_count(), 2);
    assert!(app.hub().resolve("store", "items").unwrap().is_public());
    assert!(!app.hub().resolve("store", "kettle").unwrap().is_public());
    assert!(app.registries().tasks.contains("remote_http"));
    assert!(app.registries().tasks.contains("stamp"));
    assert!(app.config().server.public_addr.ends_with(":0"));
}

#[test]
fn test_hub_yaml_port_used_when_builder_silent() {
    let home = home();
    let app = Application::builder("pantry-app")
        .home(home.path())
        .with_task("stamp", |_: &Value| Ok(Arc::new(Stamp) as Arc<dyn Task>))
        .build()
        .unwrap();
    assert_eq!(app.config().server.public_addr, "0.0.0.0:18431");
    assert_eq!(
        app.config().server.private_addr.as_deref(),
        Some("127.0.0.1:3532")
    );
}

#[test]
fn test_unknown_task_type_fails_build() {
    let home = home();
    let result = Application::builder("pantry-app").home(home.path()).build();
    let err = result.unwrap_err();
    assert!(matches!(err, ApplicationError::Config(_)));
    assert!(err.to_string().contains("stamp"));
}

#[tokio::test]
async fn test_serves_compiled_hub() {
    let home = home();
    let bound = build(home.path()).server().unwrap().bind().await.unwrap();
    let public = bound.public_addr().unwrap();
    let private = bound.private_addr().unwrap().unwrap();
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(bound.serve(shutdown.clone()));
    let client = reqwest::Client::new();

    let created = client
        .post(format!("http://{public}/store/items"))
        .json(&json!({"sku": "tea-1", "name": "sencha"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    assert_eq!(created.headers()["x-stamped"], "yes");

    let fetched: Value = client
        .get(format!("http://{public}/store/items/tea-1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["name"], "sencha");

    let hidden = client
        .get(format!("http://{public}/store/kettle"))
        .send()
        .await
        .unwrap();
    assert_eq!(hidden.status(), 404);

    let replaced = client
        .get(format!("http://{private}/internal/call/store/kettle"))
        .send()
        .await
        .unwrap();
    assert_eq!(replaced.status(), 418);

    shutdown.trigger();
    handle.await.unwrap().unwrap();
}
