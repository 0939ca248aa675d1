//! End-to-end dispatch through registries, workflows, services and the hub.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde_json::{json, Value};

use hubwork_core::fixtures::{EchoTarget, FailingTask, MarkerTask, SlowTask};
use hubwork_core::{
    decode_config, ExecContext, Handler, HttpMethod, Hub, HubError, Registries, Service, Target,
    Task, Workflow, WorkflowStep,
};

#[derive(serde::Deserialize)]
struct MarkerConfig {
    marker: String,
}

fn registries() -> Registries {
    let registries = Registries::new();
    registries.tasks.register("marker", |config: &Value| {
        let cfg: MarkerConfig = decode_config("marker", config)?;
        Ok(Arc::new(MarkerTask::new(cfg.marker)) as Arc<dyn Task>)
    });
    registries.tasks.register("fail", |_: &Value| {
        Ok(Arc::new(FailingTask::new("fail")) as Arc<dyn Task>)
    });
    registries
        .targets
        .register("echo", |_: &Value| Ok(EchoTarget::new() as Arc<dyn Target>));
    registries
}

fn step(registries: &Registries, name: &str, precedence: i32, marker: &str) -> WorkflowStep {
    let task = registries
        .tasks
        .resolve("marker", &json!({ "marker": marker }))
        .unwrap();
    WorkflowStep::new(name, precedence, task).with_task_type("marker")
}

fn request(method: &str, uri: &str, body: &'static str) -> http::Request<Full<Bytes>> {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}

#[tokio::test]
async fn test_inbound_target_outbound_order() {
    let registries = registries();
    let inbound: Workflow = [
        step(&registries, "second", 5, "2"),
        step(&registries, "first", -1, "1"),
    ]
    .into_iter()
    .collect();
    let outbound = Workflow::new().with_step(step(&registries, "out", 0, "<"));

    let handler = Handler::builder()
        .inbound(inbound)
        .target(registries.targets.resolve("echo", &Value::Null).unwrap())
        .target_info("echo-target", "echo")
        .outbound(outbound)
        .build();

    let hub = Hub::new("orders-app");
    hub.add_service(Service::new("orders", "checkout").with_handler(HttpMethod::Post, Arc::new(handler)));

    let response = hub
        .handle_request(request("POST", "/orders/checkout?dry=1", ">"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b">12<");
}

#[tokio::test]
async fn test_inbound_failure_never_reaches_target() {
    let registries = registries();
    let target = EchoTarget::new();
    let handler = Handler::builder()
        .inbound(Workflow::new().with_step(WorkflowStep::new(
            "reject",
            0,
            registries.tasks.resolve("fail", &Value::Null).unwrap(),
        )))
        .target(target.clone())
        .build();

    let hub = Hub::new("app");
    hub.add_service(Service::new("orders", "checkout").with_handler(HttpMethod::Post, Arc::new(handler)));

    let failure = hub
        .handle_request(request("POST", "/orders/checkout", "{}"))
        .await
        .unwrap_err();
    assert_eq!(failure.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(matches!(failure.error(), HubError::Plugin { .. }));
    assert_eq!(target.calls(), 0);
}

#[tokio::test]
async fn test_unregistered_task_surfaces_not_registered() {
    let registries = registries();
    let err = registries
        .tasks
        .resolve("rate_limit", &Value::Null)
        .err().unwrap();
    assert!(err.is_not_registered());
}

#[tokio::test(start_paused = true)]
async fn test_service_timeout_becomes_gateway_timeout() {
    let handler = Handler::builder()
        .inbound(Workflow::new().with_step(WorkflowStep::new(
            "slow",
            0,
            Arc::new(SlowTask::new(Duration::from_secs(30))),
        )))
        .target(EchoTarget::new())
        .build();

    let hub = Hub::new("app");
    hub.add_service(
        Service::new("orders", "checkout")
            .with_timeout(Duration::from_millis(200))
            .with_handler(HttpMethod::Get, Arc::new(handler)),
    );

    let failure = hub
        .handle_request(request("GET", "/orders/checkout", ""))
        .await
        .unwrap_err();
    assert_eq!(failure.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(matches!(failure.error(), HubError::Cancelled { .. }));
}

#[tokio::test]
async fn test_cancelled_caller_stops_dispatch() {
    let handler = Handler::builder()
        .inbound(Workflow::new().with_step(WorkflowStep::new(
            "slow",
            0,
            Arc::new(SlowTask::new(Duration::from_secs(30))),
        )))
        .target(EchoTarget::new())
        .build();
    let hub = Hub::new("app");
    hub.add_service(Service::new("orders", "checkout").with_handler(HttpMethod::Get, Arc::new(handler)));

    let ctx = ExecContext::new();
    ctx.cancel();
    let failure = hub
        .handle_request_with_context(&ctx, request("GET", "/orders/checkout", ""))
        .await
        .unwrap_err();
    assert_eq!(failure.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_concurrent_requests_share_services() {
    let hub = Arc::new(Hub::new("app"));
    let target = EchoTarget::new();
    let handler = Arc::new(Handler::builder().target(target.clone()).build());
    hub.add_service(Service::new("orders", "checkout").with_handler(HttpMethod::Post, handler));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let hub = Arc::clone(&hub);
        tasks.push(tokio::spawn(async move {
            let body = format!("req-{i}");
            let req = http::Request::builder()
                .method("POST")
                .uri("/orders/checkout")
                .body(Full::new(Bytes::from(body.clone())))
                .unwrap();
            let response = hub.handle_request(req).await.unwrap();
            assert_eq!(response.body(), &Bytes::from(body));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(target.calls(), 16);
}
