//! End-to-end tests of the public and private listeners over real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hubwork_core::fixtures::{EchoTarget, SlowTask};
use hubwork_core::{Handler, HttpMethod, Hub, Service, Workflow, WorkflowStep};
use hubwork_server::{Server, ServerBuilder, ShutdownSignal};
use serde_json::Value;
use tokio::task::JoinHandle;

struct Running {
    public: SocketAddr,
    private: SocketAddr,
    shutdown: ShutdownSignal,
    handle: JoinHandle<hubwork_server::ServerResult<()>>,
}

impl Running {
    fn public_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.public)
    }

    fn private_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.private)
    }

    async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

fn echo_handler() -> Arc<Handler> {
    Arc::new(Handler::builder().target(EchoTarget::new()).build())
}

fn kitchen_hub() -> Arc<Hub> {
    let hub = Hub::new("recipes").with_version("1.4.0");
    hub.add_service(
        Service::new("kitchen", "soups")
            .with_public(true)
            .with_handler(HttpMethod::Post, echo_handler()),
    );
    hub.add_service(Service::new("kitchen", "pantry").with_handler(HttpMethod::Post, echo_handler()));

    let slow = Workflow::from_iter([WorkflowStep::new(
        "slow",
        0,
        Arc::new(SlowTask::new(Duration::from_secs(10))),
    )]);
    hub.add_service(
        Service::new("kitchen", "oven").with_public(true).with_handler(
            HttpMethod::Get,
            Arc::new(
                Handler::builder()
                    .inbound(slow)
                    .target(EchoTarget::new())
                    .build(),
            ),
        ),
    );
    Arc::new(hub)
}

async fn start(configure: impl FnOnce(ServerBuilder) -> ServerBuilder) -> Running {
    let builder = Server::builder()
        .hub(kitchen_hub())
        .public_addr("127.0.0.1:0")
        .private_addr("127.0.0.1:0")
        .shutdown_timeout(Duration::from_secs(2));
    let bound = configure(builder).build().unwrap().bind().await.unwrap();
    let public = bound.public_addr().unwrap();
    let private = bound.private_addr().unwrap().unwrap();
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(bound.serve(shutdown.clone()));
    Running {
        public,
        private,
        shutdown,
        handle,
    }
}

#[tokio::test]
async fn test_public_service_on_public_listener() {
    let server = start(|b| b).await;
    let response = reqwest::Client::new()
        .post(server.public_url("/kitchen/soups"))
        .body("tomato")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "tomato");
    server.stop().await;
}

#[tokio::test]
async fn test_private_service_hidden_from_public_listener() {
    let server = start(|b| b).await;
    let client = reqwest::Client::new();

    let hidden = client
        .post(server.public_url("/kitchen/pantry"))
        .body("flour")
        .send()
        .await
        .unwrap();
    assert_eq!(hidden.status(), 404);
    let body: Value = hidden.json().await.unwrap();
    assert_eq!(body["error"]["code"], "SERVICE_NOT_FOUND");

    let internal = client
        .post(server.private_url("/internal/call/kitchen/pantry"))
        .body("flour")
        .send()
        .await
        .unwrap();
    assert_eq!(internal.status(), 200);
    assert_eq!(internal.text().await.unwrap(), "flour");
    server.stop().await;
}

#[tokio::test]
async fn test_internal_calls_only_on_private_listener() {
    let server = start(|b| b).await;
    let client = reqwest::Client::new();

    let on_public = client
        .post(server.public_url("/internal/call/kitchen/soups"))
        .send()
        .await
        .unwrap();
    assert_eq!(on_public.status(), 404);

    let plain_on_private = client
        .post(server.private_url("/kitchen/soups"))
        .send()
        .await
        .unwrap();
    assert_eq!(plain_on_private.status(), 404);
    server.stop().await;
}

#[tokio::test]
async fn test_health_and_ready() {
    let server = start(|b| b).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(server.private_url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["application"], "recipes");
    assert_eq!(health["version"], "1.4.0");

    let ready = client.get(server.private_url("/ready")).send().await.unwrap();
    assert_eq!(ready.status(), 200);
    let ready: Value = ready.json().await.unwrap();
    assert_eq!(ready["serviceCount"], 3);
    assert_eq!(ready["services"][0], "kitchen/oven");

    let public_health = client.get(server.public_url("/health")).send().await.unwrap();
    assert_eq!(public_health.status(), 404);
    server.stop().await;
}

#[tokio::test]
async fn test_health_endpoints_answer_head() {
    let server = start(|b| b).await;
    let client = reqwest::Client::new();

    for path in ["/health", "/ready"] {
        let response = client.head(server.private_url(path)).send().await.unwrap();
        assert_eq!(response.status(), 200, "{path}");
    }
    server.stop().await;
}

#[tokio::test]
async fn test_unsupported_method_rejected_before_routing() {
    let server = start(|b| b.max_body_bytes(8)).await;
    let client = reqwest::Client::new();
    let purge = reqwest::Method::from_bytes(b"PURGE").unwrap();

    let private_service = client
        .request(purge.clone(), server.public_url("/kitchen/pantry"))
        .send()
        .await
        .unwrap();
    assert_eq!(private_service.status(), 405);
    let body: Value = private_service.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNSUPPORTED_METHOD");

    let oversized = client
        .request(purge.clone(), server.public_url("/kitchen/soups"))
        .body("minestrone with beans")
        .send()
        .await
        .unwrap();
    assert_eq!(oversized.status(), 405);

    let internal = client
        .request(purge, server.private_url("/internal/call/kitchen/pantry"))
        .send()
        .await
        .unwrap();
    assert_eq!(internal.status(), 405);
    server.stop().await;
}

#[tokio::test]
async fn test_unknown_service_envelope_carries_request_id() {
    let server = start(|b| b).await;
    let response = reqwest::Client::new()
        .get(server.public_url("/kitchen/cellar"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(
        response.headers()["content-type"],
        "application/json"
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "SERVICE_NOT_FOUND");
    assert_eq!(body["error"]["kind"], "not_found");
    assert!(body["requestId"].as_str().is_some_and(|id| !id.is_empty()));
    server.stop().await;
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let server = start(|b| b.max_body_bytes(8)).await;
    let response = reqwest::Client::new()
        .post(server.public_url("/kitchen/soups"))
        .body("minestrone with beans")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    server.stop().await;
}

#[tokio::test]
async fn test_request_timeout_maps_to_gateway_timeout() {
    let server = start(|b| b.request_timeout(Duration::from_millis(50))).await;
    let response = reqwest::Client::new()
        .get(server.public_url("/kitchen/oven"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 504);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CANCELLED");
    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let server = start(|b| b).await;
    let public = server.public;
    server.stop().await;

    let refused = reqwest::Client::new()
        .post(format!("http://{public}/kitchen/soups"))
        .timeout(Duration::from_secs(1))
        .send()
        .await;
    assert!(refused.is_err());
}

#[tokio::test]
async fn test_public_only_server() {
    let bound = Server::builder()
        .hub(kitchen_hub())
        .public_addr("127.0.0.1:0")
        .without_private_listener()
        .build()
        .unwrap()
        .bind()
        .await
        .unwrap();
    assert!(bound.private_addr().unwrap().is_none());

    let public = bound.public_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(bound.serve(shutdown.clone()));

    let response = reqwest::Client::new()
        .post(format!("http://{public}/kitchen/soups"))
        .body("leek")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    shutdown.trigger();
    handle.await.unwrap().unwrap();
}
