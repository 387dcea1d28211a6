use reqwest::StatusCode;
use serde_json::json;

use canister_api::app;
use canister_api::config::Config;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = Config::from_env();
        let (router, _services) = app::build_app(&config).await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn wait_for_projection(client: &reqwest::Client, url: &str) -> serde_json::Value {
    // The projection dispatcher polls asynchronously from the command path;
    // poll briefly until it catches up rather than assuming synchronous consistency.
    for _ in 0..200 {
        let res = client.get(url).send().await.unwrap();
        if res.status() == StatusCode::OK {
            return res.json().await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("projection did not become visible within timeout (url={url})");
}

#[tokio::test]
async fn ping_returns_pong() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/ping", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "pong");
}

#[tokio::test]
async fn canister_lifecycle_create_check_query() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/v1/canister/events", srv.base_url))
        .json(&json!({
            "eventType": "CreateCanister",
            "data": { "mcu": "MCU-1", "tag": "T1", "model": "M1", "name": "Tank 1", "organisation_id": "org-a" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["stream_version"], 1);

    let list_url = format!("{}/api/v1/canister/distribution?organisation_id=org-a", srv.base_url);
    let listed = wait_for_distribution_nonempty(&client, &list_url).await;
    let id = listed[0]["id"].as_str().unwrap().to_string();

    let get_url = format!("{}/api/v1/canister/{id}", srv.base_url);
    let fetched = wait_for_projection(&client, &get_url).await;
    assert_eq!(fetched["mcu"], "MCU-1");
    assert_eq!(fetched["status"], "ReadyForUse");
}

async fn wait_for_distribution_nonempty(client: &reqwest::Client, url: &str) -> Vec<serde_json::Value> {
    for _ in 0..200 {
        let res = client.get(url).send().await.unwrap();
        let body: Vec<serde_json::Value> = res.json().await.unwrap();
        if !body.is_empty() {
            return body;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("distribution listing did not become non-empty within timeout (url={url})");
}

#[tokio::test]
async fn unknown_canister_id_is_404() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let fake_id = uuid::Uuid::now_v7();
    let res = client
        .get(format!("{}/api/v1/canister/{fake_id}", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn creating_the_same_canister_twice_is_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let canister_id = uuid::Uuid::now_v7().to_string();
    let body = json!({
        "eventType": "CreateCanister",
        "data": { "canister_id": canister_id, "mcu": "MCU-2", "organisation_id": "org-b" }
    });

    let res = client
        .post(format!("{}/api/v1/canister/events", srv.base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(format!("{}/api/v1/canister/events", srv.base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unrecognized_event_type_is_bad_request() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/v1/canister/events", srv.base_url))
        .json(&json!({ "eventType": "NotARealEvent", "data": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delivery_note_lifecycle_create_and_query() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/v1/delivery/events", srv.base_url))
        .json(&json!({ "eventType": "CreateDeliveryNote", "data": { "organisation_id": "org-c" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["stream_version"], 1);
}
