//! Admin API tests against a live listener.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use resource_arbiter::admin::{setup_admin_router, AdminState};
use resource_arbiter::ResourceServer;

mod common;
use common::{start_server, status, TestClient};

const API_KEY: &str = "test-admin-key";

async fn start_admin(server: Arc<ResourceServer>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let router = setup_admin_router(AdminState::new(server, API_KEY));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn rejects_missing_or_wrong_key() {
    let (server, _) = start_server(&["alice"], 5, 60_000).await;
    let base = start_admin(Arc::clone(&server)).await;
    let client = client();

    let res = client.get(format!("{base}/admin/status")).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{base}/admin/status"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);

    let res = client
        .post(format!("{base}/admin/free"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);

    server.stop().await;
}

#[tokio::test]
async fn status_reflects_settings() {
    let (server, addr) = start_server(&["alice"], 3, 1234).await;
    let base = start_admin(Arc::clone(&server)).await;

    let status: Value = client()
        .get(format!("{base}/admin/status"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(status["running"], json!(true));
    assert_eq!(status["local_addr"], json!(addr.to_string()));
    assert_eq!(status["client_limit"], json!(3));
    assert_eq!(status["z_time_ms"], json!(1234));
    assert_eq!(status["sessions"], json!(0));
    assert_eq!(status["reject_auth"], json!(false));

    server.stop().await;
}

#[tokio::test]
async fn resources_sessions_and_free() {
    let (server, addr) = start_server(&["alice"], 5, 60_000).await;
    let base = start_admin(Arc::clone(&server)).await;
    let client = client();

    let mut alice = TestClient::connect_admitted(&server, addr).await;
    alice.login(&server, "alice").await;
    alice.request("alice", 2500, 0b0010).await;
    alice.expect(status("alice", 2, 1)).await;

    let resources: Value = client
        .get(format!("{base}/admin/resources"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resources[1]["resource"], json!(2));
    assert_eq!(resources[1]["owner"], json!("alice"));
    assert_eq!(resources[1]["leased"], json!(true));
    assert_eq!(resources[0]["owner"], Value::Null);

    let sessions: Value = client
        .get(format!("{base}/admin/sessions"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sessions[0]["username"], json!("alice"));
    assert_eq!(sessions[0]["last_hold_hint_ms"], json!(2500));

    let times: Value = client
        .get(format!("{base}/admin/resource-times"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(times["alice"].as_u64().unwrap() > 0);

    // A later grant keeps the first acquisition time.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    alice.request("alice", 2500, 0b0100).await;
    alice.expect(status("alice", 3, 1)).await;
    let later: Value = client
        .get(format!("{base}/admin/resource-times"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(later["alice"], times["alice"]);

    let res = client
        .post(format!("{base}/admin/free"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NO_CONTENT);
    alice.expect(status("alice", 2, 2)).await;
    alice.expect(status("alice", 3, 2)).await;
    assert!(server.resources().iter().all(Option::is_none));

    server.stop().await;
}

#[tokio::test]
async fn reject_toggles_and_bans() {
    let (server, addr) = start_server(&["alice"], 5, 60_000).await;
    let base = start_admin(Arc::clone(&server)).await;
    let client = client();

    let res = client
        .post(format!("{base}/admin/reject-requests"))
        .bearer_auth(API_KEY)
        .json(&json!({"reject": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NO_CONTENT);
    assert!(server.rejects_resource_requests());

    let res = client
        .post(format!("{base}/admin/reject-auth"))
        .bearer_auth(API_KEY)
        .json(&json!({"reject": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NO_CONTENT);
    assert!(server.rejects_auth_requests());

    server.reject_auth_requests(false);
    let mut mallory = TestClient::connect_admitted(&server, addr).await;
    mallory.auth("mallory").await;
    mallory.expect_closed().await;

    let bans: Value = client
        .get(format!("{base}/admin/bans"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bans, json!(["127.0.0.1"]));

    server.stop().await;
}
