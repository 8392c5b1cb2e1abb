//! End-to-end transfers between real nodes on loopback

use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use lanshare::{api::AppState, config::Config, create_router, node::Node};

struct TestNode {
    address: String,
    node: Node,
    staging_dir: PathBuf,
    server: JoinHandle<()>,
}

impl TestNode {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn spawn_node(name: &str) -> TestNode {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("127.0.0.1:{}", port);

    let root = std::env::temp_dir().join(format!("lanshare-flow-{}", uuid::Uuid::new_v4()));
    let config = Config {
        port,
        device_name: Some(name.to_string()),
        advertise_address: Some(address.clone()),
        staging_dir: root.join("staging"),
        inbox_dir: root.join("inbox"),
        discovery_enabled: false,
        ..Config::default()
    };
    let staging_dir = config.staging_dir.clone();

    let node = Node::new(config).await.unwrap();
    let app = create_router(AppState::new(&node));
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestNode {
        address,
        node,
        staging_dir,
        server,
    }
}

async fn send_file(http: &reqwest::Client, sender: &TestNode, target: &str, bytes: Vec<u8>) -> Value {
    let form = Form::new()
        .part("file", Part::bytes(bytes).file_name("payload.bin"))
        .text("target", target.to_string());

    let response = http
        .post(sender.url("/api/send"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.unwrap()
}

async fn transfer(http: &reqwest::Client, node: &TestNode, id: &str) -> Value {
    http.get(node.url(&format!("/api/transfers/{}", id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Poll until the transfer on `node` reaches `status`
async fn wait_for_status(http: &reqwest::Client, node: &TestNode, id: &str, status: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let current = transfer(http, node, id).await;
        if current["status"] == status {
            return current;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "transfer {} on {} stuck at {}",
            id,
            node.address,
            current["status"]
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn wait_until_unstaged(node: &TestNode, id: &str) {
    let path = node.staging_dir.join(format!("{}.bin", id));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while path.exists() {
        assert!(tokio::time::Instant::now() < deadline, "{} still staged", id);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_push_ten_megabytes() {
    let alice = spawn_node("alice@laptop").await;
    let bob = spawn_node("bob@desk").await;
    let http = reqwest::Client::new();

    let payload: Vec<u8> = (0..10 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    let sent = send_file(&http, &alice, &bob.address, payload.clone()).await;
    let id = sent["id"].as_str().unwrap().to_string();
    assert_eq!(sent["status"], "pending");
    assert_eq!(sent["direction"], "outgoing");

    let offered = transfer(&http, &bob, &id).await;
    assert_eq!(offered["status"], "pending");
    assert_eq!(offered["direction"], "incoming");
    assert_eq!(offered["senderAddress"], alice.address.as_str());

    let response = http
        .post(bob.url(&format!("/api/accept/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let on_bob = wait_for_status(&http, &bob, &id, "completed").await;
    let on_alice = wait_for_status(&http, &alice, &id, "completed").await;
    assert_eq!(on_bob["sizeBytes"], payload.len() as u64);
    assert_eq!(on_alice["sizeBytes"], on_bob["sizeBytes"]);

    wait_until_unstaged(&alice, &id).await;

    let response = http
        .get(bob.url(&format!("/api/download/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let downloaded = response.bytes().await.unwrap();
    assert_eq!(downloaded.len(), payload.len());
    assert!(downloaded.as_ref() == payload.as_slice());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reject_reaches_sender() {
    let alice = spawn_node("alice@laptop").await;
    let bob = spawn_node("bob@desk").await;
    let http = reqwest::Client::new();

    let sent = send_file(&http, &alice, &bob.address, b"not wanted".to_vec()).await;
    let id = sent["id"].as_str().unwrap().to_string();

    let response = http
        .post(bob.url(&format!("/api/reject/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    wait_for_status(&http, &alice, &id, "rejected").await;
    wait_until_unstaged(&alice, &id).await;

    // Terminal on both sides
    let response = http
        .post(bob.url(&format!("/api/accept/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_have_one_winner() {
    let alice = spawn_node("alice@laptop").await;
    let bob = spawn_node("bob@desk").await;
    let http = reqwest::Client::new();

    let sent = send_file(&http, &alice, &bob.address, vec![7u8; 4096]).await;
    let id = sent["id"].as_str().unwrap().to_string();
    let accept_url = bob.url(&format!("/api/accept/{}", id));

    let (a, b) = tokio::join!(
        http.post(&accept_url).send(),
        http.post(&accept_url).send()
    );
    let mut statuses = vec![a.unwrap().status(), b.unwrap().status()];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);

    wait_for_status(&http, &bob, &id, "completed").await;
    wait_for_status(&http, &alice, &id, "completed").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_observer_sees_transfer_lifecycle() {
    let alice = spawn_node("alice@laptop").await;
    let bob = spawn_node("bob@desk").await;
    let http = reqwest::Client::new();

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", bob.address))
        .await
        .unwrap();

    // The hub subscription is made after the upgrade completes
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while bob.node.hub.subscriber_count().await == 0 {
        assert!(tokio::time::Instant::now() < deadline, "observer never subscribed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let sent = send_file(&http, &alice, &bob.address, b"hello bob".to_vec()).await;
    let id = sent["id"].as_str().unwrap().to_string();

    let response = http
        .post(bob.url(&format!("/api/accept/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut transfer_events = Vec::new();
    let mut saw_sender = false;
    let collect = async {
        while let Some(Ok(message)) = socket.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let event: Value = serde_json::from_str(&text).unwrap();
            let kind = event["type"].as_str().unwrap().to_string();

            if kind == "peer_discovered" {
                assert_eq!(event["payload"]["displayName"], "alice@laptop");
                saw_sender = true;
                continue;
            }

            assert_eq!(event["payload"]["id"], id.as_str());
            transfer_events.push(kind.clone());
            if kind == "transfer_completed" {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(15), collect)
        .await
        .expect("events did not arrive in time");

    assert!(saw_sender);
    assert_eq!(
        transfer_events,
        vec!["transfer_request", "transfer_accepted", "transfer_completed"]
    );
}
