use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde_json::{Value, json};

use vpnpanel_client::session::AuthHeaders;
use vpnpanel_client::{ClientError, HttpApi, PortalApi};
use vpnpanel_types::{PaymentStatus, TelegramAuthPayload};

#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<String>>>,
}

impl Seen {
    fn push(&self, line: String) {
        self.requests.lock().unwrap().push(line);
    }

    fn all(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("<missing>")
        .to_string()
}

fn proof_json(id: i64, user_id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "username": "bob",
        "status": status,
        "created_at": "2026-03-05T13:33:00+00:00",
        "reviewed_at": null,
        "reviewed_by": null,
        "reviewed_by_username": "",
        "file_url": format!("/api/payment-proofs/{}/file/", id),
    })
}

async fn telegram_login(Json(body): Json<Value>) -> impl IntoResponse {
    if body["hash"] == "bad" {
        return (StatusCode::FORBIDDEN, Json(json!({"error": "Invalid Telegram signature"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "id": body["id"],
            "username": body["username"],
            "photo": null,
            "token": "tok-123",
            "subscription_url": "https://sub.example.com/s/1",
        })),
    )
}

async fn my_proofs(State(seen): State<Seen>, headers: HeaderMap) -> impl IntoResponse {
    seen.push(format!(
        "list {} {} {}",
        header(&headers, "authorization"),
        header(&headers, "x-telegram-user-id"),
        header(&headers, "x-telegram-username"),
    ));
    Json(json!({"items": [proof_json(1, 42, "pending")]}))
}

async fn upload(State(seen): State<Seen>, mut multipart: Multipart) -> impl IntoResponse {
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        let len = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        seen.push(format!("upload {} {} {}", name, file_name, len));
    }
    (StatusCode::CREATED, Json(json!({"id": 2})))
}

async fn proof_users() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "<html>boom</html>")
}

async fn user_proofs(State(seen): State<Seen>, Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    seen.push(format!("user_proofs {}", q.get("user_id").cloned().unwrap_or_default()));
    Json(json!({"items": [proof_json(5, 7, "approved")]}))
}

async fn update_status(State(seen): State<Seen>, Path(id): Path<i64>, Json(body): Json<Value>) -> impl IntoResponse {
    seen.push(format!("patch {} {}", id, body["status"].as_str().unwrap_or_default()));
    StatusCode::OK
}

async fn delete_proof(State(seen): State<Seen>, Path(id): Path<i64>) -> impl IntoResponse {
    seen.push(format!("delete {}", id));
    (StatusCode::NOT_FOUND, Json(json!({"error": "Submission not found"})))
}

async fn proof_file(Path(id): Path<i64>, headers: HeaderMap) -> impl IntoResponse {
    if header(&headers, "authorization") != "Bearer tok-123" {
        return (StatusCode::UNAUTHORIZED, Vec::new());
    }
    (StatusCode::OK, vec![id as u8; 8])
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn spawn_server() -> (SocketAddr, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/api/health/", get(health))
        .route("/api/auth/telegram/", post(telegram_login))
        .route("/api/payment-proofs/", get(my_proofs).post(upload))
        .route("/api/payment-proofs/{id}/file/", get(proof_file))
        .route("/api/admin/payment-proofs/users/", get(proof_users))
        .route("/api/admin/payment-proofs/", get(user_proofs))
        .route("/api/admin/payment-proofs/{id}/", patch(update_status).delete(delete_proof))
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, seen)
}

fn auth() -> AuthHeaders {
    AuthHeaders {
        authorization: "Bearer tok-123".into(),
        user_id: "42".into(),
        username: "bob".into(),
    }
}

fn payload(hash: &str) -> TelegramAuthPayload {
    TelegramAuthPayload {
        id: 42,
        first_name: Some("Bob".into()),
        last_name: None,
        username: Some("bob".into()),
        photo_url: None,
        auth_date: Some(1_772_000_000),
        hash: Some(hash.into()),
    }
}

#[tokio::test]
async fn login_round_trip_and_error_message() {
    let (addr, _) = spawn_server().await;
    let api = HttpApi::new(&format!("http://{}", addr)).unwrap();

    let resp = api.telegram_login(&payload("good")).await.unwrap();
    assert_eq!(resp.id, 42);
    assert_eq!(resp.token, "tok-123");
    assert_eq!(resp.subscription_url.as_deref(), Some("https://sub.example.com/s/1"));

    match api.telegram_login(&payload("bad")).await {
        Err(ClientError::Server { status, message }) => {
            assert_eq!(status.as_u16(), 403);
            assert_eq!(message, "Invalid Telegram signature");
        }
        other => panic!("unexpected: {:?}", other.map(|r| r.id)),
    }
}

#[tokio::test]
async fn requests_carry_auth_headers() {
    let (addr, seen) = spawn_server().await;
    let api = HttpApi::new(&format!("http://{}", addr)).unwrap();

    let items = api.list_my_proofs(&auth()).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, PaymentStatus::Pending);
    assert_eq!(seen.all(), vec!["list Bearer tok-123 42 bob"]);
}

#[tokio::test]
async fn upload_sends_file_field() {
    let (addr, seen) = spawn_server().await;
    let api = HttpApi::new(&format!("http://{}", addr)).unwrap();

    api.upload_proof(&auth(), "receipt.png", vec![7; 16]).await.unwrap();
    assert_eq!(seen.all(), vec!["upload file receipt.png 16"]);
}

#[tokio::test]
async fn admin_endpoints() {
    let (addr, seen) = spawn_server().await;
    let api = HttpApi::new(&format!("http://{}", addr)).unwrap();

    let proofs = api.list_user_proofs(&auth(), 7).await.unwrap();
    assert_eq!(proofs[0].id, 5);

    api.update_proof_status(&auth(), 5, PaymentStatus::Rejected).await.unwrap();

    let err = api.delete_proof(&auth(), 9).await.unwrap_err();
    assert_eq!(err.user_message(), "Submission not found");

    assert_eq!(seen.all(), vec!["user_proofs 7", "patch 5 rejected", "delete 9"]);
}

#[tokio::test]
async fn unparseable_error_body_uses_fallback() {
    let (addr, _) = spawn_server().await;
    let api = HttpApi::new(&format!("http://{}", addr)).unwrap();

    let err = api.list_proof_users(&auth()).await.unwrap_err();
    assert_eq!(err.user_message(), "Could not load users");
}

#[tokio::test]
async fn relative_and_absolute_file_urls() {
    let (addr, _) = spawn_server().await;
    let api = HttpApi::new(&format!("http://{}", addr)).unwrap();

    let relative = api.fetch_proof_image(&auth(), "/api/payment-proofs/3/file/").await.unwrap();
    assert_eq!(relative.as_ref(), &[3u8; 8]);

    let absolute = format!("http://{}/api/payment-proofs/4/file/", addr);
    let bytes = api.fetch_proof_image(&auth(), &absolute).await.unwrap();
    assert_eq!(bytes.len(), 8);

    let anonymous = AuthHeaders {
        authorization: "Bearer ".into(),
        ..auth()
    };
    let err = api.fetch_proof_image(&anonymous, "/api/payment-proofs/3/file/").await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn health_check() {
    let (addr, _) = spawn_server().await;
    let api = HttpApi::new(&format!("http://{}", addr)).unwrap();
    api.health().await.unwrap();
}
