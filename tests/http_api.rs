mod common;

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{Engine as _, engine::general_purpose};
use exitlink::router::build_router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;

const CLIENT_ADDR: ([u8; 4], u16) = ([10, 0, 0, 7], 40123);

/// Cookies and CSRF token of a signed-in wallet.
struct Signed {
    cookie: String,
    csrf: String,
    wallet_id: String,
    phrase: String,
}

fn app() -> Router {
    build_router(app_state()).unwrap()
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let mut req = builder.body(body).unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(CLIENT_ADDR)));
    req
}

fn signed_request(signed: &Signed, method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let mut req = request(method, uri, body);
    let headers = req.headers_mut();
    headers.insert(header::COOKIE, signed.cookie.parse().unwrap());
    headers.insert("x-csrf-token", signed.csrf.parse().unwrap());
    req
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, body)
}

fn cookie_value(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k.trim() == name).then(|| v.trim().to_string())
        })
}

async fn sign_up(app: &Router) -> Signed {
    let (status, headers, body) = send(app, request("POST", "/api/wallet/create", None)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let session = cookie_value(&headers, "session_id").expect("session cookie");
    let csrf = cookie_value(&headers, "csrf_token").expect("csrf cookie");
    Signed {
        cookie: format!("session_id={}; csrf_token={}", session, csrf),
        csrf,
        wallet_id: body["wallet_id"].as_str().unwrap().to_string(),
        phrase: body["recovery_phrase"].as_str().unwrap().to_string(),
    }
}

async fn top_up(app: &Router, signed: &Signed, pack: i64) {
    let (status, _, body) = send(
        app,
        signed_request(
            signed,
            "POST",
            "/api/credits/add",
            Some(json!({ "pack": pack, "method": "monero" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn wallet_creation_returns_phrase_and_welcome_credit() {
    let app = app();
    let (status, headers, body) = send(&app, request("POST", "/api/wallet/create", None)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["balance"], 1);
    assert_eq!(
        body["recovery_phrase"].as_str().unwrap().split(' ').count(),
        12
    );
    assert!(cookie_value(&headers, "session_id").is_some());
    assert!(cookie_value(&headers, "csrf_token").is_some());
}

#[tokio::test]
async fn protected_routes_need_session_and_csrf() {
    let app = app();
    let (status, _, _) = send(&app, request("GET", "/api/credits/balance", None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let signed = sign_up(&app).await;
    let mut no_csrf = request(
        "POST",
        "/api/links",
        Some(json!({ "type": "text", "content": "hi" })),
    );
    no_csrf
        .headers_mut()
        .insert(header::COOKIE, signed.cookie.parse().unwrap());
    let (status, _, _) = send(&app, no_csrf).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = send(
        &app,
        signed_request(&signed, "GET", "/api/credits/balance", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 1);
}

#[tokio::test]
async fn text_link_is_served_once_with_no_store() {
    let app = app();
    let signed = sign_up(&app).await;

    let (status, _, created) = send(
        &app,
        signed_request(
            &signed,
            "POST",
            "/api/links",
            Some(json!({ "type": "text", "content": "see you never", "options": { "max_views": 1 } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["credit_cost"], 1);
    let link_id = created["link_id"].as_str().unwrap().to_string();

    let uri = format!("/api/links/{}/view", link_id);
    let (status, headers, body) = send(&app, request("POST", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    assert_eq!(body["content"], "see you never");
    assert_eq!(body["encoding"], "utf8");
    assert_eq!(body["is_last_view"], true);

    let (status, _, body) = send(&app, request("POST", &uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Link has been destroyed");

    let (_, _, listed) = send(&app, signed_request(&signed, "GET", "/api/links", None)).await;
    assert_eq!(listed["links"][0]["state"], "consumed");
    assert_eq!(listed["links"][0]["type"], "text");
}

#[tokio::test]
async fn insufficient_credits_reports_the_price() {
    let app = app();
    let signed = sign_up(&app).await;

    let (status, _, body) = send(
        &app,
        signed_request(
            &signed,
            "POST",
            "/api/links",
            Some(json!({ "type": "text", "content": "x", "options": { "camouflage": true } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["required"], 4);

    let (_, _, balance) = send(
        &app,
        signed_request(&signed, "GET", "/api/credits/balance", None),
    )
    .await;
    assert_eq!(balance["balance"], 1);
}

#[tokio::test]
async fn password_links_prompt_then_reject_then_reveal() {
    let app = app();
    let signed = sign_up(&app).await;
    top_up(&app, &signed, 10).await;

    let (status, _, created) = send(
        &app,
        signed_request(
            &signed,
            "POST",
            "/api/links",
            Some(json!({ "type": "text", "content": "vault", "options": { "password": "hunter2" } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let uri = format!("/api/links/{}/view", created["link_id"].as_str().unwrap());

    let (status, _, body) = send(&app, request("POST", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requires_password"], true);

    let (status, _, _) = send(
        &app,
        request("POST", &uri, Some(json!({ "password": "hunter3" }))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = send(
        &app,
        request("POST", &uri, Some(json!({ "password": "hunter2" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "vault");
}

#[tokio::test]
async fn file_link_round_trips_as_base64() {
    let app = app();
    let signed = sign_up(&app).await;
    top_up(&app, &signed, 10).await;

    let bytes: Vec<u8> = (0..=255u8).rev().collect();
    let encoded = general_purpose::STANDARD.encode(&bytes);
    let (status, _, created) = send(
        &app,
        signed_request(
            &signed,
            "POST",
            "/api/links",
            Some(json!({ "type": "file", "content": encoded, "file_name": "blob.bin" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["credit_cost"], 3);

    let uri = format!("/api/links/{}/view", created["link_id"].as_str().unwrap());
    let (status, _, body) = send(&app, request("POST", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["encoding"], "base64");
    assert_eq!(body["file_name"], "blob.bin");
    let decoded = general_purpose::STANDARD
        .decode(body["content"].as_str().unwrap())
        .unwrap();
    assert_eq!(decoded, bytes);
}

#[tokio::test]
async fn region_header_feeds_the_region_lock() {
    let app = app();
    let signed = sign_up(&app).await;
    top_up(&app, &signed, 10).await;

    let (_, _, created) = send(
        &app,
        signed_request(
            &signed,
            "POST",
            "/api/links",
            Some(json!({
                "type": "text",
                "content": "local news",
                "options": { "max_views": 3, "allowed_regions": ["FR"] }
            })),
        ),
    )
    .await;
    let uri = format!("/api/links/{}/view", created["link_id"].as_str().unwrap());

    let mut blocked = request("POST", &uri, None);
    blocked
        .headers_mut()
        .insert("x-client-region", "jp".parse().unwrap());
    let (status, _, _) = send(&app, blocked).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut allowed = request("POST", &uri, None);
    allowed
        .headers_mut()
        .insert("x-client-region", "fr".parse().unwrap());
    let (status, _, _) = send(&app, allowed).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn recovery_phrase_signs_back_in() {
    let app = app();
    let signed = sign_up(&app).await;

    let shouted = signed.phrase.to_uppercase();
    let (status, headers, body) = send(
        &app,
        request(
            "POST",
            "/api/wallet/recover",
            Some(json!({ "recovery_phrase": shouted })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["wallet_id"], signed.wallet_id.as_str());
    assert!(cookie_value(&headers, "session_id").is_some());

    let wrong = "amber amber amber amber amber amber amber amber amber amber amber amber";
    let (status, _, _) = send(
        &app,
        request(
            "POST",
            "/api/wallet/recover",
            Some(json!({ "recovery_phrase": wrong })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn successful_recovery_clears_the_failure_count() {
    let app = app();
    let signed = sign_up(&app).await;
    let wrong = "amber amber amber amber amber amber amber amber amber amber amber amber";
    let attempt = |phrase: &str| {
        request(
            "POST",
            "/api/wallet/recover",
            Some(json!({ "recovery_phrase": phrase })),
        )
    };

    for _ in 0..9 {
        let (status, _, _) = send(&app, attempt(wrong)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _, _) = send(&app, attempt(&signed.phrase)).await;
    assert_eq!(status, StatusCode::OK);

    for _ in 0..9 {
        let (status, _, _) = send(&app, attempt(wrong)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let app = app();
    let signed = sign_up(&app).await;

    let (status, _, body) = send(
        &app,
        signed_request(&signed, "POST", "/api/wallet/logout", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _, _) = send(&app, signed_request(&signed, "GET", "/api/wallet", None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn wallet_creation_is_rate_limited_per_address() {
    let app = app();
    for _ in 0..5 {
        let (status, _, _) = send(&app, request("POST", "/api/wallet/create", None)).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _, _) = send(&app, request("POST", "/api/wallet/create", None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn credit_packs_and_history() {
    let app = app();
    let signed = sign_up(&app).await;

    let (status, _, _) = send(
        &app,
        signed_request(
            &signed,
            "POST",
            "/api/credits/add",
            Some(json!({ "pack": 7, "method": "monero" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    top_up(&app, &signed, 50).await;

    let (status, _, body) = send(
        &app,
        signed_request(&signed, "GET", "/api/credits/transactions?limit=10", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0]["amount"], 50);

    let (_, _, info) = send(&app, signed_request(&signed, "GET", "/api/wallet", None)).await;
    assert_eq!(info["balance"], 51);
}

#[tokio::test]
async fn health_reports_ok_on_memory_backends() {
    let app = app();
    let (status, _, body) = send(&app, request("GET", "/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
