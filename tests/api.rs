use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use remitd::api::ChainClients;
use remitd::chain::{ChainStatus, PriceFeed, SimulatedGateway, StatusSource};
use remitd::config::DatabaseBackend;
use remitd::database::Stores;
use remitd::services::Claims;
use remitd::{build_router, AppState, Config};

const JWT_SECRET: &str = "test-secret";
const ADMIN_TOKEN: &str = "test-admin";
const RECIPIENT: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

/// Explorer stand-in: nothing ever confirms.
struct PendingSource;

#[async_trait]
impl StatusSource for PendingSource {
    async fn check(&self, _tx_hash: &str) -> ChainStatus {
        ChainStatus::Pending
    }
}

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = Config {
            jwt_secret: JWT_SECRET.to_string(),
            admin_token: Some(ADMIN_TOKEN.to_string()),
            database_backend: DatabaseBackend::Memory,
            upload_dir: std::env::temp_dir().join(format!("remitd-test-{}", uuid::Uuid::new_v4())),
            ..Config::default()
        };
        let chain = ChainClients {
            gateway: Arc::new(SimulatedGateway::new()),
            status_source: Arc::new(PendingSource),
            rpc: None,
            // Zero budget: reference prices only, no outbound calls.
            prices: Arc::new(PriceFeed::with_daily_budget("http://127.0.0.1:9", 0).unwrap()),
        };
        let app = build_router(AppState::new(config, Stores::memory(), chain));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register and log in; returns (user id, token).
    async fn sign_up(&self, email: &str) -> (i64, String) {
        let res = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "username": "tester", "email": email, "password": "secret123" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": "secret123" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        (
            body["user"]["id"].as_i64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    async fn approve_kyc(&self, user_id: i64) {
        let res = self
            .client
            .post(self.url("/api/kyc/verify"))
            .header("x-admin-token", ADMIN_TOKEN)
            .json(&json!({ "userId": user_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    async fn create_transaction(&self, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url("/api/transactions"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(user_id: i64) -> String {
    let now = Utc::now();
    let claims = Claims {
        id: user_id,
        username: "someone".to_string(),
        email: "someone@example.com".to_string(),
        iat: now.timestamp(),
        exp: (now + ChronoDuration::minutes(10)).timestamp(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn health_routes_and_fallback() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "Remittance API is running!");

    let body: Value = srv.client.get(srv.url("/api")).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["message"], "API is running");

    let res = srv.client.get(srv.url("/api/nope")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Route not found");
}

#[tokio::test]
async fn register_and_login_validation() {
    let srv = TestServer::spawn().await;
    srv.sign_up("alice@example.com").await;

    let res = srv
        .client
        .post(srv.url("/api/auth/register"))
        .json(&json!({ "username": "again", "email": "ALICE@example.com", "password": "secret123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Email already in use");
    assert_eq!(body["message"], "Registration failed");

    let res = srv
        .client
        .post(srv.url("/api/auth/register"))
        .json(&json!({ "username": "bob", "email": "bob@example.com", "password": "123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .client
        .post(srv.url("/api/auth/login"))
        .json(&json!({ "email": "alice@example.com", "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn protected_routes_require_token() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/api/transactions")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "No token, authorization denied");

    let res = srv
        .client
        .get(srv.url("/api/kyc/status"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Token is not valid");
}

#[tokio::test]
async fn unverified_user_cannot_send() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.sign_up("carol@example.com").await;

    let res = srv
        .create_transaction(&token, json!({ "recipient": RECIPIENT, "token": "ETH", "amount": 100 }))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "KYC verification required");
    assert_eq!(body["kycStatus"]["verified"], false);
    assert!(body["kycStatus"]["completedSteps"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn create_transaction_validation() {
    let srv = TestServer::spawn().await;
    let (user_id, token) = srv.sign_up("dave@example.com").await;
    srv.approve_kyc(user_id).await;

    let cases = [
        (json!({ "token": "ETH", "amount": "1" }), "Recipient, token, and amount are required"),
        (json!({ "recipient": RECIPIENT, "token": "ETH", "amount": "-3" }), "Amount must be a positive number"),
        (json!({ "recipient": "0x1234", "token": "ETH", "amount": "1" }), "Invalid recipient address format"),
    ];
    for (body, error) in cases {
        let res = srv.create_transaction(&token, body).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], error);
    }
}

#[tokio::test]
async fn verified_user_sends_and_reads_back() {
    let srv = TestServer::spawn().await;
    let (user_id, token) = srv.sign_up("erin@example.com").await;
    srv.approve_kyc(user_id).await;

    let res = srv
        .create_transaction(
            &token,
            json!({ "recipient": RECIPIENT, "token": "ETH", "amount": "100", "receiveToken": "USDT" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let id = created["id"].as_i64().expect("id must be set");
    assert!(matches!(created["status"].as_str(), Some("pending" | "completed")));
    assert_eq!(created["receive_token"], "USDT");
    assert!(created["tx_hash"].as_str().unwrap().starts_with("0x"));

    let res = srv
        .client
        .get(srv.url(&format!("/api/transactions/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let detail: Value = res.json().await.unwrap();
    assert_eq!(detail["id"], id);
    assert_eq!(detail["blockchainStatus"]["source"], "simulation");

    // Someone else's transaction does not exist for them.
    let res = srv
        .client
        .get(srv.url(&format!("/api/transactions/{id}")))
        .bearer_auth(mint_jwt(user_id + 1000))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = srv
        .client
        .get(srv.url("/api/transactions/abc"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .client
        .put(srv.url(&format!("/api/transactions/{id}")))
        .bearer_auth(&token)
        .json(&json!({ "status": "processing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = res.json().await.unwrap();
    assert_eq!(updated["status"], "processing");

    let res = srv
        .client
        .put(srv.url(&format!("/api/transactions/{id}")))
        .bearer_auth(&token)
        .json(&json!({ "status": "teleported" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn listing_is_paginated() {
    let srv = TestServer::spawn().await;
    let (user_id, token) = srv.sign_up("frank@example.com").await;
    srv.approve_kyc(user_id).await;

    for amount in ["1", "2", "3"] {
        let res = srv
            .create_transaction(&token, json!({ "recipient": RECIPIENT, "token": "MATIC", "amount": amount }))
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = srv
        .client
        .get(srv.url("/api/transactions?page=1&limit=2"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["total"], 3);
    assert_eq!(page["pages"], 2);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["transactions"].as_array().unwrap().len(), 2);
    assert_eq!(page["transactions"][0]["amount"], "3");

    for query in ["page=0", "page=abc", "limit=0", "limit=101"] {
        let res = srv
            .client
            .get(srv.url(&format!("/api/transactions?{query}")))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "query {query}");
    }
}

#[tokio::test]
async fn kyc_steps_and_admin_guard() {
    let srv = TestServer::spawn().await;
    let (user_id, token) = srv.sign_up("grace@example.com").await;

    let res = srv
        .client
        .post(srv.url("/api/kyc/complete-step"))
        .bearer_auth(&token)
        .json(&json!({ "stepName": "document_verification" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["kycStatus"]["pendingVerification"], true);

    let res = srv
        .client
        .post(srv.url("/api/kyc/complete-step"))
        .bearer_auth(&token)
        .json(&json!({ "stepName": "selfie" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .client
        .post(srv.url("/api/kyc/verify"))
        .header("x-admin-token", "guess")
        .json(&json!({ "userId": user_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    srv.approve_kyc(user_id).await;
    let status: Value = srv
        .client
        .get(srv.url("/api/kyc/status"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["verified"], true);
    assert_eq!(status["pendingVerification"], false);
}

#[tokio::test]
async fn public_market_routes() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .get(srv.url("/api/transactions/quote?sourceToken=ETH&amount=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let quote: Value = res.json().await.unwrap();
    assert_eq!(quote["targetToken"], "USDC");
    assert_eq!(quote["source"], "simulation");

    let res = srv
        .client
        .get(srv.url("/api/transactions/quote?sourceToken=ETH"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let rates: Value = srv
        .client
        .get(srv.url("/api/transactions/exchange-rates"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rates["source"], "reference");
    assert!(rates["rates"]["ETH"].as_f64().unwrap() > 0.0);

    let gas: Value = srv
        .client
        .get(srv.url("/api/transactions/gas-prices"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(gas["average"], 70);
    assert_eq!(gas["source"], "mock");

    let status: Value = srv
        .client
        .get(srv.url("/api/transactions/contract-status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["mode"], "simulation");
    assert_eq!(status["working"], false);

    let res = srv
        .client
        .post(srv.url("/api/transactions/refresh-cache"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["invalidated"]["quotes"], 1);
}

#[tokio::test]
async fn token_market_routes() {
    let srv = TestServer::spawn().await;
    let get = |path: &str| srv.client.get(srv.url(path)).send();

    let res = get("/api/transactions/bundled-rates?from=ETH&to=USDC&amount=2").await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bundled: Value = res.json().await.unwrap();
    assert_eq!(bundled["conversion"]["from"], "ETH");
    assert_eq!(bundled["conversion"]["amount"], 2.0);
    assert!(bundled["fees"]["savings"].as_f64().unwrap() > 0.0);
    assert_eq!(bundled["gasEstimate"]["unit"], "gwei");
    assert_eq!(bundled["marketConditions"]["favorable"], true);

    let res = get("/api/transactions/bundled-rates?amount=-1").await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let tokens: Value = get("/api/transactions/tokens?type=stablecoin").await.unwrap().json().await.unwrap();
    assert_eq!(tokens.as_array().unwrap().len(), 5);
    assert_eq!(tokens[0]["symbol"], "USDC");
    assert_eq!(tokens[0]["type"], "stablecoin");

    let found: Value = get("/api/transactions/tokens?query=chain").await.unwrap().json().await.unwrap();
    assert_eq!(found[0]["symbol"], "LINK");

    let changes: Value = get("/api/transactions/tokens-with-changes?symbols=ETH,BTC")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(changes["ETH"], "1.50");
    assert_eq!(changes["BTC"], "2.10");
    let res = get("/api/transactions/tokens-with-changes").await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let history: Value = get("/api/transactions/token-history?symbol=ETH&days=2")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["prices"].as_array().unwrap().len(), 3);
    assert_eq!(history["total_volumes"][0].as_array().unwrap().len(), 2);
    let res = get("/api/transactions/token-history").await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let price: Value = get("/api/transactions/token-price/matic").await.unwrap().json().await.unwrap();
    assert_eq!(price["symbol"], "MATIC");
    assert_eq!(price["priceChange24h"], -0.8);
    let res = get("/api/transactions/token-price/undefined").await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: Value = srv
        .client
        .post(srv.url("/api/transactions/refresh-cache"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // The chain search, ETH history and MATIC price
    assert_eq!(body["invalidated"]["market"], 3);
}

#[tokio::test]
async fn finalized_transaction_keeps_its_status() {
    let srv = TestServer::spawn().await;
    let (user_id, token) = srv.sign_up("final@example.com").await;
    srv.approve_kyc(user_id).await;

    let res = srv
        .create_transaction(&token, json!({ "recipient": RECIPIENT, "token": "ETH", "amount": 1 }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let id = res.json::<Value>().await.unwrap()["id"].as_i64().unwrap();
    let path = format!("/api/transactions/{id}");

    let res = srv
        .client
        .put(srv.url(&path))
        .bearer_auth(&token)
        .json(&json!({ "status": "completed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .client
        .put(srv.url(&path))
        .bearer_auth(&token)
        .json(&json!({ "status": "pending" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Transaction already finalized");

    let detail: Value = srv
        .client
        .get(srv.url(&path))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["status"], "completed");
}
