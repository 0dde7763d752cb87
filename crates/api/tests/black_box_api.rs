use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use ledgerdesk_auth::{JwtClaims, Role};
use ledgerdesk_core::{TenantId, UserId};
use reqwest::StatusCode;
use serde_json::{json, Value};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = ledgerdesk_api::ApiConfig::in_memory(SECRET);
        let (app, _services) = ledgerdesk_api::app::build_app(&config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}/api");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(tenant_id: TenantId, roles: &[&'static str]) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        tenant_id,
        roles: roles.iter().map(|r| Role::new(*r)).collect(),
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn post(client: &reqwest::Client, url: String, token: &str, body: Value) -> Value {
    let res = client
        .post(&url)
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = res.status();
    let body: Value = res.json().await.unwrap_or(Value::Null);
    assert!(status.is_success(), "POST {url} returned {status}: {body}");
    body
}

/// Read models are fed by the projection worker; poll until `ready` holds.
async fn get_eventually(
    client: &reqwest::Client,
    url: String,
    token: &str,
    ready: impl Fn(&Value) -> bool,
) -> Value {
    for _ in 0..100 {
        let res = client.get(&url).bearer_auth(token).send().await.unwrap();
        if res.status() == StatusCode::OK {
            let body: Value = res.json().await.unwrap();
            if ready(&body) {
                return body;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("{url} did not reach the expected state in time");
}

/// Product with 100 units on hand plus a customer.
async fn seed_sales(client: &reqwest::Client, srv: &TestServer, token: &str) -> (String, String) {
    let product = post(
        client,
        srv.url("/products"),
        token,
        json!({
            "sku": "WID-1",
            "name": "Widget",
            "pricing": { "sale_price": 1000, "standard_cost": 600, "tax_rate_bp": 0 },
        }),
    )
    .await;
    let product_id = product["id"].as_str().unwrap().to_string();

    post(
        client,
        srv.url("/stock/adjustments"),
        token,
        json!({ "product_id": product_id, "quantity": 100 }),
    )
    .await;

    let customer = post(
        client,
        srv.url("/customers"),
        token,
        json!({ "name": "Acme Retail" }),
    )
    .await;
    let customer_id = customer["id"].as_str().unwrap().to_string();

    (product_id, customer_id)
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tenant_context_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let token = mint_jwt(tenant_id, &["accountant"]);

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "accountant"));
    assert!(
        body["permissions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|p| p == "ledger.read")
    );
}

#[tokio::test]
async fn issued_invoice_is_listed_and_posted_to_receivables() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["admin"]);
    let client = reqwest::Client::new();
    let (product_id, customer_id) = seed_sales(&client, &srv, &token).await;

    let invoice = post(
        &client,
        srv.url("/invoices"),
        &token,
        json!({
            "number": "INV-1",
            "customer_id": customer_id,
            "issue_date": "2026-01-10",
            "due_date": "2026-02-10",
            "lines": [{ "product_id": product_id, "quantity": 3 }],
            "issue": true,
        }),
    )
    .await;
    assert_eq!(invoice["status"], "issued");
    let invoice_id = invoice["id"].as_str().unwrap().to_string();

    let listed = get_eventually(
        &client,
        srv.url("/invoices?status=issued"),
        &token,
        |page| page["total"] == 1,
    )
    .await;
    assert_eq!(listed["items"][0]["id"], invoice_id.as_str());

    let receivables = get_eventually(
        &client,
        srv.url("/account-balances/1100"),
        &token,
        |b| b["debits"].as_i64().unwrap_or(0) > 0,
    )
    .await;
    assert_eq!(receivables["debits"], 3000);

    let stock = get_eventually(
        &client,
        srv.url(&format!("/stock?product_id={product_id}")),
        &token,
        |levels| {
            levels
                .as_array()
                .and_then(|l| l.first())
                .is_some_and(|l| l["on_hand"] == 97)
        },
    )
    .await;
    assert_eq!(stock.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn role_without_permission_is_forbidden() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["clerk"]);
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url(&format!(
            "/purchase-returns/{}/approve",
            ledgerdesk_core::AggregateId::new()
        )))
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url("/accounts"))
        .bearer_auth(&token)
        .json(&json!({ "code": "9000", "name": "Suspense", "kind": "asset" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rejected_commands_return_a_json_error_body() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["admin"]);
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/invoices/not-a-uuid"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "bad_request");
    assert!(body["message"].is_string());

    let res = client
        .post(srv.url(&format!(
            "/invoices/{}/issue",
            ledgerdesk_core::AggregateId::new()
        )))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn tenants_cannot_see_each_others_documents() {
    let srv = TestServer::spawn().await;
    let token1 = mint_jwt(TenantId::new(), &["admin"]);
    let token2 = mint_jwt(TenantId::new(), &["admin"]);
    let client = reqwest::Client::new();

    let (product_id, _) = seed_sales(&client, &srv, &token1).await;
    get_eventually(
        &client,
        srv.url(&format!("/products/{product_id}")),
        &token1,
        |p| p["id"] == product_id.as_str(),
    )
    .await;

    let res = client
        .get(srv.url(&format!("/products/{product_id}")))
        .bearer_auth(&token2)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let listed: Value = client
        .get(srv.url("/products"))
        .bearer_auth(&token2)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["total"], 0);
}
