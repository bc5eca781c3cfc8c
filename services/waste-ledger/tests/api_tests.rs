//! HTTP-level tests against the in-memory store.

use actix_web::{http::header, http::StatusCode, test, App, ResponseError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use waste_ledger::config::{AuthConfig, PaginationConfig};
use waste_ledger::models::NewItem;
use waste_ledger::{handlers, seed, LedgerStore, MemoryStore, ServiceContainer};

const ADMIN_PASSWORD: &str = "admin-password-123";

/// Status, whether `WWW-Authenticate` was set, and the JSON body.
/// Middleware rejections surface as `Err` from the service and are rendered here.
macro_rules! send {
    ($app:expr, $req:expr) => {{
        match test::try_call_service(&$app, $req.to_request()).await {
            Ok(resp) => {
                let status = resp.status();
                let challenged = resp.headers().contains_key(header::WWW_AUTHENTICATE);
                let body = test::read_body(resp).await;
                (status, challenged, serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null))
            }
            Err(err) => {
                let resp = err.as_response_error().error_response();
                let status = resp.status();
                let challenged = resp.headers().contains_key(header::WWW_AUTHENTICATE);
                let body = actix_web::body::to_bytes(resp.into_body())
                    .await
                    .unwrap_or_default();
                (status, challenged, serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null))
            }
        }
    }};
}

macro_rules! test_app {
    ($services:expr) => {{
        let services = $services.clone();
        test::init_service(
            App::new()
                .configure(move |cfg| services.register(cfg))
                .configure(handlers::configure_routes),
        )
        .await
    }};
}

fn auth_config() -> AuthConfig {
    AuthConfig {
        secret_key: "api-test-signing-secret-at-least-32-bytes".to_string(),
        token_ttl_hours: 168,
        bootstrap_admin_username: None,
        bootstrap_admin_password: None,
    }
}

async fn setup() -> (ServiceContainer, Arc<MemoryStore>, i64) {
    let store = Arc::new(MemoryStore::new());
    seed::ensure_admin(store.as_ref(), "root", ADMIN_PASSWORD)
        .await
        .unwrap();
    let item = store
        .create_item(NewItem {
            name: "Aluminum Can".to_string(),
            category: "Metal".to_string(),
            instructions: Some("Rinse and flatten".to_string()),
            price_per_kg: dec!(3.5),
        })
        .await
        .unwrap();
    let services = ServiceContainer::new(store.clone(), &auth_config(), PaginationConfig::default());
    (services, store, item.id)
}

fn decimal(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

fn registration(username: &str) -> Value {
    json!({
        "username": username,
        "full_name": "Ali Tounsi",
        "phone_number": "12345678",
        "password": "testpassword123"
    })
}

#[actix_web::test]
async fn test_health_and_banner() {
    let (services, _, _) = setup().await;
    let app = test_app!(services);

    let (status, _, body) = send!(app, test::TestRequest::get().uri("/health"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _, body) = send!(app, test::TestRequest::get().uri("/"));
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("Recycling"));
}

#[actix_web::test]
async fn test_register_login_collect_withdraw() {
    let (services, _, item_id) = setup().await;
    let app = test_app!(services);

    let (status, _, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/register")
            .set_json(registration("ali_barbecha"))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "collector");
    assert!(body.get("hashed_password").is_none());

    let (status, _, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/login")
            .set_json(json!({"username": "ali_barbecha", "password": "testpassword123"}))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    let token = body["access_token"].as_str().unwrap().to_string();

    let (status, _, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/collections")
            .insert_header(bearer(&token))
            .set_json(json!({"item_id": item_id, "weight_kg": "2.0", "location": "Tunis"}))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&body["earned_amount"]), dec!(7.0));
    assert_eq!(body["item_name"], "Aluminum Can");

    let (status, _, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/withdraw")
            .insert_header(bearer(&token))
            .set_json(json!({"amount": "10"}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "insufficient_balance");

    let (status, _, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/withdraw")
            .insert_header(bearer(&token))
            .set_json(json!({"amount": "4.5", "description": "Cash out"}))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["amount"]), dec!(-4.5));
    assert_eq!(body["transaction_type"], "withdrawal");

    let (status, _, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/collectors/me/stats")
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["balance"]), dec!(2.5));
    assert_eq!(body["collections_by_category"]["Metal"]["count"], 1);

    let (status, _, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/collectors/transactions?limit=1")
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);
    let page = body.as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["description"], "Cash out");
}

#[actix_web::test]
async fn test_duplicate_registration_rejected() {
    let (services, _, _) = setup().await;
    let app = test_app!(services);

    let (status, _, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/register")
            .set_json(registration("ali"))
    );
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/register")
            .set_json(registration("ali"))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "duplicate_username");
}

#[actix_web::test]
async fn test_missing_or_bad_token_is_challenged() {
    let (services, _, _) = setup().await;
    let app = test_app!(services);

    let (status, challenged, body) = send!(app, test::TestRequest::get().uri("/collectors/me"));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(challenged);
    assert_eq!(body["error"]["type"], "unauthenticated");

    let (status, challenged, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/collectors/me")
            .insert_header(bearer("not.a.token"))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(challenged);
    assert_eq!(body["error"]["message"], "Could not validate credentials");
}

#[actix_web::test]
async fn test_admin_routes_require_admin_role() {
    let (services, _, _) = setup().await;
    let app = test_app!(services);
    let collector_token = services.gate.issuer().issue("nobody", waste_ledger::models::Role::Collector).unwrap();

    // Token for an identity that does not exist
    let (status, _, _) = send!(
        app,
        test::TestRequest::get()
            .uri("/admin/dashboard")
            .insert_header(bearer(&collector_token))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/register")
            .set_json(registration("ali"))
    );
    let (_, _, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/login")
            .set_json(json!({"username": "ali", "password": "testpassword123"}))
    );
    let token = body["access_token"].as_str().unwrap().to_string();

    let (status, _, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/admin/dashboard")
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["type"], "forbidden");
}

#[actix_web::test]
async fn test_admin_item_management_and_reconciliation() {
    let (services, _, item_id) = setup().await;
    let app = test_app!(services);

    let (_, _, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/login")
            .set_json(json!({"username": "root", "password": ADMIN_PASSWORD}))
    );
    let admin = body["access_token"].as_str().unwrap().to_string();

    // Admins pass collector routes too
    let (status, _, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/collections")
            .insert_header(bearer(&admin))
            .set_json(json!({"item_id": item_id, "weight_kg": "1"}))
    );
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = send!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/admin/items/{}", item_id))
            .insert_header(bearer(&admin))
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "item_in_use");

    let (status, _, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/admin/items")
            .insert_header(bearer(&admin))
            .set_json(json!({"name": "Tin Foil", "category": "Metal", "price_per_kg": "0.5"}))
    );
    assert_eq!(status, StatusCode::CREATED);
    let new_id = body["id"].as_i64().unwrap();

    let (status, _, body) = send!(
        app,
        test::TestRequest::put()
            .uri(&format!("/admin/items/{}", new_id))
            .insert_header(bearer(&admin))
            .set_json(json!({"name": "Aluminum Can"}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "duplicate_item");

    let (status, _, _) = send!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/admin/items/{}", new_id))
            .insert_header(bearer(&admin))
    );
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/admin/reconciliation")
            .insert_header(bearer(&admin))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consistent"], true);

    let (status, _, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/admin/collections/recent?limit=5")
            .insert_header(bearer(&admin))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn test_disabled_collector_loses_access() {
    let (services, store, _) = setup().await;
    let app = test_app!(services);

    send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/register")
            .set_json(registration("ali"))
    );
    let (_, _, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/login")
            .set_json(json!({"username": "ali", "password": "testpassword123"}))
    );
    let token = body["access_token"].as_str().unwrap().to_string();
    let (_, _, admin_body) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/login")
            .set_json(json!({"username": "root", "password": ADMIN_PASSWORD}))
    );
    let admin = admin_body["access_token"].as_str().unwrap().to_string();

    let ali = store.find_collector_by_username("ali").await.unwrap().unwrap();
    let (status, _, body) = send!(
        app,
        test::TestRequest::patch()
            .uri(&format!("/admin/collectors/{}", ali.id))
            .insert_header(bearer(&admin))
            .set_json(json!({"is_active": false}))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let (status, _, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/collectors/me")
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["type"], "account_disabled");
}

#[actix_web::test]
async fn test_citizen_catalog() {
    let (services, store, _) = setup().await;
    let app = test_app!(services);

    let (status, _, body) = send!(app, test::TestRequest::get().uri("/citizen/items?query=can"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(store.search_log().len(), 1);

    let (status, _, body) = send!(app, test::TestRequest::get().uri("/citizen/categories"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["categories"], json!(["Metal"]));

    let (status, _, body) = send!(app, test::TestRequest::get().uri("/citizen/instructions/aluminum"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item_name"], "Aluminum Can");

    let (status, _, body) = send!(app, test::TestRequest::get().uri("/citizen/items/999"));
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");

    let (status, _, _) = send!(app, test::TestRequest::get().uri("/citizen/items?limit=0"));
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_malformed_input_uses_error_envelope() {
    let (services, _, _) = setup().await;
    let app = test_app!(services);

    let (status, _, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/collectors/register")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{username: ")
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "validation_error");
    assert_eq!(body["error"]["code"], 400);

    let (status, _, body) = send!(app, test::TestRequest::get().uri("/citizen/items?limit=abc"));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "validation_error");

    let (status, _, body) = send!(app, test::TestRequest::get().uri("/citizen/items/not-a-number"));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "validation_error");
}
