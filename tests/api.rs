//! HTTP-level tests: routing, JWT authentication and role gating through the real router.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::*;
use foodhub::api::build_router;
use foodhub::models::food::ServiceType;
use foodhub::models::profile::Role;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

async fn send(
    app: &axum::Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn login(app: &axum::Router, mobile: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "mobile_number": mobile, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let app = build_router(test_state().await);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_login_and_me() {
    let app = build_router(test_state().await);
    let mobile = next_mobile();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "full_name": "Meera Nair",
            "mobile_number": mobile,
            "password": PASSWORD,
            "role": "customer",
            "panchayat": PANCHAYAT,
            "ward": WARD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "customer");
    assert!(body.get("password_hash").is_none());

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "full_name": "Meera Again",
            "mobile_number": mobile,
            "password": PASSWORD,
            "role": "customer",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "full_name": "Meera Prefixed",
            "mobile_number": format!("+91{}", mobile),
            "password": PASSWORD,
            "role": "customer",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let prefixed = login(&app, &format!("+91{}", mobile)).await;
    assert!(!prefixed.is_empty());

    let token = login(&app, &mobile).await;
    let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["mobile_number"], mobile);
}

#[tokio::test]
async fn self_registration_cannot_create_admins() {
    let app = build_router(test_state().await);
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "full_name": "Sneaky Admin",
            "mobile_number": next_mobile(),
            "password": PASSWORD,
            "role": "admin",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = build_router(test_state().await);

    let (status, _) = send(&app, Method::GET, "/api/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/orders", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customers_cannot_reach_admin_routes() {
    let state = test_state().await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let app = build_router(state);
    let token = login(&app, &customer.mobile_number).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/categories",
        Some(&token),
        Some(json!({ "name": "Meals", "service_type": "homemade" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, "/api/admin/cooks", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cart_to_order_over_http() {
    let state = test_state().await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let admin = profile(&state, "Admin User", Role::Admin).await;
    let meals = food(&state, "Kerala Meals", 90, ServiceType::Homemade).await;
    let app = build_router(state);
    let token = login(&app, &customer.mobile_number).await;
    let admin_token = login(&app, &admin.mobile_number).await;

    let (status, foods) = send(&app, Method::GET, "/api/foods?service_type=homemade", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(foods.as_array().unwrap().len(), 1);

    let (status, cart) = send(
        &app,
        Method::POST,
        "/api/cart/items",
        Some(&token),
        Some(json!({ "food_item_id": meals.id, "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["lines"].as_array().unwrap().len(), 1);

    let (status, details) = send(
        &app,
        Method::POST,
        "/api/cart/checkout",
        Some(&token),
        Some(json!({
            "panchayat": PANCHAYAT,
            "ward": WARD,
            "delivery_address": "Near the temple, Main Road",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(details["order"]["status"], "pending");
    let order_id = details["order"]["id"].as_str().unwrap().to_string();

    let (status, listed) = send(&app, Method::GET, "/api/orders", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["count"], 1);

    let (status, confirmed) = send(
        &app,
        Method::POST,
        &format!("/api/orders/{}/confirm", order_id),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "confirmed");

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/orders/{}/cancel", order_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn order_events_stream_only_the_callers_orders() {
    let state = test_state().await;
    let meera = profile(&state, "Meera Nair", Role::Customer).await;
    let joy = profile(&state, "Joy Thomas", Role::Customer).await;
    let meals = food(&state, "Kerala Meals", 90, ServiceType::Homemade).await;
    let app = build_router(state.clone());
    let token = login(&app, &meera.mobile_number).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/orders/events")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    place_order(&state, &joy, &[(&meals, 1)]).await;
    let mine = place_order(&state, &meera, &[(&meals, 2)]).await;

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .expect("an event within five seconds")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.starts_with("event: order"));
    assert!(text.contains(&mine.order.id.to_string()));
    assert!(text.contains(r#""type":"placed""#));
}
