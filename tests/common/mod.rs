#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use foodhub::api::AppState;
use foodhub::config::AppConfig;
use foodhub::database::sqlite::SqliteDatabase;
use foodhub::models::cook::Cook;
use foodhub::models::delivery::DeliveryStaff;
use foodhub::models::food::{FoodItem, ServiceType};
use foodhub::models::order::OrderDetails;
use foodhub::models::profile::{Profile, Role};
use foodhub::services::auth::NewProfile;
use foodhub::services::cart_service::Checkout;
use foodhub::services::catalog_service::NewFoodItem;
use rust_decimal::Decimal;

pub const PANCHAYAT: &str = "Kodakara";
pub const WARD: i32 = 3;
pub const PASSWORD: &str = "curryleaf42";

static MOBILE_SEQ: AtomicU32 = AtomicU32::new(0);

pub fn next_mobile() -> String {
    format!("98470{:05}", MOBILE_SEQ.fetch_add(1, Ordering::SeqCst))
}

pub async fn test_state() -> AppState {
    test_state_with(AppConfig::for_tests()).await
}

pub async fn test_state_with(config: AppConfig) -> AppState {
    let database = Arc::new(SqliteDatabase::in_memory().await.expect("in-memory database"));
    AppState::new(database, config)
}

pub async fn profile(state: &AppState, name: &str, role: Role) -> Profile {
    state
        .auth
        .create_profile(NewProfile {
            full_name: name.to_string(),
            mobile_number: next_mobile(),
            password: PASSWORD.to_string(),
            role,
            panchayat: Some(PANCHAYAT.to_string()),
            ward: Some(WARD),
        })
        .await
        .expect("profile")
}

pub async fn cook(state: &AppState, name: &str, dishes: &[&FoodItem]) -> Cook {
    let owner = profile(state, name, Role::Cook).await;
    let cook = state
        .cooks
        .register_cook(&owner.id, &format!("{} Kitchen", name), PANCHAYAT, WARD)
        .await
        .expect("cook");
    for dish in dishes {
        state.cooks.allocate_dish(&cook.id, &dish.id).await.expect("allocation");
    }
    cook
}

pub async fn delivery_staff(state: &AppState, name: &str, panchayat: &str) -> DeliveryStaff {
    let owner = profile(state, name, Role::Delivery).await;
    state
        .cooks
        .register_delivery_staff(&owner.id, vec![panchayat.to_string()], Vec::new())
        .await
        .expect("delivery staff")
}

pub async fn food(state: &AppState, name: &str, price: i64, service_type: ServiceType) -> FoodItem {
    state
        .catalog
        .create_food_item(NewFoodItem {
            name: name.to_string(),
            description: None,
            price: Decimal::new(price, 0),
            category_id: None,
            service_type,
            image_urls: Vec::new(),
        })
        .await
        .expect("food item")
}

/// Puts `lines` in the customer's cart and checks out to the default area.
pub async fn place_order(state: &AppState, customer: &Profile, lines: &[(&FoodItem, i32)]) -> OrderDetails {
    for (item, quantity) in lines {
        state
            .carts
            .add_item(&customer.id, &item.id, *quantity)
            .await
            .expect("add to cart");
    }
    state
        .carts
        .checkout(
            &customer.id,
            Checkout {
                panchayat: PANCHAYAT.to_string(),
                ward: WARD,
                delivery_address: "Near the temple, Main Road".to_string(),
                notes: None,
                event_details: None,
            },
        )
        .await
        .expect("checkout")
}
