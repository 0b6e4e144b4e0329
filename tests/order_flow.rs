mod common;

use chrono::{Duration, Utc};
use common::*;
use foodhub::config::AppConfig;
use foodhub::errors::AppError;
use foodhub::models::cart::CartLine;
use foodhub::models::cook::RequestStatus;
use foodhub::models::food::ServiceType;
use foodhub::models::notification::{FeedFilter, FeedScope, NotificationType, OrderEventKind};
use foodhub::models::order::{CookStatus, EventDetails, Order, OrderItem, OrderStatus};
use foodhub::models::profile::{Profile, Role};
use foodhub::models::settlement::{PayeeKind, SettlementStatus};
use foodhub::services::cart_service::Checkout;
use foodhub::services::order_service::{Actor, CookPlan};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use uuid::Uuid;

#[tokio::test]
async fn checkout_prices_the_order_and_empties_the_cart() {
    let state = test_state().await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let biryani = food(&state, "Chicken Biryani", 150, ServiceType::CloudKitchen).await;
    let payasam = food(&state, "Palada Payasam", 60, ServiceType::CloudKitchen).await;

    let details = place_order(&state, &customer, &[(&biryani, 2), (&payasam, 3)]).await;

    assert_eq!(details.order.status, OrderStatus::Pending);
    assert_eq!(details.items.len(), 2);
    assert_eq!(details.order.delivery_charge, Decimal::new(30, 0));
    assert_eq!(details.order.total_amount, Decimal::new(510, 0));
    assert!(details.items.iter().all(|i| i.cook_id.is_none()));

    let cart = state.carts.view(&customer.id).await.unwrap();
    assert!(cart.lines.is_empty());
    assert_eq!(cart.subtotal, Decimal::ZERO);
}

#[tokio::test]
async fn checkout_refuses_mixed_service_carts() {
    let state = test_state().await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let meals = food(&state, "Kerala Meals", 90, ServiceType::Homemade).await;
    let biryani = food(&state, "Chicken Biryani", 150, ServiceType::CloudKitchen).await;

    state.carts.add_item(&customer.id, &meals.id, 1).await.unwrap();
    state.carts.add_item(&customer.id, &biryani.id, 1).await.unwrap();
    let result = state
        .carts
        .checkout(
            &customer.id,
            Checkout {
                panchayat: PANCHAYAT.to_string(),
                ward: WARD,
                delivery_address: "Main Road".to_string(),
                notes: None,
                event_details: None,
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::ValidationError(_))));
    assert_eq!(state.carts.view(&customer.id).await.unwrap().lines.len(), 2);
}

#[tokio::test]
async fn only_cooks_holding_every_dish_are_eligible() {
    let state = test_state().await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let biryani = food(&state, "Chicken Biryani", 150, ServiceType::CloudKitchen).await;
    let payasam = food(&state, "Palada Payasam", 60, ServiceType::CloudKitchen).await;

    let _rice_only = cook(&state, "Anil", &[&biryani]).await;
    let both = cook(&state, "Beena", &[&biryani, &payasam]).await;

    let details = place_order(&state, &customer, &[(&biryani, 1), (&payasam, 1)]).await;
    let eligible = state.orders.eligible_cooks(&details.order.id, None).await.unwrap();
    assert_eq!(eligible.iter().map(|c| c.id).collect::<Vec<_>>(), vec![both.id]);

    let biryani_line = details.items.iter().find(|i| i.food_item_id == biryani.id).unwrap();
    let for_biryani = state
        .orders
        .eligible_cooks(&details.order.id, Some(&[biryani_line.id]))
        .await
        .unwrap();
    assert_eq!(for_biryani.len(), 2);

    let required: BTreeSet<_> = [biryani.id, payasam.id].into_iter().collect();
    let by_service = state.cooks.eligible_cooks(&required).await.unwrap();
    assert_eq!(by_service.len(), 1);
}

#[tokio::test]
async fn two_cook_order_settles_to_its_total() {
    let state = test_state().await;
    let admin = profile(&state, "Admin User", Role::Admin).await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let biryani = food(&state, "Chicken Biryani", 150, ServiceType::CloudKitchen).await;
    let payasam = food(&state, "Palada Payasam", 60, ServiceType::CloudKitchen).await;
    let anil = cook(&state, "Anil", &[&biryani]).await;
    let beena = cook(&state, "Beena", &[&payasam]).await;
    let rider = delivery_staff(&state, "Ravi", PANCHAYAT).await;

    let details = place_order(&state, &customer, &[(&biryani, 2), (&payasam, 3)]).await;
    let order_id = details.order.id;
    state.orders.confirm_order(&order_id).await.unwrap();

    let pairs = details
        .items
        .iter()
        .map(|i| (i.id, if i.food_item_id == biryani.id { anil.id } else { beena.id }))
        .collect();
    let assigned = state
        .orders
        .assign_cooks(&order_id, CookPlan::PerItem(pairs))
        .await
        .unwrap();
    assert_eq!(assigned.order.status, OrderStatus::Preparing);
    assert_eq!(assigned.assignments.len(), 2);
    assert_eq!(state.notifications.pending_alerts(&anil.id, Utc::now()).len(), 1);

    for assignment in &assigned.assignments {
        let owner = if assignment.cook_id == anil.id { &anil } else { &beena };
        let answered = state
            .orders
            .respond_to_assignment(owner, &assignment.id, true)
            .await
            .unwrap();
        assert_eq!(answered.status, CookStatus::Accepted);
    }
    assert!(state.notifications.pending_alerts(&anil.id, Utc::now()).is_empty());

    let ready = state.orders.mark_ready(&Actor::Cook(anil.clone()), &order_id).await.unwrap();
    assert_eq!(ready.status, OrderStatus::Ready);
    assert_eq!(state.notifications.pending_alerts(&rider.id, Utc::now()).len(), 1);

    state.orders.claim_delivery(&rider, &order_id).await.unwrap();
    assert!(state.notifications.pending_alerts(&rider.id, Utc::now()).is_empty());
    let dispatched = state
        .orders
        .dispatch(&rider, &order_id, "Bike", "KL 08 AB 1234")
        .await
        .unwrap();
    assert_eq!(dispatched.status, OrderStatus::OutForDelivery);

    let settlements = state
        .orders
        .complete_delivery(&Actor::Delivery(rider.clone()), &order_id)
        .await
        .unwrap();
    assert_eq!(settlements.len(), 3);
    let cook_settlements = settlements.iter().filter(|s| s.payee_kind == PayeeKind::Cook).count();
    assert_eq!(cook_settlements, 2);
    let total: Decimal = settlements.iter().map(|s| s.amount).sum();
    assert_eq!(total, details.order.total_amount);
    let anil_share = settlements
        .iter()
        .find(|s| s.payee_kind == PayeeKind::Cook && s.payee_id == anil.id)
        .unwrap();
    assert_eq!(anil_share.amount, Decimal::new(300, 0));
    let rider_share = settlements
        .iter()
        .find(|s| s.payee_kind == PayeeKind::Delivery)
        .unwrap();
    assert_eq!(rider_share.payee_id, rider.id);
    assert_eq!(rider_share.amount, Decimal::new(30, 0));

    let again = state
        .orders
        .complete_delivery(&Actor::Admin(admin.id), &order_id)
        .await;
    assert!(again.is_err());
    assert_eq!(state.settlements.list(None, None, Some(&order_id)).await.unwrap().len(), 3);
}

#[tokio::test]
async fn free_delivery_order_yields_one_settlement_per_cook() {
    let mut config = AppConfig::for_tests();
    config.delivery_charge = Decimal::ZERO;
    let state = test_state_with(config).await;
    let admin = profile(&state, "Admin User", Role::Admin).await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let sadya = food(&state, "Sadya", 250, ServiceType::Homemade).await;
    let avial = food(&state, "Avial", 40, ServiceType::Homemade).await;
    let anil = cook(&state, "Anil", &[&sadya]).await;
    let beena = cook(&state, "Beena", &[&avial]).await;
    let rider = delivery_staff(&state, "Ravi", PANCHAYAT).await;

    let details = place_order(&state, &customer, &[(&sadya, 1), (&avial, 2)]).await;
    let order_id = details.order.id;
    state.orders.confirm_order(&order_id).await.unwrap();
    let pairs = details
        .items
        .iter()
        .map(|i| (i.id, if i.food_item_id == sadya.id { anil.id } else { beena.id }))
        .collect();
    let assigned = state
        .orders
        .assign_cooks(&order_id, CookPlan::PerItem(pairs))
        .await
        .unwrap();
    for assignment in &assigned.assignments {
        let owner = if assignment.cook_id == anil.id { &anil } else { &beena };
        state
            .orders
            .respond_to_assignment(owner, &assignment.id, true)
            .await
            .unwrap();
    }
    state.orders.mark_ready(&Actor::Admin(admin.id), &order_id).await.unwrap();
    state.orders.assign_delivery(&order_id, &rider.id).await.unwrap();
    state.orders.dispatch(&rider, &order_id, "Auto", "KL 64 C 5521").await.unwrap();

    let settlements = state
        .orders
        .complete_delivery(&Actor::Admin(admin.id), &order_id)
        .await
        .unwrap();
    assert_eq!(settlements.len(), 2);
    for settlement in &settlements {
        let expected: Decimal = details
            .items
            .iter()
            .filter(|i| {
                let owner = if i.food_item_id == sadya.id { anil.id } else { beena.id };
                owner == settlement.payee_id
            })
            .map(|i| i.total_price)
            .sum();
        assert_eq!(settlement.payee_kind, PayeeKind::Cook);
        assert_eq!(settlement.amount, expected);
    }
}

#[tokio::test]
async fn approving_settlements_credits_wallets_once() {
    let state = test_state().await;
    let admin = profile(&state, "Admin User", Role::Admin).await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let meals = food(&state, "Kerala Meals", 90, ServiceType::Homemade).await;
    let anil = cook(&state, "Anil", &[&meals]).await;
    let rider = delivery_staff(&state, "Ravi", PANCHAYAT).await;

    let details = place_order(&state, &customer, &[(&meals, 2)]).await;
    let order_id = details.order.id;
    state.orders.confirm_order(&order_id).await.unwrap();
    let assigned = state
        .orders
        .assign_cooks(&order_id, CookPlan::WholeOrder(anil.id))
        .await
        .unwrap();
    state
        .orders
        .respond_to_assignment(&anil, &assigned.assignments[0].id, true)
        .await
        .unwrap();
    state.orders.assign_delivery(&order_id, &rider.id).await.unwrap();
    state.orders.mark_ready(&Actor::Admin(admin.id), &order_id).await.unwrap();
    state.orders.dispatch(&rider, &order_id, "Scooter", "KL-08-1234").await.unwrap();
    let settlements = state
        .orders
        .complete_delivery(&Actor::Admin(admin.id), &order_id)
        .await
        .unwrap();

    let before = state.settlements.wallet(PayeeKind::Cook, &anil.id).await.unwrap();
    assert_eq!(before.balance, Decimal::ZERO);
    assert_eq!(before.pending_amount, Decimal::new(180, 0));

    let ids: Vec<_> = settlements.iter().map(|s| s.id).collect();
    let approved = state.settlements.approve_many(&ids, &admin.id).await.unwrap();
    assert_eq!(approved.len(), 2);
    assert!(approved.iter().all(|s| s.status == SettlementStatus::Approved));

    let after = state.settlements.wallet(PayeeKind::Cook, &anil.id).await.unwrap();
    assert_eq!(after.balance, Decimal::new(180, 0));
    assert_eq!(after.pending_amount, Decimal::ZERO);
    assert_eq!(after.transactions.len(), 1);

    let twice = state.settlements.approve(&ids[0], &admin.id).await;
    assert!(matches!(twice, Err(AppError::Conflict(_))));
    let unchanged = state.settlements.wallet(PayeeKind::Cook, &anil.id).await.unwrap();
    assert_eq!(unchanged.balance, Decimal::new(180, 0));

    let inbox = state
        .notifications
        .get_profile_notifications(&anil.profile_id, None)
        .await
        .unwrap();
    assert!(!inbox.is_empty());
}

#[tokio::test]
async fn late_acceptance_is_refused_and_swept() {
    let state = test_state().await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let meals = food(&state, "Kerala Meals", 90, ServiceType::Homemade).await;
    let anil = cook(&state, "Anil", &[&meals]).await;

    let details = place_order(&state, &customer, &[(&meals, 1)]).await;
    let order_id = details.order.id;
    state.orders.confirm_order(&order_id).await.unwrap();
    let assigned = state
        .orders
        .assign_cooks(&order_id, CookPlan::WholeOrder(anil.id))
        .await
        .unwrap();
    let assignment = &assigned.assignments[0];

    let too_late = assignment.respond_by + Duration::seconds(1);
    let result = state
        .orders
        .respond_at(&anil, &assignment.id, true, too_late)
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let report = state.orders.sweep(too_late).await.unwrap();
    assert_eq!(report.timed_out, 1);

    let after = state.orders.get_details(&order_id).await.unwrap();
    assert_eq!(after.order.status, OrderStatus::Confirmed);
    assert_eq!(after.assignments[0].status, CookStatus::TimedOut);
    assert!(after.items.iter().all(|i| i.cook_id.is_none()));
    assert!(state.notifications.pending_alerts(&anil.id, too_late).is_empty());

    // The same cook can be offered the work again once the old assignment is dead.
    let reassigned = state
        .orders
        .assign_cooks(&order_id, CookPlan::WholeOrder(anil.id))
        .await
        .unwrap();
    assert_eq!(reassigned.order.status, OrderStatus::Preparing);
}

#[tokio::test]
async fn rejection_frees_items_for_another_cook() {
    let state = test_state().await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let meals = food(&state, "Kerala Meals", 90, ServiceType::Homemade).await;
    let anil = cook(&state, "Anil", &[&meals]).await;
    let beena = cook(&state, "Beena", &[&meals]).await;

    let details = place_order(&state, &customer, &[(&meals, 1)]).await;
    let order_id = details.order.id;
    state.orders.confirm_order(&order_id).await.unwrap();
    let assigned = state
        .orders
        .assign_cooks(&order_id, CookPlan::WholeOrder(anil.id))
        .await
        .unwrap();

    let duplicate = state
        .orders
        .assign_cooks(&order_id, CookPlan::WholeOrder(beena.id))
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    state
        .orders
        .respond_to_assignment(&anil, &assigned.assignments[0].id, false)
        .await
        .unwrap();
    let after = state.orders.get_details(&order_id).await.unwrap();
    assert_eq!(after.order.status, OrderStatus::Confirmed);

    let wrong_cook = state
        .orders
        .respond_to_assignment(&beena, &assigned.assignments[0].id, true)
        .await;
    assert!(matches!(wrong_cook, Err(AppError::Forbidden(_))));

    let second = state
        .orders
        .assign_cooks(&order_id, CookPlan::WholeOrder(beena.id))
        .await
        .unwrap();
    assert!(second.items.iter().all(|i| i.cook_id == Some(beena.id)));
}

#[tokio::test]
async fn concurrent_claims_have_exactly_one_winner() {
    let state = test_state().await;
    let admin = profile(&state, "Admin User", Role::Admin).await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let meals = food(&state, "Kerala Meals", 90, ServiceType::Homemade).await;
    let anil = cook(&state, "Anil", &[&meals]).await;
    let ravi = delivery_staff(&state, "Ravi", PANCHAYAT).await;
    let sunil = delivery_staff(&state, "Sunil", PANCHAYAT).await;
    let outsider = delivery_staff(&state, "Joseph", "Mala").await;

    let details = place_order(&state, &customer, &[(&meals, 1)]).await;
    let order_id = details.order.id;
    state.orders.confirm_order(&order_id).await.unwrap();
    let assigned = state
        .orders
        .assign_cooks(&order_id, CookPlan::WholeOrder(anil.id))
        .await
        .unwrap();
    state
        .orders
        .respond_to_assignment(&anil, &assigned.assignments[0].id, true)
        .await
        .unwrap();
    state.orders.mark_ready(&Actor::Admin(admin.id), &order_id).await.unwrap();

    let eligible = state.orders.eligible_delivery_staff(&order_id).await.unwrap();
    assert_eq!(eligible.len(), 2);
    assert!(state.notifications.pending_alerts(&outsider.id, Utc::now()).is_empty());
    let out_of_area = state.orders.claim_delivery(&outsider, &order_id).await;
    assert!(matches!(out_of_area, Err(AppError::ValidationError(_))));

    let (first, second) = tokio::join!(
        state.orders.claim_delivery(&ravi, &order_id),
        state.orders.claim_delivery(&sunil, &order_id),
    );
    let winners = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1);
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(loser, Err(AppError::Conflict(_))));

    let order = state.orders.get_details(&order_id).await.unwrap().order;
    assert!(order.delivery_staff_id == Some(ravi.id) || order.delivery_staff_id == Some(sunil.id));
}

#[tokio::test]
async fn cancelled_orders_cannot_be_reassigned() {
    let state = test_state().await;
    let admin = profile(&state, "Admin User", Role::Admin).await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let stranger = profile(&state, "Other Customer", Role::Customer).await;
    let meals = food(&state, "Kerala Meals", 90, ServiceType::Homemade).await;
    let anil = cook(&state, "Anil", &[&meals]).await;

    let details = place_order(&state, &customer, &[(&meals, 1)]).await;
    let order_id = details.order.id;

    let foreign = state.orders.cancel(&Actor::Customer(stranger.id), &order_id).await;
    assert!(matches!(foreign, Err(AppError::NotFound(_))));

    let cancelled = state
        .orders
        .cancel(&Actor::Customer(customer.id), &order_id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let assign = state
        .orders
        .assign_cooks(&order_id, CookPlan::WholeOrder(anil.id))
        .await;
    assert!(matches!(assign, Err(AppError::InvalidTransition(_))));
    let confirm = state.orders.confirm_order(&order_id).await;
    assert!(confirm.is_err());
    let again = state.orders.cancel(&Actor::Admin(admin.id), &order_id).await;
    assert!(matches!(again, Err(AppError::InvalidTransition(_))));
}

#[tokio::test]
async fn customers_only_see_their_own_orders() {
    let state = test_state().await;
    let admin = profile(&state, "Admin User", Role::Admin).await;
    let meera = profile(&state, "Meera Nair", Role::Customer).await;
    let joy = profile(&state, "Joy Thomas", Role::Customer).await;
    let meals = food(&state, "Kerala Meals", 90, ServiceType::Homemade).await;

    let mine = place_order(&state, &meera, &[(&meals, 1)]).await;
    place_order(&state, &joy, &[(&meals, 2)]).await;

    let listed = state
        .orders
        .list_for(&Actor::Customer(meera.id), Default::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, mine.order.id);

    let all = state
        .orders
        .list_for(&Actor::Admin(admin.id), Default::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let hidden = state
        .orders
        .details_for(&Actor::Customer(joy.id), &mine.order.id)
        .await;
    assert!(matches!(hidden, Err(AppError::NotFound(_))));
}

fn checkout_to(panchayat: &str, event_details: Option<EventDetails>) -> Checkout {
    Checkout {
        panchayat: panchayat.to_string(),
        ward: WARD,
        delivery_address: "Near the temple, Main Road".to_string(),
        notes: None,
        event_details,
    }
}

/// An order priced from `lines`, as checkout would build it.
fn priced_order(customer: &Profile, lines: &[CartLine]) -> (Order, Vec<OrderItem>) {
    let now = Utc::now();
    let order_id = Uuid::new_v4();
    let items: Vec<OrderItem> = lines
        .iter()
        .map(|line| OrderItem {
            id: Uuid::new_v4(),
            order_id,
            food_item_id: line.food_item_id,
            food_name: line.food_name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            total_price: line.line_total(),
            cook_id: None,
        })
        .collect();
    let order = Order {
        id: order_id,
        customer_id: customer.id,
        service_type: lines[0].service_type,
        status: OrderStatus::Pending,
        panchayat: PANCHAYAT.to_string(),
        ward: WARD,
        delivery_address: "Main Road".to_string(),
        delivery_charge: Decimal::ZERO,
        total_amount: items.iter().map(|i| i.total_price).sum(),
        delivery_staff_id: None,
        event_details: None,
        notes: None,
        created_at: now,
        updated_at: now,
        delivered_at: None,
    };
    (order, items)
}

#[tokio::test]
async fn cart_line_cannot_grow_past_its_cap() {
    let state = test_state().await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let appam = food(&state, "Appam", 10, ServiceType::Homemade).await;
    let stew = food(&state, "Vegetable Stew", 70, ServiceType::Homemade).await;

    state.carts.add_item(&customer.id, &appam.id, 500).await.unwrap();
    let over = state.carts.add_item(&customer.id, &appam.id, 500).await;
    assert!(matches!(over, Err(AppError::ValidationError(_))));
    let one_more = state.carts.add_item(&customer.id, &appam.id, 1).await;
    assert!(matches!(one_more, Err(AppError::ValidationError(_))));

    state.carts.add_item(&customer.id, &stew.id, 300).await.unwrap();
    let cart = state.carts.add_item(&customer.id, &stew.id, 200).await.unwrap();
    let quantity_of = |id| cart.lines.iter().find(|l| l.food_item_id == id).unwrap().quantity;
    assert_eq!(quantity_of(appam.id), 500);
    assert_eq!(quantity_of(stew.id), 500);
}

#[tokio::test]
async fn placing_an_order_keeps_cart_lines_added_after_pricing() {
    let state = test_state().await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let meals = food(&state, "Kerala Meals", 90, ServiceType::Homemade).await;
    let appam = food(&state, "Appam", 10, ServiceType::Homemade).await;

    state.carts.add_item(&customer.id, &meals.id, 2).await.unwrap();
    let priced_lines = state.database.list_cart_lines(&customer.id).await.unwrap();
    state.carts.add_item(&customer.id, &appam.id, 4).await.unwrap();

    let (order, items) = priced_order(&customer, &priced_lines);
    let priced: Vec<(Uuid, i32)> = priced_lines.iter().map(|l| (l.id, l.quantity)).collect();
    state.database.place_order(&order, &items, &priced).await.unwrap();

    let cart = state.carts.view(&customer.id).await.unwrap();
    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.lines[0].food_item_id, appam.id);

    // The appam line grows after it was priced, so the stale checkout is refused whole.
    let stale = state.database.list_cart_lines(&customer.id).await.unwrap();
    state.carts.add_item(&customer.id, &appam.id, 1).await.unwrap();
    let (order, items) = priced_order(&customer, &stale);
    let priced: Vec<(Uuid, i32)> = stale.iter().map(|l| (l.id, l.quantity)).collect();
    let result = state.database.place_order(&order, &items, &priced).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(state.database.get_order(&order.id).await.is_err());
    assert_eq!(state.carts.view(&customer.id).await.unwrap().lines[0].quantity, 5);
}

#[tokio::test]
async fn ready_waits_for_every_item_and_every_answer() {
    let state = test_state().await;
    let admin = profile(&state, "Admin User", Role::Admin).await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let biryani = food(&state, "Chicken Biryani", 150, ServiceType::CloudKitchen).await;
    let payasam = food(&state, "Palada Payasam", 60, ServiceType::CloudKitchen).await;
    let anil = cook(&state, "Anil", &[&biryani]).await;
    let beena = cook(&state, "Beena", &[&payasam]).await;

    let details = place_order(&state, &customer, &[(&biryani, 1), (&payasam, 1)]).await;
    let order_id = details.order.id;
    state.orders.confirm_order(&order_id).await.unwrap();
    let line_of = |food_id| details.items.iter().find(|i| i.food_item_id == food_id).unwrap().id;

    let first = state
        .orders
        .assign_cooks(&order_id, CookPlan::PerItem(vec![(line_of(biryani.id), anil.id)]))
        .await
        .unwrap();
    state
        .orders
        .respond_to_assignment(&anil, &first.assignments[0].id, true)
        .await
        .unwrap();
    let unassigned = state.orders.mark_ready(&Actor::Admin(admin.id), &order_id).await;
    assert!(matches!(unassigned, Err(AppError::InvalidTransition(_))));

    let second = state
        .orders
        .assign_cooks(&order_id, CookPlan::PerItem(vec![(line_of(payasam.id), beena.id)]))
        .await
        .unwrap();
    let unanswered = state.orders.mark_ready(&Actor::Cook(anil.clone()), &order_id).await;
    assert!(matches!(unanswered, Err(AppError::InvalidTransition(_))));
    let not_yet_accepted = state.orders.mark_ready(&Actor::Cook(beena.clone()), &order_id).await;
    assert!(matches!(not_yet_accepted, Err(AppError::Forbidden(_))));

    let beena_assignment = second
        .assignments
        .iter()
        .find(|a| a.cook_id == beena.id)
        .unwrap();
    state
        .orders
        .respond_to_assignment(&beena, &beena_assignment.id, true)
        .await
        .unwrap();
    let ready = state.orders.mark_ready(&Actor::Cook(beena.clone()), &order_id).await.unwrap();
    assert_eq!(ready.status, OrderStatus::Ready);
}

#[tokio::test]
async fn dispatch_needs_a_ready_order_and_its_own_agent() {
    let state = test_state().await;
    let admin = profile(&state, "Admin User", Role::Admin).await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let meals = food(&state, "Kerala Meals", 90, ServiceType::Homemade).await;
    let anil = cook(&state, "Anil", &[&meals]).await;
    let ravi = delivery_staff(&state, "Ravi", PANCHAYAT).await;
    let sunil = delivery_staff(&state, "Sunil", PANCHAYAT).await;

    let details = place_order(&state, &customer, &[(&meals, 1)]).await;
    let order_id = details.order.id;
    state.orders.confirm_order(&order_id).await.unwrap();
    let assigned = state
        .orders
        .assign_cooks(&order_id, CookPlan::WholeOrder(anil.id))
        .await
        .unwrap();
    state
        .orders
        .respond_to_assignment(&anil, &assigned.assignments[0].id, true)
        .await
        .unwrap();
    state.orders.assign_delivery(&order_id, &ravi.id).await.unwrap();

    let still_cooking = state.orders.dispatch(&ravi, &order_id, "Bike", "KL 08 AB 1234").await;
    assert!(matches!(still_cooking, Err(AppError::InvalidTransition(_))));

    state.orders.mark_ready(&Actor::Admin(admin.id), &order_id).await.unwrap();
    let someone_else = state.orders.dispatch(&sunil, &order_id, "Bike", "KL 08 CD 4321").await;
    assert!(matches!(someone_else, Err(AppError::InvalidTransition(_))));
    let bad_plate = state.orders.dispatch(&ravi, &order_id, "Bike", "bicycle").await;
    assert!(matches!(bad_plate, Err(AppError::ValidationError(_))));

    let dispatched = state
        .orders
        .dispatch(&ravi, &order_id, "Bike", "kl 08 ab 1234")
        .await
        .unwrap();
    assert_eq!(dispatched.status, OrderStatus::OutForDelivery);
    let vehicle = state.orders.get_details(&order_id).await.unwrap().vehicle.unwrap();
    assert_eq!(vehicle.staff_id, ravi.id);
    assert_eq!(vehicle.vehicle_number, "KL 08 AB 1234");

    let twice = state.orders.dispatch(&ravi, &order_id, "Bike", "KL 08 AB 1234").await;
    assert!(matches!(twice, Err(AppError::InvalidTransition(_))));
}

#[tokio::test]
async fn approved_dish_request_allocates_the_dish() {
    let state = test_state().await;
    let appam = food(&state, "Appam", 10, ServiceType::Homemade).await;
    let anil = cook(&state, "Anil", &[]).await;
    let wanted: BTreeSet<_> = [appam.id].into_iter().collect();
    assert!(state.cooks.eligible_cooks(&wanted).await.unwrap().is_empty());

    let request = state
        .cooks
        .request_dish(&anil.id, &appam.id, Some("Family recipe".to_string()))
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    let duplicate = state.cooks.request_dish(&anil.id, &appam.id, None).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let reviewed = state.cooks.review_dish_request(&request.id, true).await.unwrap();
    assert_eq!(reviewed.status, RequestStatus::Approved);
    let dishes = state.cooks.list_cook_dishes(&anil.id).await.unwrap();
    assert_eq!(dishes.len(), 1);
    assert_eq!(dishes[0].food_item_id, appam.id);
    let eligible = state.cooks.eligible_cooks(&wanted).await.unwrap();
    assert_eq!(eligible.iter().map(|c| c.id).collect::<Vec<_>>(), vec![anil.id]);

    let again = state.cooks.review_dish_request(&request.id, false).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
    let already_allocated = state.cooks.request_dish(&anil.id, &appam.id, None).await;
    assert!(matches!(already_allocated, Err(AppError::Conflict(_))));

    let inbox = state
        .notifications
        .get_profile_notifications(&anil.profile_id, None)
        .await
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification_type, NotificationType::DishRequestReviewed);
}

#[tokio::test]
async fn indoor_event_checkout_requires_and_keeps_event_details() {
    let state = test_state().await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let sadya = food(&state, "Wedding Sadya", 350, ServiceType::IndoorEvents).await;
    state.carts.add_item(&customer.id, &sadya.id, 150).await.unwrap();

    let missing = state
        .carts
        .checkout(&customer.id, checkout_to(PANCHAYAT, None))
        .await;
    assert!(matches!(missing, Err(AppError::ValidationError(_))));
    assert_eq!(state.carts.view(&customer.id).await.unwrap().lines.len(), 1);

    let event = EventDetails {
        event_date: (Utc::now() + Duration::days(30)).date_naive(),
        guest_count: 150,
        venue: "St. Mary's parish hall".to_string(),
        event_type: "wedding".to_string(),
    };
    let placed = state
        .carts
        .checkout(&customer.id, checkout_to(PANCHAYAT, Some(event.clone())))
        .await
        .unwrap();
    assert_eq!(placed.order.service_type, ServiceType::IndoorEvents);
    assert_eq!(placed.order.total_amount, Decimal::new(350 * 150 + 30, 0));

    let stored = state.orders.get_details(&placed.order.id).await.unwrap();
    assert_eq!(stored.order.event_details, Some(event));
}

#[tokio::test]
async fn change_feed_follows_an_order_to_its_door() {
    let state = test_state().await;
    let admin = profile(&state, "Admin User", Role::Admin).await;
    let customer = profile(&state, "Meera Nair", Role::Customer).await;
    let meals = food(&state, "Kerala Meals", 90, ServiceType::Homemade).await;
    let anil = cook(&state, "Anil", &[&meals]).await;
    let ravi = delivery_staff(&state, "Ravi", PANCHAYAT).await;
    let joseph = delivery_staff(&state, "Joseph", "Mala").await;
    let mut feed = state.notifications.subscribe();

    let details = place_order(&state, &customer, &[(&meals, 2)]).await;
    let order_id = details.order.id;
    state.orders.confirm_order(&order_id).await.unwrap();
    let assigned = state
        .orders
        .assign_cooks(&order_id, CookPlan::WholeOrder(anil.id))
        .await
        .unwrap();
    state
        .orders
        .respond_to_assignment(&anil, &assigned.assignments[0].id, true)
        .await
        .unwrap();
    state.orders.mark_ready(&Actor::Admin(admin.id), &order_id).await.unwrap();
    state.orders.claim_delivery(&ravi, &order_id).await.unwrap();
    state.orders.dispatch(&ravi, &order_id, "Scooter", "KL-08-1234").await.unwrap();
    state
        .orders
        .complete_delivery(&Actor::Delivery(ravi.clone()), &order_id)
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = feed.try_recv() {
        events.push(event);
    }
    assert!(events.iter().all(|e| e.order_id == order_id && e.customer_id == customer.id));
    assert_eq!(events[0].kind, OrderEventKind::Placed);
    assert_eq!(
        events.iter().map(|e| e.status).collect::<Vec<_>>(),
        vec![
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Ready,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ]
    );
    assert_eq!(events[5].kind, OrderEventKind::DeliveryAssigned { staff_id: ravi.id });

    let seen_by = |scope: FeedScope, service_type: Option<ServiceType>| {
        let mut filter = FeedFilter::new(scope, service_type);
        events.iter().filter(|e| filter.admits(e)).count()
    };
    assert_eq!(seen_by(FeedScope::Everything, None), 8);
    assert_eq!(seen_by(FeedScope::Customer(customer.id), None), 8);
    assert_eq!(seen_by(FeedScope::Customer(admin.id), None), 0);
    assert_eq!(seen_by(FeedScope::Cook(anil.id), None), 6);
    assert_eq!(seen_by(FeedScope::Delivery(ravi.clone()), Some(ServiceType::Homemade)), 8);
    assert_eq!(seen_by(FeedScope::Delivery(joseph.clone()), None), 0);
    assert_eq!(seen_by(FeedScope::Everything, Some(ServiceType::CloudKitchen)), 0);
}
