pub mod auth;
pub mod cart_service;
pub mod catalog_service;
pub mod cook_service;
pub mod jwt;
pub mod notification_service;
pub mod order_service;
pub mod settlement_service;
