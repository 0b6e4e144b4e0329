pub mod cart;
pub mod cook;
pub mod delivery;
pub mod food;
pub mod notification;
pub mod order;
pub mod profile;
pub mod settlement;
