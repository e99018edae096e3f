pub mod auth;
pub mod cart;
pub mod locations;
pub mod orders;
pub mod products;
