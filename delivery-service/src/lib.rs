pub mod api;
pub mod auth;
pub mod checkout;
pub mod error;
pub mod gateway;
pub mod models;
pub mod postgres;
pub mod reconciler;
pub mod schema;
pub mod store;
