// Netatmo Away - library root

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod http_client;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod switch;
pub mod thermostat;
