// Procurement API client - Library root for testing

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod http_client;
pub mod models;
