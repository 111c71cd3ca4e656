// billing-backend/src/lib.rs
pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod repository;
pub mod service;
pub mod utils;
pub mod webhook;

// Re-export commonly used types
pub use api::dto::common::ApiResponse;
