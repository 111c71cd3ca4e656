// billing-backend/src/service/mod.rs
pub mod billing_provider;
pub mod payment_service;
pub mod subscription_service;
pub mod subscription_sync_service;
