// billing-backend/src/domain/mod.rs
pub mod customer_model;
pub mod invoice_model;
pub mod subscription_item_model;
pub mod subscription_model;
pub mod subscription_status;
pub mod subscription_tier;
