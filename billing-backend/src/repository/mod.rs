// billing-backend/src/repository/mod.rs
pub mod customer_repository;
pub mod invoice_repository;
pub mod subscription_item_repository;
pub mod subscription_repository;
