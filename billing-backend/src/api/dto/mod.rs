pub mod common;
pub mod payment_dto;
pub mod subscription_dto;
pub mod webhook_dto;
