pub mod payment_handler;
pub mod subscription_handler;
pub mod system_handler;
pub mod webhook_handler;
