// billing-backend/src/api/dto/webhook_dto.rs

use crate::service::subscription_sync_service::{WebhookOutcome, WebhookReceipt};
use serde::Serialize;

/// Webhookの受信確認
#[derive(Debug, Serialize)]
pub struct WebhookAckResponse {
    pub received: bool,
    pub event_id: String,
    pub event_type: String,
    pub outcome: WebhookOutcome,
}

impl From<WebhookReceipt> for WebhookAckResponse {
    fn from(receipt: WebhookReceipt) -> Self {
        Self {
            received: true,
            event_id: receipt.event_id,
            event_type: receipt.event_type,
            outcome: receipt.outcome,
        }
    }
}
