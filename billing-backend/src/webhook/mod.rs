// billing-backend/src/webhook/mod.rs

//! Stripe Webhookの受信処理
//!
//! 署名検証（[`signature`]）とイベントの分類・デコード（[`event`]）を扱う。
//! DBへの反映は `service::subscription_sync_service` が行う。

pub mod event;
pub mod signature;

use sea_orm::DbErr;
use thiserror::Error;

pub use event::{WebhookEvent, WebhookEventKind};
pub use signature::verify_signature;

/// Webhook処理のエラー
///
/// `InvalidSignature` と `MalformedPayload` のみ 400 として返す。
/// それ以外は署名検証後に起きるため、ログに残したうえで受信確認（200）を返す。
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Could not resolve a user for customer {customer_id}")]
    UnresolvedUser { customer_id: String },

    #[error("Could not decode {event_type} object: {reason}")]
    UndecodableObject { event_type: String, reason: String },

    #[error("Failed to write webhook result: {0}")]
    StoreWriteFailure(#[from] DbErr),
}

impl WebhookError {
    /// リクエスト自体を拒否すべきエラーか
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidSignature(_) | Self::MalformedPayload(_))
    }

    /// 受信確認に載せるエラー種別
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSignature(_) => "invalid_signature",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::UnresolvedUser { .. } => "unresolved_user",
            Self::UndecodableObject { .. } => "undecodable_object",
            Self::StoreWriteFailure(_) => "store_write_failure",
        }
    }
}
