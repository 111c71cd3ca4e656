// billing-backend/src/logging/mod.rs

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{field, Instrument, Level, Span};
use uuid::Uuid;

/// レベルを実行時に選びつつ、キーと値を構造化フィールドとして出力する
#[macro_export]
macro_rules! log_with_context {
    ($level:expr, $msg:expr $(, $($key:expr => $value:expr),* $(,)?)?) => {
        match $level {
            tracing::Level::ERROR => {
                tracing::error!(message = $msg $(, $($key = ?$value,)*)?);
            }
            tracing::Level::WARN => {
                tracing::warn!(message = $msg $(, $($key = ?$value,)*)?);
            }
            tracing::Level::INFO => {
                tracing::info!(message = $msg $(, $($key = ?$value,)*)?);
            }
            tracing::Level::DEBUG => {
                tracing::debug!(message = $msg $(, $($key = ?$value,)*)?);
            }
            _ => {
                tracing::trace!(message = $msg $(, $($key = ?$value,)*)?);
            }
        }
    };
}

/// リクエスト単位のログコンテキスト
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub path: String,
    pub method: String,
    /// Stripeの再送を追跡するための署名タイムスタンプ（Webhookのみ）
    pub stripe_signature_timestamp: Option<String>,
}

impl RequestContext {
    /// リクエスト全体を包むspan
    ///
    /// `event_id` と `event_type` は署名検証とパースが済んだ後に
    /// [`record_webhook_event`] で埋める。それまでは空のまま。
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            stripe_signature_timestamp = field::debug(&self.stripe_signature_timestamp),
            event_id = field::Empty,
            event_type = field::Empty,
        )
    }
}

/// 現在のリクエストspanに処理中のStripeイベントを記録する
pub fn record_webhook_event(event_id: &str, event_type: &str) {
    let span = Span::current();
    span.record("event_id", event_id);
    span.record("event_type", event_type);
}

/// ステータスコードに応じた完了ログのレベル
pub fn completion_level(status: StatusCode) -> Level {
    if status.is_server_error() {
        Level::ERROR
    } else if status.is_client_error() {
        Level::WARN
    } else {
        Level::INFO
    }
}

/// `Stripe-Signature` ヘッダーから `t=` の値のみを取り出す（署名本体はログに残さない）
fn signature_timestamp(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .and_then(|header| {
            header
                .split(',')
                .find_map(|part| part.trim().strip_prefix("t="))
                .map(str::to_string)
        })
}

// ロギングミドルウェア
pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let Some(context) = req.extensions().get::<RequestContext>().cloned() else {
        return next.run(req).await;
    };

    let span = context.span();
    async move {
        let start = Instant::now();
        tracing::info!("Request started");

        let response = next.run(req).await;
        let status = response.status();

        log_with_context!(
            completion_level(status),
            "Request completed",
            "status" => status.as_u16(),
            "duration_ms" => start.elapsed().as_millis(),
        );

        response
    }
    .instrument(span)
    .await
}

// RequestContextを生成するミドルウェア
pub async fn inject_request_context(mut req: Request<Body>, next: Next) -> Response {
    let context = RequestContext {
        request_id: Uuid::new_v4().to_string(),
        path: req.uri().path().to_string(),
        method: req.method().to_string(),
        stripe_signature_timestamp: signature_timestamp(&req),
    };

    req.extensions_mut().insert(context);
    next.run(req).await
}
