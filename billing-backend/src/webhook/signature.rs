// billing-backend/src/webhook/signature.rs

use super::WebhookError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// `Stripe-Signature` ヘッダーの解析結果
#[derive(Debug, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signatures: Vec<Vec<u8>>,
}

/// `t=<unix>,v1=<hex>[,v1=...][,v0=...]` を解析する
///
/// 未知のキー（v0など）は無視する。16進として読めないv1は照合対象外。
pub fn parse_signature_header(header: &str) -> Result<SignatureHeader, WebhookError> {
    let mut timestamp = None;
    let mut v1_signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    WebhookError::InvalidSignature("timestamp is not a number".to_string())
                })?);
            }
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    v1_signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        WebhookError::InvalidSignature("missing timestamp in stripe-signature".to_string())
    })?;

    if v1_signatures.is_empty() {
        return Err(WebhookError::InvalidSignature(
            "missing v1 in stripe-signature".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        v1_signatures,
    })
}

/// 生のリクエストボディに対して署名を検証する
///
/// 期待値は `"{t}.{body}"` のHMAC-SHA256（鍵はWebhook署名シークレット）。
/// いずれかのv1が一致し、かつタイムスタンプが `now` から `tolerance_secs` 以内なら成功。
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), WebhookError> {
    if secret.is_empty() {
        return Err(WebhookError::InvalidSignature(
            "webhook signing secret is not configured".to_string(),
        ));
    }

    let header = header.ok_or_else(|| {
        WebhookError::InvalidSignature("missing stripe-signature header".to_string())
    })?;
    let parsed = parse_signature_header(header)?;

    if (now - parsed.timestamp).abs() > tolerance_secs {
        return Err(WebhookError::InvalidSignature(format!(
            "timestamp {} is outside the tolerance window",
            parsed.timestamp
        )));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::InvalidSignature(e.to_string()))?;
    mac.update(parsed.timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice は定数時間比較
    let matched = parsed
        .v1_signatures
        .iter()
        .any(|candidate| mac.clone().verify_slice(candidate).is_ok());

    if matched {
        Ok(())
    } else {
        Err(WebhookError::InvalidSignature(
            "no signature matched the expected value".to_string(),
        ))
    }
}
