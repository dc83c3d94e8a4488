//! Opaque QR token codec
//!
//! A token carries the bill id, merchant id, and expiry behind a
//! versioned binary envelope with a SHA-256 integrity tag. Payers see
//! only an opaque base64 string; amounts and discounts stay server
//! side.

use crate::crypto::hash_bytes;
use crate::error::{Error, Result};
use crate::types::Bill;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current token envelope version
const TOKEN_VERSION: u8 = 1;

/// Truncated SHA-256 tag length in bytes
const TAG_LEN: usize = 8;

/// Decoded token contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Bill the token points at
    pub bill_id: Uuid,
    /// Issuing merchant
    pub merchant_id: Uuid,
    /// Expiry as epoch seconds
    pub expires_at: i64,
}

impl TokenPayload {
    /// Whether the embedded expiry has passed at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now.timestamp()
    }
}

/// Encode a bill into an opaque QR token
pub fn encode_token(bill: &Bill) -> Result<String> {
    let payload = TokenPayload {
        bill_id: bill.bill_id,
        merchant_id: bill.merchant_id,
        expires_at: bill.expires_at.timestamp(),
    };
    let body = bincode::serialize(&payload)?;
    let mut raw = Vec::with_capacity(1 + body.len() + TAG_LEN);
    raw.push(TOKEN_VERSION);
    raw.extend_from_slice(&body);
    let tag = hash_bytes(&raw);
    raw.extend_from_slice(&tag[..TAG_LEN]);
    Ok(BASE64.encode(raw))
}

/// Decode and validate an opaque QR token
///
/// Every failure mode collapses to [`Error::MalformedToken`] so a
/// scanner cannot distinguish tampering from truncation.
pub fn decode_token(token: &str) -> Result<TokenPayload> {
    let raw = BASE64
        .decode(token)
        .map_err(|_| Error::MalformedToken("bad encoding".into()))?;
    if raw.len() <= 1 + TAG_LEN {
        return Err(Error::MalformedToken("truncated".into()));
    }
    let (envelope, tag) = raw.split_at(raw.len() - TAG_LEN);
    let expected = hash_bytes(envelope);
    if tag != &expected[..TAG_LEN] {
        return Err(Error::MalformedToken("integrity check failed".into()));
    }
    if envelope[0] != TOKEN_VERSION {
        return Err(Error::MalformedToken(format!(
            "unsupported version {}",
            envelope[0]
        )));
    }
    bincode::deserialize(&envelope[1..])
        .map_err(|_| Error::MalformedToken("invalid payload".into()))
}
