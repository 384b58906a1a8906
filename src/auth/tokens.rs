use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{config::WebsiteConfig, models::User};

type HmacSha256 = Hmac<Sha256>;

/// Width of the truncated signature, in bytes (20 hex characters on the wire).
const SIGNATURE_BYTES: usize = 10;

/// Issues and verifies account-activation tokens.
///
/// A token is `base64url(timestamp) + "-" + hex(truncated hmac)` where the
/// mac covers `(user pk, timestamp, active flag)`. Nothing is stored: because
/// the active flag is part of the signed payload, activating the account
/// silently invalidates every token issued before the flip, which makes each
/// token single-use without a consumed-token table.
#[derive(Clone, Debug)]
pub struct ActivationTokens {
    key: String,
    max_age: i64,
}

impl ActivationTokens {
    pub fn new(config: &WebsiteConfig) -> Self {
        Self {
            key: config.secret_key.clone(),
            max_age: config.token_max_age(),
        }
    }

    pub fn issue(&self, user: &User) -> String {
        self.issue_at(user, now())
    }

    /// Fails closed: a malformed, expired, forged or already-consumed token
    /// and a missing user all collapse into `false`, with no reason code.
    pub fn check(&self, user: Option<&User>, token: &str) -> bool {
        self.check_at(user, token, now())
    }

    fn issue_at(&self, user: &User, timestamp: i64) -> String {
        let signature = self.mac(user, timestamp).finalize().into_bytes();
        format!(
            "{}-{}",
            URL_SAFE_NO_PAD.encode(timestamp.to_string()),
            hex::encode(&signature[..SIGNATURE_BYTES])
        )
    }

    fn check_at(&self, user: Option<&User>, token: &str, now: i64) -> bool {
        let Some(user) = user else {
            return false;
        };
        // The signature is hex so the rightmost separator is unambiguous even
        // though the base64url alphabet also contains '-'.
        let Some((encoded_timestamp, signature)) = token.rsplit_once('-') else {
            return false;
        };
        let Some(timestamp) = decode_timestamp(encoded_timestamp) else {
            return false;
        };
        if now.saturating_sub(timestamp) > self.max_age {
            return false;
        }
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };
        if signature.len() != SIGNATURE_BYTES {
            return false;
        }
        self.mac(user, timestamp)
            .verify_truncated_left(&signature)
            .is_ok()
    }

    /// The canonical signed payload. Must stay identical between issue and
    /// check time or every outstanding token breaks.
    fn fingerprint(&self, user: &User, timestamp: i64) -> String {
        format!("{}:{}:{}", user.pk, timestamp, user.is_active)
    }

    fn mac(&self, user: &User, timestamp: i64) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(self.fingerprint(user, timestamp).as_bytes());
        mac
    }
}

/// Encodes a user pk the way activation links carry it.
pub fn encode_uid(pk: i64) -> String {
    URL_SAFE_NO_PAD.encode(pk.to_string())
}

/// Inverse of [`encode_uid`]. Any malformed input yields `None`, never an
/// error.
pub fn decode_uid(value: &str) -> Option<i64> {
    let bytes = URL_SAFE_NO_PAD.decode(value).ok()?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

fn decode_timestamp(value: &str) -> Option<i64> {
    let bytes = URL_SAFE_NO_PAD.decode(value).ok()?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs() as i64
}
