//! Signed Token Codec
//!
//! Wire format: `<json payload>:<hex HMAC-SHA256(json payload)>`.
//!
//! The codec is pure. It never looks at clocks or storage; expiry and reuse
//! are decided by the registry.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::types::Purpose;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Signing secret must not be empty")]
    EmptySecret,

    #[error("Malformed token: missing signature separator")]
    MissingSeparator,

    #[error("Malformed token: signature is not hex")]
    SignatureEncoding,

    #[error("Token signature mismatch")]
    SignatureMismatch,

    #[error("Token payload decode failed: {0}")]
    Decode(String),

    #[error("Token payload encode failed: {0}")]
    Encode(String),
}

impl CodecError {
    pub fn code(&self) -> &'static str {
        match self {
            CodecError::EmptySecret | CodecError::Encode(_) => "SYSTEM_ERROR",
            CodecError::MissingSeparator
            | CodecError::SignatureEncoding
            | CodecError::SignatureMismatch
            | CodecError::Decode(_) => "INVALID_SIGNATURE",
        }
    }
}

/// Signed content of a QR code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Student id for subject-presented codes, vendor id for counter-presented
    pub identity: Uuid,
    pub purpose: Purpose,
    /// Opposing party the code is bound to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<Uuid>,
    /// Issue time, ms since epoch
    pub ts: i64,
    pub nonce: Uuid,
}

/// Registry key for a signed artifact: hex SHA-256 of the whole string.
pub fn code_hash(signed: &str) -> String {
    hex::encode(Sha256::digest(signed.as_bytes()))
}

#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenCodec { mac: <redacted> }")
    }
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, CodecError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(CodecError::EmptySecret);
        }
        let mac = <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| CodecError::EmptySecret)?;
        Ok(Self { mac })
    }

    /// Build and sign a fresh payload. Every call draws a new nonce, so two
    /// calls with identical arguments never produce the same artifact.
    pub fn issue(
        &self,
        identity: Uuid,
        purpose: Purpose,
        counterparty: Option<Uuid>,
        now_ms: i64,
    ) -> Result<(String, TokenPayload), CodecError> {
        let payload = TokenPayload {
            identity,
            purpose,
            counterparty,
            ts: now_ms,
            nonce: Uuid::new_v4(),
        };
        let signed = self.sign(&payload)?;
        Ok((signed, payload))
    }

    pub fn sign(&self, payload: &TokenPayload) -> Result<String, CodecError> {
        let body = serde_json::to_string(payload).map_err(|e| CodecError::Encode(e.to_string()))?;
        let mut mac = self.mac.clone();
        mac.update(body.as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{}:{}", body, sig))
    }

    /// Check the signature and decode the payload.
    ///
    /// The JSON body contains colons of its own, so the split is on the last
    /// one. Comparison is constant-time.
    pub fn verify(&self, signed: &str) -> Result<TokenPayload, CodecError> {
        let (body, sig_hex) = signed
            .rsplit_once(':')
            .ok_or(CodecError::MissingSeparator)?;
        if body.is_empty() || sig_hex.is_empty() {
            return Err(CodecError::MissingSeparator);
        }
        let sig = hex::decode(sig_hex).map_err(|_| CodecError::SignatureEncoding)?;

        let mut mac = self.mac.clone();
        mac.update(body.as_bytes());
        mac.verify_slice(&sig)
            .map_err(|_| CodecError::SignatureMismatch)?;

        serde_json::from_str(body).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
