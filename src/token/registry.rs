//! Token Registry
//!
//! Persistent record of every issued code plus a timed fast-path cache.
//! Validation runs seven ordered checks and reports the first one that fails:
//!
//! 1. signature
//! 2. purpose
//! 3. embedded timestamp freshness
//! 4. registry lookup by hash
//! 5. used flag
//! 6. stored expiry
//! 7. cache presence (a miss reads as expiry)
//!
//! Consumption is a compare-and-set on the registry row, run inside the
//! caller's unit of work, followed by a synchronous cache eviction.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::cache::TokenCache;
use super::codec::{TokenCodec, TokenPayload, code_hash};
use super::error::TokenError;
use super::render::qr_data_url;
use super::types::{Purpose, TokenReason, TokenRecord};
use crate::clock::Clock;
use crate::core_types::{UserId, VendorId};
use crate::store::{Storage, UnitOfWork};

/// Default token lifetime in seconds
pub const DEFAULT_TTL_SECONDS: u64 = 300;

/// Longest lifetime a code may be issued with (one day)
pub const MAX_TTL_SECONDS: u64 = 86_400;

/// Clamp a configured lifetime into `1..=MAX_TTL_SECONDS`.
pub fn bounded_ttl(ttl_seconds: u64) -> u64 {
    ttl_seconds.clamp(1, MAX_TTL_SECONDS)
}

/// Result of a successful issuance
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IssuedToken {
    pub signed_payload: String,
    /// SVG QR code as a data URL
    pub image_data_url: String,
    pub code_hash: String,
    pub purpose: Purpose,
    pub ttl_seconds: u64,
    pub expires_at: DateTime<Utc>,
}

/// A token that passed every check
#[derive(Debug, Clone)]
pub struct ValidToken {
    pub payload: TokenPayload,
    pub code_hash: String,
    pub record: TokenRecord,
}

/// Wire shape of a validation answer
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub payload: Option<TokenPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<TokenReason>,
}

pub struct TokenRegistry {
    store: Arc<dyn Storage>,
    cache: Arc<dyn TokenCache>,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    ttl_seconds: u64,
}

impl TokenRegistry {
    pub fn new(
        store: Arc<dyn Storage>,
        cache: Arc<dyn TokenCache>,
        codec: TokenCodec,
        clock: Arc<dyn Clock>,
        ttl_seconds: u64,
    ) -> Self {
        let bounded = bounded_ttl(ttl_seconds);
        if bounded != ttl_seconds {
            warn!(
                requested = ttl_seconds,
                applied = bounded,
                "Token TTL out of range; clamped"
            );
        }
        Self {
            store,
            cache,
            codec,
            clock,
            ttl_seconds: bounded,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds as i64)
    }

    /// Code a student shows at the counter. `vendor_hint` binds it to one vendor.
    pub async fn issue_subject_code(
        &self,
        student_id: UserId,
        vendor_hint: Option<VendorId>,
    ) -> Result<IssuedToken, TokenError> {
        let student = self.store.get_user(student_id).await?;
        if !student.is_some_and(|s| s.is_active_student()) {
            return Err(TokenError::IneligibleSubject);
        }
        self.issue(
            student_id,
            Purpose::SubjectPresented,
            vendor_hint,
            json!({ "student_id": student_id }),
        )
        .await
    }

    /// Code a vendor displays for students to scan. Only the vendor's
    /// operator may issue it, and only while the vendor is active.
    pub async fn issue_counter_code(
        &self,
        caller: UserId,
        vendor_id: VendorId,
    ) -> Result<IssuedToken, TokenError> {
        let vendor = self
            .store
            .get_vendor(vendor_id)
            .await?
            .ok_or(TokenError::VendorNotFound)?;
        if !vendor.is_active {
            return Err(TokenError::VendorInactive);
        }
        if !vendor.is_operated_by(caller) {
            warn!(caller = %caller, vendor_id = %vendor_id, "Counter code requested by non-operator");
            return Err(TokenError::NotVendorOwner);
        }
        self.issue(
            vendor_id,
            Purpose::CounterPresented,
            None,
            json!({ "vendor_id": vendor_id, "vendor_code": vendor.vendor_code, "issued_by": caller }),
        )
        .await
    }

    /// Sign, render and register a new code.
    ///
    /// Rendering happens before anything touches storage.
    pub async fn issue(
        &self,
        identity: Uuid,
        purpose: Purpose,
        counterparty: Option<Uuid>,
        metadata: serde_json::Value,
    ) -> Result<IssuedToken, TokenError> {
        let (signed, payload) =
            self.codec
                .issue(identity, purpose, counterparty, self.clock.now_ms())?;
        let image_data_url = qr_data_url(&signed)?;
        let record = self.register(&signed, &payload, metadata).await?;

        info!(
            identity = %identity,
            purpose = %purpose,
            code_hash = %record.code_hash,
            "Token issued"
        );

        Ok(IssuedToken {
            signed_payload: signed,
            image_data_url,
            code_hash: record.code_hash,
            purpose,
            ttl_seconds: self.ttl_seconds,
            expires_at: record.expires_at,
        })
    }

    /// Persist the hash of `signed` with expiry = issue time + TTL and seed
    /// the cache with a matching lifespan.
    pub async fn register(
        &self,
        signed: &str,
        payload: &TokenPayload,
        metadata: serde_json::Value,
    ) -> Result<TokenRecord, TokenError> {
        let issued_at = DateTime::from_timestamp_millis(payload.ts).unwrap_or_else(|| self.clock.now());
        let (subject_id, vendor_id) = match payload.purpose {
            Purpose::SubjectPresented => (Some(payload.identity), payload.counterparty),
            Purpose::CounterPresented => (None, Some(payload.identity)),
        };
        let record = TokenRecord {
            code_hash: code_hash(signed),
            subject_id,
            vendor_id,
            purpose: payload.purpose,
            issued_at,
            expires_at: issued_at + self.ttl(),
            used: false,
            used_at: None,
            used_by: None,
            transaction_id: None,
            metadata,
        };
        self.store.insert_token(&record).await?;
        self.cache.put(&record.code_hash);
        Ok(record)
    }

    /// Run the ordered validation checks.
    pub async fn check_valid(
        &self,
        signed: &str,
        expected: Purpose,
    ) -> Result<ValidToken, TokenError> {
        let reject = |reason: TokenReason| {
            debug!(reason = %reason, "Token rejected");
            Err(TokenError::Rejected(reason))
        };

        // 1. signature
        let payload = match self.codec.verify(signed) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "Token failed codec verification");
                return reject(TokenReason::Signature);
            }
        };

        // 2. purpose
        if payload.purpose != expected {
            return reject(TokenReason::Purpose);
        }

        // 3. freshness of the embedded timestamp
        let now = self.clock.now();
        let age_ms = now.timestamp_millis() - payload.ts;
        if age_ms > self.ttl().num_milliseconds() {
            return reject(TokenReason::Expired);
        }

        // 4. registry lookup
        let hash = code_hash(signed);
        let Some(record) = self.store.find_token(&hash).await? else {
            return reject(TokenReason::NotFound);
        };

        // 5. used flag
        if record.used {
            warn!(code_hash = %hash, used_by = ?record.used_by, "Replay of consumed token");
            return reject(TokenReason::AlreadyUsed);
        }

        // 6. stored expiry
        if record.is_expired_at(now) {
            return reject(TokenReason::Expired);
        }

        // 7. cache presence
        if !self.cache.contains(&hash) {
            return reject(TokenReason::Expired);
        }

        Ok(ValidToken {
            payload,
            code_hash: hash,
            record,
        })
    }

    /// `check_valid` folded into the wire answer. Infrastructure errors still
    /// propagate.
    pub async fn validate(
        &self,
        signed: &str,
        expected: Purpose,
    ) -> Result<TokenValidation, TokenError> {
        match self.check_valid(signed, expected).await {
            Ok(valid) => Ok(TokenValidation {
                valid: true,
                payload: Some(valid.payload),
                reason: None,
            }),
            Err(TokenError::Rejected(reason)) => Ok(TokenValidation {
                valid: false,
                payload: None,
                reason: Some(reason),
            }),
            Err(e) => Err(e),
        }
    }

    /// Consume in its own unit of work.
    pub async fn consume(
        &self,
        signed: &str,
        consumer: UserId,
        transaction_id: Uuid,
    ) -> Result<(), TokenError> {
        let hash = code_hash(signed);
        let mut uow = self.store.begin().await?;
        self.consume_in(uow.as_mut(), &hash, consumer, transaction_id)
            .await?;
        uow.commit().await?;
        self.evict(&hash);
        Ok(())
    }

    /// Mark used inside the caller's unit of work.
    ///
    /// Exactly one concurrent caller gets `Ok`; the rest see `AlreadyUsed`.
    /// The caller must [`TokenRegistry::evict`] after its commit succeeds.
    pub async fn consume_in(
        &self,
        uow: &mut dyn UnitOfWork,
        code_hash: &str,
        consumer: UserId,
        transaction_id: Uuid,
    ) -> Result<(), TokenError> {
        let won = uow
            .mark_token_used(code_hash, consumer, transaction_id, self.clock.now())
            .await?;
        if !won {
            warn!(code_hash = %code_hash, consumer = %consumer, "Token consume lost race");
            return Err(TokenError::Rejected(TokenReason::AlreadyUsed));
        }
        Ok(())
    }

    /// Drop the token from the fast cache so no further validation passes.
    pub fn evict(&self, code_hash: &str) {
        self.cache.evict(code_hash);
    }

    /// Registry row for a signed payload, if any
    pub async fn details(&self, signed: &str) -> Result<Option<TokenRecord>, TokenError> {
        Ok(self.store.find_token(&code_hash(signed)).await?)
    }
}
