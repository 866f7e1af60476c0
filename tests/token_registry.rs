//! Token issuance, ordered validation and single-use consumption.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{SECRET, TTL_SECONDS, fixture};
use mealpay::clock::Clock;
use mealpay::gateway::AppState;
use mealpay::token::{
    MAX_TTL_SECONDS, Purpose, TokenCodec, TokenError, TokenReason, code_hash,
};
use uuid::Uuid;

fn reason(err: TokenError) -> TokenReason {
    err.reason()
        .unwrap_or_else(|| panic!("expected a rejection, got {err:?}"))
}

#[tokio::test]
async fn test_fresh_subject_code_validates() {
    let f = fixture();
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();

    assert_eq!(issued.purpose, Purpose::SubjectPresented);
    assert_eq!(issued.ttl_seconds, TTL_SECONDS);
    assert_eq!(issued.code_hash, code_hash(&issued.signed_payload));
    assert!(
        issued
            .image_data_url
            .starts_with("data:image/svg+xml;base64,")
    );

    let valid = f
        .app
        .tokens
        .check_valid(&issued.signed_payload, Purpose::SubjectPresented)
        .await
        .unwrap();
    assert_eq!(valid.payload.identity, f.student);
    assert_eq!(valid.payload.ts, f.clock.now_ms());
    assert!(!valid.record.used);
}

#[tokio::test]
async fn test_wrong_purpose_rejected() {
    let f = fixture();
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();

    let err = f
        .app
        .tokens
        .check_valid(&issued.signed_payload, Purpose::CounterPresented)
        .await
        .unwrap_err();
    assert_eq!(reason(err), TokenReason::Purpose);
}

#[tokio::test]
async fn test_tampered_or_foreign_signature_rejected() {
    let f = fixture();
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();

    let forged = issued
        .signed_payload
        .replacen(&f.student.to_string(), &f.other_student.to_string(), 1);
    let err = f
        .app
        .tokens
        .check_valid(&forged, Purpose::SubjectPresented)
        .await
        .unwrap_err();
    assert_eq!(reason(err), TokenReason::Signature);

    let foreign = TokenCodec::new("some-other-deployment").unwrap();
    let (signed, _) = foreign
        .issue(f.student, Purpose::SubjectPresented, None, f.clock.now_ms())
        .unwrap();
    let err = f
        .app
        .tokens
        .check_valid(&signed, Purpose::SubjectPresented)
        .await
        .unwrap_err();
    assert_eq!(reason(err), TokenReason::Signature);

    let err = f
        .app
        .tokens
        .check_valid("garbage", Purpose::SubjectPresented)
        .await
        .unwrap_err();
    assert_eq!(reason(err), TokenReason::Signature);
}

#[tokio::test]
async fn test_code_expires_after_ttl() {
    let f = fixture();
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();

    f.clock.advance(Duration::seconds(TTL_SECONDS as i64 - 1));
    f.app
        .tokens
        .check_valid(&issued.signed_payload, Purpose::SubjectPresented)
        .await
        .unwrap();

    f.clock.advance(Duration::seconds(2));
    let err = f
        .app
        .tokens
        .check_valid(&issued.signed_payload, Purpose::SubjectPresented)
        .await
        .unwrap_err();
    assert_eq!(reason(err), TokenReason::Expired);
}

#[tokio::test]
async fn test_signed_but_unregistered_is_not_found() {
    let f = fixture();
    let codec = TokenCodec::new(SECRET).unwrap();
    let (signed, _) = codec
        .issue(f.student, Purpose::SubjectPresented, None, f.clock.now_ms())
        .unwrap();

    let err = f
        .app
        .tokens
        .check_valid(&signed, Purpose::SubjectPresented)
        .await
        .unwrap_err();
    assert_eq!(reason(err), TokenReason::NotFound);
    assert!(f.app.tokens.details(&signed).await.unwrap().is_none());
}

#[tokio::test]
async fn test_consumed_code_reports_already_used() {
    let f = fixture();
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();
    let tx = Uuid::new_v4();

    f.app
        .tokens
        .consume(&issued.signed_payload, f.vendor_user, tx)
        .await
        .unwrap();

    let err = f
        .app
        .tokens
        .check_valid(&issued.signed_payload, Purpose::SubjectPresented)
        .await
        .unwrap_err();
    assert_eq!(reason(err), TokenReason::AlreadyUsed);

    let record = f
        .app
        .tokens
        .details(&issued.signed_payload)
        .await
        .unwrap()
        .unwrap();
    assert!(record.used);
    assert_eq!(record.used_by, Some(f.vendor_user));
    assert_eq!(record.transaction_id, Some(tx));
    assert_eq!(record.used_at, Some(f.clock.now()));

    let err = f
        .app
        .tokens
        .consume(&issued.signed_payload, f.vendor_user, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(reason(err), TokenReason::AlreadyUsed);
}

#[tokio::test]
async fn test_cache_miss_reads_as_expired() {
    let f = fixture();
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();

    f.app.tokens.evict(&issued.code_hash);

    let err = f
        .app
        .tokens
        .check_valid(&issued.signed_payload, Purpose::SubjectPresented)
        .await
        .unwrap_err();
    assert_eq!(reason(err), TokenReason::Expired);
}

#[tokio::test]
async fn test_validate_folds_rejection_into_answer() {
    let f = fixture();
    let issued = f
        .app
        .tokens
        .issue_counter_code(f.vendor_user, f.mess)
        .await
        .unwrap();

    let answer = f
        .app
        .tokens
        .validate(&issued.signed_payload, Purpose::CounterPresented)
        .await
        .unwrap();
    assert!(answer.valid);
    assert_eq!(answer.payload.unwrap().identity, f.mess);

    let answer = f
        .app
        .tokens
        .validate(&issued.signed_payload, Purpose::SubjectPresented)
        .await
        .unwrap();
    assert!(!answer.valid);
    assert_eq!(answer.reason, Some(TokenReason::Purpose));
    assert!(answer.payload.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consume_has_one_winner() {
    let f = fixture();
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let tokens = Arc::clone(&f.app.tokens);
        let signed = issued.signed_payload.clone();
        let consumer = f.vendor_user;
        handles.push(tokio::spawn(async move {
            tokens.consume(&signed, consumer, Uuid::new_v4()).await
        }));
    }

    let mut winners = 0;
    for h in futures::future::join_all(handles).await {
        match h.unwrap() {
            Ok(()) => winners += 1,
            Err(e) => assert_eq!(reason(e), TokenReason::AlreadyUsed),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(f.store.row_lock_count(), 0);
}

#[tokio::test]
async fn test_subject_code_requires_active_student() {
    let f = fixture();
    for who in [f.inactive_student, f.vendor_user, f.admin, Uuid::new_v4()] {
        let err = f
            .app
            .tokens
            .issue_subject_code(who, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::IneligibleSubject), "{who}");
    }
}

#[tokio::test]
async fn test_subject_code_can_bind_vendor() {
    let f = fixture();
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, Some(f.mess))
        .await
        .unwrap();
    let record = f
        .app
        .tokens
        .details(&issued.signed_payload)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.subject_id, Some(f.student));
    assert_eq!(record.vendor_id, Some(f.mess));
    assert_eq!(
        record.expires_at,
        record.issued_at + Duration::seconds(TTL_SECONDS as i64)
    );
}

#[tokio::test]
async fn test_counter_code_rules() {
    let f = fixture();

    let issued = f
        .app
        .tokens
        .issue_counter_code(f.vendor_user, f.mess)
        .await
        .unwrap();
    assert_eq!(issued.purpose, Purpose::CounterPresented);
    let record = f
        .app
        .tokens
        .details(&issued.signed_payload)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.vendor_id, Some(f.mess));
    assert_eq!(record.subject_id, None);
    assert_eq!(record.metadata["vendor_code"], "NM01");

    // canteen has no operator
    let err = f
        .app
        .tokens
        .issue_counter_code(f.vendor_user, f.canteen)
        .await
        .unwrap_err();
    assert!(matches!(err, TokenError::NotVendorOwner));

    let err = f
        .app
        .tokens
        .issue_counter_code(f.vendor_user, f.closed_vendor)
        .await
        .unwrap_err();
    assert!(matches!(err, TokenError::VendorInactive));

    let err = f
        .app
        .tokens
        .issue_counter_code(f.vendor_user, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, TokenError::VendorNotFound));
}

#[tokio::test]
async fn test_every_issue_is_distinct() {
    let f = fixture();
    let a = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();
    let b = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();
    assert_ne!(a.signed_payload, b.signed_payload);
    assert_ne!(a.code_hash, b.code_hash);
}

#[tokio::test]
async fn test_oversized_ttl_is_clamped_at_issue() {
    let f = fixture();
    let clock: Arc<dyn Clock> = f.clock.clone();
    let app = AppState::new(Arc::new(f.store.clone()), clock, SECRET, u64::MAX, "INR").unwrap();

    let issued = app.tokens.issue_subject_code(f.student, None).await.unwrap();
    assert_eq!(issued.ttl_seconds, MAX_TTL_SECONDS);

    let record = app.tokens.details(&issued.signed_payload).await.unwrap().unwrap();
    assert_eq!(
        record.expires_at,
        record.issued_at + Duration::seconds(MAX_TTL_SECONDS as i64)
    );
}
