//! End-to-end meal redemption: identity paths, atomicity and replay.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{Fault, dec, faulty_fixture, fixture};
use mealpay::clock::Clock;
use mealpay::meal::{RedeemError, RedeemRequest};
use mealpay::store::{Page, StoreError};
use mealpay::token::{Purpose, TokenError, TokenReason};
use mealpay::wallet::{Direction, LedgerError, RefKind};
use uuid::Uuid;

#[tokio::test]
async fn test_subject_code_redemption_commits_everything() {
    let f = fixture();
    f.fund(f.student, "1000.00").await;
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();

    let meal = f
        .app
        .meals
        .redeem(
            RedeemRequest::by_subject_token(&issued.signed_payload, f.mess, f.thali, None),
            f.vendor_user,
        )
        .await
        .unwrap();

    assert_eq!(meal.student_id, f.student);
    assert_eq!(meal.vendor_id, f.mess);
    assert_eq!(meal.amount, dec("120.00"));
    assert_eq!(meal.item_name, "Veg Thali");
    assert_eq!(meal.token_hash.as_deref(), Some(issued.code_hash.as_str()));
    assert_eq!(f.balance(f.student).await, dec("880.00"));
    assert_eq!(f.store.meal_count(), 1);

    let entries = f.entries(f.student).await;
    let debit = entries.last().unwrap();
    assert_eq!(debit.direction, Direction::Debit);
    assert_eq!(debit.ref_kind, RefKind::MealPurchase);
    assert_eq!(debit.ref_id, Some(meal.id));
    assert_eq!(debit.id, meal.ledger_entry_id);
    assert_eq!(debit.description, "Meal purchase: Veg Thali at North Mess");
    assert_eq!(debit.balance_before, dec("1000.00"));
    assert_eq!(debit.balance_after, dec("880.00"));

    let record = f
        .app
        .tokens
        .details(&issued.signed_payload)
        .await
        .unwrap()
        .unwrap();
    assert!(record.used);
    assert_eq!(record.used_by, Some(f.vendor_user));
    assert_eq!(record.transaction_id, Some(meal.id));
}

#[tokio::test]
async fn test_replayed_code_is_rejected_without_side_effects() {
    let f = fixture();
    f.fund(f.student, "1000.00").await;
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();
    let request = RedeemRequest::by_subject_token(&issued.signed_payload, f.mess, f.thali, None);

    f.app
        .meals
        .redeem(request.clone(), f.vendor_user)
        .await
        .unwrap();

    let err = f
        .app
        .meals
        .redeem(request, f.vendor_user)
        .await
        .unwrap_err();
    assert!(err.is_already_used());
    assert_eq!(err.code(), "ALREADY_USED");
    assert_eq!(err.http_status(), 409);

    assert_eq!(f.balance(f.student).await, dec("880.00"));
    assert_eq!(f.store.meal_count(), 1);
    assert_eq!(f.entries(f.student).await.len(), 2);
}

#[tokio::test]
async fn test_counter_code_redemption() {
    let f = fixture();
    f.fund(f.student, "200.00").await;
    let issued = f
        .app
        .tokens
        .issue_counter_code(f.vendor_user, f.mess)
        .await
        .unwrap();

    let meal = f
        .app
        .meals
        .redeem(
            RedeemRequest::by_counter_token(
                &issued.signed_payload,
                f.student,
                f.mess,
                f.thali,
                None,
            ),
            f.student,
        )
        .await
        .unwrap();

    assert_eq!(meal.student_id, f.student);
    assert_eq!(meal.metadata["purpose"], "counter-presented");
    assert_eq!(f.balance(f.student).await, dec("80.00"));

    let record = f
        .app
        .tokens
        .details(&issued.signed_payload)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.used_by, Some(f.student));
}

#[tokio::test]
async fn test_vendor_binding_enforced_on_both_paths() {
    let f = fixture();
    f.fund(f.student, "500.00").await;

    // subject code bound to the canteen, presented at the mess
    let bound = f
        .app
        .tokens
        .issue_subject_code(f.student, Some(f.canteen))
        .await
        .unwrap();
    let err = f
        .app
        .meals
        .redeem(
            RedeemRequest::by_subject_token(&bound.signed_payload, f.mess, f.thali, None),
            f.vendor_user,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RedeemError::VendorMismatch));
    assert!(!f.token_used(&bound.signed_payload).await);

    // mess counter code used to pay at the canteen
    let counter = f
        .app
        .tokens
        .issue_counter_code(f.vendor_user, f.mess)
        .await
        .unwrap();
    let err = f
        .app
        .meals
        .redeem(
            RedeemRequest::by_counter_token(
                &counter.signed_payload,
                f.student,
                f.canteen,
                f.samosa,
                None,
            ),
            f.student,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RedeemError::VendorMismatch));
    assert!(!f.token_used(&counter.signed_payload).await);

    assert_eq!(f.balance(f.student).await, dec("500.00"));
    assert_eq!(f.store.meal_count(), 0);
}

#[tokio::test]
async fn test_wrong_purpose_on_redeem_path() {
    let f = fixture();
    f.fund(f.student, "500.00").await;
    let counter = f
        .app
        .tokens
        .issue_counter_code(f.vendor_user, f.mess)
        .await
        .unwrap();

    let err = f
        .app
        .meals
        .redeem(
            RedeemRequest::by_subject_token(&counter.signed_payload, f.mess, f.thali, None),
            f.vendor_user,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RedeemError::Token(TokenError::Rejected(TokenReason::Purpose))
    ));
}

#[tokio::test]
async fn test_insufficient_funds_leaves_code_reusable() {
    let f = fixture();
    f.fund(f.student, "100.00").await;
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();
    let request = RedeemRequest::by_subject_token(&issued.signed_payload, f.mess, f.thali, None);

    let err = f
        .app
        .meals
        .redeem(request.clone(), f.vendor_user)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RedeemError::Ledger(LedgerError::InsufficientFunds { .. })
    ));
    assert_eq!(err.http_status(), 422);
    assert!(!f.token_used(&issued.signed_payload).await);
    assert_eq!(f.store.meal_count(), 0);
    assert_eq!(f.entries(f.student).await.len(), 1);

    f.fund(f.student, "50.00").await;
    let meal = f
        .app
        .meals
        .redeem(request, f.vendor_user)
        .await
        .unwrap();
    assert_eq!(meal.amount, dec("120.00"));
    assert_eq!(f.balance(f.student).await, dec("30.00"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redemptions_of_one_code() {
    let f = fixture();
    f.fund(f.student, "1000.00").await;
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..12 {
        let meals = Arc::clone(&f.app.meals);
        let request =
            RedeemRequest::by_subject_token(&issued.signed_payload, f.mess, f.thali, None);
        let vendor_user = f.vendor_user;
        handles.push(tokio::spawn(
            async move { meals.redeem(request, vendor_user).await },
        ));
    }

    let mut completed = 0;
    for h in futures::future::join_all(handles).await {
        match h.unwrap() {
            Ok(_) => completed += 1,
            Err(e) => assert!(e.is_already_used(), "unexpected: {e}"),
        }
    }

    assert_eq!(completed, 1);
    assert_eq!(f.store.meal_count(), 1);
    assert_eq!(f.balance(f.student).await, dec("880.00"));
    assert_eq!(f.entries(f.student).await.len(), 2);
}

#[tokio::test]
async fn test_lost_consume_race_rolls_back_debit() {
    let f = faulty_fixture(Fault::RivalConsumesToken);
    f.fund(f.student, "500.00").await;
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();

    let err = f
        .app
        .meals
        .redeem(
            RedeemRequest::by_subject_token(&issued.signed_payload, f.mess, f.thali, None),
            f.vendor_user,
        )
        .await
        .unwrap_err();

    assert!(err.is_already_used());
    assert_eq!(f.balance(f.student).await, dec("500.00"));
    assert_eq!(f.entries(f.student).await.len(), 1);
    assert_eq!(f.store.meal_count(), 0);
}

#[tokio::test]
async fn test_failed_meal_insert_rolls_back_debit_and_token() {
    let f = faulty_fixture(Fault::MealInsertFails);
    f.fund(f.student, "500.00").await;
    let issued = f
        .app
        .tokens
        .issue_subject_code(f.student, None)
        .await
        .unwrap();

    let err = f
        .app
        .meals
        .redeem(
            RedeemRequest::by_subject_token(&issued.signed_payload, f.mess, f.thali, None),
            f.vendor_user,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RedeemError::Store(StoreError::Unavailable(_))));
    assert_eq!(err.http_status(), 503);
    assert_eq!(f.balance(f.student).await, dec("500.00"));
    assert_eq!(f.entries(f.student).await.len(), 1);
    assert_eq!(f.store.meal_count(), 0);
    assert!(!f.token_used(&issued.signed_payload).await);
    f.app
        .tokens
        .check_valid(&issued.signed_payload, Purpose::SubjectPresented)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_direct_charge_and_amount_override() {
    let f = fixture();
    f.fund(f.student, "300.00").await;

    let meal = f
        .app
        .meals
        .redeem(
            RedeemRequest::direct(f.student, f.mess, f.thali, Some(dec("99.50"))),
            f.admin,
        )
        .await
        .unwrap();
    assert_eq!(meal.amount, dec("99.50"));
    assert!(meal.token_hash.is_none());
    assert_eq!(f.balance(f.student).await, dec("200.50"));

    let err = f
        .app
        .meals
        .redeem(
            RedeemRequest::direct(f.student, f.mess, f.thali, Some(dec("0"))),
            f.admin,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RedeemError::InvalidAmount(_)));
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn test_vendor_and_item_resolution_errors() {
    let f = fixture();
    f.fund(f.student, "300.00").await;
    let redeem = |vendor, item| {
        let meals = Arc::clone(&f.app.meals);
        let request = RedeemRequest::direct(f.student, vendor, item, None);
        let admin = f.admin;
        async move { meals.redeem(request, admin).await.unwrap_err() }
    };

    assert!(matches!(
        redeem(Uuid::new_v4(), f.thali).await,
        RedeemError::VendorNotFound
    ));
    assert!(matches!(
        redeem(f.closed_vendor, f.thali).await,
        RedeemError::VendorInactive
    ));
    // another vendor's item
    assert!(matches!(
        redeem(f.mess, f.samosa).await,
        RedeemError::MenuItemNotFound
    ));
    assert!(matches!(
        redeem(f.mess, f.sold_out).await,
        RedeemError::ItemUnavailable
    ));
    assert_eq!(f.balance(f.student).await, dec("300.00"));
}

#[tokio::test]
async fn test_student_resolution_errors() {
    let f = fixture();
    let cases = [
        (Uuid::new_v4(), "STUDENT_NOT_FOUND"),
        (f.vendor_user, "NOT_A_STUDENT"),
        (f.inactive_student, "STUDENT_INACTIVE"),
    ];
    for (who, code) in cases {
        let err = f
            .app
            .meals
            .redeem(RedeemRequest::direct(who, f.mess, f.thali, None), f.admin)
            .await
            .unwrap_err();
        assert_eq!(err.code(), code);
    }
    assert_eq!(f.store.meal_count(), 0);
}

#[tokio::test]
async fn test_histories_newest_first_and_windowed() {
    let f = fixture();
    f.fund(f.student, "1000.00").await;
    let start = f.app.clock.now();

    let first = f
        .app
        .meals
        .redeem(
            RedeemRequest::direct(f.student, f.mess, f.thali, None),
            f.admin,
        )
        .await
        .unwrap();
    f.clock.advance(Duration::hours(2));
    let second = f
        .app
        .meals
        .redeem(
            RedeemRequest::direct(f.student, f.mess, f.thali, Some(dec("60.00"))),
            f.admin,
        )
        .await
        .unwrap();

    let history = f
        .app
        .meals
        .student_history(f.student, Page::default())
        .await
        .unwrap();
    assert_eq!(
        history.iter().map(|m| m.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );

    let late = f
        .app
        .meals
        .vendor_transactions(
            f.mess,
            Some(start + Duration::hours(1)),
            None,
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].id, second.id);

    let all = f
        .app
        .meals
        .vendor_transactions(f.mess, None, None, Page::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let elsewhere = f
        .app
        .meals
        .vendor_transactions(f.canteen, None, None, Page::default())
        .await
        .unwrap();
    assert!(elsewhere.is_empty());
}
