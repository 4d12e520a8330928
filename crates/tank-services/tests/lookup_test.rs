//! Reservation lookup tests

mod common;

use common::{Fixture, CALLER_A, CALLER_B};
use tank_core::AppError;

#[tokio::test]
async fn test_most_recent_by_number_tracks_latest() {
    let fx = Fixture::new().await;
    let number = fx.add_number(3125551000).await;

    // Lapsed leases, so each new one is accepted
    for n in 1..=5u64 {
        let latest = fx.reservation(&number, CALLER_A + n, -60).await;

        let found = fx
            .lookup()
            .most_recent_by_number(number.number, false)
            .await
            .unwrap();
        assert_eq!(found.id, latest.id, "after {} reservations", n);
    }
}

#[tokio::test]
async fn test_most_recent_by_number_and_caller_never_crosses_callers() {
    let fx = Fixture::new().await;
    let number = fx.add_number(3125551000).await;

    let for_a = fx.reservation(&number, CALLER_A, -60).await;
    let for_b = fx.reservation(&number, CALLER_B, 3600).await;

    let lookup = fx.lookup();
    let found_a = lookup
        .most_recent_by_number_and_caller(number.number, CALLER_A, false)
        .await
        .unwrap();
    assert_eq!(found_a.id, for_a.id);
    assert_eq!(found_a.ani, CALLER_A);

    let found_b = lookup
        .most_recent_by_number_and_caller(number.number, CALLER_B, false)
        .await
        .unwrap();
    assert_eq!(found_b.id, for_b.id);

    // B is newer overall
    let latest = lookup
        .most_recent_by_number(number.number, false)
        .await
        .unwrap();
    assert_eq!(latest.id, for_b.id);
}

#[tokio::test]
async fn test_returning_caller_gets_same_reservation() {
    let fx = Fixture::new().await;
    let number = fx.add_number(3125551000).await;
    let original = fx.reservation(&number, CALLER_A, 3600).await;

    let lookup = fx.lookup();
    for _ in 0..3 {
        let again = lookup
            .most_recent_by_number_and_caller(number.number, CALLER_A, false)
            .await
            .unwrap();
        assert_eq!(again.id, original.id);
    }
}

#[tokio::test]
async fn test_lookup_not_found() {
    let fx = Fixture::new().await;
    let number = fx.add_number(3125551000).await;
    let lookup = fx.lookup();

    // Number without reservations
    assert!(matches!(
        lookup.most_recent_by_number(number.number, false).await,
        Err(AppError::NotFound(_))
    ));

    // Unknown number
    assert!(matches!(
        lookup.most_recent_by_number(9999999999, false).await,
        Err(AppError::NotFound(_))
    ));

    // Known number, other caller
    fx.reservation(&number, CALLER_A, 3600).await;
    assert!(matches!(
        lookup
            .most_recent_by_number_and_caller(number.number, CALLER_B, false)
            .await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_lookup_with_related_data() {
    let fx = Fixture::new().await;
    let number = fx.add_number(3125551000).await;
    fx.reservation(&number, CALLER_A, 3600).await;

    let bare = fx
        .lookup()
        .most_recent_by_number(number.number, false)
        .await
        .unwrap();
    assert!(bare.tank.is_none());
    assert!(bare.phone_number.is_none());

    let full = fx
        .lookup()
        .most_recent_by_number_and_caller(number.number, CALLER_A, true)
        .await
        .unwrap();
    assert_eq!(full.tank.as_ref().map(|t| t.id), Some(fx.tank.id));
    assert_eq!(full.phone_number.as_ref().map(|p| p.number), Some(number.number));
}

#[tokio::test]
async fn test_retired_number_no_longer_resolves_by_value() {
    let fx = Fixture::new().await;
    let number = fx.add_number(3125551000).await;
    fx.reservation(&number, CALLER_A, 3600).await;

    fx.repo::<tank_core::models::PhoneNumber>()
        .delete(number.id.unwrap())
        .await
        .unwrap();

    assert!(matches!(
        fx.lookup().most_recent_by_number(number.number, false).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_rebought_number_resolves_to_its_own_history() {
    let fx = Fixture::new().await;
    let old = fx.add_number(3125551000).await;
    fx.reservation(&old, CALLER_A, 3600).await;
    fx.repo::<tank_core::models::PhoneNumber>()
        .delete(old.id.unwrap())
        .await
        .unwrap();

    let new = fx.add_number(3125551000).await;
    assert_ne!(new.id, old.id);
    assert!(fx
        .lookup()
        .most_recent_by_number(3125551000, false)
        .await
        .is_err());

    let fresh = fx.reservation(&new, CALLER_B, 3600).await;
    let found = fx
        .lookup()
        .most_recent_by_number(3125551000, false)
        .await
        .unwrap();
    assert_eq!(found.id, fresh.id);
}
