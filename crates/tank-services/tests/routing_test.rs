//! Call routing and end-to-end tests

mod common;

use common::{Fixture, CALLER_A, CALLER_B};
use tank_core::models::{Call, PhoneNumber, Reservation};
use tank_core::{AppError, Query};
use tank_services::{LeaseRequest, Route};

#[tokio::test]
async fn test_end_to_end_lease_call_retire() {
    let fx = Fixture::with_tank(|t| t.max_tank_size = 2).await;
    let p1 = fx.add_number(3125551000).await;

    let r1 = fx
        .leases()
        .reserve(p1.id.unwrap(), LeaseRequest::new(CALLER_A).ttl(3600))
        .await
        .unwrap();
    assert!(!r1.is_expired());

    let call = fx
        .repo::<Call>()
        .save(Call::new(
            r1.phone_number_id,
            r1.id.unwrap(),
            CALLER_A,
            8005550100,
        ))
        .await
        .unwrap();
    assert!(call.id.is_some());

    let found = fx
        .lookup()
        .most_recent_by_number_and_caller(p1.number, CALLER_A, false)
        .await
        .unwrap();
    assert_eq!(found.id, r1.id);

    fx.repo::<PhoneNumber>()
        .delete(p1.id.unwrap())
        .await
        .unwrap();

    let r1 = fx
        .repo::<Reservation>()
        .get(r1.id.unwrap(), true)
        .await
        .unwrap();
    assert!(r1.phone_number.is_some());
    assert!(r1.tank.is_some());
}

#[tokio::test]
async fn test_route_to_callers_lease() {
    let fx = Fixture::new().await;
    let number = fx.add_number(3125551000).await;
    let lease = fx
        .leases()
        .reserve(number.id.unwrap(), LeaseRequest::new(CALLER_A))
        .await
        .unwrap();

    match fx.router().route(number.number, CALLER_A).await.unwrap() {
        Route::Lease { reservation, tank } => {
            assert_eq!(reservation.id, lease.id);
            assert_eq!(tank.id, fx.tank.id);
        }
        other => panic!("expected lease route, got {:?}", other),
    }
}

#[tokio::test]
async fn test_other_caller_gets_tank_fallback() {
    let fx = Fixture::with_tank(|t| t.fallback_url = "https://ivr.acme.test/spring".into()).await;
    let number = fx.add_number(3125551000).await;
    let lease = fx
        .leases()
        .reserve(number.id.unwrap(), LeaseRequest::new(CALLER_A))
        .await
        .unwrap();

    match fx.router().route(number.number, CALLER_B).await.unwrap() {
        Route::Fallback {
            tank,
            last_reservation,
            number,
            url,
        } => {
            assert_eq!(tank.id, fx.tank.id);
            assert_eq!(last_reservation.map(|r| r.id), Some(lease.id));
            assert_eq!(number, Some(8005550100));
            assert_eq!(url.as_deref(), Some("https://ivr.acme.test/spring"));
        }
        other => panic!("expected fallback route, got {:?}", other),
    }
}

#[tokio::test]
async fn test_expired_lease_falls_back() {
    let fx = Fixture::new().await;
    let number = fx.add_number(3125551000).await;
    fx.reservation(&number, CALLER_A, -1).await;

    let route = fx.router().route(number.number, CALLER_A).await.unwrap();
    assert!(!route.is_lease());
    assert_eq!(route.tank().id, fx.tank.id);
}

#[tokio::test]
async fn test_route_unknown_number() {
    let fx = Fixture::new().await;
    assert!(matches!(
        fx.router().route(9999999999, CALLER_A).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_record_call_stamps_number() {
    let fx = Fixture::new().await;
    let number = fx.add_number(3125551000).await;
    let lease = fx
        .leases()
        .reserve(number.id.unwrap(), LeaseRequest::new(CALLER_A))
        .await
        .unwrap();

    let call = fx
        .router()
        .record_call(lease.id.unwrap(), CALLER_A, 8005550100)
        .await
        .unwrap();
    assert_eq!(call.phone_number_id, number.id.unwrap());
    assert_eq!(call.destination, 8005550100);

    let stamped = fx
        .repo::<PhoneNumber>()
        .get(number.id.unwrap(), false)
        .await
        .unwrap();
    assert_eq!(stamped.last_call, call.created_at);

    let calls = fx
        .repo::<Call>()
        .list(Query::new().filter_eq("reservation_id", lease.id), true)
        .await
        .unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].reservation.is_some());
}

#[tokio::test]
async fn test_record_call_after_number_retired() {
    let fx = Fixture::new().await;
    let number = fx.add_number(3125551000).await;
    let lease = fx.reservation(&number, CALLER_A, 3600).await;
    fx.repo::<PhoneNumber>()
        .delete(number.id.unwrap())
        .await
        .unwrap();

    let call = fx
        .router()
        .record_call(lease.id.unwrap(), CALLER_A, 8005550100)
        .await
        .unwrap();
    assert_eq!(call.phone_number_id, number.id.unwrap());

    assert!(matches!(
        fx.router()
            .record_call(tank_core::Id::new(), CALLER_A, 8005550100)
            .await,
        Err(AppError::NotFound(_))
    ));
}
