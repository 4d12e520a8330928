//! PostgreSQL store tests
//!
//! These run against a live database named by `DATABASE_URL`:
//!
//! ```sh
//! DATABASE_URL=postgresql://localhost/phone_tank_test cargo test -p tank-db -- --ignored
//! ```

use tank_core::models::{PhoneNumber, Provider, Reservation, Subscriber, Tank};
use tank_core::query::Query;
use tank_core::traits::{Store, StoreTx};
use tank_core::{AppError, Id, Visibility};
use tank_db::{create_pool, run_migrations, PgStore};

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/phone_tank_test".to_string());
    let pool = create_pool(&url, Some(5)).await.unwrap();
    run_migrations(&pool).await.unwrap();
    PgStore::new(pool)
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Id::new())
}

/// Random number in a range unlikely to collide across runs
fn unique_number() -> u64 {
    let id = Id::new().as_uuid().as_u128();
    5_000_000_000 + (id % 1_000_000_000) as u64
}

#[tokio::test]
#[ignore] // Requires database
async fn test_round_trip_with_meta() {
    let store = store().await;
    let mut tx = store.begin().await.unwrap();

    let provider = tx.insert(&Provider::new(unique("carrier"))).await.unwrap();
    let subscriber = tx
        .insert(&Subscriber::new("acme", format!("{}@acme.test", Id::new())))
        .await
        .unwrap();
    let tank = tx
        .insert(&Tank::new(unique("tank"), subscriber.id.unwrap()))
        .await
        .unwrap();
    let number = tx
        .insert(&PhoneNumber::new(
            provider.id.unwrap(),
            tank.id.unwrap(),
            unique_number(),
        ))
        .await
        .unwrap();

    let reservation = tx
        .insert(
            &Reservation::new(number.id.unwrap(), tank.id.unwrap(), 5551234567, 600)
                .unwrap()
                .with_meta("campaign", "radio"),
        )
        .await
        .unwrap();

    let found: Option<Reservation> = tx
        .find(reservation.id.unwrap(), Visibility::Live)
        .await
        .unwrap();
    let found = found.unwrap();
    assert_eq!(found.meta.get("campaign").map(String::as_str), Some("radio"));
    assert_eq!(found.ani, 5551234567);

    tx.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires database
async fn test_live_uniqueness_and_soft_delete() {
    let store = store().await;
    let mut tx = store.begin().await.unwrap();

    let provider = tx.insert(&Provider::new(unique("carrier"))).await.unwrap();
    let subscriber = tx
        .insert(&Subscriber::new("acme", format!("{}@acme.test", Id::new())))
        .await
        .unwrap();
    let tank = tx
        .insert(&Tank::new(unique("tank"), subscriber.id.unwrap()))
        .await
        .unwrap();

    let value = unique_number();
    let pn = PhoneNumber::new(provider.id.unwrap(), tank.id.unwrap(), value);
    let first = tx.insert(&pn).await.unwrap();
    assert!(tx.soft_delete::<PhoneNumber>(first.id.unwrap()).await.unwrap());

    // The value is free again once the first row is retired
    let second = tx.insert(&pn).await.unwrap();
    assert_ne!(first.id, second.id);

    let all: Vec<PhoneNumber> = tx
        .select(&Query::new().filter_eq("phone_number", value).include_deleted())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    tx.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires database
async fn test_foreign_key_violation_is_validation() {
    let store = store().await;
    let mut tx = store.begin().await.unwrap();

    let result = tx.insert(&Tank::new(unique("tank"), Id::new())).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    tx.rollback().await.unwrap();
}
