//! Shared fixtures for the service integration tests
//!
//! Everything runs against `MemoryStore`, which enforces the same
//! uniqueness and reference rules as the PostgreSQL schema.

#![allow(dead_code)]

use std::sync::Arc;
use tank_core::config::PoolConfig;
use tank_core::models::{Id, OverflowProvider, PhoneNumber, Provider, Reservation, Subscriber, Tank};
use tank_db::MemoryStore;
use tank_services::{CallRouter, LeaseManager, Record, Repository, ReservationLookup};

pub const CALLER_A: u64 = 3125550101;
pub const CALLER_B: u64 = 3125550202;

/// A provider, a subscriber and one tank owned by that subscriber
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub provider: Provider,
    pub subscriber: Subscriber,
    pub tank: Tank,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_tank(|_| {}).await
    }

    /// Fixture whose tank is adjusted by `configure` before it is saved
    pub async fn with_tank(configure: impl FnOnce(&mut Tank)) -> Self {
        let store = Arc::new(MemoryStore::new());

        let provider = Repository::<_, Provider>::new(Arc::clone(&store))
            .save(Provider::new("carrier-one"))
            .await
            .unwrap();
        let subscriber = Repository::<_, Subscriber>::new(Arc::clone(&store))
            .save(Subscriber::new("Acme Marketing", "ops@acme.test"))
            .await
            .unwrap();

        let mut tank = Tank::new("spring-campaign", subscriber.id.unwrap());
        tank.default_number = 8005550100;
        configure(&mut tank);
        let tank = Repository::<_, Tank>::new(Arc::clone(&store))
            .save(tank).await.unwrap();

        Self {
            store,
            provider,
            subscriber,
            tank,
        }
    }

    pub fn repo<T: Record>(&self) -> Repository<MemoryStore, T> {
        Repository::new(Arc::clone(&self.store))
    }

    pub fn lookup(&self) -> ReservationLookup<MemoryStore> {
        ReservationLookup::new(Arc::clone(&self.store))
    }

    pub fn leases(&self) -> LeaseManager<MemoryStore> {
        LeaseManager::new(Arc::clone(&self.store), PoolConfig::default())
    }

    pub fn router(&self) -> CallRouter<MemoryStore> {
        CallRouter::new(Arc::clone(&self.store))
    }

    pub fn tank_id(&self) -> Id {
        self.tank.id.unwrap()
    }

    /// Add a live number to the fixture tank
    pub async fn add_number(&self, number: u64) -> PhoneNumber {
        self.repo()
            .save(PhoneNumber::new(
                self.provider.id.unwrap(),
                self.tank_id(),
                number,
            ))
            .await
            .unwrap()
    }

    /// Write a reservation through the repository instead of the lease manager
    pub async fn reservation(&self, number: &PhoneNumber, ani: u64, ttl: i64) -> Reservation {
        self.repo()
            .save(Reservation::new(number.id.unwrap(), self.tank_id(), ani, ttl).unwrap())
            .await
            .unwrap()
    }

    /// Give the fixture subscriber an overflow provider
    pub async fn add_overflow(&self, fallback_id: &str) -> OverflowProvider {
        let overflow = self
            .repo()
            .save(OverflowProvider::new(
                self.provider.id.unwrap(),
                "overflow-carrier",
                fallback_id,
            ))
            .await
            .unwrap();

        let mut subscriber = self.subscriber.clone();
        subscriber.overflow_provider_id = overflow.id;
        self.repo::<Subscriber>().save(subscriber).await.unwrap();

        overflow
    }
}
