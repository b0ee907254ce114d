//! # storage-adapters
//!
//! Implementations of the `domains` storage and delivery ports.
//!
//! The in-memory store is always available and backs the test suites.
//! PostgreSQL sits behind `db-postgres`; the HTTP geo-ip locator behind `geo-http`.

pub mod events;
pub mod geo;
pub mod memory;

#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use events::{BroadcastEventEmitter, LoggingEventEmitter};
pub use geo::{LocationCache, NoopGeoLocator};
#[cfg(feature = "geo-http")]
pub use geo::HttpGeoLocator;
pub use memory::MemoryStore;
#[cfg(feature = "db-postgres")]
pub use postgres::PgStore;
