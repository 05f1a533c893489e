//! SQLite backend for the plancare brokerage.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. One [`SqliteStore`] serves as both the
//! [`BrokerageStore`](plancare_core::store::BrokerageStore) and the
//! email/password [`IdentityProvider`](plancare_core::identity::IdentityProvider).

mod accounts;
mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
