//! Core types and workflows for the plancare subscription brokerage.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! document store and the identity provider are reached only through the
//! [`store::BrokerageStore`] and [`identity::IdentityProvider`] traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod activity;
pub mod billing;
pub mod dashboard;
pub mod error;
pub mod guard;
pub mod identity;
pub mod plan;
pub mod profile;
pub mod resolver;
pub mod role;
pub mod session;
pub mod signup;
pub mod step;
pub mod store;
pub mod subscription;
pub mod workflow;

pub use error::{Error, Result};
pub use workflow::{Brokerage, CommissionAccrual, WorkflowSettings};

#[cfg(test)]
mod testing;
