//! Core types, the identity resolver and trait definitions for Tally.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::ContactStore`]; the
//! [`resolver::IdentityResolver`] runs the reconciliation algorithm over any
//! of them.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod contact;
pub mod error;
pub mod forest;
pub mod fuzzy;
pub mod lock;
pub mod memory;
pub mod resolver;
pub mod store;

pub use error::{Error, Result};
pub use resolver::{IdentifyRequest, Identification, IdentityResolver, RepairReport};
