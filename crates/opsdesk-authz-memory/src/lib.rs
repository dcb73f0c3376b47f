//! In-memory backend for `opsdesk-authz`.
//!
//! This crate provides reference implementations of the engine's external
//! contracts, for tests, local development and the `opsdesk` CLI:
//!
//! - [`InMemoryRoleStore`]: roles, assignments, rate windows and
//!   access-denied rows
//! - [`InMemoryAuditSink`]: recorded audit events
//! - [`Fixture`]: TOML seeding
//!
//! # Example
//!
//! ```ignore
//! use opsdesk_authz::{Authorizer, StaticSession, SystemClock};
//! use opsdesk_authz_memory::InMemoryRoleStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryRoleStore::with_default_roles(Arc::new(SystemClock)));
//! let authorizer = Authorizer::builder(store, Arc::new(StaticSession::anonymous())).build()?;
//! ```

pub mod audit;
pub mod fixture;
pub mod rate_window;
pub mod store;

pub use audit::InMemoryAuditSink;
pub use fixture::{AssignmentSpec, Fixture, RoleSpec};
pub use rate_window::{RateKey, RateTier, SlidingWindowLimiter};
pub use store::InMemoryRoleStore;
