/// Pairing Session Core Library
/// Session creation, membership, readiness and identity keys for device pairing

pub mod config;
pub mod db;
pub mod error;
pub mod ffi;
pub mod identity;
pub mod membership;
pub mod models;
pub mod registry;
pub mod service;
pub mod sink;

pub use error::{Result, ServiceError, StatusCode};
pub use identity::IdentityManager;
pub use membership::MembershipCoordinator;
pub use registry::SessionRegistry;
pub use service::{ServiceResponse, SessionService};
pub use sink::LogSink;
