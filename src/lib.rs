//! Authoritative real-time messaging core: WebSocket ingress, session registry, message lifecycle, room
//! fan-out, and replay. See `SPEC_FULL.md` for the full design; this crate implements it end to end, from the
//! axum upgrade route down to the sqlite-backed durability layer.

//module tree
pub mod auth;
pub mod config;
pub mod connection;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod model;
pub mod observability;
pub mod protocol;
pub mod pubsub;
pub mod router;
pub mod safety;
pub mod services;
pub mod state;
pub mod stores;
pub mod transport;

//API exports
pub use config::AppConfig;
pub use error::{ErrorCode, ServiceError, ServiceResult};
pub use state::AppState;
