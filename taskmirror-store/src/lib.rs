//! `TaskMirror` store server library.
//!
//! Exposes the ordered document store for use in tests and embedding. The
//! server accepts WebSocket connections, applies add/delete requests to the
//! authoritative collection, and pushes a full ordered snapshot to every
//! subscriber after each change.

pub mod collection;
pub mod config;
pub mod server;
