//! # mongo-protocol
//!
//! Shared connection-level types for the MongoDB pool and authenticators.
//!
//! This crate deliberately stops short of the wire format. It names the
//! pieces the pool and the authenticators agree on: identifiers, the
//! [`Connection`] and [`ConnectionFactory`] seams, the parsed `hello`
//! handshake reply, and the error type connections report.
//!
//! ## Features
//!
//! - Endpoint, server, connection and load-balancer service identifiers
//! - `hello` reply parsing, including speculative authentication results
//! - Lenient command reply helpers (`ok`, numeric fields, binary payloads)
//! - Async connection trait with cooperative cancellation
//!
//! ## Example
//!
//! ```rust,ignore
//! use mongo_protocol::{HelloResult, reply};
//! use bson::doc;
//!
//! let hello = HelloResult::parse(doc! { "ok": 1, "maxWireVersion": 21 })?;
//! assert_eq!(hello.max_wire_version(), 21);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod description;
pub mod error;
pub mod ids;
pub mod reply;

pub use connection::{Connection, ConnectionFactory};
pub use description::{ConnectionDescription, HelloResult};
pub use error::ConnectionError;
pub use ids::{ConnectionId, Endpoint, ServerId, ServiceId};

// Re-exported so dependents agree on one bson version.
pub use bson;
pub use tokio_util::sync::CancellationToken;
