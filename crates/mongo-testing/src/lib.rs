//! # mongo-testing
//!
//! Test doubles for the MongoDB pool and authenticators.
//!
//! - [`MockConnection`]: a [`Connection`](mongo_protocol::Connection) that
//!   answers from a reply script and records what it was sent
//! - [`MockConnectionFactory`]: hands out mock connections and keeps a
//!   [`ConnectionProbe`] for each, with gated or failing opens
//! - [`reply`]: builders for `hello`, SASL and error replies
//! - [`RecordingSubscriber`]: collects events for later assertions
//!
//! ## Example
//!
//! ```rust,ignore
//! use mongo_testing::{MockConnection, reply};
//!
//! let mut connection = MockConnection::new(1)
//!     .with_reply(reply::sasl(1, b"r=...", false))
//!     .with_reply(reply::sasl(1, b"v=...", true));
//! let probe = connection.probe();
//! // ... authenticate ...
//! assert_eq!(probe.command_names(), ["saslStart", "saslContinue"]);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod factory;
pub mod reply;
pub mod subscriber;

pub use connection::{ConnectionProbe, MockConnection, SentCommand};
pub use factory::MockConnectionFactory;
pub use subscriber::RecordingSubscriber;
