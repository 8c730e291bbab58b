//! # mongo-driver-pool
//!
//! Exclusive connection pool for a single MongoDB server.
//!
//! Connections are created by a [`mongo_protocol::ConnectionFactory`],
//! opened, and run through the `hello` handshake and authentication of a
//! [`mongo_auth::ConnectionInitializer`] before they are handed out.
//!
//! ## Features
//!
//! - Capacity, establishment concurrency and wait queue limits
//! - Pause on clear; stale connections are closed lazily by generation
//! - Per-service generations for load-balanced deployments
//! - Background maintenance: pruning and top-up to the minimum size
//! - Interruption of checked-out connections on clear
//! - Lifecycle events, metrics and `tracing` logs
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mongo_driver_pool::{CheckOutReason, ConnectionPool};
//!
//! let pool = ConnectionPool::builder()
//!     .server_id(server_id)
//!     .factory(Arc::new(factory))
//!     .min_connections(2)
//!     .max_connections(20)
//!     .event_subscriber(|event: &PoolEvent| println!("{event:?}"))
//!     .build()?;
//!
//! pool.initialize()?;
//! pool.set_ready()?;
//!
//! // Connection automatically returned to pool on drop
//! let conn = pool.acquire_connection(&cancel).await?;
//! let reply = conn.run_command("admin", doc! { "ping": 1 }, &cancel).await?;
//!
//! // Pin a connection to a cursor
//! let pinned = pool.acquire_connection_for(CheckOutReason::Cursor, &cancel).await?;
//!
//! // After a network error on this server
//! pool.clear(None, false)?;
//!
//! let status = pool.status();
//! println!("Pool utilization: {:.1}%", status.utilization());
//!
//! pool.dispose().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod checkout_reason;
pub mod config;
pub mod error;
pub mod events;
pub mod handle;
mod holder;
pub mod lifecycle;
pub mod maintenance;
pub mod pool;
pub mod semaphore;
pub mod service_states;
pub mod state;

// Configuration
pub use config::PoolConfig;

// Error types
pub use error::{CheckOutFailedReason, PoolError};

// Pool types
pub use checkout_reason::{CheckOutReason, CheckOutReasonCounter};
pub use handle::ConnectionHandle;
pub use pool::{ConnectionPool, PoolBuilder, PoolMetrics, PoolStatus};
pub use state::{PoolState, State};

// Events and hooks
pub use events::{EventSubscriber, PoolEvent, RemovalReason};
pub use lifecycle::ConnectionExceptionHandler;

// Building blocks
pub use maintenance::{MaintenanceHelper, MaintenanceTarget};
pub use semaphore::{SemaphoreWait, SignalableSemaphore, WaitQueue, WaitQueueSlot};
pub use service_states::ServiceStates;
