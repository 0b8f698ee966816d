//! # World Server - Distributed Presence Foundation
//!
//! The backend library of a real-time multiplayer world: many browser
//! clients hold persistent WebSocket connections to one of several
//! stateless, horizontally-scaled instances of this server, and see each
//! other's presence, movement, and chat with low latency and eventual
//! cross-instance consistency.
//!
//! ## Architecture Overview
//!
//! * **Connection Manager** - WebSocket lifecycle, player binding, and
//!   fire-and-forget outbound queueing
//! * **World Model** - session registry, lazily-created world rooms,
//!   distance-based interest management behind one coordinating lock
//! * **Event Router** - one exhaustively-matched dispatch path for client,
//!   bus, and internally-synthesized envelopes, with self-echo suppression
//!   and bus re-publication
//! * **Message Bus Adapter** - pub/sub trait with NATS and in-process
//!   backends, plus the shared snapshot slot for crash recovery
//! * **Presence Reconciler** - liveness sweep, snapshot export, and the
//!   startup bootstrap exchange
//!
//! ## Consistency Model
//!
//! There is no cross-instance lock or consensus. Every instance applies
//! the same event stream; transitions are idempotent (duplicate enter and
//! leave events are no-ops) and order-insensitive where it matters (stale
//! moves are dropped by timestamp), so instances converge on the same
//! presence view. The user-visible failure mode of any partial outage is
//! "other players appear momentarily stale", never a crash.
//!
//! ## Message Flow
//!
//! 1. Client sends a `{type, payload}` frame over its WebSocket
//! 2. The router applies it to local state and mirrors it onto the bus
//! 3. Peer instances apply the same transition for their remote view
//! 4. Room fan-out queues notices to every interested local socket
//!
//! ## Error Handling
//!
//! The server uses structured error types ([`ServerError`]) to categorize
//! failures; protocol and stale-state errors are logged and dropped
//! without closing connections, and bus outages degrade propagation
//! rather than failing requests.

// Re-export core types and functions for easy access
pub use config::{BusConfig, ServerConfig};
pub use error::ServerError;
pub use server::{ServerStats, WorldServer};
pub use utils::{create_server, create_server_with_config};

// Public module declarations
pub mod bus;
pub mod config;
pub mod connection;
pub mod error;
pub mod messaging;
pub mod reconciler;
pub mod server;
pub mod store;
pub mod utils;
pub mod world;

// Cross-component scenario tests
mod tests;
