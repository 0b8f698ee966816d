//! Event routing for client-, bus-, and internally-originated envelopes.

pub mod router;

pub use router::{EventRouter, Origin};
