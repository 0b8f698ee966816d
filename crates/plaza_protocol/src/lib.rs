//! # Plaza Protocol
//!
//! Wire types shared by the world server, its peers, and game clients.
//!
//! Every frame on a client socket and every message on the inter-instance
//! bus is a JSON object of the shape `{type, payload}`, optionally carrying
//! an `origin_instance_id` on bus messages. Inbound traffic deserializes
//! into the [`Event`] tagged union; server→client traffic serializes from
//! the [`Notice`] tagged union. Adding an event type extends the enum, and
//! the compiler walks every dispatch site.
//!
//! The crate is deliberately free of async and I/O so that clients, tools,
//! and the server all depend on the same small surface.

pub mod envelope;
pub mod types;

pub use envelope::{Envelope, Event, Notice};
pub use types::{
    Checkpoint, InstanceId, MoveData, PlayerProfile, PresenceSnapshot, SessionRecord,
    WorldPresence,
};
