//! The typed message envelope exchanged over sockets and the bus.
//!
//! Both directions share the outer `{type, payload}` shape, but the
//! payloads differ: clients and peers send identifiers ([`Event`]), the
//! server answers with enriched frames ([`Notice`]). Keeping them as two
//! tagged unions means a new event type cannot be half-wired: every
//! `match` over [`Event`] stops compiling until the new arm exists.

use crate::types::{InstanceId, MoveData, PlayerProfile};
use serde::{Deserialize, Serialize};

/// A world event originated by a client or a peer instance.
///
/// # Wire format
///
/// ```json
/// { "type": "move",
///   "payload": { "player_id": "player_0",
///                "data": { "x": 10.0, "y": 4.0, "animation": "walk_down",
///                          "timestamp": 1700000000000 } } }
/// ```
///
/// Unknown `type` values fail deserialization; the router logs and drops
/// the frame without closing the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    /// A player comes online in their world.
    EnterWorld { player_id: String },
    /// A player leaves, or their socket was found dead.
    LeaveWorld { player_id: String },
    /// A position/animation update, guarded by a monotonic timestamp.
    Move { player_id: String, data: MoveData },
    /// Chat addressed to an explicit recipient list.
    Talk {
        from: String,
        players: Vec<String>,
        message: String,
    },
    /// A newly-started instance asking peers for their local presence.
    BootstrapRequest { instance_id: InstanceId },
    /// Direct reply to a [`Event::BootstrapRequest`]: the player ids the
    /// responding instance holds live sockets for.
    BootstrapResponse {
        instance_id: InstanceId,
        players: Vec<String>,
    },
}

impl Event {
    /// The `type` tag this event serializes under. Used for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::EnterWorld { .. } => "enter_world",
            Event::LeaveWorld { .. } => "leave_world",
            Event::Move { .. } => "move",
            Event::Talk { .. } => "talk",
            Event::BootstrapRequest { .. } => "bootstrap_request",
            Event::BootstrapResponse { .. } => "bootstrap_response",
        }
    }
}

/// The wire wrapper shared by client sockets and the inter-instance bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub event: Event,

    /// Identifier of the publishing instance. Present on bus messages
    /// only; an instance discards any envelope carrying its own id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_instance_id: Option<InstanceId>,
}

impl Envelope {
    /// Wraps an event as it arrives from a client socket (no origin tag).
    pub fn from_client(event: Event) -> Self {
        Self {
            event,
            origin_instance_id: None,
        }
    }

    /// Wraps an event for publication on the bus, tagged with the
    /// publishing instance so receivers can suppress self-echo.
    pub fn from_instance(event: Event, instance_id: InstanceId) -> Self {
        Self {
            event,
            origin_instance_id: Some(instance_id),
        }
    }
}

/// A server→client frame.
///
/// Notices reuse the event `type` tags so clients dispatch on one string,
/// but their payloads carry what the client actually needs: the full
/// public profile on enter, the resolved sender on talk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Notice {
    EnterWorld { player: PlayerProfile },
    LeaveWorld { player_id: String },
    Move { player_id: String, data: MoveData },
    Talk { from: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Checkpoint;

    #[test]
    fn parses_client_enter_world() {
        let raw = r#"{"type":"enter_world","payload":{"player_id":"p1"}}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(
            envelope.event,
            Event::EnterWorld {
                player_id: "p1".to_string()
            }
        );
        assert!(envelope.origin_instance_id.is_none());
    }

    #[test]
    fn parses_move_with_null_animation() {
        let raw = r#"{"type":"move","payload":{"player_id":"p1",
            "data":{"x":5.0,"y":-3.5,"animation":null,"timestamp":42}}}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        match envelope.event {
            Event::Move { player_id, data } => {
                assert_eq!(player_id, "p1");
                assert_eq!(data.x, 5.0);
                assert_eq!(data.y, -3.5);
                assert_eq!(data.animation, None);
                assert_eq!(data.timestamp, 42);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_a_parse_error() {
        let raw = r#"{"type":"teleport","payload":{"player_id":"p1"}}"#;
        assert!(serde_json::from_str::<Envelope>(raw).is_err());
    }

    #[test]
    fn bus_envelope_roundtrips_origin() {
        let origin = InstanceId::new();
        let envelope = Envelope::from_instance(
            Event::Talk {
                from: "p1".to_string(),
                players: vec!["p2".to_string(), "p3".to_string()],
                message: "hello".to_string(),
            },
            origin,
        );

        let bytes = serde_json::to_vec(&envelope).unwrap();
        let back: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, envelope);
        assert_eq!(back.origin_instance_id, Some(origin));
    }

    #[test]
    fn client_envelope_omits_origin_field() {
        let envelope = Envelope::from_client(Event::LeaveWorld {
            player_id: "p1".to_string(),
        });
        let value = serde_json::to_value(&envelope).unwrap();
        assert!(value.get("origin_instance_id").is_none());
        assert_eq!(value["type"], "leave_world");
        assert_eq!(value["payload"]["player_id"], "p1");
    }

    #[test]
    fn enter_notice_carries_full_profile() {
        let notice = Notice::EnterWorld {
            player: PlayerProfile {
                id: "player_1".to_string(),
                name: "Raj".to_string(),
                wealth: 100,
                spritesheet: "BARD".to_string(),
                checkpoint: Checkpoint { x: 100.0, y: 100.0 },
            },
        };

        let value = serde_json::to_value(&notice).unwrap();
        assert_eq!(value["type"], "enter_world");
        assert_eq!(value["payload"]["player"]["id"], "player_1");
        assert_eq!(value["payload"]["player"]["spritesheet"], "BARD");
        assert_eq!(value["payload"]["player"]["checkpoint"]["x"], 100.0);
    }

    #[test]
    fn bootstrap_exchange_roundtrip() {
        let requester = InstanceId::new();
        let responder = InstanceId::new();

        let request = Envelope::from_instance(
            Event::BootstrapRequest {
                instance_id: requester,
            },
            requester,
        );
        let parsed: Envelope = serde_json::from_slice(&serde_json::to_vec(&request).unwrap()).unwrap();
        assert_eq!(parsed, request);

        let response = Envelope::from_instance(
            Event::BootstrapResponse {
                instance_id: responder,
                players: vec!["player_0".to_string()],
            },
            responder,
        );
        let parsed: Envelope =
            serde_json::from_slice(&serde_json::to_vec(&response).unwrap()).unwrap();
        assert_eq!(parsed, response);
    }
}
