// Include tests
#[cfg(test)]
mod tests {
    use crate::bus::{events_topic, instance_topic, MemoryBusHub, MessageBus};
    use crate::connection::{ConnectionId, ResponseSender};
    use crate::messaging::EventRouter;
    use crate::reconciler::PresenceReconciler;
    use crate::store::MemoryStore;
    use crate::world::{Locality, WorldState};
    use plaza_protocol::{Envelope, Event, InstanceId, MoveData, Notice};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::RwLock;
    use tokio::time::timeout;

    /// Response sender that records every queued frame and lets tests mark
    /// connections as closed for the liveness sweep.
    #[derive(Debug, Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(ConnectionId, Vec<u8>)>>,
        closed: Mutex<HashSet<ConnectionId>>,
    }

    impl RecordingSender {
        fn notices_for(&self, connection_id: ConnectionId) -> Vec<Notice> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(conn, _)| *conn == connection_id)
                .map(|(_, bytes)| serde_json::from_slice(bytes).unwrap())
                .collect()
        }

        fn clear(&self) {
            self.sent.lock().unwrap().clear();
        }

        fn close(&self, connection_id: ConnectionId) {
            self.closed.lock().unwrap().insert(connection_id);
        }
    }

    impl ResponseSender for RecordingSender {
        fn send_to_connection(&self, connection_id: ConnectionId, data: Vec<u8>) {
            self.sent.lock().unwrap().push((connection_id, data));
        }

        fn is_connection_open(&self, connection_id: ConnectionId) -> bool {
            !self.closed.lock().unwrap().contains(&connection_id)
        }

        fn bind_player(&self, _connection_id: ConnectionId, _player_id: &str) {}
    }

    /// One "instance" assembled from the real components, minus sockets:
    /// frames go in through the router, fan-out lands in the recording
    /// sender, and the shared hub plays the role of the broker.
    struct TestInstance {
        instance_id: InstanceId,
        state: Arc<RwLock<WorldState>>,
        router: Arc<EventRouter>,
        reconciler: Arc<PresenceReconciler>,
        sink: Arc<RecordingSender>,
        bus_rx: tokio::sync::mpsc::UnboundedReceiver<crate::bus::BusMessage>,
    }

    impl TestInstance {
        async fn connect(hub: &MemoryBusHub, store: Arc<MemoryStore>) -> Self {
            let instance_id = InstanceId::new();
            let bus: Arc<dyn MessageBus> = Arc::new(hub.handle("plaza"));
            let sink = Arc::new(RecordingSender::default());
            let sink_dyn: Arc<dyn ResponseSender> = sink.clone();
            let state = Arc::new(RwLock::new(WorldState::new(500.0)));

            let router = Arc::new(EventRouter::new(
                instance_id,
                state.clone(),
                bus.clone(),
                store,
                sink_dyn.clone(),
                "plaza",
            ));
            let reconciler = Arc::new(PresenceReconciler::new(
                instance_id,
                state.clone(),
                bus.clone(),
                router.clone(),
                sink_dyn,
                Duration::from_secs(10),
                "plaza",
            ));

            let bus_rx = bus
                .subscribe(&[events_topic("plaza"), instance_topic("plaza", instance_id)])
                .await
                .expect("memory bus subscribe cannot fail");

            Self {
                instance_id,
                state,
                router,
                reconciler,
                sink,
                bus_rx,
            }
        }

        /// Feeds a raw client frame into the router as `connection_id`.
        async fn client_send(&self, connection_id: ConnectionId, event: &Event) {
            let text = serde_json::to_string(&Envelope::from_client(event.clone())).unwrap();
            self.router
                .handle_client_message(connection_id, &text)
                .await
                .unwrap();
        }

        /// Applies every bus message currently in flight for this instance
        /// (including self-echo, which the router discards) and returns how
        /// many were processed.
        async fn pump(&mut self) -> usize {
            let mut applied = 0;
            while let Ok(Some(message)) =
                timeout(Duration::from_millis(200), self.bus_rx.recv()).await
            {
                self.router.handle_bus_message(&message.payload).await;
                applied += 1;
            }
            applied
        }

        async fn has_session(&self, player_id: &str) -> bool {
            self.state.read().await.registry().contains(player_id)
        }

        async fn room_members(&self, world_id: &str) -> Vec<String> {
            let state = self.state.read().await;
            let mut members: Vec<String> = state
                .room(world_id)
                .map(|room| room.members().map(|m| m.player_id.clone()).collect())
                .unwrap_or_default();
            members.sort();
            members
        }
    }

    fn enter(player_id: &str) -> Event {
        Event::EnterWorld {
            player_id: player_id.to_string(),
        }
    }

    fn leave(player_id: &str) -> Event {
        Event::LeaveWorld {
            player_id: player_id.to_string(),
        }
    }

    fn mv(player_id: &str, x: f64, y: f64, timestamp: u64) -> Event {
        Event::Move {
            player_id: player_id.to_string(),
            data: MoveData {
                x,
                y,
                animation: Some("walk_down".to_string()),
                timestamp,
            },
        }
    }

    #[tokio::test]
    async fn duplicate_enters_leave_exactly_one_session() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let instance = TestInstance::connect(&hub, store).await;

        instance.client_send(1, &enter("player_0")).await;
        instance.client_send(1, &enter("player_0")).await;
        instance.client_send(2, &enter("player_0")).await;

        let state = instance.state.read().await;
        assert_eq!(state.registry().len(), 1);
        // The first admission won; the racing connection did not steal it.
        assert_eq!(
            state.registry().get("player_0").unwrap().locality,
            Locality::Local { connection_id: 1 }
        );
    }

    #[tokio::test]
    async fn enter_replies_with_roster_of_other_members_only() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let instance = TestInstance::connect(&hub, store).await;

        instance.client_send(1, &enter("player_0")).await;
        instance.client_send(2, &enter("player_5")).await;

        // player_5's socket got the roster: exactly player_0, never itself.
        let roster: Vec<String> = instance
            .sink
            .notices_for(2)
            .into_iter()
            .map(|notice| match notice {
                Notice::EnterWorld { player } => player.id,
                other => panic!("unexpected notice: {other:?}"),
            })
            .collect();
        assert_eq!(roster, ["player_0"]);

        // player_0's socket heard the room announcement for player_5.
        let announcements: Vec<String> = instance
            .sink
            .notices_for(1)
            .into_iter()
            .map(|notice| match notice {
                Notice::EnterWorld { player } => player.id,
                other => panic!("unexpected notice: {other:?}"),
            })
            .collect();
        assert_eq!(announcements, ["player_5"]);
    }

    #[tokio::test]
    async fn enter_for_unknown_player_is_a_noop() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let instance = TestInstance::connect(&hub, store).await;

        instance.client_send(1, &enter("player_99")).await;
        assert!(!instance.has_session("player_99").await);
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_are_dropped() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let instance = TestInstance::connect(&hub, store).await;

        assert!(instance
            .router
            .handle_client_message(1, "this is not json")
            .await
            .is_err());
        assert!(instance
            .router
            .handle_client_message(1, r#"{"type":"dance","payload":{}}"#)
            .await
            .is_err());

        // A bus message with the same defects is swallowed entirely.
        instance.router.handle_bus_message(b"garbage").await;
        assert!(instance.state.read().await.registry().is_empty());
    }

    #[tokio::test]
    async fn presence_propagates_across_instances() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let mut a = TestInstance::connect(&hub, store.clone()).await;
        let mut b = TestInstance::connect(&hub, store).await;

        // P1 connects to instance A.
        a.client_send(1, &enter("player_0")).await;
        b.pump().await;

        assert!(b.has_session("player_0").await);
        assert_eq!(
            b.state.read().await.registry().get("player_0").unwrap().locality,
            Locality::Remote
        );

        // P2 connects to instance B, same world.
        b.client_send(7, &enter("player_5")).await;
        a.pump().await;

        assert_eq!(a.room_members("world_0").await, ["player_0", "player_5"]);
        assert_eq!(b.room_members("world_0").await, ["player_0", "player_5"]);

        // P1's socket learned about P2 only after the bus delivered the
        // event, and was never sent its own data.
        let p1_enters: Vec<String> = a
            .sink
            .notices_for(1)
            .into_iter()
            .filter_map(|notice| match notice {
                Notice::EnterWorld { player } => Some(player.id),
                _ => None,
            })
            .collect();
        assert_eq!(p1_enters, ["player_5"]);
    }

    #[tokio::test]
    async fn self_echo_is_never_reapplied() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let a = TestInstance::connect(&hub, store).await;
        let peer_id = InstanceId::new();

        // An envelope tagged with our own id must be discarded outright...
        let own_echo = Envelope::from_instance(enter("player_0"), a.instance_id);
        a.router
            .handle_bus_message(&serde_json::to_vec(&own_echo).unwrap())
            .await;
        assert!(!a.has_session("player_0").await);

        // ...while the same envelope from a peer applies normally.
        let from_peer = Envelope::from_instance(enter("player_0"), peer_id);
        a.router
            .handle_bus_message(&serde_json::to_vec(&from_peer).unwrap())
            .await;
        assert!(a.has_session("player_0").await);
    }

    #[tokio::test]
    async fn out_of_order_moves_keep_the_newer_position() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let instance = TestInstance::connect(&hub, store).await;

        instance.client_send(1, &enter("player_0")).await;
        instance.client_send(1, &mv("player_0", 0.0, 0.0, 100)).await;
        instance.client_send(1, &mv("player_0", 5.0, 5.0, 50)).await;

        let state = instance.state.read().await;
        let session = state.room("world_0").unwrap().member("player_0").unwrap();
        assert_eq!((session.x, session.y), (0.0, 0.0));
        assert_eq!(session.last_move_timestamp, 100);
    }

    #[tokio::test]
    async fn remote_moves_fan_out_to_interested_locals() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let mut a = TestInstance::connect(&hub, store.clone()).await;
        let mut b = TestInstance::connect(&hub, store).await;

        a.client_send(1, &enter("player_0")).await;
        b.client_send(7, &enter("player_5")).await;
        a.pump().await;
        b.pump().await;
        b.sink.clear();

        // P1 moves on A; B's local P2 is within range (both near the
        // checkpoint) and must see the move.
        a.client_send(1, &mv("player_0", 120.0, 80.0, 10)).await;
        b.pump().await;

        let moves: Vec<(String, f64, f64)> = b
            .sink
            .notices_for(7)
            .into_iter()
            .filter_map(|notice| match notice {
                Notice::Move { player_id, data } => Some((player_id, data.x, data.y)),
                _ => None,
            })
            .collect();
        assert_eq!(moves, [("player_0".to_string(), 120.0, 80.0)]);

        // And B's remote session tracks the authoritative position.
        let state = b.state.read().await;
        let session = state.room("world_0").unwrap().member("player_0").unwrap();
        assert_eq!((session.x, session.y), (120.0, 80.0));
    }

    #[tokio::test]
    async fn talk_reaches_local_recipients_within_range_only() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let mut a = TestInstance::connect(&hub, store.clone()).await;
        let mut b = TestInstance::connect(&hub, store).await;

        a.client_send(1, &enter("player_0")).await;
        a.client_send(2, &enter("player_5")).await;
        b.client_send(7, &enter("player_1")).await;
        a.pump().await;
        b.pump().await;
        a.sink.clear();
        b.sink.clear();

        let talk = Event::Talk {
            from: "player_0".to_string(),
            players: vec![
                "player_5".to_string(),
                "player_1".to_string(),
                "player_99".to_string(),
            ],
            message: "hello there".to_string(),
        };
        a.client_send(1, &talk).await;
        b.pump().await;

        // Local recipient on A, remote-listed player on B: each delivered
        // by the instance holding the socket. The unknown id is skipped.
        let a_talks = a.sink.notices_for(2);
        assert!(matches!(
            &a_talks[..],
            [Notice::Talk { from, message }] if from == "player_0" && message == "hello there"
        ));
        let b_talks = b.sink.notices_for(7);
        assert_eq!(b_talks.len(), 1);

        // Move the local recipient out of range; chat stops reaching it.
        a.client_send(2, &mv("player_5", 2000.0, 2000.0, 5)).await;
        a.sink.clear();
        a.client_send(1, &talk).await;
        assert!(a.sink.notices_for(2).is_empty());
    }

    #[tokio::test]
    async fn disconnect_synthesizes_leave_for_the_bound_player() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let instance = TestInstance::connect(&hub, store).await;

        instance.client_send(1, &enter("player_0")).await;
        instance.client_send(2, &enter("player_5")).await;
        instance.sink.clear();

        instance.router.handle_disconnect(1).await;

        assert!(!instance.has_session("player_0").await);
        let notices = instance.sink.notices_for(2);
        assert!(matches!(
            &notices[..],
            [Notice::LeaveWorld { player_id }] if player_id == "player_0"
        ));
    }

    #[tokio::test]
    async fn liveness_sweep_removes_dead_sessions_and_publishes_leave() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let mut a = TestInstance::connect(&hub, store.clone()).await;
        let mut b = TestInstance::connect(&hub, store).await;

        a.client_send(1, &enter("player_0")).await;
        a.client_send(2, &enter("player_5")).await;
        b.pump().await;
        assert!(b.has_session("player_0").await);
        a.sink.clear();

        // P1's socket dies without a leave_world.
        a.sink.close(1);
        let swept = a.reconciler.run_sweep().await;
        assert_eq!(swept, 1);

        assert!(!a.has_session("player_0").await);
        // The remaining member heard the broadcast...
        let notices = a.sink.notices_for(2);
        assert!(matches!(
            &notices[..],
            [Notice::LeaveWorld { player_id }] if player_id == "player_0"
        ));
        // ...and so did the peer instance, via the published leave.
        b.pump().await;
        assert!(!b.has_session("player_0").await);
        assert!(b.has_session("player_5").await);
    }

    #[tokio::test]
    async fn snapshot_roundtrip_reconstructs_membership() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let a = TestInstance::connect(&hub, store.clone()).await;

        a.client_send(1, &enter("player_0")).await;
        a.client_send(2, &enter("player_5")).await;
        a.client_send(3, &enter("player_2")).await; // world_1
        a.client_send(1, &mv("player_0", 42.0, 7.0, 10)).await;
        a.reconciler.export_snapshot().await;

        // A cold-starting instance rebuilds the rooms from the slot alone.
        let fresh = TestInstance::connect(&hub, store).await;
        fresh.reconciler.recover().await;

        assert_eq!(fresh.room_members("world_0").await, ["player_0", "player_5"]);
        assert_eq!(fresh.room_members("world_1").await, ["player_2"]);

        let state = fresh.state.read().await;
        let session = state.room("world_0").unwrap().member("player_0").unwrap();
        // Same membership, recorded position, remote liveness.
        assert_eq!((session.x, session.y), (42.0, 7.0));
        assert_eq!(session.locality, Locality::Remote);
    }

    #[tokio::test]
    async fn bootstrap_exchange_corrects_for_missing_snapshot() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let mut a = TestInstance::connect(&hub, store.clone()).await;

        a.client_send(1, &enter("player_0")).await;
        a.pump().await; // discard A's own publishes

        // B starts with no snapshot in the slot: gossip must fill in.
        let mut b = TestInstance::connect(&hub, store).await;
        b.reconciler.recover().await;

        // A answers the request on B's private topic.
        a.pump().await;
        b.pump().await;

        assert!(b.has_session("player_0").await);
        assert_eq!(
            b.state.read().await.registry().get("player_0").unwrap().locality,
            Locality::Remote
        );
    }

    #[tokio::test]
    async fn bus_origin_enters_get_no_roster_reply() {
        let hub = MemoryBusHub::new();
        let store = Arc::new(MemoryStore::with_sample_data());
        let a = TestInstance::connect(&hub, store).await;
        let peer = InstanceId::new();

        let envelope = Envelope::from_instance(enter("player_0"), peer);
        a.router
            .handle_bus_message(&serde_json::to_vec(&envelope).unwrap())
            .await;

        assert!(a.has_session("player_0").await);
        // No socket anywhere: nothing may have been queued.
        assert!(a.sink.sent.lock().unwrap().is_empty());
    }
}
