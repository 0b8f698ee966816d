//! Connection handling logic for WebSocket clients.
//!
//! This module contains the core connection handling logic that manages
//! the lifecycle of individual client connections, including WebSocket
//! handshaking, message processing, and cleanup.

use crate::{connection::ConnectionManager, error::ServerError, messaging::EventRouter};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, trace, warn};

/// Handles a single client connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Perform WebSocket handshake
/// 2. Register connection and its write half with the connection manager
/// 3. Run the incoming task (frames → event router) and the outgoing task
///    (broadcast queue → socket) until either ends
/// 4. Deregister and synthesize the `leave_world` the client never sent
///
/// The close path here is the event-driven primary; the reconciler's
/// liveness sweep only catches connections whose close event was missed.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection_manager: Arc<ConnectionManager>,
    router: Arc<EventRouter>,
    max_message_size: usize,
) -> Result<(), ServerError> {
    // Perform WebSocket handshake
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));
    let connection_id = connection_manager.add_connection(addr);
    connection_manager.register_ws_sender(connection_id, ws_sender.clone());

    let mut message_receiver = connection_manager.subscribe();
    let ws_sender_incoming = ws_sender.clone();
    let ws_sender_outgoing = ws_sender;

    // Incoming message task - routes frames through the event router
    let incoming_task = {
        let router = router.clone();

        async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if text.len() > max_message_size {
                            warn!(
                                "📏 Dropping oversized frame ({} bytes) from connection {}",
                                text.len(),
                                connection_id
                            );
                            continue;
                        }
                        if let Err(e) = router
                            .handle_client_message(connection_id, text.as_str())
                            .await
                        {
                            trace!("❌ Message routing error: {}", e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("🔌 Client {} requested close", connection_id);
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        let mut ws_sender = ws_sender_incoming.lock().await;
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Err(e) => {
                        error!("WebSocket error for connection {}: {}", connection_id, e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    };

    // Outgoing message task - drains the broadcast queue for this connection
    let outgoing_task = {
        let ws_sender = ws_sender_outgoing;
        async move {
            while let Ok((target_connection_id, message)) = message_receiver.recv().await {
                if target_connection_id == connection_id {
                    let message_text = String::from_utf8_lossy(&message);
                    let mut ws_sender = ws_sender.lock().await;
                    if let Err(e) = ws_sender
                        .send(Message::Text(message_text.to_string().into()))
                        .await
                    {
                        error!("Failed to send message: {}", e);
                        break;
                    }
                }
            }
        }
    };

    // Run both tasks concurrently until one completes
    tokio::select! {
        _ = incoming_task => {},
        _ = outgoing_task => {},
    }

    // Deregister before the synthesized leave so the liveness view is
    // already correct when the leave fans out.
    connection_manager.remove_ws_sender(connection_id);
    connection_manager.remove_connection(connection_id);
    router.handle_disconnect(connection_id).await;
    Ok(())
}
