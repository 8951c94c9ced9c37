use crate::error::{AppError, AppResult};
use crate::models::AuctionStatus;
use crate::selection::{RoundOutcome, SpinPlan};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Channel for library-wide lot changes
pub const LOTS_CHANNEL: &str = "lots";

pub fn auction_channel(auction_id: Uuid) -> String {
    format!("auction:{}", auction_id)
}

/// What happened to the lots named in a `LotChange`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotChangeAction {
    Created,
    Added,
    Removed,
    Reordered,
    SumChanged,
}

/// WebSocket message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "subscribe")]
    Subscribe {
        channel: String, // "auction:{id}" or "lots"
    },
    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        channel: String,
    },
    #[serde(rename = "auction_status")]
    AuctionStatus {
        auction_id: Uuid,
        status: AuctionStatus,
        previous_status: Option<AuctionStatus>,
        winner_lot_id: Option<Uuid>,
        timestamp: i64,
    },
    #[serde(rename = "lot_change")]
    LotChange {
        /// `None` for library changes outside any auction
        auction_id: Option<Uuid>,
        action: LotChangeAction,
        lot_ids: Vec<Uuid>,
    },
    #[serde(rename = "round_result")]
    RoundResult {
        auction_id: Uuid,
        outcome: RoundOutcome,
        spin: Option<SpinPlan>,
    },
    #[serde(rename = "timer_tick")]
    TimerTick {
        auction_id: Uuid,
        left_ms: u64,
        running: bool,
        display: String,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
    },
}

impl WsMessage {
    /// Channel the message is delivered on; client requests have none
    pub fn channel(&self) -> Option<String> {
        match self {
            WsMessage::AuctionStatus { auction_id, .. }
            | WsMessage::RoundResult { auction_id, .. }
            | WsMessage::TimerTick { auction_id, .. } => Some(auction_channel(*auction_id)),
            WsMessage::LotChange { auction_id, .. } => Some(
                auction_id
                    .map(auction_channel)
                    .unwrap_or_else(|| LOTS_CHANNEL.to_string()),
            ),
            _ => None,
        }
    }
}

/// WebSocket server pushing auction updates to overlays
pub struct WebSocketServer {
    /// Broadcast sender for sending messages to all clients
    tx: broadcast::Sender<WsMessage>,
    /// Active subscriptions: channel -> set of client IDs
    subscriptions: Arc<RwLock<HashMap<String, Vec<Uuid>>>>,
    /// Client subscriptions: client_id -> set of channels
    client_channels: Arc<RwLock<HashMap<Uuid, Vec<String>>>>,
}

impl WebSocketServer {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);

        Self {
            tx,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            client_channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get broadcast sender
    pub fn sender(&self) -> broadcast::Sender<WsMessage> {
        self.tx.clone()
    }

    /// Publish a message on its channel if anyone listens there
    pub async fn publish(&self, message: WsMessage) {
        let Some(channel) = message.channel() else {
            warn!("Refusing to publish a client-only message");
            return;
        };

        let subscribers = self.subscriber_count(&channel).await;
        if subscribers == 0 {
            return;
        }

        debug!("Broadcasting to {} subscribers on channel {}", subscribers, channel);
        if let Err(e) = self.tx.send(message) {
            warn!("Failed to broadcast message: {}", e);
        }
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        let subscriptions = self.subscriptions.read().await;
        subscriptions.get(channel).map_or(0, Vec::len)
    }

    /// Subscribe a client to a channel
    pub async fn subscribe(&self, client_id: Uuid, channel: String) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        let subscribers = subscriptions.entry(channel.clone()).or_default();
        if !subscribers.contains(&client_id) {
            subscribers.push(client_id);
        }

        let channels = client_channels.entry(client_id).or_default();
        if !channels.contains(&channel) {
            channels.push(channel.clone());
        }

        info!("Client {} subscribed to {}", client_id, channel);
    }

    /// Unsubscribe a client from a channel
    pub async fn unsubscribe(&self, client_id: Uuid, channel: &str) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        if let Some(subscribers) = subscriptions.get_mut(channel) {
            subscribers.retain(|&id| id != client_id);
            if subscribers.is_empty() {
                subscriptions.remove(channel);
            }
        }

        if let Some(channels) = client_channels.get_mut(&client_id) {
            channels.retain(|c| c != channel);
            if channels.is_empty() {
                client_channels.remove(&client_id);
            }
        }

        info!("Client {} unsubscribed from {}", client_id, channel);
    }

    /// Get all channels a client is subscribed to
    pub async fn get_client_channels(&self, client_id: Uuid) -> Vec<String> {
        let client_channels = self.client_channels.read().await;
        client_channels.get(&client_id).cloned().unwrap_or_default()
    }

    async fn is_client_subscribed(&self, client_id: Uuid, channel: &str) -> bool {
        let subscriptions = self.subscriptions.read().await;
        subscriptions
            .get(channel)
            .map_or(false, |subscribers| subscribers.contains(&client_id))
    }

    /// Handle a new WebSocket connection
    pub async fn handle_connection(&self, stream: tokio::net::TcpStream) -> AppResult<()> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| AppError::Message(format!("WebSocket handshake failed: {}", e)))?;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut rx = self.tx.subscribe();
        let client_id = Uuid::new_v4();

        info!("New WebSocket connection: {}", client_id);

        let welcome = serde_json::json!({
            "type": "connected",
            "client_id": client_id.to_string(),
        });
        if let Err(e) = ws_sender.send(Message::Text(welcome.to_string())).await {
            warn!("Failed to send welcome message: {}", e);
        }

        // Shared between the reader and the broadcast forwarder
        let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));

        let ws_server_for_receiver = self.clone();
        let ws_sender_for_receiver = ws_sender.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let reply = match serde_json::from_str::<WsMessage>(&text) {
                            Ok(WsMessage::Subscribe { channel }) => {
                                ws_server_for_receiver.subscribe(client_id, channel.clone()).await;
                                serde_json::json!({ "type": "subscribed", "channel": channel })
                            }
                            Ok(WsMessage::Unsubscribe { channel }) => {
                                ws_server_for_receiver.unsubscribe(client_id, &channel).await;
                                serde_json::json!({ "type": "unsubscribed", "channel": channel })
                            }
                            Ok(_) => {
                                warn!("Unexpected message type from client {}", client_id);
                                serde_json::json!({ "type": "error", "message": "Unsupported message type" })
                            }
                            Err(_) => {
                                warn!("Failed to parse message from client {}: {}", client_id, text);
                                serde_json::json!({ "type": "error", "message": "Invalid message format" })
                            }
                        };

                        let mut sender = ws_sender_for_receiver.lock().await;
                        if let Err(e) = sender.send(Message::Text(reply.to_string())).await {
                            warn!("Failed to reply to client {}: {}", client_id, e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed: {}", client_id);
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Clean up all subscriptions for this client
            let channels = ws_server_for_receiver.get_client_channels(client_id).await;
            for channel in channels {
                ws_server_for_receiver.unsubscribe(client_id, &channel).await;
            }
        });

        let ws_server_clone = self.clone();
        let ws_sender_for_broadcast = ws_sender.clone();
        tokio::spawn(async move {
            loop {
                let msg = match rx.recv().await {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagged, skipped {} messages", client_id, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let should_send = match msg.channel() {
                    Some(channel) => ws_server_clone.is_client_subscribed(client_id, &channel).await,
                    None => false,
                };
                if !should_send {
                    continue;
                }

                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                let mut sender = ws_sender_for_broadcast.lock().await;
                if let Err(e) = sender.send(Message::Text(json)).await {
                    debug!("Stopped forwarding to client {}: {}", client_id, e);
                    break;
                }
            }
        });

        Ok(())
    }
}

impl Clone for WebSocketServer {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
            client_channels: Arc::clone(&self.client_channels),
        }
    }
}

impl Default for WebSocketServer {
    fn default() -> Self {
        Self::new()
    }
}
