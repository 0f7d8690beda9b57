use crate::error::{AppError, AppResult};
use crate::models::{ActivityEntry, ActivityKind, BetStatus};
use crate::services::ActivitySink;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// WebSocket message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "subscribe")]
    Subscribe {
        channel: String, // "bet:{id}", "league:{id}"
    },
    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        channel: String,
    },
    #[serde(rename = "activity")]
    Activity {
        bet_id: Uuid,
        league_id: Uuid,
        kind: ActivityKind,
        actor: String,
        from_status: Option<BetStatus>,
        to_status: Option<BetStatus>,
        details: serde_json::Value,
        timestamp: i64,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
    },
}

impl WsMessage {
    /// Channels a message is delivered on
    pub fn channels(&self) -> Vec<String> {
        match self {
            WsMessage::Activity {
                bet_id, league_id, ..
            } => vec![bet_channel(*bet_id), league_channel(*league_id)],
            _ => Vec::new(),
        }
    }
}

impl From<&ActivityEntry> for WsMessage {
    fn from(entry: &ActivityEntry) -> Self {
        WsMessage::Activity {
            bet_id: entry.bet_id,
            league_id: entry.league_id,
            kind: entry.kind,
            actor: entry.actor.label(),
            from_status: entry.from_status,
            to_status: entry.to_status,
            details: entry.details.clone(),
            timestamp: entry.created_at.timestamp(),
        }
    }
}

pub fn bet_channel(bet_id: Uuid) -> String {
    format!("bet:{}", bet_id)
}

pub fn league_channel(league_id: Uuid) -> String {
    format!("league:{}", league_id)
}

/// WebSocket server for real-time bet activity
pub struct WebSocketServer {
    /// Broadcast sender for sending messages to all clients
    tx: broadcast::Sender<WsMessage>,
    /// Active subscriptions: channel -> client IDs
    subscriptions: Arc<RwLock<HashMap<String, Vec<Uuid>>>>,
    /// Client subscriptions: client_id -> channels
    client_channels: Arc<RwLock<HashMap<Uuid, Vec<String>>>>,
}

impl WebSocketServer {
    /// Create a new WebSocket server
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000); // Buffer up to 1000 messages

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

    /// Send a message to every client subscribed to one of its channels
    pub async fn broadcast(&self, message: WsMessage) {
        let subscriptions = self.subscriptions.read().await;
        let count: usize = message
            .channels()
            .iter()
            .filter_map(|c| subscriptions.get(c))
            .map(Vec::len)
            .sum();
        if count == 0 {
            return;
        }

        debug!("Broadcasting to {} subscriptions", count);
        if let Err(e) = self.tx.send(message) {
            warn!("Failed to broadcast message: {}", e);
        }
    }

    /// Forward a committed activity entry to its bet and league channels
    pub async fn broadcast_activity(&self, entry: &ActivityEntry) {
        self.broadcast(WsMessage::from(entry)).await;
    }

    /// Subscribe a client to a channel
    pub async fn subscribe(&self, client_id: Uuid, channel: String) -> AppResult<()> {
        validate_channel(&channel)?;
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        let subscribers = subscriptions.entry(channel.clone()).or_insert_with(Vec::new);
        if subscribers.contains(&client_id) {
            return Ok(());
        }
        subscribers.push(client_id);
        client_channels
            .entry(client_id)
            .or_insert_with(Vec::new)
            .push(channel.clone());

        info!("Client {} subscribed to {}", client_id, channel);
        Ok(())
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

    async fn is_subscribed_to_any(&self, client_id: Uuid, channels: &[String]) -> bool {
        let subscriptions = self.subscriptions.read().await;
        channels.iter().any(|channel| {
            subscriptions
                .get(channel)
                .map_or(false, |subscribers| subscribers.contains(&client_id))
        })
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

        let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));
        let ws_sender_for_receiver = ws_sender.clone();
        let server = self.clone();

        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                let reply = match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<WsMessage>(&text) {
                        Ok(WsMessage::Subscribe { channel }) => {
                            match server.subscribe(client_id, channel.clone()).await {
                                Ok(()) => serde_json::json!({ "type": "subscribed", "channel": channel }),
                                Err(e) => serde_json::json!({ "type": "error", "message": e.to_string() }),
                            }
                        }
                        Ok(WsMessage::Unsubscribe { channel }) => {
                            server.unsubscribe(client_id, &channel).await;
                            serde_json::json!({ "type": "unsubscribed", "channel": channel })
                        }
                        Ok(_) => {
                            warn!("Unexpected message type from client {}", client_id);
                            continue;
                        }
                        Err(_) => {
                            warn!("Failed to parse message from client {}: {}", client_id, text);
                            serde_json::json!({ "type": "error", "message": "Invalid message format" })
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed: {}", client_id);
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => continue,
                };

                let mut sender = ws_sender_for_receiver.lock().await;
                if let Err(e) = sender.send(Message::Text(reply.to_string())).await {
                    warn!("Failed to reply to client {}: {}", client_id, e);
                }
            }

            // Clean up all subscriptions for this client
            for channel in server.get_client_channels(client_id).await {
                server.unsubscribe(client_id, &channel).await;
            }
        });

        let server = self.clone();
        tokio::spawn(async move {
            loop {
                let msg = match rx.recv().await {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagged, {} messages dropped", client_id, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if !server.is_subscribed_to_any(client_id, &msg.channels()).await {
                    continue;
                }

                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                let mut sender = ws_sender.lock().await;
                if let Err(e) = sender.send(Message::Text(json)).await {
                    error!("Failed to send message to client {}: {}", client_id, e);
                    break;
                }
            }
        });

        Ok(())
    }
}

fn validate_channel(channel: &str) -> AppResult<()> {
    let valid = match channel.split_once(':') {
        Some(("bet", id)) | Some(("league", id)) => Uuid::parse_str(id).is_ok(),
        _ => false,
    };
    if !valid {
        return Err(AppError::Validation(format!("Unknown channel: {}", channel)));
    }
    Ok(())
}

#[async_trait]
impl ActivitySink for WebSocketServer {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn publish(&self, entry: &ActivityEntry) -> AppResult<()> {
        self.broadcast_activity(entry).await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Actor;
    use chrono::Utc;

    fn entry() -> ActivityEntry {
        ActivityEntry::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Actor::Scheduler,
            ActivityKind::BetResolved,
            Utc::now(),
        )
        .transition(BetStatus::Proofing, BetStatus::Resolved)
    }

    #[test]
    fn test_activity_routes_to_bet_and_league() {
        let entry = entry();
        let message = WsMessage::from(&entry);
        assert_eq!(
            message.channels(),
            vec![bet_channel(entry.bet_id), league_channel(entry.league_id)]
        );

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "activity");
        assert_eq!(json["kind"], "bet_resolved");
    }

    #[tokio::test]
    async fn test_subscriptions_are_tracked_once() {
        let server = WebSocketServer::new();
        let client = Uuid::new_v4();
        let channel = bet_channel(Uuid::new_v4());

        server.subscribe(client, channel.clone()).await.unwrap();
        server.subscribe(client, channel.clone()).await.unwrap();
        assert_eq!(server.get_client_channels(client).await, vec![channel.clone()]);

        assert!(server.subscribe(client, "event:42".into()).await.is_err());

        server.unsubscribe(client, &channel).await;
        assert!(server.get_client_channels(client).await.is_empty());
    }

    #[tokio::test]
    async fn test_only_subscribed_activity_is_broadcast() {
        let server = WebSocketServer::new();
        let mut rx = server.sender().subscribe();
        let entry = entry();

        server.publish(&entry).await.unwrap();
        assert!(rx.try_recv().is_err());

        server
            .subscribe(Uuid::new_v4(), league_channel(entry.league_id))
            .await
            .unwrap();
        server.publish(&entry).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), WsMessage::from(&entry));
    }
}
