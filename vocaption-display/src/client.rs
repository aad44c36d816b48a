use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::message::CaptionMessage;

/// Client connection wrapper
pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Send one caption message to the client.
    pub async fn send_message(&mut self, message: &CaptionMessage) -> Result<()> {
        let json_line = message.to_json_line()?;
        self.stream.write_all(json_line.as_bytes()).await?;
        Ok(())
    }

    /// Replay the latest caption to a newly connected client.
    pub async fn send_catch_up(&mut self, latest: Option<&CaptionMessage>) -> Result<()> {
        if let Some(message) = latest {
            self.send_message(message).await?;
        }
        Ok(())
    }
}

/// Thread-safe client list manager
pub struct ClientManager {
    clients: Arc<Mutex<Vec<Client>>>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Broadcast a message to all clients, removing dead ones.
    pub async fn broadcast(&self, message: &CaptionMessage) -> Result<()> {
        let mut clients = self.clients.lock().await;
        let mut dead_indices = Vec::new();

        for (idx, client) in clients.iter_mut().enumerate() {
            if let Err(e) = client.send_message(message).await {
                tracing::warn!("Failed to send to display client {}: {}", idx, e);
                dead_indices.push(idx);
            }
        }

        // Remove dead clients in reverse order
        for idx in dead_indices.iter().rev() {
            clients.remove(*idx);
            tracing::info!("Removed dead display client. Remaining: {}", clients.len());
        }

        Ok(())
    }

    /// Drop all connections.
    pub async fn clear(&self) {
        self.clients.lock().await.clear();
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Get cloned Arc for sharing with the accept loop.
    pub fn clone_arc(&self) -> Arc<Mutex<Vec<Client>>> {
        Arc::clone(&self.clients)
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
