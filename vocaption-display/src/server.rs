use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::client::{Client, ClientManager};
use crate::error::{DisplayError, Result};
use crate::message::CaptionMessage;

/// Live caption broadcast server for UI clients
pub struct DisplayServer {
    host: String,
    port: u16,
    client_manager: ClientManager,
    latest: Arc<RwLock<Option<CaptionMessage>>>,
    local_addr: Arc<RwLock<Option<SocketAddr>>>,
    accept_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    running: Arc<RwLock<bool>>,
}

impl DisplayServer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_manager: ClientManager::new(),
            latest: Arc::new(RwLock::new(None)),
            local_addr: Arc::new(RwLock::new(None)),
            accept_task: Arc::new(Mutex::new(None)),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start listening for display clients.
    pub async fn start(&self) -> Result<()> {
        if *self.running.read().await {
            return Err(DisplayError::AlreadyRunning);
        }

        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;
        let addr = listener.local_addr()?;
        *self.local_addr.write().await = Some(addr);
        *self.running.write().await = true;

        tracing::info!("Caption display server listening on {}", addr);

        let clients = self.client_manager.clone_arc();
        let latest = Arc::clone(&self.latest);
        let running = Arc::clone(&self.running);

        let task = tokio::spawn(async move {
            loop {
                if !*running.read().await {
                    break;
                }

                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tracing::info!("Display client connected from {}", peer);
                        let mut client = Client::new(stream);

                        let snapshot = latest.read().await.clone();
                        if let Err(e) = client.send_catch_up(snapshot.as_ref()).await {
                            tracing::warn!("Failed to send catch-up caption: {}", e);
                            continue;
                        }

                        let mut clients = clients.lock().await;
                        clients.push(client);
                        tracing::info!("Display client added. Total: {}", clients.len());
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept display client: {}", e);
                    }
                }
            }
            tracing::info!("Display accept loop stopped");
        });

        *self.accept_task.lock().await = Some(task);

        Ok(())
    }

    /// Stop the server and disconnect all clients.
    pub async fn stop(&self) -> Result<()> {
        if !*self.running.read().await {
            return Err(DisplayError::NotStarted);
        }

        *self.running.write().await = false;

        if let Some(task) = self.accept_task.lock().await.take() {
            task.abort();
        }

        self.client_manager.clear().await;
        *self.local_addr.write().await = None;

        tracing::info!("Caption display server stopped");
        Ok(())
    }

    /// Broadcast a caption update to all connected clients and remember it
    /// for late-joiner catch-up. Send failures only prune the failing client.
    pub async fn broadcast(&self, message: CaptionMessage) {
        *self.latest.write().await = Some(message.clone());

        if let Err(e) = self.client_manager.broadcast(&message).await {
            tracing::error!("Failed to broadcast caption: {}", e);
        }
    }

    /// Address actually bound (useful with port 0).
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    pub async fn client_count(&self) -> usize {
        self.client_manager.client_count().await
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
