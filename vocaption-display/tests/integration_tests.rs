use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

use vocaption_display::{CaptionMessage, DisplayServer};

async fn read_json_line(reader: &mut BufReader<TcpStream>) -> serde_json::Value {
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for caption line")
        .unwrap();
    serde_json::from_str(line.trim()).unwrap()
}

#[tokio::test]
async fn test_server_lifecycle() {
    let server = DisplayServer::new("127.0.0.1", 0);

    server.start().await.unwrap();
    assert!(server.is_running().await);
    assert!(server.local_addr().await.is_some());

    server.stop().await.unwrap();
    assert!(!server.is_running().await);
    assert!(server.local_addr().await.is_none());
}

#[tokio::test]
async fn test_broadcast_reaches_all_clients() {
    let server = DisplayServer::new("127.0.0.1", 0);
    server.start().await.unwrap();
    let addr = server.local_addr().await.unwrap();

    let mut first = BufReader::new(TcpStream::connect(addr).await.unwrap());
    let mut second = BufReader::new(TcpStream::connect(addr).await.unwrap());

    // Give the accept loop time to register both clients.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.client_count().await, 2);

    server
        .broadcast(CaptionMessage::partial("hi the", None))
        .await;
    server
        .broadcast(CaptionMessage::final_text("hi there.", None))
        .await;

    for reader in [&mut first, &mut second] {
        let partial = read_json_line(reader).await;
        assert_eq!(partial["type"], "partial");
        assert_eq!(partial["text"], "hi the");
        assert!(partial["speaker"].is_null());

        let finalized = read_json_line(reader).await;
        assert_eq!(finalized["type"], "final");
        assert_eq!(finalized["text"], "hi there.");
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_late_joiner_receives_latest_caption() {
    let server = DisplayServer::new("127.0.0.1", 0);
    server.start().await.unwrap();
    let addr = server.local_addr().await.unwrap();

    server
        .broadcast(CaptionMessage::final_text("earlier caption", None))
        .await;

    let mut late = BufReader::new(TcpStream::connect(addr).await.unwrap());
    let catch_up = read_json_line(&mut late).await;
    assert_eq!(catch_up["type"], "final");
    assert_eq!(catch_up["text"], "earlier caption");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_dead_clients_are_pruned() {
    let server = DisplayServer::new("127.0.0.1", 0);
    server.start().await.unwrap();
    let addr = server.local_addr().await.unwrap();

    let alive = TcpStream::connect(addr).await.unwrap();
    let dying = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.client_count().await, 2);

    drop(dying);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Broadcasts to the closed socket eventually fail and prune the client;
    // the first write after close may still land in the kernel buffer.
    for _ in 0..4 {
        server
            .broadcast(CaptionMessage::partial("still here", None))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(server.client_count().await, 1);

    drop(alive);
    server.stop().await.unwrap();
}
